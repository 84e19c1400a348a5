//! Flat event-builder fragments.
//!
//! A flat fragment is a fixed 20-byte [`FragmentHeader`] immediately followed
//! by a serialized record. Event builders consume streams of these; built
//! physics events carry a sequence of them behind a self-inclusive byte
//! count.
//!
//! ```text
//! offset  0  u64 timestamp
//! offset  8  u32 source id
//! offset 12  u32 payload size
//! offset 16  u32 barrier type
//! offset 20  payload
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::RecordError;
use crate::record::{BodyHeader, Fragment, FormatVersion, Record, RecordBody, NULL_TIMESTAMP};

/// Fixed header in front of every flat fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Event timestamp.
    pub timestamp: u64,
    /// Producer id.
    pub source_id: u32,
    /// Bytes of payload following the header.
    pub payload_size: u32,
    /// State-change tag for run boundaries, else 0.
    pub barrier_type: u32,
}

impl FragmentHeader {
    /// Wire size of the header.
    pub const SIZE: usize = 20;

    /// Header describing `record` as a flat fragment payload.
    ///
    /// Timestamp and source id come from the record's body header; records
    /// without one get [`NULL_TIMESTAMP`] and `default_source_id`. The
    /// barrier type is derived from the record kind alone.
    pub fn for_record(record: &Record, default_source_id: u32) -> Self {
        let (timestamp, source_id) = match record.body_header() {
            Some(header) => (header.timestamp, header.source_id),
            None => (NULL_TIMESTAMP, default_source_id),
        };
        Self {
            timestamp,
            source_id,
            payload_size: record.size() as u32,
            barrier_type: record.kind().barrier_type(),
        }
    }

    /// Serialize the header.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.source_id);
        buf.put_u32_le(self.payload_size);
        buf.put_u32_le(self.barrier_type);
        out
    }

    /// Parse a header from the front of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < Self::SIZE {
            return Err(RecordError::Truncated {
                declared: Self::SIZE,
                available: bytes.len(),
            });
        }
        let mut buf = &bytes[..Self::SIZE];
        Ok(Self {
            timestamp: buf.get_u64_le(),
            source_id: buf.get_u32_le(),
            payload_size: buf.get_u32_le(),
            barrier_type: buf.get_u32_le(),
        })
    }
}

/// Flatten `record` into header bytes plus serialized payload.
pub fn flatten(record: &Record, default_source_id: u32) -> ([u8; FragmentHeader::SIZE], Bytes) {
    let header = FragmentHeader::for_record(record, default_source_id);
    (header.encode(), record.encode())
}

/// Wrap `record` in an `EVB_FRAGMENT` record of the same generation.
///
/// The inverse of flattening: the fragment's body header carries what the
/// flat header would, and its payload is the serialized record.
pub fn wrap(record: &Record, default_source_id: u32) -> Record {
    let header = FragmentHeader::for_record(record, default_source_id);
    let body = RecordBody::Fragment(Fragment {
        payload: record.encode(),
        unknown_payload: false,
    });
    Record::from_parts(
        record.version(),
        Some(BodyHeader::new(
            header.timestamp,
            header.source_id,
            header.barrier_type,
        )),
        body,
    )
}

/// Decode the record carried by a fragment payload.
pub fn unwrap_payload(fragment: &Fragment, version: FormatVersion) -> Result<Record, RecordError> {
    Record::decode(&fragment.payload, version)
}

/// Iterator over the flat fragments of an event-built physics event body.
#[derive(Debug, Clone)]
pub struct BuiltEventIter<'a> {
    rest: &'a [u8],
}

impl<'a> BuiltEventIter<'a> {
    /// Start iterating an event-builder body: a `u32` byte count that
    /// includes itself, then back-to-back flat fragments.
    pub fn new(body: &'a [u8]) -> Result<Self, RecordError> {
        if body.len() < 4 {
            return Err(RecordError::FieldOverrun {
                field: "built_event_size",
            });
        }
        let declared = (&body[..4]).get_u32_le() as usize;
        if declared < 4 || declared > body.len() {
            return Err(RecordError::Truncated {
                declared,
                available: body.len(),
            });
        }
        Ok(Self {
            rest: &body[4..declared],
        })
    }
}

impl<'a> Iterator for BuiltEventIter<'a> {
    type Item = Result<(FragmentHeader, &'a [u8]), RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let header = match FragmentHeader::decode(self.rest) {
            Ok(header) => header,
            Err(err) => {
                self.rest = &[];
                return Some(Err(err));
            }
        };
        let end = FragmentHeader::SIZE + header.payload_size as usize;
        if end > self.rest.len() {
            let available = self.rest.len() - FragmentHeader::SIZE;
            self.rest = &[];
            return Some(Err(RecordError::Truncated {
                declared: header.payload_size as usize,
                available,
            }));
        }
        let payload = &self.rest[FragmentHeader::SIZE..end];
        self.rest = &self.rest[end..];
        Some(Ok((header, payload)))
    }
}

/// Build an event-builder body from records, the way an event builder
/// would glom them.
pub fn compose_built_event<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    default_source_id: u32,
) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u32_le(0);
    for record in records {
        let (header, payload) = flatten(record, default_source_id);
        out.put_slice(&header);
        out.put_slice(&payload);
    }
    let total = out.len() as u32;
    out[..4].copy_from_slice(&total.to_le_bytes());
    out.freeze()
}
