//! Self-describing, length-prefixed binary records ("ring items").
//!
//! A [`Record`] is a value built once and never mutated: a wire generation,
//! an optional [`BodyHeader`], and a variant payload ([`RecordBody`]). Its
//! [`size`](Record::size) is always the exact number of bytes
//! [`encode`](Record::encode) produces, so a record read from a stream and a
//! record built in memory are interchangeable.
//!
//! A decoded record keeps the bytes it was decoded from and encodes back to
//! exactly those bytes, so passing a record through unchanged never alters
//! the stream. Records built with the constructors are encoded from their
//! fields.
//!
//! # Wire layout
//!
//! ```text
//! u32 size | u32 type | [body header section] | payload
//! ```
//!
//! The body header section depends on [`FormatVersion`]: absent in v10, and a
//! size word in v11 and v12. The word is 0 or 4 when there is no body header
//! (v11 writes 0, v12 writes 4) and 20 or more when there is one; anything
//! past the 20 standard bytes is an extension carried through untouched.

pub mod body;
pub mod codec;
pub mod kind;

use bytes::{Bytes, BytesMut};

pub use body::{
    BodyHeader, Composite, DataFormat, EventCount, Fragment, GlomParameters, RecordBody, Scaler,
    StateChange, Text, TimestampPolicy, NULL_TIMESTAMP, TITLE_MAXSIZE,
};
pub use kind::{
    FormatVersion, RecordKind, ABNORMAL_ENDRUN, BEGIN_RUN, COMPOSITE_FLAG, END_RUN, EVB_FRAGMENT,
    EVB_GLOM_INFO, EVB_UNKNOWN_PAYLOAD, MONITORED_VARIABLES, PACKET_TYPES, PAUSE_RUN,
    PERIODIC_SCALERS, PHYSICS_EVENT, PHYSICS_EVENT_COUNT, RESUME_RUN, RING_FORMAT,
};

use crate::error::RecordError;

/// One record of a DAQ stream.
///
/// Equality compares the decoded content; the retained wire bytes of a
/// decoded record take no part in it.
#[derive(Debug, Clone)]
pub struct Record {
    version: FormatVersion,
    body_header: Option<BodyHeader>,
    header_extension: Bytes,
    body: RecordBody,
    wire: Option<Bytes>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.body_header == other.body_header
            && self.header_extension == other.header_extension
            && self.body == other.body
    }
}

impl Eq for Record {}

impl Record {
    /// Build a record, checking that the payload can be expressed in
    /// `version`.
    ///
    /// v10 has no body headers; one passed for anything but a fragment is
    /// discarded.
    pub fn new(
        version: FormatVersion,
        body_header: Option<BodyHeader>,
        body: RecordBody,
    ) -> Result<Self, RecordError> {
        let kind = body.kind();
        match &body {
            RecordBody::StateChange(sc) if !sc.kind.is_state_change() => {
                return Err(RecordError::KindMismatch(sc.kind));
            }
            RecordBody::Text(text)
                if !matches!(
                    text.kind,
                    RecordKind::PacketTypes | RecordKind::MonitoredVariables
                ) =>
            {
                return Err(RecordError::KindMismatch(text.kind));
            }
            RecordBody::Composite(composite) => {
                if let Some(child) = composite.children.iter().find(|c| c.version != version) {
                    return Err(RecordError::MixedVersions {
                        parent: version,
                        child: child.version,
                    });
                }
            }
            _ => {}
        }
        if RecordKind::from_type_id(kind.type_id(), version) != kind {
            return Err(RecordError::Unsupported { kind, version });
        }
        Ok(Self::from_parts(version, body_header, body))
    }

    pub(crate) fn from_parts(
        version: FormatVersion,
        body_header: Option<BodyHeader>,
        body: RecordBody,
    ) -> Self {
        let body_header = match (&body, version) {
            (RecordBody::Fragment(_), _) => body_header,
            (_, FormatVersion::V10) => None,
            _ => body_header,
        };
        Self {
            version,
            body_header,
            header_extension: Bytes::new(),
            body,
            wire: None,
        }
    }

    pub(crate) fn with_header_extension(mut self, extension: Bytes) -> Self {
        if self.body_header.is_some() {
            self.header_extension = extension;
        }
        self
    }

    pub(crate) fn with_wire(mut self, wire: Bytes) -> Self {
        self.wire = Some(wire);
        self
    }

    /// A begin/end/pause/resume record with default timing fields.
    pub fn state_change(
        version: FormatVersion,
        kind: RecordKind,
        run_number: u32,
    ) -> Result<Self, RecordError> {
        Self::new(
            version,
            None,
            RecordBody::StateChange(StateChange::new(kind, run_number)),
        )
    }

    /// A physics event with an opaque payload.
    pub fn physics_event(
        version: FormatVersion,
        body_header: Option<BodyHeader>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::from_parts(version, body_header, RecordBody::PhysicsEvent(payload.into()))
    }

    /// A composite record built from `children` (v12 only).
    pub fn composite(
        version: FormatVersion,
        base_type: u32,
        body_header: Option<BodyHeader>,
        children: Vec<Record>,
    ) -> Result<Self, RecordError> {
        Self::new(
            version,
            body_header,
            RecordBody::Composite(Composite {
                base_type,
                children,
            }),
        )
    }

    /// An abnormal end-of-run marker (v11 and later).
    pub fn abnormal_end(version: FormatVersion) -> Result<Self, RecordError> {
        Self::new(version, None, RecordBody::AbnormalEnd)
    }

    /// Decode exactly one record from `bytes`.
    ///
    /// `bytes` may extend past the record; the declared size decides where
    /// it ends. A buffer shorter than the declared size is rejected.
    pub fn decode(bytes: &[u8], version: FormatVersion) -> Result<Self, RecordError> {
        codec::decode_prefix(bytes, version).map(|(record, _)| record)
    }

    /// Serialize the record.
    ///
    /// A decoded record returns the bytes it was decoded from.
    pub fn encode(&self) -> Bytes {
        if let Some(wire) = &self.wire {
            return wire.clone();
        }
        let mut out = BytesMut::with_capacity(self.size());
        self.encode_into(&mut out);
        out.freeze()
    }

    /// Serialize the record onto the end of `out`.
    pub fn encode_into(&self, out: &mut BytesMut) {
        codec::encode_into(self, out);
    }

    /// Total serialized length including the size and type words.
    pub fn size(&self) -> usize {
        match &self.wire {
            Some(wire) => wire.len(),
            None => self.encoded_size(),
        }
    }

    /// Length the fields encode to, ignoring retained wire bytes.
    pub(crate) fn encoded_size(&self) -> usize {
        codec::RECORD_HEADER_SIZE + codec::body_header_section_len(self) + codec::payload_len(self)
    }

    /// Wire generation of this record.
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Kind of this record.
    pub fn kind(&self) -> RecordKind {
        self.body.kind()
    }

    /// Wire type tag of this record.
    pub fn type_id(&self) -> u32 {
        self.kind().type_id()
    }

    /// Body header, if the record carries one.
    pub fn body_header(&self) -> Option<&BodyHeader> {
        self.body_header.as_ref()
    }

    /// Body-header bytes past the standard 20, as read from the wire.
    pub fn body_header_extension(&self) -> &[u8] {
        &self.header_extension
    }

    /// Bytes this record was decoded from, if it was decoded.
    pub fn wire(&self) -> Option<&Bytes> {
        self.wire.as_ref()
    }

    /// Variant payload.
    pub fn body(&self) -> &RecordBody {
        &self.body
    }

    /// Consume the record, returning its payload.
    pub fn into_body(self) -> RecordBody {
        self.body
    }

    /// Run number of a state-change record.
    pub fn run_number(&self) -> Option<u32> {
        match &self.body {
            RecordBody::StateChange(sc) => Some(sc.run_number),
            _ => None,
        }
    }

    /// Direct children of a composite record; empty for everything else.
    pub fn children(&self) -> &[Record] {
        match &self.body {
            RecordBody::Composite(composite) => &composite.children,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(version: FormatVersion) -> Vec<Record> {
        let header = Some(BodyHeader::new(0x1122_3344_5566, 3, 0));
        let mut records = vec![
            Record::new(
                version,
                None,
                RecordBody::StateChange(StateChange {
                    title: "calibration run with a fairly long title".into(),
                    time_offset: 12,
                    ..StateChange::new(RecordKind::BeginRun, 42)
                }),
            )
            .unwrap(),
            Record::new(
                version,
                header,
                RecordBody::Scaler(Scaler {
                    interval_start: 0,
                    interval_end: 10,
                    unix_time: 1_700_000_000,
                    interval_divisor: 1,
                    is_incremental: true,
                    values: vec![1, 2, 3, 4],
                    original_source_id: 0,
                }),
            )
            .unwrap(),
            Record::new(
                version,
                None,
                RecordBody::Text(Text {
                    kind: RecordKind::MonitoredVariables,
                    time_offset: 5,
                    unix_time: 1_700_000_001,
                    offset_divisor: 1,
                    strings: vec!["set a 1".into(), "set b 2".into()],
                    original_source_id: 0,
                }),
            )
            .unwrap(),
            Record::physics_event(version, header, vec![1u8, 2, 3, 4, 5, 6]),
            Record::new(
                version,
                None,
                RecordBody::PhysicsEventCount(EventCount {
                    time_offset: 9,
                    offset_divisor: 1,
                    unix_time: 1_700_000_002,
                    event_count: 1 << 40,
                    original_source_id: 0,
                }),
            )
            .unwrap(),
            Record::new(
                version,
                Some(BodyHeader::new(77, 2, 0)),
                RecordBody::Fragment(Fragment {
                    payload: Bytes::from_static(b"payload!"),
                    unknown_payload: false,
                }),
            )
            .unwrap(),
        ];
        if version != FormatVersion::V10 {
            records.push(Record::abnormal_end(version).unwrap());
            records.push(
                Record::new(
                    version,
                    None,
                    RecordBody::GlomParameters(GlomParameters {
                        coincidence_ticks: 100,
                        is_building: true,
                        timestamp_policy: TimestampPolicy::Average,
                    }),
                )
                .unwrap(),
            );
        }
        records
    }

    #[test]
    fn test_size_matches_encoding_in_every_generation() {
        for version in [FormatVersion::V10, FormatVersion::V11, FormatVersion::V12] {
            for record in samples(version) {
                let bytes = record.encode();
                assert_eq!(bytes.len(), record.size(), "{} {}", version, record.kind());
                let decoded = Record::decode(&bytes, version).unwrap();
                assert_eq!(decoded, record, "{} {}", version, record.kind());
            }
        }
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let record = Record::physics_event(FormatVersion::V11, None, vec![0u8; 32]);
        let bytes = record.encode();
        let err = Record::decode(&bytes[..bytes.len() - 1], FormatVersion::V11).unwrap_err();
        assert_eq!(
            err,
            RecordError::Truncated {
                declared: bytes.len(),
                available: bytes.len() - 1
            }
        );
    }

    #[test]
    fn test_declared_size_below_header_is_rejected() {
        let bytes = [4u8, 0, 0, 0, 30, 0, 0, 0];
        assert_eq!(
            Record::decode(&bytes, FormatVersion::V11),
            Err(RecordError::TooSmall(4))
        );
    }

    #[test]
    fn test_field_overrun_inside_declared_size() {
        // A v11 state change that declares only its header and body-header word.
        let bytes = [12u8, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            Record::decode(&bytes, FormatVersion::V11),
            Err(RecordError::FieldOverrun {
                field: "run_number"
            })
        );
    }

    #[test]
    fn test_unknown_kind_round_trips() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&16u32.to_le_bytes());
        raw.extend_from_slice(&32768u32.to_le_bytes());
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&[9, 8, 7, 6]);
        let record = Record::decode(&raw, FormatVersion::V11).unwrap();
        assert_eq!(record.kind(), RecordKind::Unknown(32768));
        assert_eq!(record.encode(), raw.freeze());
    }

    #[test]
    fn test_composite_requires_v12() {
        let child = Record::physics_event(FormatVersion::V11, None, vec![1u8]);
        let err = Record::composite(FormatVersion::V11, 30, None, vec![child]).unwrap_err();
        assert!(matches!(err, RecordError::Unsupported { .. }));
    }

    #[test]
    fn test_composite_round_trip_keeps_children_flat() {
        let v = FormatVersion::V12;
        let children = vec![
            Record::state_change(v, RecordKind::BeginRun, 3).unwrap(),
            Record::physics_event(v, Some(BodyHeader::new(10, 1, 0)), vec![1u8, 2]),
        ];
        let composite = Record::composite(v, 30, None, children.clone()).unwrap();
        assert_eq!(composite.kind(), RecordKind::Composite(30));
        let decoded = Record::decode(&composite.encode(), v).unwrap();
        assert_eq!(decoded.children(), children.as_slice());
    }

    #[test]
    fn test_long_title_is_truncated_on_the_wire() {
        let title = "x".repeat(TITLE_MAXSIZE + 20);
        let record = Record::new(
            FormatVersion::V11,
            None,
            RecordBody::StateChange(StateChange {
                title: title.into(),
                ..StateChange::new(RecordKind::EndRun, 1)
            }),
        )
        .unwrap();
        let decoded = Record::decode(&record.encode(), FormatVersion::V11).unwrap();
        match decoded.body() {
            RecordBody::StateChange(sc) => assert_eq!(sc.title.len(), TITLE_MAXSIZE),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(decoded.size(), record.size());
    }

    fn le_words(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_non_utf8_strings_keep_their_bytes() {
        // v11 monitored variables: offset, time, count, divisor, "caf\xe9\0"
        let mut raw = le_words(&[33, MONITORED_VARIABLES, 0, 0, 1_700_000_000, 1, 1]);
        raw.extend_from_slice(b"caf\xe9\0");

        let record = Record::decode(&raw, FormatVersion::V11).unwrap();
        assert_eq!(record.size(), 33);
        match record.body() {
            RecordBody::Text(text) => assert_eq!(text.strings, vec![Bytes::from_static(b"caf\xe9")]),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(record.encode(), raw);

        let rebuilt = Record::new(FormatVersion::V11, None, record.body().clone()).unwrap();
        assert!(rebuilt.wire().is_none());
        assert_eq!(rebuilt.encode(), raw);
    }

    #[test]
    fn test_decoded_record_encodes_to_its_wire_bytes() {
        // Empty body-header words the other generation would normally write.
        for (version, word) in [(FormatVersion::V12, 0u32), (FormatVersion::V11, 4)] {
            let mut raw = le_words(&[16, PHYSICS_EVENT, word]);
            raw.extend_from_slice(&[1, 2, 3, 4]);
            let record = Record::decode(&raw, version).unwrap();
            assert!(record.body_header().is_none());
            assert_eq!(record.encode(), raw, "{}", version);
        }

        // Title bytes after the terminating NUL.
        let mut raw = le_words(&[109, BEGIN_RUN, 0, 7, 0, 0, 1]);
        let mut title = [0u8; TITLE_MAXSIZE + 1];
        title[..5].copy_from_slice(b"ab\0zz");
        raw.extend_from_slice(&title);
        let record = Record::decode(&raw, FormatVersion::V11).unwrap();
        match record.body() {
            RecordBody::StateChange(sc) => {
                assert_eq!(&sc.title[..], b"ab");
                assert_eq!(sc.title_lossy(), "ab");
            }
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(record.encode(), raw);
    }

    #[test]
    fn test_deeply_nested_composites_are_rejected() {
        let levels = 200_000u32;
        let composite = COMPOSITE_FLAG | PHYSICS_EVENT;
        let raw: Vec<u8> = (0..levels)
            .flat_map(|level| le_words(&[12 * (levels - level), composite, 4]))
            .collect();
        assert_eq!(
            Record::decode(&raw, FormatVersion::V12),
            Err(RecordError::NestingTooDeep {
                limit: codec::MAX_COMPOSITE_DEPTH
            })
        );
    }

    #[test]
    fn test_extended_body_header_is_carried_through() {
        let mut raw = le_words(&[34, PHYSICS_EVENT, 24, 500, 0, 6, 0]);
        raw.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0x01, 0x02]);

        let record = Record::decode(&raw, FormatVersion::V12).unwrap();
        assert_eq!(record.body_header(), Some(&BodyHeader::new(500, 6, 0)));
        assert_eq!(record.body_header_extension(), &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(record.body(), &RecordBody::PhysicsEvent(Bytes::from_static(&[1, 2])));
        assert_eq!(record.encode(), raw);

        let rebuilt = Record::from_parts(
            FormatVersion::V12,
            Some(BodyHeader::new(500, 6, 0)),
            RecordBody::PhysicsEvent(Bytes::from_static(&[1, 2])),
        )
        .with_header_extension(Bytes::from_static(&[0xaa, 0xbb, 0xcc, 0xdd]));
        assert_eq!(rebuilt.encode(), raw);
    }

    #[test]
    fn test_body_header_word_between_empty_and_full_is_rejected() {
        let raw = le_words(&[24, PHYSICS_EVENT, 12, 0, 0, 0]);
        assert_eq!(
            Record::decode(&raw, FormatVersion::V12),
            Err(RecordError::BadBodyHeader(12))
        );

        let raw = le_words(&[28, PHYSICS_EVENT, 40, 0, 0, 0, 0]);
        assert_eq!(
            Record::decode(&raw, FormatVersion::V12),
            Err(RecordError::FieldOverrun {
                field: "body_header_extension"
            })
        );
    }

    #[test]
    fn test_state_change_payload_rejects_other_kinds() {
        let err = Record::state_change(FormatVersion::V11, RecordKind::PhysicsEvent, 1).unwrap_err();
        assert_eq!(err, RecordError::KindMismatch(RecordKind::PhysicsEvent));
    }
}
