//! Wire encoding and decoding for every supported generation.
//!
//! All integers are little-endian. The decoder never reads past the size a
//! record declares, and never trusts that size beyond the bytes it was given.
//! Decoded records retain their wire bytes; [`encode_into`] replays them.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::body::{
    BodyHeader, Composite, DataFormat, EventCount, Fragment, GlomParameters, RecordBody, Scaler,
    StateChange, Text, TimestampPolicy, NULL_TIMESTAMP, TITLE_MAXSIZE,
};
use super::{FormatVersion, Record, RecordKind};
use crate::error::RecordError;

/// Size of the `size` + `type` prefix every record starts with.
pub const RECORD_HEADER_SIZE: usize = 8;

const TITLE_WIRE_SIZE: usize = TITLE_MAXSIZE + 1;
const V10_FRAGMENT_HEADER_SIZE: usize = 20;

/// Deepest composite nesting the decoder follows.
pub const MAX_COMPOSITE_DEPTH: usize = 32;

/// Bytes occupied by the body-header section (size word included).
pub(crate) fn body_header_section_len(record: &Record) -> usize {
    if !record.version().has_body_header_word() {
        return 0;
    }
    match record.body_header() {
        Some(_) => BodyHeader::WIRE_SIZE + record.body_header_extension().len(),
        None => 4,
    }
}

/// Bytes occupied by the variant payload.
pub(crate) fn payload_len(record: &Record) -> usize {
    let version = record.version();
    let v10 = version == FormatVersion::V10;
    let v12 = version == FormatVersion::V12;
    let sid = if v12 { 4 } else { 0 };
    match record.body() {
        RecordBody::StateChange(_) => 12 + if v10 { 0 } else { 4 } + TITLE_WIRE_SIZE + sid,
        RecordBody::Scaler(scaler) => {
            let fixed = if v10 { 16 } else { 24 + sid };
            fixed + 4 * scaler.values.len()
        }
        RecordBody::Text(text) => {
            let fixed = if v10 { 12 } else { 16 + sid };
            fixed + text.strings.iter().map(|s| s.len() + 1).sum::<usize>()
        }
        RecordBody::PhysicsEvent(payload) => payload.len(),
        RecordBody::PhysicsEventCount(_) => if v10 { 16 } else { 20 + sid },
        RecordBody::Fragment(fragment) => {
            let inline = if v10 { V10_FRAGMENT_HEADER_SIZE } else { 0 };
            inline + fragment.payload.len()
        }
        RecordBody::Composite(composite) => composite.children.iter().map(Record::size).sum(),
        RecordBody::GlomParameters(_) => 12,
        RecordBody::DataFormat(_) => 4,
        RecordBody::AbnormalEnd => 0,
        RecordBody::Unknown { body, .. } => body.len(),
    }
}

/// Append the serialized record to `out`.
pub(crate) fn encode_into(record: &Record, out: &mut BytesMut) {
    if let Some(wire) = record.wire() {
        out.put_slice(wire);
        return;
    }
    let version = record.version();
    let v10 = version == FormatVersion::V10;
    let v12 = version == FormatVersion::V12;
    let start = out.len();

    out.reserve(record.size());
    out.put_u32_le(record.size() as u32);
    out.put_u32_le(record.type_id());

    if version.has_body_header_word() {
        match record.body_header() {
            Some(header) => put_body_header(out, header, record.body_header_extension()),
            None => out.put_u32_le(version.empty_body_header_word()),
        }
    }

    match record.body() {
        RecordBody::StateChange(sc) => {
            out.put_u32_le(sc.run_number);
            out.put_u32_le(sc.time_offset);
            out.put_u32_le(sc.unix_time);
            if !v10 {
                out.put_u32_le(sc.offset_divisor);
            }
            put_title(out, &sc.title);
            if v12 {
                out.put_u32_le(sc.original_source_id);
            }
        }
        RecordBody::Scaler(scaler) => {
            out.put_u32_le(scaler.interval_start);
            out.put_u32_le(scaler.interval_end);
            out.put_u32_le(scaler.unix_time);
            if !v10 {
                out.put_u32_le(scaler.interval_divisor);
            }
            out.put_u32_le(scaler.values.len() as u32);
            if !v10 {
                out.put_u32_le(u32::from(scaler.is_incremental));
            }
            if v12 {
                out.put_u32_le(scaler.original_source_id);
            }
            for value in &scaler.values {
                out.put_u32_le(*value);
            }
        }
        RecordBody::Text(text) => {
            out.put_u32_le(text.time_offset);
            out.put_u32_le(text.unix_time);
            out.put_u32_le(text.strings.len() as u32);
            if !v10 {
                out.put_u32_le(text.offset_divisor);
            }
            if v12 {
                out.put_u32_le(text.original_source_id);
            }
            for s in &text.strings {
                out.put_slice(s);
                out.put_u8(0);
            }
        }
        RecordBody::PhysicsEvent(payload) => out.put_slice(payload),
        RecordBody::PhysicsEventCount(count) => {
            out.put_u32_le(count.time_offset);
            if v10 {
                out.put_u32_le(count.unix_time);
            } else {
                out.put_u32_le(count.offset_divisor);
                out.put_u32_le(count.unix_time);
            }
            out.put_u64_le(count.event_count);
            if v12 {
                out.put_u32_le(count.original_source_id);
            }
        }
        RecordBody::Fragment(fragment) => {
            if v10 {
                let header = record
                    .body_header()
                    .copied()
                    .unwrap_or_else(|| BodyHeader::new(NULL_TIMESTAMP, 0, 0));
                out.put_u64_le(header.timestamp);
                out.put_u32_le(header.source_id);
                out.put_u32_le(fragment.payload.len() as u32);
                out.put_u32_le(header.barrier_type);
            }
            out.put_slice(&fragment.payload);
        }
        RecordBody::Composite(composite) => {
            for child in &composite.children {
                encode_into(child, out);
            }
        }
        RecordBody::GlomParameters(glom) => {
            out.put_u64_le(glom.coincidence_ticks);
            out.put_u16_le(u16::from(glom.is_building));
            out.put_u16_le(glom.timestamp_policy.code());
        }
        RecordBody::DataFormat(format) => {
            out.put_u16_le(format.major);
            out.put_u16_le(format.minor);
        }
        RecordBody::AbnormalEnd => {}
        RecordBody::Unknown { body, .. } => out.put_slice(body),
    }

    debug_assert_eq!(out.len() - start, record.size());
}

fn put_body_header(out: &mut BytesMut, header: &BodyHeader, extension: &[u8]) {
    out.put_u32_le((BodyHeader::WIRE_SIZE + extension.len()) as u32);
    out.put_u64_le(header.timestamp);
    out.put_u32_le(header.source_id);
    out.put_u32_le(header.barrier_type);
    out.put_slice(extension);
}

fn put_title(out: &mut BytesMut, title: &[u8]) {
    let end = title.len().min(TITLE_MAXSIZE);
    out.put_slice(&title[..end]);
    out.put_bytes(0, TITLE_WIRE_SIZE - end);
}

/// Read the declared size of the record at the front of `bytes`, if the
/// size word itself is present.
pub fn peek_size(bytes: &[u8]) -> Option<u32> {
    let word = bytes.get(..4)?;
    Some(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
}

/// Decode the record at the front of `bytes`.
///
/// Returns the record and the number of bytes it occupied. Trailing bytes
/// past the declared size are left alone.
pub fn decode_prefix(bytes: &[u8], version: FormatVersion) -> Result<(Record, usize), RecordError> {
    let declared = declared_size(bytes)?;
    let wire = Bytes::copy_from_slice(&bytes[..declared]);
    Ok((decode_wire(wire, version, 0)?, declared))
}

/// Decode the record at the front of an owned buffer without copying it.
pub fn decode_owned(wire: Bytes, version: FormatVersion) -> Result<Record, RecordError> {
    let declared = declared_size(&wire)?;
    decode_wire(wire.slice(..declared), version, 0)
}

/// Validated size of the record at the front of `bytes`.
fn declared_size(bytes: &[u8]) -> Result<usize, RecordError> {
    let declared = peek_size(bytes).ok_or(RecordError::Truncated {
        declared: RECORD_HEADER_SIZE,
        available: bytes.len(),
    })?;
    if (declared as usize) < RECORD_HEADER_SIZE {
        return Err(RecordError::TooSmall(declared));
    }
    let declared = declared as usize;
    if bytes.len() < declared {
        return Err(RecordError::Truncated {
            declared,
            available: bytes.len(),
        });
    }
    Ok(declared)
}

/// Decode a buffer holding exactly one record. Payloads share `wire`.
fn decode_wire(wire: Bytes, version: FormatVersion, depth: usize) -> Result<Record, RecordError> {
    let declared = wire.len();
    let mut buf = &wire[4..];
    let type_id = take_u32(&mut buf, "type")?;
    let kind = RecordKind::from_type_id(type_id, version);

    let (mut body_header, extension) = if version.has_body_header_word() {
        take_body_header(&mut buf)?
    } else {
        (None, &[][..])
    };
    let extension = slice_of(&wire, extension);

    let v10 = version == FormatVersion::V10;
    let v12 = version == FormatVersion::V12;

    let body = match kind {
        RecordKind::BeginRun | RecordKind::EndRun | RecordKind::PauseRun | RecordKind::ResumeRun => {
            let run_number = take_u32(&mut buf, "run_number")?;
            let time_offset = take_u32(&mut buf, "time_offset")?;
            let unix_time = take_u32(&mut buf, "timestamp")?;
            let offset_divisor = if v10 {
                1
            } else {
                take_u32(&mut buf, "offset_divisor")?
            };
            let title = take_title(&wire, &mut buf)?;
            let original_source_id = if v12 {
                take_u32(&mut buf, "original_source_id")?
            } else {
                0
            };
            RecordBody::StateChange(StateChange {
                kind,
                run_number,
                time_offset,
                unix_time,
                offset_divisor,
                title,
                original_source_id,
            })
        }
        RecordKind::Scaler => {
            let interval_start = take_u32(&mut buf, "interval_start")?;
            let interval_end = take_u32(&mut buf, "interval_end")?;
            let unix_time = take_u32(&mut buf, "timestamp")?;
            let interval_divisor = if v10 {
                1
            } else {
                take_u32(&mut buf, "interval_divisor")?
            };
            let count = take_u32(&mut buf, "scaler_count")? as usize;
            let is_incremental = if v10 {
                true
            } else {
                take_u32(&mut buf, "is_incremental")? != 0
            };
            let original_source_id = if v12 {
                take_u32(&mut buf, "original_source_id")?
            } else {
                0
            };
            if buf.remaining() < count.saturating_mul(4) {
                return Err(RecordError::FieldOverrun { field: "scalers" });
            }
            let values = (0..count).map(|_| buf.get_u32_le()).collect();
            RecordBody::Scaler(Scaler {
                interval_start,
                interval_end,
                unix_time,
                interval_divisor,
                is_incremental,
                values,
                original_source_id,
            })
        }
        RecordKind::PacketTypes | RecordKind::MonitoredVariables => {
            let time_offset = take_u32(&mut buf, "time_offset")?;
            let unix_time = take_u32(&mut buf, "timestamp")?;
            let count = take_u32(&mut buf, "string_count")? as usize;
            let offset_divisor = if v10 {
                1
            } else {
                take_u32(&mut buf, "offset_divisor")?
            };
            let original_source_id = if v12 {
                take_u32(&mut buf, "original_source_id")?
            } else {
                0
            };
            let strings = take_strings(&wire, &mut buf, count)?;
            RecordBody::Text(Text {
                kind,
                time_offset,
                unix_time,
                offset_divisor,
                strings,
                original_source_id,
            })
        }
        RecordKind::PhysicsEvent => RecordBody::PhysicsEvent(take_rest(&wire, &mut buf)),
        RecordKind::PhysicsEventCount => {
            let time_offset = take_u32(&mut buf, "time_offset")?;
            let (offset_divisor, unix_time) = if v10 {
                (1, take_u32(&mut buf, "timestamp")?)
            } else {
                let divisor = take_u32(&mut buf, "offset_divisor")?;
                (divisor, take_u32(&mut buf, "timestamp")?)
            };
            let event_count = take_u64(&mut buf, "event_count")?;
            let original_source_id = if v12 {
                take_u32(&mut buf, "original_source_id")?
            } else {
                0
            };
            RecordBody::PhysicsEventCount(EventCount {
                time_offset,
                offset_divisor,
                unix_time,
                event_count,
                original_source_id,
            })
        }
        RecordKind::Fragment | RecordKind::UnknownPayloadFragment => {
            if v10 {
                let timestamp = take_u64(&mut buf, "fragment_timestamp")?;
                let source_id = take_u32(&mut buf, "fragment_source_id")?;
                let payload_size = take_u32(&mut buf, "fragment_payload_size")? as usize;
                let barrier_type = take_u32(&mut buf, "fragment_barrier")?;
                if payload_size != buf.remaining() {
                    return Err(RecordError::Truncated {
                        declared: payload_size,
                        available: buf.remaining(),
                    });
                }
                body_header = Some(BodyHeader::new(timestamp, source_id, barrier_type));
            }
            RecordBody::Fragment(Fragment {
                payload: take_rest(&wire, &mut buf),
                unknown_payload: kind == RecordKind::UnknownPayloadFragment,
            })
        }
        RecordKind::Composite(base_type) => {
            if depth >= MAX_COMPOSITE_DEPTH && buf.has_remaining() {
                return Err(RecordError::NestingTooDeep {
                    limit: MAX_COMPOSITE_DEPTH,
                });
            }
            let mut children = Vec::new();
            while buf.has_remaining() {
                let used = declared_size(buf)?;
                let child = slice_of(&wire, &buf[..used]);
                children.push(decode_wire(child, version, depth + 1)?);
                buf.advance(used);
            }
            RecordBody::Composite(Composite {
                base_type,
                children,
            })
        }
        RecordKind::GlomParameters => {
            let coincidence_ticks = take_u64(&mut buf, "coincidence_ticks")?;
            let is_building = take_u16(&mut buf, "is_building")? != 0;
            let policy = take_u16(&mut buf, "timestamp_policy")?;
            RecordBody::GlomParameters(GlomParameters {
                coincidence_ticks,
                is_building,
                timestamp_policy: TimestampPolicy::from_code(policy),
            })
        }
        RecordKind::DataFormat => {
            let major = take_u16(&mut buf, "major")?;
            let minor = take_u16(&mut buf, "minor")?;
            RecordBody::DataFormat(DataFormat { major, minor })
        }
        RecordKind::AbnormalEnd => RecordBody::AbnormalEnd,
        RecordKind::Unknown(type_id) => RecordBody::Unknown {
            type_id,
            body: take_rest(&wire, &mut buf),
        },
    };

    let record = Record::from_parts(version, body_header, body).with_header_extension(extension);
    // Trailing padding inside the declared size would make `size()` lie.
    let decoded = record.encoded_size();
    if decoded != declared {
        return Err(RecordError::TrailingBytes { declared, decoded });
    }
    Ok(record.with_wire(wire))
}

/// Returns the body header, if any, and its extension bytes.
fn take_body_header<'a>(
    buf: &mut &'a [u8],
) -> Result<(Option<BodyHeader>, &'a [u8]), RecordError> {
    let word = take_u32(buf, "body_header_size")?;
    match word as usize {
        0 | 4 => Ok((None, &[][..])),
        size if size >= BodyHeader::WIRE_SIZE => {
            let timestamp = take_u64(buf, "body_header_timestamp")?;
            let source_id = take_u32(buf, "body_header_source_id")?;
            let barrier_type = take_u32(buf, "body_header_barrier")?;
            let extra = size - BodyHeader::WIRE_SIZE;
            if buf.remaining() < extra {
                return Err(RecordError::FieldOverrun {
                    field: "body_header_extension",
                });
            }
            let remaining: &'a [u8] = *buf;
            let (extension, rest) = remaining.split_at(extra);
            *buf = rest;
            Ok((
                Some(BodyHeader::new(timestamp, source_id, barrier_type)),
                extension,
            ))
        }
        _ => Err(RecordError::BadBodyHeader(word)),
    }
}

/// `part` must borrow from `wire`.
fn slice_of(wire: &Bytes, part: &[u8]) -> Bytes {
    if part.is_empty() {
        return Bytes::new();
    }
    wire.slice_ref(part)
}

fn take_u16(buf: &mut &[u8], field: &'static str) -> Result<u16, RecordError> {
    if buf.remaining() < 2 {
        return Err(RecordError::FieldOverrun { field });
    }
    Ok(buf.get_u16_le())
}

fn take_u32(buf: &mut &[u8], field: &'static str) -> Result<u32, RecordError> {
    if buf.remaining() < 4 {
        return Err(RecordError::FieldOverrun { field });
    }
    Ok(buf.get_u32_le())
}

fn take_u64(buf: &mut &[u8], field: &'static str) -> Result<u64, RecordError> {
    if buf.remaining() < 8 {
        return Err(RecordError::FieldOverrun { field });
    }
    Ok(buf.get_u64_le())
}

fn take_title(wire: &Bytes, buf: &mut &[u8]) -> Result<Bytes, RecordError> {
    if buf.remaining() < TITLE_WIRE_SIZE {
        return Err(RecordError::FieldOverrun { field: "title" });
    }
    let raw = &buf[..TITLE_WIRE_SIZE];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(TITLE_MAXSIZE);
    let title = slice_of(wire, &raw[..end]);
    buf.advance(TITLE_WIRE_SIZE);
    Ok(title)
}

fn take_strings(wire: &Bytes, buf: &mut &[u8], count: usize) -> Result<Vec<Bytes>, RecordError> {
    let mut strings = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        let end = buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(RecordError::FieldOverrun { field: "strings" })?;
        strings.push(slice_of(wire, &buf[..end]));
        buf.advance(end + 1);
    }
    Ok(strings)
}

fn take_rest(wire: &Bytes, buf: &mut &[u8]) -> Bytes {
    let rest = slice_of(wire, buf);
    buf.advance(buf.remaining());
    rest
}
