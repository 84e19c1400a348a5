//! Variant-specific record payloads.

use std::borrow::Cow;

use bytes::Bytes;

use super::{Record, RecordKind};

/// Maximum number of title characters a state change carries on the wire.
pub const TITLE_MAXSIZE: usize = 80;

/// Timestamp value meaning "no timestamp available".
pub const NULL_TIMESTAMP: u64 = u64::MAX;

/// Event-builder metadata carried in front of a record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyHeader {
    /// Event timestamp in clock ticks.
    pub timestamp: u64,
    /// Id of the producer that emitted the record.
    pub source_id: u32,
    /// Barrier type; the state-change tag for run boundaries, else 0.
    pub barrier_type: u32,
}

impl BodyHeader {
    /// Body header size on the wire, including its own size word.
    pub const WIRE_SIZE: usize = 20;

    /// Create a body header.
    pub fn new(timestamp: u64, source_id: u32, barrier_type: u32) -> Self {
        Self {
            timestamp,
            source_id,
            barrier_type,
        }
    }
}

/// Begin, end, pause or resume of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// One of the four state-change kinds.
    pub kind: RecordKind,
    /// Run number.
    pub run_number: u32,
    /// Elapsed time into the run, in units of `1/offset_divisor` seconds.
    pub time_offset: u32,
    /// Wall-clock time the transition happened (unix seconds).
    pub unix_time: u32,
    /// Divisor for `time_offset`; always 1 in v10.
    pub offset_divisor: u32,
    /// Run title bytes up to the first NUL; at most [`TITLE_MAXSIZE`] bytes
    /// are kept on the wire. Producers do not promise any text encoding.
    pub title: Bytes,
    /// Source id of the producer that first emitted the record (v12).
    pub original_source_id: u32,
}

impl StateChange {
    /// A state change with zeroed timing fields and an empty title.
    pub fn new(kind: RecordKind, run_number: u32) -> Self {
        Self {
            kind,
            run_number,
            time_offset: 0,
            unix_time: 0,
            offset_divisor: 1,
            title: Bytes::new(),
            original_source_id: 0,
        }
    }

    /// Elapsed run time in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        let divisor = if self.offset_divisor == 0 {
            1
        } else {
            self.offset_divisor
        };
        f64::from(self.time_offset) / f64::from(divisor)
    }

    /// Title for display, with invalid UTF-8 replaced.
    pub fn title_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.title)
    }
}

/// Scaler readout over one interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaler {
    /// Interval start offset.
    pub interval_start: u32,
    /// Interval end offset.
    pub interval_end: u32,
    /// Wall-clock time of the readout.
    pub unix_time: u32,
    /// Divisor for the interval offsets.
    pub interval_divisor: u32,
    /// Whether values are increments since the previous readout.
    pub is_incremental: bool,
    /// Scaler channel values.
    pub values: Vec<u32>,
    /// Source id of the producer that first emitted the record (v12).
    pub original_source_id: u32,
}

/// Packet-type documentation or monitored variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    /// Either `PacketTypes` or `MonitoredVariables`.
    pub kind: RecordKind,
    /// Elapsed time into the run.
    pub time_offset: u32,
    /// Wall-clock time.
    pub unix_time: u32,
    /// Divisor for `time_offset`.
    pub offset_divisor: u32,
    /// The strings as raw bytes, without their NUL terminators.
    pub strings: Vec<Bytes>,
    /// Source id of the producer that first emitted the record (v12).
    pub original_source_id: u32,
}

/// Number of physics events seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCount {
    /// Elapsed time into the run.
    pub time_offset: u32,
    /// Divisor for `time_offset`.
    pub offset_divisor: u32,
    /// Wall-clock time.
    pub unix_time: u32,
    /// Events so far.
    pub event_count: u64,
    /// Source id of the producer that first emitted the record (v12).
    pub original_source_id: u32,
}

/// An event-builder fragment. Timestamp, source id and barrier live in the
/// record's body header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Opaque payload, normally a serialized record.
    pub payload: Bytes,
    /// Set for `EVB_UNKNOWN_PAYLOAD` fragments.
    pub unknown_payload: bool,
}

/// How the event builder derives a built event's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPolicy {
    /// Timestamp of the first fragment.
    First,
    /// Timestamp of the last fragment.
    Last,
    /// Average of all fragment timestamps.
    Average,
    /// A value this crate does not know.
    Other(u16),
}

impl TimestampPolicy {
    /// Wire encoding.
    pub fn code(self) -> u16 {
        match self {
            TimestampPolicy::First => 0,
            TimestampPolicy::Last => 1,
            TimestampPolicy::Average => 2,
            TimestampPolicy::Other(code) => code,
        }
    }

    /// Wire decoding.
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => TimestampPolicy::First,
            1 => TimestampPolicy::Last,
            2 => TimestampPolicy::Average,
            other => TimestampPolicy::Other(other),
        }
    }
}

/// Parameters an event builder used to glom fragments together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlomParameters {
    /// Coincidence window in timestamp ticks.
    pub coincidence_ticks: u64,
    /// Whether the builder was gluing fragments at all.
    pub is_building: bool,
    /// Timestamp policy of built events.
    pub timestamp_policy: TimestampPolicy,
}

/// Announces the wire-format generation of the records that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormat {
    /// Major format version.
    pub major: u16,
    /// Minor format version.
    pub minor: u16,
}

/// A built record whose payload is a list of child records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    /// Base type tag the composite stands for (without the composite flag).
    pub base_type: u32,
    /// Direct children; never decomposed further by this crate.
    pub children: Vec<Record>,
}

/// The variant-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    /// Begin, end, pause or resume.
    StateChange(StateChange),
    /// Scaler readout.
    Scaler(Scaler),
    /// Text strings.
    Text(Text),
    /// Opaque physics event payload.
    PhysicsEvent(Bytes),
    /// Physics event count.
    PhysicsEventCount(EventCount),
    /// Event-builder fragment.
    Fragment(Fragment),
    /// Built record made of children.
    Composite(Composite),
    /// Event-builder glom parameters.
    GlomParameters(GlomParameters),
    /// Data-format announcement.
    DataFormat(DataFormat),
    /// Abnormal end of run; no payload.
    AbnormalEnd,
    /// Uninterpreted record kept byte for byte.
    Unknown {
        /// Raw type tag.
        type_id: u32,
        /// Everything after the body header.
        body: Bytes,
    },
}

impl RecordBody {
    /// Kind of this payload.
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBody::StateChange(sc) => sc.kind,
            RecordBody::Scaler(_) => RecordKind::Scaler,
            RecordBody::Text(text) => text.kind,
            RecordBody::PhysicsEvent(_) => RecordKind::PhysicsEvent,
            RecordBody::PhysicsEventCount(_) => RecordKind::PhysicsEventCount,
            RecordBody::Fragment(fragment) if fragment.unknown_payload => {
                RecordKind::UnknownPayloadFragment
            }
            RecordBody::Fragment(_) => RecordKind::Fragment,
            RecordBody::Composite(composite) => RecordKind::Composite(composite.base_type),
            RecordBody::GlomParameters(_) => RecordKind::GlomParameters,
            RecordBody::DataFormat(_) => RecordKind::DataFormat,
            RecordBody::AbnormalEnd => RecordKind::AbnormalEnd,
            RecordBody::Unknown { type_id, .. } => RecordKind::Unknown(*type_id),
        }
    }
}
