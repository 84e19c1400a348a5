//! Record type tags and wire-format generations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag of a begin-of-run state change.
pub const BEGIN_RUN: u32 = 1;
/// Type tag of an end-of-run state change.
pub const END_RUN: u32 = 2;
/// Type tag of a pause state change.
pub const PAUSE_RUN: u32 = 3;
/// Type tag of a resume state change.
pub const RESUME_RUN: u32 = 4;
/// Type tag of an abnormal end-of-run marker.
pub const ABNORMAL_ENDRUN: u32 = 5;
/// Type tag of a packet-types documentation text record.
pub const PACKET_TYPES: u32 = 10;
/// Type tag of a monitored-variables text record.
pub const MONITORED_VARIABLES: u32 = 11;
/// Type tag of a data-format record.
pub const RING_FORMAT: u32 = 12;
/// Type tag of a scaler record.
pub const PERIODIC_SCALERS: u32 = 20;
/// Type tag of a physics event.
pub const PHYSICS_EVENT: u32 = 30;
/// Type tag of a physics event count.
pub const PHYSICS_EVENT_COUNT: u32 = 31;
/// Type tag of an event-builder fragment.
pub const EVB_FRAGMENT: u32 = 40;
/// Type tag of an event-builder fragment whose payload is not a record.
pub const EVB_UNKNOWN_PAYLOAD: u32 = 41;
/// Type tag of the glom parameters record.
pub const EVB_GLOM_INFO: u32 = 42;
/// Bit set in the type tag of composite records.
pub const COMPOSITE_FLAG: u32 = 0x8000;

/// Wire-format generation of a record stream.
///
/// The generations are mutually incompatible at the byte level; a stream is
/// always decoded with exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    /// Legacy layout without body headers.
    V10,
    /// Optional body headers, scaler and state-change divisors.
    #[default]
    V11,
    /// Mandatory body-header word, original source ids and composite records.
    V12,
}

impl FormatVersion {
    /// Whether this generation carries a body-header size word after the type.
    pub fn has_body_header_word(self) -> bool {
        !matches!(self, FormatVersion::V10)
    }

    /// The value of the body-header size word when no body header is present.
    pub fn empty_body_header_word(self) -> u32 {
        match self {
            FormatVersion::V12 => 4,
            _ => 0,
        }
    }

    /// Major version number as written in data-format records.
    pub fn major(self) -> u16 {
        match self {
            FormatVersion::V10 => 10,
            FormatVersion::V11 => 11,
            FormatVersion::V12 => 12,
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.major())
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().trim_start_matches('v') {
            "10" => Ok(FormatVersion::V10),
            "11" => Ok(FormatVersion::V11),
            "12" => Ok(FormatVersion::V12),
            _ => Err(format!(
                "Invalid format version '{}'. Must be one of: v10, v11, v12",
                s
            )),
        }
    }
}

/// Kind of a record, derived from its type tag.
///
/// `Unknown` keeps the raw tag of anything this crate does not interpret so
/// that it can be forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// Begin of run.
    BeginRun,
    /// End of run.
    EndRun,
    /// Run paused.
    PauseRun,
    /// Run resumed.
    ResumeRun,
    /// Upstream failed catastrophically.
    AbnormalEnd,
    /// Documentation of packet types.
    PacketTypes,
    /// Monitored variable values.
    MonitoredVariables,
    /// Data-format announcement.
    DataFormat,
    /// Scaler readout.
    Scaler,
    /// Physics event.
    PhysicsEvent,
    /// Physics event count.
    PhysicsEventCount,
    /// Event-builder fragment.
    Fragment,
    /// Event-builder fragment with a non-record payload.
    UnknownPayloadFragment,
    /// Glom parameters.
    GlomParameters,
    /// Composite record; carries the base tag it is composed of.
    Composite(u32),
    /// Anything else.
    Unknown(u32),
}

impl RecordKind {
    /// Map a wire type tag to a kind under the given generation.
    pub fn from_type_id(type_id: u32, version: FormatVersion) -> Self {
        if type_id & COMPOSITE_FLAG != 0 && version == FormatVersion::V12 {
            return RecordKind::Composite(type_id & !COMPOSITE_FLAG);
        }
        let v10 = version == FormatVersion::V10;
        match type_id {
            BEGIN_RUN => RecordKind::BeginRun,
            END_RUN => RecordKind::EndRun,
            PAUSE_RUN => RecordKind::PauseRun,
            RESUME_RUN => RecordKind::ResumeRun,
            ABNORMAL_ENDRUN if !v10 => RecordKind::AbnormalEnd,
            PACKET_TYPES => RecordKind::PacketTypes,
            MONITORED_VARIABLES => RecordKind::MonitoredVariables,
            RING_FORMAT if !v10 => RecordKind::DataFormat,
            PERIODIC_SCALERS => RecordKind::Scaler,
            PHYSICS_EVENT => RecordKind::PhysicsEvent,
            PHYSICS_EVENT_COUNT => RecordKind::PhysicsEventCount,
            EVB_FRAGMENT => RecordKind::Fragment,
            EVB_UNKNOWN_PAYLOAD => RecordKind::UnknownPayloadFragment,
            EVB_GLOM_INFO if !v10 => RecordKind::GlomParameters,
            other => RecordKind::Unknown(other),
        }
    }

    /// The wire type tag of this kind.
    pub fn type_id(self) -> u32 {
        match self {
            RecordKind::BeginRun => BEGIN_RUN,
            RecordKind::EndRun => END_RUN,
            RecordKind::PauseRun => PAUSE_RUN,
            RecordKind::ResumeRun => RESUME_RUN,
            RecordKind::AbnormalEnd => ABNORMAL_ENDRUN,
            RecordKind::PacketTypes => PACKET_TYPES,
            RecordKind::MonitoredVariables => MONITORED_VARIABLES,
            RecordKind::DataFormat => RING_FORMAT,
            RecordKind::Scaler => PERIODIC_SCALERS,
            RecordKind::PhysicsEvent => PHYSICS_EVENT,
            RecordKind::PhysicsEventCount => PHYSICS_EVENT_COUNT,
            RecordKind::Fragment => EVB_FRAGMENT,
            RecordKind::UnknownPayloadFragment => EVB_UNKNOWN_PAYLOAD,
            RecordKind::GlomParameters => EVB_GLOM_INFO,
            RecordKind::Composite(base) => base | COMPOSITE_FLAG,
            RecordKind::Unknown(tag) => tag,
        }
    }

    /// Whether this kind is one of the four run-boundary transitions.
    pub fn is_state_change(self) -> bool {
        matches!(
            self,
            RecordKind::BeginRun | RecordKind::EndRun | RecordKind::PauseRun | RecordKind::ResumeRun
        )
    }

    /// Barrier type to stamp on a fragment carrying a record of this kind.
    pub fn barrier_type(self) -> u32 {
        if self.is_state_change() {
            self.type_id()
        } else {
            0
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::BeginRun => write!(f, "BEGIN_RUN"),
            RecordKind::EndRun => write!(f, "END_RUN"),
            RecordKind::PauseRun => write!(f, "PAUSE_RUN"),
            RecordKind::ResumeRun => write!(f, "RESUME_RUN"),
            RecordKind::AbnormalEnd => write!(f, "ABNORMAL_ENDRUN"),
            RecordKind::PacketTypes => write!(f, "PACKET_TYPES"),
            RecordKind::MonitoredVariables => write!(f, "MONITORED_VARIABLES"),
            RecordKind::DataFormat => write!(f, "RING_FORMAT"),
            RecordKind::Scaler => write!(f, "PERIODIC_SCALERS"),
            RecordKind::PhysicsEvent => write!(f, "PHYSICS_EVENT"),
            RecordKind::PhysicsEventCount => write!(f, "PHYSICS_EVENT_COUNT"),
            RecordKind::Fragment => write!(f, "EVB_FRAGMENT"),
            RecordKind::UnknownPayloadFragment => write!(f, "EVB_UNKNOWN_PAYLOAD"),
            RecordKind::GlomParameters => write!(f, "EVB_GLOM_INFO"),
            RecordKind::Composite(base) => write!(f, "COMPOSITE({})", base),
            RecordKind::Unknown(tag) => write!(f, "UNKNOWN({})", tag),
        }
    }
}

impl FromStr for RecordKind {
    type Err = String;

    /// Parse a kind name as printed by `Display`, or a bare numeric tag
    /// (interpreted under the v11 tag table).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(tag) = s.parse::<u32>() {
            return Ok(RecordKind::from_type_id(tag, FormatVersion::V11));
        }
        let kind = match s.to_ascii_uppercase().as_str() {
            "BEGIN_RUN" => RecordKind::BeginRun,
            "END_RUN" => RecordKind::EndRun,
            "PAUSE_RUN" => RecordKind::PauseRun,
            "RESUME_RUN" => RecordKind::ResumeRun,
            "ABNORMAL_ENDRUN" => RecordKind::AbnormalEnd,
            "PACKET_TYPES" => RecordKind::PacketTypes,
            "MONITORED_VARIABLES" => RecordKind::MonitoredVariables,
            "RING_FORMAT" => RecordKind::DataFormat,
            "PERIODIC_SCALERS" => RecordKind::Scaler,
            "PHYSICS_EVENT" => RecordKind::PhysicsEvent,
            "PHYSICS_EVENT_COUNT" => RecordKind::PhysicsEventCount,
            "EVB_FRAGMENT" => RecordKind::Fragment,
            "EVB_UNKNOWN_PAYLOAD" => RecordKind::UnknownPayloadFragment,
            "EVB_GLOM_INFO" => RecordKind::GlomParameters,
            _ => return Err(format!("Unknown record kind '{}'", s)),
        };
        Ok(kind)
    }
}
