//! Internal FIT message model
//!
//! Messages decoded from a session file are represented as a closed tagged
//! union over the known message categories, each carrying a mapping from
//! stable field number to an optional typed value. Pipeline stages dispatch
//! on `MessageKind` instead of scattering per-type conditionals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed-point semicircle units per degree of latitude/longitude.
pub const SEMICIRCLES_PER_DEGREE: f64 = (1u64 << 31) as f64 / 180.0;

/// Meters per degree of latitude under the locally-flat approximation.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Seconds between the Unix epoch and the FIT epoch (1989-12-31T00:00:00Z).
pub const FIT_EPOCH_OFFSET: i64 = 631_065_600;

/// Convert degrees to the 32-bit semicircle wire representation.
pub fn degrees_to_semicircles(deg: f64) -> i32 {
    (deg * SEMICIRCLES_PER_DEGREE).round() as i32
}

/// Convert a semicircle value back to degrees.
pub fn semicircles_to_degrees(semi: i32) -> f64 {
    semi as f64 / SEMICIRCLES_PER_DEGREE
}

/// Message categories of interest, keyed by their global message number.
///
/// Categories this tool never inspects individually are preserved through
/// the pipeline as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    FileId,
    UserProfile,
    Sport,
    Session,
    Lap,
    Record,
    Event,
    DeviceInfo,
    Workout,
    WorkoutStep,
    Activity,
    Hrv,
    FieldDescription,
    DeveloperDataId,
    Other(u16),
}

impl MessageKind {
    /// Global FIT message number for this category.
    pub fn global_number(&self) -> u16 {
        match self {
            MessageKind::FileId => 0,
            MessageKind::UserProfile => 3,
            MessageKind::Sport => 12,
            MessageKind::Session => 18,
            MessageKind::Lap => 19,
            MessageKind::Record => 20,
            MessageKind::Event => 21,
            MessageKind::DeviceInfo => 23,
            MessageKind::Workout => 26,
            MessageKind::WorkoutStep => 27,
            MessageKind::Activity => 34,
            MessageKind::Hrv => 78,
            MessageKind::FieldDescription => 206,
            MessageKind::DeveloperDataId => 207,
            MessageKind::Other(n) => *n,
        }
    }

    /// Map a global message number back onto a category.
    pub fn from_global(num: u16) -> Self {
        match num {
            0 => MessageKind::FileId,
            3 => MessageKind::UserProfile,
            12 => MessageKind::Sport,
            18 => MessageKind::Session,
            19 => MessageKind::Lap,
            20 => MessageKind::Record,
            21 => MessageKind::Event,
            23 => MessageKind::DeviceInfo,
            26 => MessageKind::Workout,
            27 => MessageKind::WorkoutStep,
            34 => MessageKind::Activity,
            78 => MessageKind::Hrv,
            206 => MessageKind::FieldDescription,
            207 => MessageKind::DeveloperDataId,
            n => MessageKind::Other(n),
        }
    }

    /// Human-readable category name for reports and diagnostics.
    pub fn name(&self) -> String {
        match self {
            MessageKind::FileId => "file_id".to_string(),
            MessageKind::UserProfile => "user_profile".to_string(),
            MessageKind::Sport => "sport".to_string(),
            MessageKind::Session => "session".to_string(),
            MessageKind::Lap => "lap".to_string(),
            MessageKind::Record => "record".to_string(),
            MessageKind::Event => "event".to_string(),
            MessageKind::DeviceInfo => "device_info".to_string(),
            MessageKind::Workout => "workout".to_string(),
            MessageKind::WorkoutStep => "workout_step".to_string(),
            MessageKind::Activity => "activity".to_string(),
            MessageKind::Hrv => "hrv".to_string(),
            MessageKind::FieldDescription => "field_description".to_string(),
            MessageKind::DeveloperDataId => "developer_data_id".to_string(),
            MessageKind::Other(n) => format!("unknown_{}", n),
        }
    }
}

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Enumerated category (sport, sub-sport, event type, ...)
    Enum(u8),
    UInt(u64),
    SInt(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Enum(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            FieldValue::SInt(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Timestamp(ts) => Some(ts.timestamp() as f64),
            FieldValue::String(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Enum(v) => Some(*v as i64),
            FieldValue::UInt(v) => i64::try_from(*v).ok(),
            FieldValue::SInt(v) => Some(*v),
            FieldValue::Float(v) => Some(v.round() as i64),
            FieldValue::Timestamp(ts) => Some(ts.timestamp()),
            FieldValue::String(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|v| u64::try_from(v).ok())
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Enum(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::SInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// A developer-defined field attached to a message, keyed by the
/// (developer data index, field number) pair that identifies it on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperField {
    pub developer_data_index: u8,
    pub field_number: u8,
    pub name: String,
    pub value: FieldValue,
}

/// A decoded message: category tag plus field-number → value mapping.
///
/// Field numbers are unique within one message; insertion of an existing
/// number replaces the previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    fields: BTreeMap<u8, FieldValue>,
    pub developer_fields: Vec<DeveloperField>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            developer_fields: Vec::new(),
        }
    }

    /// Builder-style field insertion for tests and synthetic streams.
    pub fn with_field(mut self, number: u8, value: FieldValue) -> Self {
        self.set_field(number, value);
        self
    }

    pub fn set_field(&mut self, number: u8, value: FieldValue) {
        self.fields.insert(number, value);
    }

    /// Remove a field if present. Missing fields are not an error.
    pub fn remove_field(&mut self, number: u8) -> Option<FieldValue> {
        self.fields.remove(&number)
    }

    pub fn field(&self, number: u8) -> Option<&FieldValue> {
        self.fields.get(&number)
    }

    /// Capability query: does this message carry a value for the field?
    pub fn has_field(&self, number: u8) -> bool {
        self.fields.contains_key(&number)
    }

    pub fn field_f64(&self, number: u8) -> Option<f64> {
        self.field(number).and_then(FieldValue::as_f64)
    }

    pub fn field_u64(&self, number: u8) -> Option<u64> {
        self.field(number).and_then(FieldValue::as_u64)
    }

    pub fn field_str(&self, number: u8) -> Option<&str> {
        match self.field(number) {
            Some(FieldValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The message's own timestamp field, when it carries one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.field(fields::TIMESTAMP) {
            Some(FieldValue::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }

    /// Iterate over (field number, value) pairs in field-number order.
    pub fn iter_fields(&self) -> impl Iterator<Item = (u8, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Field numbers shared across message categories.
pub mod fields {
    /// Every timestamped message uses 253 for its timestamp.
    pub const TIMESTAMP: u8 = 253;
    pub const MESSAGE_INDEX: u8 = 254;
}

/// RECORD message field numbers.
pub mod record {
    pub const POSITION_LAT: u8 = 0;
    pub const POSITION_LONG: u8 = 1;
    pub const ALTITUDE: u8 = 2;
    pub const HEART_RATE: u8 = 3;
    pub const CADENCE: u8 = 4;
    pub const DISTANCE: u8 = 5;
    pub const SPEED: u8 = 6;
    pub const GRADE: u8 = 9;
    pub const ENHANCED_SPEED: u8 = 73;
    pub const ENHANCED_ALTITUDE: u8 = 78;
    pub const VERTICAL_RATIO: u8 = 83;
}

/// SESSION message field numbers.
pub mod session {
    pub const EVENT: u8 = 0;
    pub const EVENT_TYPE: u8 = 1;
    pub const START_TIME: u8 = 2;
    pub const START_POSITION_LAT: u8 = 3;
    pub const START_POSITION_LONG: u8 = 4;
    pub const SPORT: u8 = 5;
    pub const SUB_SPORT: u8 = 6;
    pub const TOTAL_DISTANCE: u8 = 9;
    pub const AVG_SPEED: u8 = 14;
    pub const MAX_SPEED: u8 = 15;
    pub const TOTAL_ASCENT: u8 = 22;
    pub const TOTAL_DESCENT: u8 = 23;
    pub const NEC_LAT: u8 = 29;
    pub const NEC_LONG: u8 = 30;
    pub const SWC_LAT: u8 = 31;
    pub const SWC_LONG: u8 = 32;
    pub const END_POSITION_LAT: u8 = 38;
    pub const END_POSITION_LONG: u8 = 39;
    pub const AVG_GRADE: u8 = 45;
    pub const MAX_ALTITUDE: u8 = 50;
    pub const MIN_ALTITUDE: u8 = 71;
    pub const SPORT_PROFILE_NAME: u8 = 110;
    pub const ENHANCED_AVG_SPEED: u8 = 124;
    pub const ENHANCED_MAX_SPEED: u8 = 125;
    pub const ENHANCED_MIN_ALTITUDE: u8 = 127;
    pub const ENHANCED_MAX_ALTITUDE: u8 = 128;
    pub const AVG_VERTICAL_RATIO: u8 = 139;
    pub const TOTAL_FRACTIONAL_ASCENT: u8 = 199;
    pub const TOTAL_FRACTIONAL_DESCENT: u8 = 200;
}

/// LAP message field numbers.
pub mod lap {
    pub const EVENT: u8 = 0;
    pub const EVENT_TYPE: u8 = 1;
    pub const START_TIME: u8 = 2;
    pub const START_POSITION_LAT: u8 = 3;
    pub const START_POSITION_LONG: u8 = 4;
    pub const END_POSITION_LAT: u8 = 5;
    pub const END_POSITION_LONG: u8 = 6;
    pub const TOTAL_DISTANCE: u8 = 9;
    pub const AVG_SPEED: u8 = 13;
    pub const MAX_SPEED: u8 = 14;
    pub const TOTAL_ASCENT: u8 = 21;
    pub const TOTAL_DESCENT: u8 = 22;
    pub const SPORT: u8 = 25;
    pub const SUB_SPORT: u8 = 39;
    pub const MAX_ALTITUDE: u8 = 42;
    pub const AVG_GRADE: u8 = 45;
    pub const MIN_ALTITUDE: u8 = 62;
    pub const ENHANCED_AVG_SPEED: u8 = 109;
    pub const ENHANCED_MAX_SPEED: u8 = 110;
    pub const ENHANCED_MIN_ALTITUDE: u8 = 112;
    pub const ENHANCED_MAX_ALTITUDE: u8 = 113;
    pub const AVG_VERTICAL_RATIO: u8 = 118;
    pub const TOTAL_FRACTIONAL_ASCENT: u8 = 156;
    pub const TOTAL_FRACTIONAL_DESCENT: u8 = 157;
}

/// SPORT message field numbers.
pub mod sport {
    pub const SPORT: u8 = 0;
    pub const SUB_SPORT: u8 = 1;
    pub const NAME: u8 = 3;
}

/// FILE_ID message field numbers.
pub mod file_id {
    pub const FILE_TYPE: u8 = 0;
    pub const MANUFACTURER: u8 = 1;
    pub const PRODUCT: u8 = 2;
    pub const SERIAL_NUMBER: u8 = 3;
    pub const TIME_CREATED: u8 = 4;
}

/// EVENT message field numbers.
pub mod event {
    pub const EVENT: u8 = 0;
    pub const EVENT_TYPE: u8 = 1;
}

/// ACTIVITY message field numbers.
pub mod activity {
    pub const TOTAL_TIMER_TIME: u8 = 0;
    pub const NUM_SESSIONS: u8 = 1;
    pub const ACTIVITY_TYPE: u8 = 2;
    pub const EVENT: u8 = 3;
    pub const EVENT_TYPE: u8 = 4;
}

/// FIELD_DESCRIPTION message field numbers (developer field metadata).
pub mod field_description {
    pub const DEVELOPER_DATA_INDEX: u8 = 0;
    pub const FIELD_DEFINITION_NUMBER: u8 = 1;
    pub const FIT_BASE_TYPE_ID: u8 = 2;
    pub const FIELD_NAME: u8 = 3;
}

/// Sport enumeration values used when retagging.
pub mod sport_values {
    pub const RUNNING: u8 = 1;
}

/// Sub-sport enumeration values used when retagging.
pub mod sub_sport_values {
    pub const GENERIC: u8 = 0;
    pub const TREADMILL: u8 = 1;
    pub const VIRTUAL_RUN: u8 = 18;
    pub const VIRTUAL_ACTIVITY: u8 = 58;
}
