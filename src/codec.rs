//! Codec boundary
//!
//! Everything that touches FIT bytes lives here. Decoding is delegated to
//! `fitparser` and normalized into the internal message model; encoding is
//! a minimal binary writer covering the fields the rewriter emits. The
//! pipelines never see wire details.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{CodecError, Result};
use crate::messages::{
    field_description, fields, lap, record, session, sub_sport_values, DeveloperField, FieldValue,
    Message, MessageKind, FIT_EPOCH_OFFSET,
};

const HEADER_SIZE: u8 = 14;
const PROTOCOL_VERSION: u8 = 0x20;
const PROFILE_VERSION: u16 = 2132;
const FIT_MAGIC: &[u8; 4] = b".FIT";

/// What the target platform accepts, looked up instead of probed.
///
/// Older profile versions have no virtual-run sub-sport; a `None` entry
/// makes the rewriter fall back to the generic sub-sport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecCapabilities {
    pub virtual_run_sub_sport: Option<u8>,
}

impl Default for CodecCapabilities {
    fn default() -> Self {
        Self {
            virtual_run_sub_sport: Some(sub_sport_values::VIRTUAL_RUN),
        }
    }
}

/// Counters from one encode pass. Skipped messages were logged and dropped;
/// the output file is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOutcome {
    pub written: usize,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode a FIT file into the internal message model.
pub fn decode_file(path: &Path) -> Result<Vec<Message>> {
    if !path.exists() {
        return Err(CodecError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let records = fitparser::from_reader(&mut reader).map_err(|e| CodecError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(normalize(records))
}

/// Decode an in-memory FIT byte stream.
pub fn decode_bytes(bytes: &[u8], origin: &Path) -> Result<Vec<Message>> {
    let records = fitparser::de::from_bytes(bytes).map_err(|e| CodecError::Malformed {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(normalize(records))
}

/// Names and identities of developer fields, collected from
/// FIELD_DESCRIPTION messages as they stream past.
#[derive(Debug, Default)]
struct DeveloperRegistry {
    by_name: HashMap<String, (u8, u8)>,
}

impl DeveloperRegistry {
    fn register(&mut self, msg: &Message) {
        let (Some(index), Some(number)) = (
            msg.field_u64(field_description::DEVELOPER_DATA_INDEX),
            msg.field_u64(field_description::FIELD_DEFINITION_NUMBER),
        ) else {
            return;
        };
        if let Some(name) = msg.field_str(field_description::FIELD_NAME) {
            self.by_name
                .insert(name.to_string(), (index as u8, number as u8));
        }
    }

    fn lookup(&self, name: &str, field_number: u8) -> Option<(u8, u8)> {
        match self.by_name.get(name) {
            Some(&(index, number)) if number == field_number => Some((index, number)),
            _ => None,
        }
    }
}

fn normalize(records: Vec<fitparser::FitDataRecord>) -> Vec<Message> {
    let mut registry = DeveloperRegistry::default();
    let mut out = Vec::with_capacity(records.len());

    for rec in records {
        let kind = MessageKind::from_global(rec.kind().as_u16());
        let mut msg = Message::new(kind);

        for field in rec.fields() {
            let Some(value) = convert_value(field.value()) else {
                debug!(
                    message = %kind.name(),
                    field = field.name(),
                    "skipping unconvertible field value"
                );
                continue;
            };
            // fitparser surfaces developer fields under their described
            // name and field-definition number; the registry tells the two
            // namespaces apart.
            if let Some((index, number)) = registry.lookup(field.name(), field.number()) {
                msg.developer_fields.push(DeveloperField {
                    developer_data_index: index,
                    field_number: number,
                    name: field.name().to_string(),
                    value,
                });
            } else {
                msg.set_field(field.number(), value);
            }
        }

        if kind == MessageKind::FieldDescription {
            registry.register(&msg);
        }
        out.push(msg);
    }

    out
}

fn convert_value(value: &fitparser::Value) -> Option<FieldValue> {
    use fitparser::Value;
    Some(match value {
        Value::Timestamp(ts) => FieldValue::Timestamp(ts.with_timezone(&chrono::Utc)),
        Value::Enum(v) => FieldValue::Enum(*v),
        Value::String(s) => FieldValue::String(s.clone()),
        Value::Float32(v) => FieldValue::Float(*v as f64),
        Value::Float64(v) => FieldValue::Float(*v),
        Value::SInt8(v) => FieldValue::SInt(*v as i64),
        Value::SInt16(v) => FieldValue::SInt(*v as i64),
        Value::SInt32(v) => FieldValue::SInt(*v as i64),
        Value::SInt64(v) => FieldValue::SInt(*v),
        Value::UInt8(v) | Value::UInt8z(v) | Value::Byte(v) => FieldValue::UInt(*v as u64),
        Value::UInt16(v) | Value::UInt16z(v) => FieldValue::UInt(*v as u64),
        Value::UInt32(v) | Value::UInt32z(v) => FieldValue::UInt(*v as u64),
        Value::UInt64(v) | Value::UInt64z(v) => FieldValue::UInt(*v),
        Value::Array(values) => return values.first().and_then(convert_value),
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

// FIT base type identifiers.
const BASE_ENUM: u8 = 0x00;
const BASE_UINT8: u8 = 0x02;
const BASE_STRING: u8 = 0x07;
const BASE_SINT16: u8 = 0x83;
const BASE_UINT16: u8 = 0x84;
const BASE_SINT32: u8 = 0x85;
const BASE_UINT32: u8 = 0x86;
const BASE_FLOAT64: u8 = 0x89;
const BASE_UINT32Z: u8 = 0x8C;

/// Wire representation of one field: base type plus scale/offset applied
/// before integer conversion (wire = round(value * scale + offset)).
#[derive(Debug, Clone, Copy, PartialEq)]
enum WireForm {
    Enum,
    UInt8 { scale: f64, offset: f64 },
    UInt16 { scale: f64, offset: f64 },
    UInt32 { scale: f64, offset: f64 },
    UInt32Z,
    SInt16 { scale: f64 },
    SInt32,
    /// uint32 seconds since the FIT epoch.
    DateTime,
    /// NUL-terminated bytes, length taken from the value.
    String,
    Float64,
}

const PLAIN_U16: WireForm = WireForm::UInt16 {
    scale: 1.0,
    offset: 0.0,
};
const PLAIN_U32: WireForm = WireForm::UInt32 {
    scale: 1.0,
    offset: 0.0,
};
const SPEED_U16: WireForm = WireForm::UInt16 {
    scale: 1000.0,
    offset: 0.0,
};
const SPEED_U32: WireForm = WireForm::UInt32 {
    scale: 1000.0,
    offset: 0.0,
};
// Altitude wire form: 1/5 m resolution with a 500 m floor.
const ALTITUDE_U16: WireForm = WireForm::UInt16 {
    scale: 5.0,
    offset: 2500.0,
};
const ALTITUDE_U32: WireForm = WireForm::UInt32 {
    scale: 5.0,
    offset: 2500.0,
};
const CENTI_U32: WireForm = WireForm::UInt32 {
    scale: 100.0,
    offset: 0.0,
};
const PERCENT_U8: WireForm = WireForm::UInt8 {
    scale: 100.0,
    offset: 0.0,
};
const PERCENT_U16: WireForm = WireForm::UInt16 {
    scale: 100.0,
    offset: 0.0,
};
const PERCENT_S16: WireForm = WireForm::SInt16 { scale: 100.0 };

// Wire forms for the profile fields this tool writes. Fields outside the
// table fall back to a form inferred from the value.
fn wire_form(kind: MessageKind, number: u8) -> Option<WireForm> {
    if number == fields::TIMESTAMP {
        return Some(WireForm::DateTime);
    }
    if number == fields::MESSAGE_INDEX {
        return Some(PLAIN_U16);
    }
    let form = match kind {
        MessageKind::Record => match number {
            record::POSITION_LAT | record::POSITION_LONG => WireForm::SInt32,
            record::ALTITUDE => ALTITUDE_U16,
            record::HEART_RATE | record::CADENCE => WireForm::UInt8 {
                scale: 1.0,
                offset: 0.0,
            },
            record::DISTANCE => CENTI_U32,
            record::SPEED => SPEED_U16,
            record::GRADE => PERCENT_S16,
            record::ENHANCED_SPEED => SPEED_U32,
            record::ENHANCED_ALTITUDE => ALTITUDE_U32,
            record::VERTICAL_RATIO => PERCENT_U16,
            _ => return None,
        },
        MessageKind::Session => match number {
            session::EVENT | session::EVENT_TYPE | session::SPORT | session::SUB_SPORT => {
                WireForm::Enum
            }
            session::START_TIME => WireForm::DateTime,
            session::START_POSITION_LAT
            | session::START_POSITION_LONG
            | session::NEC_LAT
            | session::NEC_LONG
            | session::SWC_LAT
            | session::SWC_LONG
            | session::END_POSITION_LAT
            | session::END_POSITION_LONG => WireForm::SInt32,
            session::TOTAL_DISTANCE => CENTI_U32,
            session::AVG_SPEED | session::MAX_SPEED => SPEED_U16,
            session::TOTAL_ASCENT | session::TOTAL_DESCENT => PLAIN_U16,
            session::AVG_GRADE => PERCENT_S16,
            session::MAX_ALTITUDE | session::MIN_ALTITUDE => ALTITUDE_U16,
            session::SPORT_PROFILE_NAME => WireForm::String,
            session::ENHANCED_AVG_SPEED | session::ENHANCED_MAX_SPEED => SPEED_U32,
            session::ENHANCED_MIN_ALTITUDE | session::ENHANCED_MAX_ALTITUDE => ALTITUDE_U32,
            session::AVG_VERTICAL_RATIO => PERCENT_U16,
            session::TOTAL_FRACTIONAL_ASCENT | session::TOTAL_FRACTIONAL_DESCENT => PERCENT_U8,
            _ => return None,
        },
        MessageKind::Lap => match number {
            lap::EVENT | lap::EVENT_TYPE | lap::SPORT | lap::SUB_SPORT => WireForm::Enum,
            lap::START_TIME => WireForm::DateTime,
            lap::START_POSITION_LAT
            | lap::START_POSITION_LONG
            | lap::END_POSITION_LAT
            | lap::END_POSITION_LONG => WireForm::SInt32,
            lap::TOTAL_DISTANCE => CENTI_U32,
            lap::AVG_SPEED | lap::MAX_SPEED => SPEED_U16,
            lap::TOTAL_ASCENT | lap::TOTAL_DESCENT => PLAIN_U16,
            lap::MAX_ALTITUDE | lap::MIN_ALTITUDE => ALTITUDE_U16,
            lap::AVG_GRADE => PERCENT_S16,
            lap::ENHANCED_AVG_SPEED | lap::ENHANCED_MAX_SPEED => SPEED_U32,
            lap::ENHANCED_MIN_ALTITUDE | lap::ENHANCED_MAX_ALTITUDE => ALTITUDE_U32,
            lap::AVG_VERTICAL_RATIO => PERCENT_U16,
            lap::TOTAL_FRACTIONAL_ASCENT | lap::TOTAL_FRACTIONAL_DESCENT => PERCENT_U8,
            _ => return None,
        },
        MessageKind::FileId => match number {
            crate::messages::file_id::FILE_TYPE => WireForm::Enum,
            crate::messages::file_id::MANUFACTURER | crate::messages::file_id::PRODUCT => {
                PLAIN_U16
            }
            crate::messages::file_id::SERIAL_NUMBER => WireForm::UInt32Z,
            crate::messages::file_id::TIME_CREATED => WireForm::DateTime,
            _ => return None,
        },
        MessageKind::Sport => match number {
            crate::messages::sport::SPORT | crate::messages::sport::SUB_SPORT => WireForm::Enum,
            crate::messages::sport::NAME => WireForm::String,
            _ => return None,
        },
        MessageKind::Event => match number {
            crate::messages::event::EVENT | crate::messages::event::EVENT_TYPE => WireForm::Enum,
            _ => return None,
        },
        MessageKind::Activity => match number {
            crate::messages::activity::TOTAL_TIMER_TIME => WireForm::UInt32 {
                scale: 1000.0,
                offset: 0.0,
            },
            crate::messages::activity::NUM_SESSIONS => PLAIN_U16,
            crate::messages::activity::ACTIVITY_TYPE
            | crate::messages::activity::EVENT
            | crate::messages::activity::EVENT_TYPE => WireForm::Enum,
            _ => return None,
        },
        _ => return None,
    };
    Some(form)
}

// Untabled fields still travel; the form is inferred from the value so
// passthrough messages survive a rewrite.
fn inferred_form(value: &FieldValue) -> WireForm {
    match value {
        FieldValue::Enum(_) => WireForm::Enum,
        FieldValue::UInt(_) => PLAIN_U32,
        FieldValue::SInt(_) => WireForm::SInt32,
        FieldValue::Float(_) => WireForm::Float64,
        FieldValue::String(_) => WireForm::String,
        FieldValue::Timestamp(_) => WireForm::DateTime,
    }
}

fn numeric(value: &FieldValue) -> Option<f64> {
    value.as_f64()
}

fn scaled_integer(value: &FieldValue, scale: f64, offset: f64) -> Option<i64> {
    numeric(value).map(|v| (v * scale + offset).round() as i64)
}

fn encode_value(form: WireForm, value: &FieldValue) -> std::result::Result<Vec<u8>, String> {
    let out_of_range = |v: i64| format!("value {} out of range", v);
    match form {
        WireForm::Enum => {
            let v = value.as_u64().ok_or("not an enum value")?;
            let v = u8::try_from(v).map_err(|_| out_of_range(v as i64))?;
            Ok(vec![v])
        }
        WireForm::UInt8 { scale, offset } => {
            let v = scaled_integer(value, scale, offset).ok_or("not numeric")?;
            let v = u8::try_from(v).map_err(|_| out_of_range(v))?;
            Ok(vec![v])
        }
        WireForm::UInt16 { scale, offset } => {
            let v = scaled_integer(value, scale, offset).ok_or("not numeric")?;
            let v = u16::try_from(v).map_err(|_| out_of_range(v))?;
            Ok(v.to_le_bytes().to_vec())
        }
        WireForm::UInt32 { scale, offset } => {
            let v = scaled_integer(value, scale, offset).ok_or("not numeric")?;
            let v = u32::try_from(v).map_err(|_| out_of_range(v))?;
            Ok(v.to_le_bytes().to_vec())
        }
        WireForm::UInt32Z => {
            let v = value.as_u64().ok_or("not numeric")?;
            let v = u32::try_from(v).map_err(|_| out_of_range(v as i64))?;
            Ok(v.to_le_bytes().to_vec())
        }
        WireForm::SInt16 { scale } => {
            let v = scaled_integer(value, scale, 0.0).ok_or("not numeric")?;
            let v = i16::try_from(v).map_err(|_| out_of_range(v))?;
            Ok(v.to_le_bytes().to_vec())
        }
        WireForm::SInt32 => {
            let v = value.as_i64().ok_or("not numeric")?;
            let v = i32::try_from(v).map_err(|_| out_of_range(v))?;
            Ok(v.to_le_bytes().to_vec())
        }
        WireForm::DateTime => {
            let unix = value.as_i64().ok_or("not a timestamp")?;
            let fit = unix - FIT_EPOCH_OFFSET;
            let fit = u32::try_from(fit).map_err(|_| "timestamp before the FIT epoch")?;
            Ok(fit.to_le_bytes().to_vec())
        }
        WireForm::String => match value {
            FieldValue::String(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                if bytes.len() > 255 {
                    return Err("string longer than 255 bytes".to_string());
                }
                Ok(bytes)
            }
            _ => Err("not a string".to_string()),
        },
        WireForm::Float64 => {
            let v = numeric(value).ok_or("not numeric")?;
            Ok(v.to_le_bytes().to_vec())
        }
    }
}

fn base_type(form: WireForm) -> u8 {
    match form {
        WireForm::Enum => BASE_ENUM,
        WireForm::UInt8 { .. } => BASE_UINT8,
        WireForm::UInt16 { .. } => BASE_UINT16,
        WireForm::UInt32 { .. } | WireForm::DateTime => BASE_UINT32,
        WireForm::UInt32Z => BASE_UINT32Z,
        WireForm::SInt16 { .. } => BASE_SINT16,
        WireForm::SInt32 => BASE_SINT32,
        WireForm::String => BASE_STRING,
        WireForm::Float64 => BASE_FLOAT64,
    }
}

// One message becomes a definition record plus a data record, both on
// local message number 0. Redefining per message keeps the writer simple
// and the stream valid.
fn encode_message(msg: &Message) -> std::result::Result<Vec<u8>, CodecError> {
    let mut field_defs: Vec<(u8, u8, u8)> = Vec::new();
    let mut payload: Vec<u8> = Vec::new();

    for (number, value) in msg.iter_fields() {
        let form = wire_form(msg.kind, number).unwrap_or_else(|| inferred_form(value));
        let bytes = encode_value(form, value).map_err(|reason| CodecError::UnwritableField {
            kind: msg.kind.name(),
            field: number,
            reason,
        })?;
        field_defs.push((number, bytes.len() as u8, base_type(form)));
        payload.extend_from_slice(&bytes);
    }

    if field_defs.is_empty() {
        return Err(CodecError::MessageEncode {
            kind: msg.kind.name(),
            reason: "no encodable fields".to_string(),
        });
    }
    if field_defs.len() > 255 {
        return Err(CodecError::MessageEncode {
            kind: msg.kind.name(),
            reason: "too many fields".to_string(),
        });
    }

    let mut out = Vec::with_capacity(6 + field_defs.len() * 3 + 1 + payload.len());
    // Definition record: header, reserved, little-endian arch, global
    // message number, field count, field triples.
    out.push(0x40);
    out.push(0);
    out.push(0);
    out.extend_from_slice(&msg.kind.global_number().to_le_bytes());
    out.push(field_defs.len() as u8);
    for (number, size, base) in &field_defs {
        out.push(*number);
        out.push(*size);
        out.push(*base);
    }
    // Data record on the same local number.
    out.push(0x00);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Encode a message stream into FIT bytes.
///
/// FileId messages are written first regardless of stream position. A
/// message that fails to encode is logged with a full field dump and
/// skipped; the remaining stream still produces a valid file.
pub fn encode(messages: &[Message]) -> (Vec<u8>, EncodeOutcome) {
    let mut data: Vec<u8> = Vec::new();
    let mut outcome = EncodeOutcome::default();

    if !messages.iter().any(|m| m.kind == MessageKind::FileId) {
        warn!("stream has no file_id message; most consumers will reject the output");
    }

    let ordered = messages
        .iter()
        .filter(|m| m.kind == MessageKind::FileId)
        .chain(messages.iter().filter(|m| m.kind != MessageKind::FileId));

    for msg in ordered {
        match encode_message(msg) {
            Ok(bytes) => {
                data.extend_from_slice(&bytes);
                outcome.written += 1;
            }
            Err(err) => {
                warn!(
                    message = %msg.kind.name(),
                    error = %err,
                    fields = %dump_fields(msg),
                    "skipping unencodable message"
                );
                outcome.skipped += 1;
            }
        }
    }

    let mut file = Vec::with_capacity(HEADER_SIZE as usize + data.len() + 2);
    file.push(HEADER_SIZE);
    file.push(PROTOCOL_VERSION);
    file.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
    file.extend_from_slice(&(data.len() as u32).to_le_bytes());
    file.extend_from_slice(FIT_MAGIC);
    let header_crc = crc16(&file[..12]);
    file.extend_from_slice(&header_crc.to_le_bytes());
    file.extend_from_slice(&data);
    let file_crc = crc16(&file);
    file.extend_from_slice(&file_crc.to_le_bytes());

    (file, outcome)
}

/// Encode and write a message stream to disk.
pub fn encode_file(path: &Path, messages: &[Message]) -> Result<EncodeOutcome> {
    let (bytes, outcome) = encode(messages);
    std::fs::write(path, bytes)?;
    Ok(outcome)
}

fn dump_fields(msg: &Message) -> String {
    msg.iter_fields()
        .map(|(n, v)| format!("{}={}", n, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// FIT CRC-16, nibble-at-a-time table variant.
pub fn crc16(data: &[u8]) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
        0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
    ];
    let mut crc: u16 = 0;
    for &byte in data {
        let mut tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc ^= tmp ^ CRC_TABLE[(byte & 0xF) as usize];
        tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc ^= tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize];
    }
    crc
}
