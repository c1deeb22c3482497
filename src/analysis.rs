//! Schema-presence analysis
//!
//! Read-only scan over a decoded message stream that reports which optional
//! fields are actually populated: per-record coverage percentages, session
//! and lap presence flags, developer-field inventory, and an overall
//! GAP-readiness verdict (grade-adjusted-pace tooling needs position,
//! enhanced altitude, and enhanced speed on every record).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::messages::{
    activity, event, fields, file_id, lap, record, session, sport, Message, MessageKind,
};
use crate::presence::{self, Coverage};

/// Record dumps are capped at this many entries.
const RECORD_DUMP_LIMIT: usize = 5;

/// Count of one message category in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageCount {
    pub name: String,
    pub count: usize,
}

/// Identity fields from the FILE_ID message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_type: Option<u64>,
    pub manufacturer: Option<u64>,
    pub product: Option<u64>,
}

/// Resolved sport tagging, with the message kinds it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SportInfo {
    pub sport: Option<u8>,
    pub sub_sport: Option<u8>,
    pub profile_name: Option<String>,
    /// Which message kinds carried a sub-sport value, e.g. "sport", "lap".
    pub sub_sport_sources: Vec<String>,
}

/// ACTIVITY message summary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub timestamp: Option<String>,
    pub event: Option<u8>,
    pub event_type: Option<u8>,
}

/// Per-field coverage over all RECORD messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordCoverage {
    pub total: usize,
    /// Both latitude and longitude present.
    pub position: Coverage,
    pub distance: Coverage,
    pub altitude: Coverage,
    pub enhanced_altitude: Coverage,
    pub speed: Coverage,
    pub enhanced_speed: Coverage,
    pub grade: Coverage,
    pub vertical_ratio: Coverage,
}

/// Presence flags and headline values for the SESSION message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionPresence {
    pub sport: bool,
    pub sub_sport: bool,
    pub sport_profile_name: bool,
    pub start_position: bool,
    pub end_position: bool,
    pub bounding_box: bool,
    pub total_distance: bool,
    pub total_ascent: bool,
    pub total_descent: bool,
    pub avg_speed: bool,
    pub max_speed: bool,
    pub enhanced_avg_speed: bool,
    pub enhanced_max_speed: bool,
    pub min_altitude: bool,
    pub max_altitude: bool,
    pub enhanced_min_altitude: bool,
    pub enhanced_max_altitude: bool,
    pub avg_grade: bool,
    pub avg_vertical_ratio: bool,
    pub fractional_ascent: bool,
    pub total_distance_meters: Option<f64>,
    pub total_ascent_meters: Option<u64>,
    pub total_descent_meters: Option<u64>,
}

/// Presence flags for one LAP message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LapPresence {
    pub index: u64,
    pub total_ascent: Option<u64>,
    pub total_descent: Option<u64>,
    pub avg_grade: Option<f64>,
    pub avg_vertical_ratio: Option<f64>,
    pub start_position: bool,
    pub end_position: bool,
    pub enhanced_avg_speed: bool,
    pub enhanced_max_speed: bool,
    pub min_altitude: bool,
    pub max_altitude: bool,
    pub enhanced_min_altitude: bool,
    pub enhanced_max_altitude: bool,
    pub fractional_ascent: bool,
    pub fractional_descent: bool,
}

impl LapPresence {
    /// Names of the enhanced/fractional fields this lap is missing.
    pub fn missing_enhanced(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.enhanced_avg_speed {
            missing.push("enhanced avg speed");
        }
        if !self.enhanced_max_speed {
            missing.push("enhanced max speed");
        }
        if !self.enhanced_min_altitude {
            missing.push("enhanced min altitude");
        }
        if !self.enhanced_max_altitude {
            missing.push("enhanced max altitude");
        }
        if !self.fractional_ascent {
            missing.push("total fractional ascent");
        }
        if !self.fractional_descent {
            missing.push("total fractional descent");
        }
        missing
    }
}

/// "Any lap carries X" rollup across all laps.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LapAnyFlags {
    pub total_ascent: bool,
    pub total_descent: bool,
    pub avg_grade: bool,
    pub avg_vertical_ratio: bool,
    pub start_position: bool,
    pub end_position: bool,
    pub enhanced_avg_speed: bool,
    pub enhanced_max_speed: bool,
    pub enhanced_min_altitude: bool,
    pub enhanced_max_altitude: bool,
    pub fractional_ascent: bool,
    pub fractional_descent: bool,
}

/// All lap-level findings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LapAnalysis {
    pub count: usize,
    pub laps: Vec<LapPresence>,
    /// Sum of per-lap ascent values, for cross-checking the session total.
    pub sum_ascent: u64,
    pub sum_descent: u64,
    pub any: LapAnyFlags,
}

/// One distinct developer field and how often it appears.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeveloperFieldCount {
    pub developer_data_index: u8,
    pub field_number: u8,
    pub name: String,
    pub count: usize,
}

/// Inventory of developer fields across the whole stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeveloperFieldInventory {
    pub total_instances: usize,
    pub distinct: Vec<DeveloperFieldCount>,
}

/// Raw dump of one record's fields, for eyeballing unfamiliar files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordDump {
    pub index: usize,
    pub timestamp: Option<String>,
    pub fields: Vec<(u8, String)>,
}

/// The complete analysis result. Pure data; rendering lives elsewhere.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub total_messages: usize,
    pub message_counts: BTreeMap<u16, MessageCount>,
    pub file_info: FileInfo,
    pub sport_info: SportInfo,
    pub activity: ActivitySummary,
    pub records: RecordCoverage,
    pub session: Option<SessionPresence>,
    pub laps: LapAnalysis,
    pub event_kinds: Vec<String>,
    pub developer_fields: DeveloperFieldInventory,
    pub gap_ready: bool,
    pub record_dumps: Vec<RecordDump>,
}

/// Analyze a decoded message stream. Never mutates the input.
pub fn analyze(messages: &[Message]) -> CompletenessReport {
    let mut counts: BTreeMap<u16, MessageCount> = BTreeMap::new();
    for msg in messages {
        let entry = counts.entry(msg.kind.global_number()).or_insert_with(|| {
            MessageCount {
                name: msg.kind.name(),
                count: 0,
            }
        });
        entry.count += 1;
    }

    let records = scan_records(messages);
    let gap_ready = records.total > 0
        && records.position.is_complete()
        && records.enhanced_altitude.is_complete()
        && records.enhanced_speed.is_complete();

    CompletenessReport {
        total_messages: messages.len(),
        message_counts: counts,
        file_info: scan_file_id(messages),
        sport_info: scan_sport(messages),
        activity: scan_activity(messages),
        records,
        session: scan_session(messages),
        laps: scan_laps(messages),
        event_kinds: scan_events(messages),
        developer_fields: scan_developer_fields(messages),
        gap_ready,
        record_dumps: dump_records(messages),
    }
}

fn scan_file_id(messages: &[Message]) -> FileInfo {
    let Some(msg) = messages.iter().find(|m| m.kind == MessageKind::FileId) else {
        return FileInfo::default();
    };
    FileInfo {
        file_type: msg.field_u64(file_id::FILE_TYPE),
        manufacturer: msg.field_u64(file_id::MANUFACTURER),
        product: msg.field_u64(file_id::PRODUCT),
    }
}

// Sport resolution prefers the SPORT message and falls back to the SESSION,
// mirroring how most consumers read these files.
fn scan_sport(messages: &[Message]) -> SportInfo {
    let sport_msg = messages.iter().find(|m| m.kind == MessageKind::Sport);
    let session_msg = messages.iter().find(|m| m.kind == MessageKind::Session);

    let mut info = SportInfo::default();

    if let Some(msg) = sport_msg {
        info.sport = msg.field_u64(sport::SPORT).map(|v| v as u8);
        info.sub_sport = msg.field_u64(sport::SUB_SPORT).map(|v| v as u8);
        info.profile_name = msg.field_str(sport::NAME).map(|s| s.to_string());
        if msg.has_field(sport::SUB_SPORT) {
            info.sub_sport_sources.push("sport".to_string());
        }
    }
    if let Some(msg) = session_msg {
        if info.sport.is_none() {
            info.sport = msg.field_u64(session::SPORT).map(|v| v as u8);
        }
        if info.sub_sport.is_none() {
            info.sub_sport = msg.field_u64(session::SUB_SPORT).map(|v| v as u8);
        }
        if msg.has_field(session::SUB_SPORT) {
            info.sub_sport_sources.push("session".to_string());
        }
        if info.profile_name.is_none() {
            info.profile_name = msg
                .field_str(session::SPORT_PROFILE_NAME)
                .map(|s| s.to_string());
        }
    }
    if presence::any_has(messages, MessageKind::Lap, lap::SUB_SPORT) {
        info.sub_sport_sources.push("lap".to_string());
    }

    info
}

fn scan_activity(messages: &[Message]) -> ActivitySummary {
    let Some(msg) = messages.iter().find(|m| m.kind == MessageKind::Activity) else {
        return ActivitySummary::default();
    };
    ActivitySummary {
        timestamp: msg.timestamp().map(|ts| ts.to_rfc3339()),
        event: msg.field_u64(activity::EVENT).map(|v| v as u8),
        event_type: msg.field_u64(activity::EVENT_TYPE).map(|v| v as u8),
    }
}

fn scan_records(messages: &[Message]) -> RecordCoverage {
    // Position counts only when both halves of the coordinate are there.
    let mut position = Coverage::default();
    for msg in messages.iter().filter(|m| m.kind == MessageKind::Record) {
        position.total += 1;
        if presence::has_all(msg, &[record::POSITION_LAT, record::POSITION_LONG]) {
            position.present += 1;
        }
    }

    let field = |number| presence::coverage(messages, MessageKind::Record, number);
    RecordCoverage {
        total: position.total,
        position,
        distance: field(record::DISTANCE),
        altitude: field(record::ALTITUDE),
        enhanced_altitude: field(record::ENHANCED_ALTITUDE),
        speed: field(record::SPEED),
        enhanced_speed: field(record::ENHANCED_SPEED),
        grade: field(record::GRADE),
        vertical_ratio: field(record::VERTICAL_RATIO),
    }
}

fn scan_session(messages: &[Message]) -> Option<SessionPresence> {
    let msg = messages.iter().find(|m| m.kind == MessageKind::Session)?;
    Some(SessionPresence {
        sport: msg.has_field(session::SPORT),
        sub_sport: msg.has_field(session::SUB_SPORT),
        sport_profile_name: msg.has_field(session::SPORT_PROFILE_NAME),
        start_position: presence::has_all(
            msg,
            &[session::START_POSITION_LAT, session::START_POSITION_LONG],
        ),
        end_position: presence::has_all(
            msg,
            &[session::END_POSITION_LAT, session::END_POSITION_LONG],
        ),
        bounding_box: presence::has_all(
            msg,
            &[
                session::NEC_LAT,
                session::NEC_LONG,
                session::SWC_LAT,
                session::SWC_LONG,
            ],
        ),
        total_distance: msg.has_field(session::TOTAL_DISTANCE),
        total_ascent: msg.has_field(session::TOTAL_ASCENT),
        total_descent: msg.has_field(session::TOTAL_DESCENT),
        avg_speed: msg.has_field(session::AVG_SPEED),
        max_speed: msg.has_field(session::MAX_SPEED),
        enhanced_avg_speed: msg.has_field(session::ENHANCED_AVG_SPEED),
        enhanced_max_speed: msg.has_field(session::ENHANCED_MAX_SPEED),
        min_altitude: msg.has_field(session::MIN_ALTITUDE),
        max_altitude: msg.has_field(session::MAX_ALTITUDE),
        enhanced_min_altitude: msg.has_field(session::ENHANCED_MIN_ALTITUDE),
        enhanced_max_altitude: msg.has_field(session::ENHANCED_MAX_ALTITUDE),
        avg_grade: msg.has_field(session::AVG_GRADE),
        avg_vertical_ratio: msg.has_field(session::AVG_VERTICAL_RATIO),
        fractional_ascent: msg.has_field(session::TOTAL_FRACTIONAL_ASCENT),
        total_distance_meters: msg.field_f64(session::TOTAL_DISTANCE),
        total_ascent_meters: msg.field_u64(session::TOTAL_ASCENT),
        total_descent_meters: msg.field_u64(session::TOTAL_DESCENT),
    })
}

fn scan_laps(messages: &[Message]) -> LapAnalysis {
    let mut analysis = LapAnalysis::default();

    for (i, msg) in messages
        .iter()
        .filter(|m| m.kind == MessageKind::Lap)
        .enumerate()
    {
        let lap = LapPresence {
            index: msg.field_u64(fields::MESSAGE_INDEX).unwrap_or(i as u64),
            total_ascent: msg.field_u64(lap::TOTAL_ASCENT),
            total_descent: msg.field_u64(lap::TOTAL_DESCENT),
            avg_grade: msg.field_f64(lap::AVG_GRADE),
            avg_vertical_ratio: msg.field_f64(lap::AVG_VERTICAL_RATIO),
            start_position: presence::has_all(
                msg,
                &[lap::START_POSITION_LAT, lap::START_POSITION_LONG],
            ),
            end_position: presence::has_all(msg, &[lap::END_POSITION_LAT, lap::END_POSITION_LONG]),
            enhanced_avg_speed: msg.has_field(lap::ENHANCED_AVG_SPEED),
            enhanced_max_speed: msg.has_field(lap::ENHANCED_MAX_SPEED),
            min_altitude: msg.has_field(lap::MIN_ALTITUDE),
            max_altitude: msg.has_field(lap::MAX_ALTITUDE),
            enhanced_min_altitude: msg.has_field(lap::ENHANCED_MIN_ALTITUDE),
            enhanced_max_altitude: msg.has_field(lap::ENHANCED_MAX_ALTITUDE),
            fractional_ascent: msg.has_field(lap::TOTAL_FRACTIONAL_ASCENT),
            fractional_descent: msg.has_field(lap::TOTAL_FRACTIONAL_DESCENT),
        };

        analysis.sum_ascent += lap.total_ascent.unwrap_or(0);
        analysis.sum_descent += lap.total_descent.unwrap_or(0);

        let any = &mut analysis.any;
        any.total_ascent |= lap.total_ascent.is_some();
        any.total_descent |= lap.total_descent.is_some();
        any.avg_grade |= lap.avg_grade.is_some();
        any.avg_vertical_ratio |= lap.avg_vertical_ratio.is_some();
        any.start_position |= lap.start_position;
        any.end_position |= lap.end_position;
        any.enhanced_avg_speed |= lap.enhanced_avg_speed;
        any.enhanced_max_speed |= lap.enhanced_max_speed;
        any.enhanced_min_altitude |= lap.enhanced_min_altitude;
        any.enhanced_max_altitude |= lap.enhanced_max_altitude;
        any.fractional_ascent |= lap.fractional_ascent;
        any.fractional_descent |= lap.fractional_descent;

        analysis.laps.push(lap);
    }

    analysis.count = analysis.laps.len();
    analysis
}

fn scan_events(messages: &[Message]) -> Vec<String> {
    let mut kinds: Vec<String> = messages
        .iter()
        .filter(|m| m.kind == MessageKind::Event)
        .map(|m| {
            let ev = m
                .field_u64(event::EVENT)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            let ty = m
                .field_u64(event::EVENT_TYPE)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("{} ({})", ty, ev)
        })
        .collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

// Inventory keyed by the wire identity (dev index, field number); the
// BTreeMap makes the output order deterministic.
fn scan_developer_fields(messages: &[Message]) -> DeveloperFieldInventory {
    let mut distinct: BTreeMap<(u8, u8), DeveloperFieldCount> = BTreeMap::new();
    let mut total_instances = 0;

    for msg in messages {
        for dev in &msg.developer_fields {
            total_instances += 1;
            let entry = distinct
                .entry((dev.developer_data_index, dev.field_number))
                .or_insert_with(|| DeveloperFieldCount {
                    developer_data_index: dev.developer_data_index,
                    field_number: dev.field_number,
                    name: dev.name.clone(),
                    count: 0,
                });
            entry.count += 1;
        }
    }

    DeveloperFieldInventory {
        total_instances,
        distinct: distinct.into_values().collect(),
    }
}

fn dump_records(messages: &[Message]) -> Vec<RecordDump> {
    messages
        .iter()
        .filter(|m| m.kind == MessageKind::Record)
        .take(RECORD_DUMP_LIMIT)
        .enumerate()
        .map(|(index, msg)| RecordDump {
            index,
            timestamp: msg.timestamp().map(|ts| ts.to_rfc3339()),
            fields: msg
                .iter_fields()
                .map(|(n, v)| (n, v.to_string()))
                .collect(),
        })
        .collect()
}
