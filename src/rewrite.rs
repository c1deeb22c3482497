//! Message rewriting
//!
//! The inject pipeline: retag an indoor session as an outdoor-looking
//! virtual run, attach the synthetic track to every record, and replace the
//! session and lap summaries the track invalidated. Everything operates on
//! copies of the decoded stream; the input is never mutated.

use tracing::{debug, info, warn};

use crate::aggregates::{lap_summary, session_summary};
use crate::codec::CodecCapabilities;
use crate::messages::{
    lap, record, session, sport, sport_values, sub_sport_values, FieldValue, Message, MessageKind,
};
use crate::synth::{synthesize, SynthesisParams, SyntheticTrack, TrackPoint};
use crate::timeline::{KnotPolicy, Sample, TimelineBuilder};

/// Counters from one inject pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewriteStats {
    pub records_updated: usize,
    pub sessions_updated: usize,
    pub laps_updated: usize,
    pub workouts_dropped: usize,
    /// Recomputed whole-meter ascent for the session.
    pub total_ascent: u32,
}

/// Rewrite a decoded stream with a synthetic track.
///
/// `virtual_tag` selects the virtual-run sub-sport (resolved through the
/// capability table) over the generic one. Returns the new stream plus
/// counters. A stream without records passes through with sport retagging
/// only.
pub fn inject(
    messages: &[Message],
    params: &SynthesisParams,
    policy: KnotPolicy,
    virtual_tag: bool,
    capabilities: &CodecCapabilities,
) -> (Vec<Message>, RewriteStats) {
    if !messages.iter().any(|m| m.kind == MessageKind::FileId) {
        warn!("stream has no file_id message");
    }

    let samples: Vec<Sample> = messages
        .iter()
        .filter_map(Sample::from_message)
        .collect();

    let stored_total = messages
        .iter()
        .find(|m| m.kind == MessageKind::Session)
        .and_then(|m| m.field_f64(session::TOTAL_DISTANCE));

    let timeline = TimelineBuilder::new()
        .knot_policy(policy)
        .session_total_distance(stored_total)
        .build(&samples);
    if !timeline.is_monotonic() {
        warn!("record distances regress; interpolated track may fold back on itself");
    }

    let track = synthesize(&timeline, &samples, params);
    debug!(points = track.len(), "synthesized track");

    let sub_sport = if virtual_tag {
        virtual_sub_sport(capabilities)
    } else {
        sub_sport_values::GENERIC
    };
    let summary = session_summary(
        &track,
        stored_total.unwrap_or(timeline.max_known_distance()),
        params.bearing_degrees,
    );

    let mut stats = RewriteStats {
        total_ascent: summary.total_ascent,
        ..RewriteStats::default()
    };
    let mut points = track.points.iter();
    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.kind {
            // Treadmill workout structure makes no sense on the synthetic
            // course; dropping it matches how platforms expect virtual runs.
            MessageKind::Workout | MessageKind::WorkoutStep => {
                stats.workouts_dropped += 1;
            }
            MessageKind::Sport => {
                out.push(retag_sport(msg, sub_sport));
            }
            MessageKind::Record => {
                let mut copy = msg.clone();
                // Track points align one to one with records that carried
                // a timestamp.
                if Sample::from_message(msg).is_some() {
                    if let Some(point) = points.next() {
                        apply_track_point(&mut copy, point);
                        stats.records_updated += 1;
                    }
                } else {
                    // No track point for a timestampless record, but its
                    // legacy fields still must not outlive the rewrite.
                    copy.remove_field(record::ALTITUDE);
                    copy.remove_field(record::SPEED);
                }
                out.push(copy);
            }
            MessageKind::Session => {
                out.push(rewrite_session(msg, &summary, sub_sport));
                stats.sessions_updated += 1;
            }
            MessageKind::Lap => {
                out.push(rewrite_lap(msg, &track, params.grade, sub_sport));
                stats.laps_updated += 1;
            }
            _ => out.push(msg.clone()),
        }
    }

    info!(
        records = stats.records_updated,
        laps = stats.laps_updated,
        ascent = stats.total_ascent,
        "inject pass complete"
    );
    (out, stats)
}

fn virtual_sub_sport(capabilities: &CodecCapabilities) -> u8 {
    match capabilities.virtual_run_sub_sport {
        Some(value) => value,
        None => {
            warn!("target profile has no virtual-run sub-sport; tagging as generic");
            sub_sport_values::GENERIC
        }
    }
}

fn retag_sport(msg: &Message, sub_sport: u8) -> Message {
    let mut copy = msg.clone();
    copy.set_field(sport::SPORT, FieldValue::Enum(sport_values::RUNNING));
    copy.set_field(sport::SUB_SPORT, FieldValue::Enum(sub_sport));
    copy.set_field(sport::NAME, FieldValue::String("Run".to_string()));
    copy
}

fn apply_track_point(msg: &mut Message, point: &TrackPoint) {
    msg.set_field(
        record::POSITION_LAT,
        FieldValue::SInt(point.latitude_semicircles as i64),
    );
    msg.set_field(
        record::POSITION_LONG,
        FieldValue::SInt(point.longitude_semicircles as i64),
    );
    msg.set_field(record::ENHANCED_ALTITUDE, FieldValue::Float(point.altitude));
    if !msg.has_field(record::DISTANCE) {
        msg.set_field(record::DISTANCE, FieldValue::Float(point.distance));
    }
    // The narrow legacy fields would shadow the enhanced values on import.
    msg.remove_field(record::ALTITUDE);
    msg.remove_field(record::SPEED);
}

fn rewrite_session(
    msg: &Message,
    summary: &crate::aggregates::SessionSummary,
    sub_sport: u8,
) -> Message {
    let mut copy = msg.clone();
    copy.set_field(session::SPORT, FieldValue::Enum(sport_values::RUNNING));
    copy.set_field(session::SUB_SPORT, FieldValue::Enum(sub_sport));
    copy.set_field(
        session::SPORT_PROFILE_NAME,
        FieldValue::String("Run".to_string()),
    );

    // Stored total distance stays; the device measured it.
    copy.set_field(
        session::TOTAL_DISTANCE,
        FieldValue::Float(summary.total_distance),
    );
    copy.set_field(
        session::TOTAL_ASCENT,
        FieldValue::UInt(summary.total_ascent as u64),
    );
    copy.set_field(
        session::TOTAL_DESCENT,
        FieldValue::UInt(summary.total_descent as u64),
    );
    copy.set_field(
        session::TOTAL_FRACTIONAL_ASCENT,
        FieldValue::Float(summary.fractional_ascent),
    );
    copy.set_field(
        session::TOTAL_FRACTIONAL_DESCENT,
        FieldValue::Float(summary.fractional_descent),
    );

    if let Some((lat, lon)) = summary.start_position {
        copy.set_field(session::START_POSITION_LAT, FieldValue::SInt(lat as i64));
        copy.set_field(session::START_POSITION_LONG, FieldValue::SInt(lon as i64));
    }
    if let Some((lat, lon)) = summary.end_position {
        copy.set_field(session::END_POSITION_LAT, FieldValue::SInt(lat as i64));
        copy.set_field(session::END_POSITION_LONG, FieldValue::SInt(lon as i64));
    }
    if let Some(bbox) = summary.bounding_box {
        copy.set_field(session::NEC_LAT, FieldValue::SInt(bbox.nec.0 as i64));
        copy.set_field(session::NEC_LONG, FieldValue::SInt(bbox.nec.1 as i64));
        copy.set_field(session::SWC_LAT, FieldValue::SInt(bbox.swc.0 as i64));
        copy.set_field(session::SWC_LONG, FieldValue::SInt(bbox.swc.1 as i64));
    }

    // Treadmill speed and altitude summaries no longer describe the data.
    copy.remove_field(session::AVG_SPEED);
    copy.remove_field(session::MAX_SPEED);
    copy.remove_field(session::MIN_ALTITUDE);
    copy.remove_field(session::MAX_ALTITUDE);
    copy.remove_field(session::ENHANCED_MIN_ALTITUDE);
    copy.remove_field(session::ENHANCED_MAX_ALTITUDE);
    copy
}

fn rewrite_lap(msg: &Message, track: &SyntheticTrack, grade: f64, sub_sport: u8) -> Message {
    let mut copy = msg.clone();
    copy.set_field(lap::SPORT, FieldValue::Enum(sport_values::RUNNING));
    copy.set_field(lap::SUB_SPORT, FieldValue::Enum(sub_sport));

    let summary = lap_summary(msg.field_f64(lap::TOTAL_DISTANCE), grade);
    copy.set_field(
        lap::TOTAL_ASCENT,
        FieldValue::UInt(summary.total_ascent as u64),
    );
    copy.set_field(
        lap::TOTAL_DESCENT,
        FieldValue::UInt(summary.total_descent as u64),
    );
    copy.set_field(
        lap::TOTAL_FRACTIONAL_ASCENT,
        FieldValue::Float(summary.fractional_ascent),
    );
    copy.set_field(
        lap::TOTAL_FRACTIONAL_DESCENT,
        FieldValue::Float(summary.fractional_descent),
    );

    if let Some(first) = track.first() {
        copy.set_field(
            lap::START_POSITION_LAT,
            FieldValue::SInt(first.latitude_semicircles as i64),
        );
        copy.set_field(
            lap::START_POSITION_LONG,
            FieldValue::SInt(first.longitude_semicircles as i64),
        );
    }
    if let Some(last) = track.last() {
        copy.set_field(
            lap::END_POSITION_LAT,
            FieldValue::SInt(last.latitude_semicircles as i64),
        );
        copy.set_field(
            lap::END_POSITION_LONG,
            FieldValue::SInt(last.longitude_semicircles as i64),
        );
    }
    if let Some((min, max)) = track.altitude_range() {
        copy.set_field(lap::ENHANCED_MIN_ALTITUDE, FieldValue::Float(min));
        copy.set_field(lap::ENHANCED_MAX_ALTITUDE, FieldValue::Float(max));
    }

    copy.remove_field(lap::AVG_SPEED);
    copy.remove_field(lap::MAX_SPEED);
    copy.remove_field(lap::MIN_ALTITUDE);
    copy.remove_field(lap::MAX_ALTITUDE);
    copy
}
