//! End-to-end pipeline tests over synthetic message streams.

use chrono::{TimeZone, Utc};

use inclinefit::analysis::analyze;
use inclinefit::codec::{self, CodecCapabilities};
use inclinefit::messages::{
    fields, file_id, lap, record, session, sport, FieldValue, Message, MessageKind,
};
use inclinefit::rewrite::inject;
use inclinefit::synth::SynthesisParams;
use inclinefit::timeline::KnotPolicy;

fn ts(offset: i64) -> FieldValue {
    FieldValue::Timestamp(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(offset),
    )
}

/// A plausible treadmill session: file_id, sport, a workout, records with
/// distance and legacy altitude/speed, one lap, one session.
fn treadmill_session(records: usize, total_distance: f64) -> Vec<Message> {
    let mut msgs = vec![
        Message::new(MessageKind::FileId)
            .with_field(file_id::FILE_TYPE, FieldValue::Enum(4))
            .with_field(file_id::MANUFACTURER, FieldValue::UInt(1))
            .with_field(file_id::TIME_CREATED, ts(0)),
        Message::new(MessageKind::Sport)
            .with_field(sport::SPORT, FieldValue::Enum(1))
            .with_field(sport::SUB_SPORT, FieldValue::Enum(1)),
        Message::new(MessageKind::Workout),
    ];
    let last = (records - 1).max(1) as f64;
    for i in 0..records {
        msgs.push(
            Message::new(MessageKind::Record)
                .with_field(fields::TIMESTAMP, ts(i as i64))
                .with_field(
                    record::DISTANCE,
                    FieldValue::Float(i as f64 * total_distance / last),
                )
                .with_field(record::ALTITUDE, FieldValue::Float(400.0))
                .with_field(record::SPEED, FieldValue::Float(3.0))
                .with_field(record::ENHANCED_SPEED, FieldValue::Float(3.0))
                .with_field(record::HEART_RATE, FieldValue::UInt(150)),
        );
    }
    msgs.push(
        Message::new(MessageKind::Lap)
            .with_field(fields::TIMESTAMP, ts(records as i64))
            .with_field(lap::TOTAL_DISTANCE, FieldValue::Float(total_distance)),
    );
    msgs.push(
        Message::new(MessageKind::Session)
            .with_field(fields::TIMESTAMP, ts(records as i64))
            .with_field(session::SPORT, FieldValue::Enum(1))
            .with_field(session::SUB_SPORT, FieldValue::Enum(1))
            .with_field(session::TOTAL_DISTANCE, FieldValue::Float(total_distance)),
    );
    msgs
}

fn params() -> SynthesisParams {
    let mut p = SynthesisParams::new(47.3769, 8.5417);
    p.start_altitude = 408.0;
    p.noise_seed = Some(1);
    p
}

fn run_inject(stream: &[Message]) -> Vec<Message> {
    let (out, _) = inject(
        stream,
        &params(),
        KnotPolicy::default(),
        true,
        &CodecCapabilities::default(),
    );
    out
}

#[test]
fn inject_flips_gap_readiness() {
    let stream = treadmill_session(30, 150.0);
    assert!(!analyze(&stream).gap_ready);

    let out = run_inject(&stream);
    let report = analyze(&out);
    assert!(report.gap_ready);
    assert!(report.records.position.is_complete());
    assert!(report.records.enhanced_altitude.is_complete());
    assert!(report.records.enhanced_speed.is_complete());
    // Legacy narrow fields are gone.
    assert_eq!(report.records.altitude.present, 0);
    assert_eq!(report.records.speed.present, 0);
}

#[test]
fn inject_preserves_cardinality_except_workouts() {
    let stream = treadmill_session(30, 150.0);
    let out = run_inject(&stream);

    let workouts = stream
        .iter()
        .filter(|m| matches!(m.kind, MessageKind::Workout | MessageKind::WorkoutStep))
        .count();
    assert_eq!(out.len(), stream.len() - workouts);

    let records_in = stream.iter().filter(|m| m.kind == MessageKind::Record).count();
    let records_out = out.iter().filter(|m| m.kind == MessageKind::Record).count();
    assert_eq!(records_in, records_out);
}

#[test]
fn inject_preserves_distances() {
    let stream = treadmill_session(30, 150.0);
    let out = run_inject(&stream);

    let session_out = out.iter().find(|m| m.kind == MessageKind::Session).unwrap();
    let stored = session_out.field_f64(session::TOTAL_DISTANCE).unwrap();
    assert!((stored - 150.0).abs() <= 1e-3);

    let distances_in: Vec<f64> = stream
        .iter()
        .filter(|m| m.kind == MessageKind::Record)
        .filter_map(|m| m.field_f64(record::DISTANCE))
        .collect();
    let distances_out: Vec<f64> = out
        .iter()
        .filter(|m| m.kind == MessageKind::Record)
        .filter_map(|m| m.field_f64(record::DISTANCE))
        .collect();
    assert_eq!(distances_in, distances_out);
}

#[test]
fn inject_is_deterministic_with_seed() {
    let stream = treadmill_session(30, 150.0);
    assert_eq!(run_inject(&stream), run_inject(&stream));
}

#[test]
fn inject_is_stable_on_its_own_output() {
    let stream = treadmill_session(30, 150.0);
    let once = run_inject(&stream);
    let twice = run_inject(&once);

    let positions = |msgs: &[Message]| -> Vec<(Option<f64>, Option<f64>, Option<f64>)> {
        msgs.iter()
            .filter(|m| m.kind == MessageKind::Record)
            .map(|m| {
                (
                    m.field_f64(record::POSITION_LAT),
                    m.field_f64(record::POSITION_LONG),
                    m.field_f64(record::ENHANCED_ALTITUDE),
                )
            })
            .collect()
    };
    assert_eq!(positions(&once), positions(&twice));

    let ascent = |msgs: &[Message]| {
        msgs.iter()
            .find(|m| m.kind == MessageKind::Session)
            .and_then(|m| m.field_u64(session::TOTAL_ASCENT))
    };
    assert_eq!(ascent(&once), ascent(&twice));
}

#[test]
fn session_and_lap_summaries_are_consistent() {
    let stream = treadmill_session(30, 150.0);
    let out = run_inject(&stream);
    let report = analyze(&out);

    let session_presence = report.session.unwrap();
    assert!(session_presence.start_position);
    assert!(session_presence.end_position);
    assert!(session_presence.bounding_box);
    assert!(session_presence.fractional_ascent);
    // 150 m at the default 10% grade.
    assert_eq!(session_presence.total_ascent_meters, Some(15));
    assert_eq!(session_presence.total_descent_meters, Some(0));

    // The single lap covers the whole session, so the sums agree.
    assert_eq!(report.laps.sum_ascent, 15);
    assert!(report.laps.laps[0].missing_enhanced().len() < 6);
}

#[test]
fn encoded_output_is_structurally_valid() {
    let stream = treadmill_session(10, 50.0);
    let out = run_inject(&stream);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.fit");
    let outcome = codec::encode_file(&path, &out).unwrap();
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.written, out.len());

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes[0], 14);
    assert_eq!(&bytes[8..12], b".FIT");
    let data_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    assert_eq!(bytes.len(), 14 + data_size + 2);
    let file_crc = u16::from_le_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
    assert_eq!(file_crc, codec::crc16(&bytes[..bytes.len() - 2]));
}

#[test]
fn stream_without_distances_uses_session_total() {
    let mut stream = treadmill_session(20, 100.0);
    for msg in stream.iter_mut().filter(|m| m.kind == MessageKind::Record) {
        msg.remove_field(record::DISTANCE);
    }
    let out = run_inject(&stream);

    // Constant-pace fallback still produces a moving track.
    let first = out
        .iter()
        .find(|m| m.kind == MessageKind::Record)
        .unwrap()
        .field_f64(record::POSITION_LAT)
        .unwrap();
    let last = out
        .iter()
        .filter(|m| m.kind == MessageKind::Record)
        .last()
        .unwrap()
        .field_f64(record::POSITION_LAT)
        .unwrap();
    assert!(last > first);

    let report = analyze(&out);
    assert!(report.gap_ready);
}
