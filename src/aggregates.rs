//! Session and lap summary recomputation
//!
//! Once a synthetic track exists, the session and lap summaries stored in
//! the file no longer describe the data. These functions fold a track into
//! fresh immutable summaries; the rewriter decides which stored fields they
//! replace.

use crate::synth::SyntheticTrack;

/// Distances below this are treated as zero when deriving ratios.
const DISTANCE_EPSILON: f64 = 1e-6;

/// Northeast/southwest corners in semicircles, as (lat, long) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub nec: (i32, i32),
    pub swc: (i32, i32),
}

/// Recomputed session-level values.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// Stored total distance, carried through verbatim.
    pub total_distance: f64,
    /// Ascent in whole meters.
    pub total_ascent: u32,
    /// Always 0: the synthesized course only climbs.
    pub total_descent: u32,
    /// Ascent per meter of distance, in percent terms (ascent / distance).
    pub fractional_ascent: f64,
    pub fractional_descent: f64,
    pub start_position: Option<(i32, i32)>,
    pub end_position: Option<(i32, i32)>,
    pub bounding_box: Option<BoundingBox>,
}

/// Recomputed lap-level values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapSummary {
    pub total_ascent: u32,
    pub total_descent: u32,
    pub fractional_ascent: f64,
    pub fractional_descent: f64,
}

/// Fold a synthetic track into a session summary.
///
/// `total_distance` is the stored session distance, preserved verbatim so
/// the device-reported total never drifts through the rewrite.
pub fn session_summary(
    track: &SyntheticTrack,
    total_distance: f64,
    bearing_degrees: f64,
) -> SessionSummary {
    let total_distance = total_distance.max(0.0);

    let total_ascent = track
        .altitude_range()
        .map(|(min, max)| (max - min).max(0.0).round() as u32)
        .unwrap_or(0);

    let fractional_ascent = if total_distance > DISTANCE_EPSILON {
        total_ascent as f64 / total_distance
    } else {
        0.0
    };

    let start_position = track
        .first()
        .map(|p| (p.latitude_semicircles, p.longitude_semicircles));
    let end_position = track
        .last()
        .map(|p| (p.latitude_semicircles, p.longitude_semicircles));

    let bounding_box = match (start_position, end_position) {
        (Some(first), Some(last)) => Some(bounding_box(first, last, bearing_degrees)),
        _ => None,
    };

    SessionSummary {
        total_distance,
        total_ascent,
        total_descent: 0,
        fractional_ascent,
        fractional_descent: 0.0,
        start_position,
        end_position,
        bounding_box,
    }
}

/// Fold a lap's stored distance into lap-level ascent values under a
/// constant grade.
pub fn lap_summary(lap_distance: Option<f64>, grade: f64) -> LapSummary {
    match lap_distance {
        Some(dist) if dist > DISTANCE_EPSILON => {
            let total_ascent = (dist * grade).round() as u32;
            LapSummary {
                total_ascent,
                total_descent: 0,
                fractional_ascent: total_ascent as f64 / dist,
                fractional_descent: 0.0,
            }
        }
        _ => LapSummary {
            total_ascent: 0,
            total_descent: 0,
            fractional_ascent: 0.0,
            fractional_descent: 0.0,
        },
    }
}

// A straight course visits exactly two corners; which endpoint is the
// southwest corner depends on the bearing quadrant.
fn bounding_box(first: (i32, i32), last: (i32, i32), bearing: f64) -> BoundingBox {
    let sw_lat = if bearing > 90.0 && bearing < 270.0 {
        last.0
    } else {
        first.0
    };
    let sw_lon = if bearing > 180.0 && bearing < 360.0 {
        last.1
    } else {
        first.1
    };
    let ne_lat = if bearing <= 90.0 || bearing >= 270.0 {
        last.0
    } else {
        first.0
    };
    let ne_lon = if (0.0..=180.0).contains(&bearing) {
        last.1
    } else {
        first.1
    };
    BoundingBox {
        nec: (ne_lat, ne_lon),
        swc: (sw_lat, sw_lon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{synthesize, SynthesisParams};
    use crate::timeline::{Sample, TimelineBuilder};

    fn track_with(bearing: f64, total: f64) -> SyntheticTrack {
        let samples: Vec<Sample> = (0..=10)
            .map(|i| Sample {
                timestamp: i,
                distance: Some(i as f64 * total / 10.0),
            })
            .collect();
        let tl = TimelineBuilder::new().build(&samples);
        let mut params = SynthesisParams::new(47.0, 8.0);
        params.bearing_degrees = bearing;
        synthesize(&tl, &samples, &params)
    }

    #[test]
    fn test_ascent_from_altitude_range() {
        // 500 m at 10% grade climbs 50 m.
        let track = track_with(0.0, 500.0);
        let summary = session_summary(&track, 500.0, 0.0);
        assert_eq!(summary.total_ascent, 50);
        assert_eq!(summary.total_descent, 0);
        assert!((summary.fractional_ascent - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_total_distance_preserved_verbatim() {
        let track = track_with(0.0, 500.0);
        let summary = session_summary(&track, 512.75, 0.0);
        assert_eq!(summary.total_distance, 512.75);
    }

    #[test]
    fn test_bounding_box_north() {
        // Heading north the start is the southwest corner.
        let track = track_with(0.0, 500.0);
        let summary = session_summary(&track, 500.0, 0.0);
        let bbox = summary.bounding_box.unwrap();
        let first = track.first().unwrap();
        let last = track.last().unwrap();
        assert_eq!(
            bbox.swc,
            (first.latitude_semicircles, first.longitude_semicircles)
        );
        assert_eq!(
            bbox.nec,
            (last.latitude_semicircles, last.longitude_semicircles)
        );
        assert!(bbox.nec.0 > bbox.swc.0);
    }

    #[test]
    fn test_bounding_box_southwest() {
        // Heading southwest the end is the southwest corner.
        let track = track_with(225.0, 500.0);
        let summary = session_summary(&track, 500.0, 225.0);
        let bbox = summary.bounding_box.unwrap();
        let first = track.first().unwrap();
        let last = track.last().unwrap();
        assert_eq!(
            bbox.swc,
            (last.latitude_semicircles, last.longitude_semicircles)
        );
        assert_eq!(
            bbox.nec,
            (first.latitude_semicircles, first.longitude_semicircles)
        );
    }

    #[test]
    fn test_zero_distance_session_has_zero_ratios() {
        let track = track_with(0.0, 0.0);
        let summary = session_summary(&track, 0.0, 0.0);
        assert_eq!(summary.total_ascent, 0);
        assert_eq!(summary.fractional_ascent, 0.0);
    }

    #[test]
    fn test_negative_distance_clamped() {
        let track = track_with(0.0, 100.0);
        let summary = session_summary(&track, -5.0, 0.0);
        assert_eq!(summary.total_distance, 0.0);
        assert_eq!(summary.fractional_ascent, 0.0);
    }

    #[test]
    fn test_empty_track_summary() {
        let tl = TimelineBuilder::new().build(&[]);
        let track = synthesize(&tl, &[], &SynthesisParams::new(47.0, 8.0));
        let summary = session_summary(&track, 100.0, 0.0);
        assert_eq!(summary.total_ascent, 0);
        assert_eq!(summary.start_position, None);
        assert_eq!(summary.bounding_box, None);
    }

    #[test]
    fn test_lap_summary_from_distance() {
        // 400 m at 10% grade is 40 m of ascent.
        let lap = lap_summary(Some(400.0), 0.10);
        assert_eq!(lap.total_ascent, 40);
        assert_eq!(lap.total_descent, 0);
        assert!((lap.fractional_ascent - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_lap_summary_without_distance() {
        let lap = lap_summary(None, 0.10);
        assert_eq!(lap.total_ascent, 0);
        assert_eq!(lap.fractional_ascent, 0.0);
        let zero = lap_summary(Some(0.0), 0.10);
        assert_eq!(zero.total_ascent, 0);
    }
}
