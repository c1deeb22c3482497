//! Distance timeline construction
//!
//! Builds a total timestamp → distance function from sparse per-sample
//! distance values. Samples carrying a distance become knots; every other
//! sample timestamp is filled by interpolation between knots, extrapolation
//! past the knot span, or a constant-pace fallback driven by the externally
//! reported session total distance.

use serde::{Deserialize, Serialize};

use crate::messages::{record, Message, MessageKind};

/// How duplicate knot timestamps are resolved.
///
/// Noisy sources can emit two distance values for one second of the logical
/// clock; which one wins is a policy decision, not a correctness question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnotPolicy {
    /// Keep the value at first occurrence.
    #[default]
    FirstSeen,
    /// Keep the value at last occurrence.
    LastSeen,
    /// Average all values seen for the timestamp.
    Mean,
}

/// A known (timestamp, distance) anchor point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knot {
    /// Seconds on the session's logical clock.
    pub timestamp: i64,
    /// Cumulative distance in meters.
    pub distance: f64,
}

/// Per-record view the timeline consumes: a timestamp plus an optional
/// cumulative distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub distance: Option<f64>,
}

impl Sample {
    /// Extract the sample view from a RECORD message. Messages without a
    /// timestamp yield no sample.
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.kind != MessageKind::Record {
            return None;
        }
        let timestamp = msg.timestamp()?.timestamp();
        Some(Self {
            timestamp,
            distance: msg.field_f64(record::DISTANCE),
        })
    }
}

/// Configuration for timeline construction.
#[derive(Debug, Clone, Default)]
pub struct TimelineBuilder {
    policy: KnotPolicy,
    session_total_distance: Option<f64>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knot_policy(mut self, policy: KnotPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Externally reported total session distance. Supersedes the maximum
    /// knot distance when larger, but never rewrites known knots.
    pub fn session_total_distance(mut self, meters: Option<f64>) -> Self {
        self.session_total_distance = meters.filter(|d| *d > 0.0);
        self
    }

    /// Build the timeline. Samples must already be in timestamp order, as
    /// decoded from the file. An empty sample set yields an empty timeline.
    pub fn build(&self, samples: &[Sample]) -> DistanceTimeline {
        let mut knots: Vec<Knot> = Vec::new();
        let mut dup_counts: Vec<u32> = Vec::new();

        for sample in samples {
            let Some(distance) = sample.distance else {
                continue;
            };
            match knots.binary_search_by_key(&sample.timestamp, |k| k.timestamp) {
                Ok(idx) => match self.policy {
                    KnotPolicy::FirstSeen => {}
                    KnotPolicy::LastSeen => {
                        knots[idx].distance = distance;
                    }
                    KnotPolicy::Mean => {
                        let n = dup_counts[idx] as f64;
                        knots[idx].distance = (knots[idx].distance * n + distance) / (n + 1.0);
                        dup_counts[idx] += 1;
                    }
                },
                Err(idx) => {
                    knots.insert(
                        idx,
                        Knot {
                            timestamp: sample.timestamp,
                            distance,
                        },
                    );
                    dup_counts.insert(idx, 1);
                }
            }
        }

        let max_knot_distance = knots.iter().fold(0.0_f64, |acc, k| acc.max(k.distance));
        let max_known_distance = match self.session_total_distance {
            Some(total) if total > max_knot_distance => total,
            _ => max_knot_distance,
        };

        DistanceTimeline {
            knots,
            first_sample_ts: samples.first().map(|s| s.timestamp),
            last_sample_ts: samples.last().map(|s| s.timestamp),
            max_known_distance,
        }
    }
}

/// A total timestamp → distance function over one session.
#[derive(Debug, Clone)]
pub struct DistanceTimeline {
    knots: Vec<Knot>,
    first_sample_ts: Option<i64>,
    last_sample_ts: Option<i64>,
    max_known_distance: f64,
}

impl DistanceTimeline {
    /// True when no samples were seen. Downstream stages produce no output
    /// for an empty timeline; this is not an error condition.
    pub fn is_empty(&self) -> bool {
        self.first_sample_ts.is_none()
    }

    pub fn knots(&self) -> &[Knot] {
        &self.knots
    }

    /// Largest distance the timeline knows about, either from a knot or the
    /// externally reported session total.
    pub fn max_known_distance(&self) -> f64 {
        self.max_known_distance
    }

    /// Whether knot distances are non-decreasing in timestamp order.
    ///
    /// The interpolated function is deliberately not clamped; callers that
    /// care about regressions can check this and warn.
    pub fn is_monotonic(&self) -> bool {
        self.knots.windows(2).all(|w| w[0].distance <= w[1].distance)
    }

    /// Distance at a sample timestamp.
    ///
    /// Defined for every timestamp once any sample was seen; an empty
    /// timeline reports 0.
    pub fn distance_at(&self, timestamp: i64) -> f64 {
        let Some(first_ts) = self.first_sample_ts else {
            return 0.0;
        };

        if self.knots.is_empty() {
            return self.constant_pace(timestamp, first_ts);
        }

        match self
            .knots
            .binary_search_by_key(&timestamp, |k| k.timestamp)
        {
            // Exactly on a knot: its value, no drift.
            Ok(idx) => self.knots[idx].distance,
            Err(0) => self.before_first(timestamp, first_ts),
            Err(idx) if idx == self.knots.len() => self.after_last(timestamp, first_ts),
            Err(idx) => self.between(timestamp, &self.knots[idx - 1], &self.knots[idx]),
        }
    }

    /// Distances for a run of samples, in order.
    pub fn distances_for(&self, samples: &[Sample]) -> Vec<f64> {
        samples
            .iter()
            .map(|s| self.distance_at(s.timestamp))
            .collect()
    }

    // No knots at all: spread the known total distance at constant pace
    // over the full sample span.
    fn constant_pace(&self, timestamp: i64, first_ts: i64) -> f64 {
        if self.max_known_distance <= 0.0 {
            return 0.0;
        }
        let Some(last_ts) = self.last_sample_ts else {
            return 0.0;
        };
        let span = last_ts - first_ts;
        if span <= 0 {
            return 0.0;
        }
        self.max_known_distance * (timestamp - first_ts) as f64 / span as f64
    }

    // Before the first knot: line from (first sample, 0) through the knot.
    fn before_first(&self, timestamp: i64, first_ts: i64) -> f64 {
        let first = self.knots[0];
        let span = first.timestamp - first_ts;
        if span <= 0 {
            return 0.0;
        }
        first.distance * (timestamp - first_ts) as f64 / span as f64
    }

    // After the last knot: continue the pace of the final knot pair, or,
    // with a single knot, head toward the maximum known distance over the
    // full session span.
    fn after_last(&self, timestamp: i64, first_ts: i64) -> f64 {
        let last = self.knots[self.knots.len() - 1];
        if self.knots.len() >= 2 {
            let prev = self.knots[self.knots.len() - 2];
            let dt = last.timestamp - prev.timestamp;
            if dt <= 0 {
                return last.distance;
            }
            let pace = (last.distance - prev.distance) / dt as f64;
            last.distance + pace * (timestamp - last.timestamp) as f64
        } else {
            let Some(last_ts) = self.last_sample_ts else {
                return last.distance;
            };
            let span = last_ts - first_ts;
            if span <= 0 {
                return self.max_known_distance;
            }
            self.max_known_distance * (timestamp - first_ts) as f64 / span as f64
        }
    }

    fn between(&self, timestamp: i64, before: &Knot, after: &Knot) -> f64 {
        let dt = after.timestamp - before.timestamp;
        if dt <= 0 {
            // Equal bracketing timestamps: take the earlier knot's value.
            return before.distance;
        }
        let ratio = (timestamp - before.timestamp) as f64 / dt as f64;
        before.distance + ratio * (after.distance - before.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(t: i64, d: Option<f64>) -> Sample {
        Sample {
            timestamp: t,
            distance: d,
        }
    }

    #[test]
    fn test_between_two_knots() {
        // Knots {(0,0), (10,100)}, query t=5 -> 50.
        let samples = vec![
            sample(0, Some(0.0)),
            sample(5, None),
            sample(10, Some(100.0)),
        ];
        let tl = TimelineBuilder::new().build(&samples);
        assert_eq!(tl.distance_at(5), 50.0);
    }

    #[test]
    fn test_boundary_exactness() {
        let samples = vec![
            sample(0, Some(0.0)),
            sample(10, Some(100.0)),
            sample(20, Some(137.5)),
        ];
        let tl = TimelineBuilder::new().build(&samples);
        assert_eq!(tl.distance_at(0), 0.0);
        assert_eq!(tl.distance_at(10), 100.0);
        assert_eq!(tl.distance_at(20), 137.5);
    }

    #[test]
    fn test_single_knot_extrapolates_toward_session_total() {
        // Single knot (0,0), session total 200, last sample t=20:
        // t=10 interpolates to 100.
        let samples = vec![sample(0, Some(0.0)), sample(10, None), sample(20, None)];
        let tl = TimelineBuilder::new()
            .session_total_distance(Some(200.0))
            .build(&samples);
        assert_eq!(tl.distance_at(10), 100.0);
    }

    #[test]
    fn test_extrapolation_uses_last_pair_pace() {
        let samples = vec![
            sample(0, Some(0.0)),
            sample(10, Some(50.0)),
            sample(20, None),
        ];
        let tl = TimelineBuilder::new().build(&samples);
        // Pace of final pair is 5 m/s.
        assert_eq!(tl.distance_at(20), 100.0);
    }

    #[test]
    fn test_before_first_knot_from_time_zero() {
        let samples = vec![
            sample(0, None),
            sample(5, None),
            sample(10, Some(100.0)),
        ];
        let tl = TimelineBuilder::new().build(&samples);
        assert_eq!(tl.distance_at(5), 50.0);
        assert_eq!(tl.distance_at(0), 0.0);
    }

    #[test]
    fn test_first_knot_at_first_sample_gives_zero_before() {
        let samples = vec![sample(10, Some(40.0)), sample(12, None)];
        let tl = TimelineBuilder::new().build(&samples);
        // Degenerate span before the first knot.
        assert_eq!(tl.distance_at(9), 0.0);
    }

    #[test]
    fn test_no_knots_constant_pace_fallback() {
        let samples = vec![sample(0, None), sample(10, None), sample(20, None)];
        let tl = TimelineBuilder::new()
            .session_total_distance(Some(300.0))
            .build(&samples);
        assert_eq!(tl.distance_at(0), 0.0);
        assert_eq!(tl.distance_at(10), 150.0);
        assert_eq!(tl.distance_at(20), 300.0);
    }

    #[test]
    fn test_no_knots_zero_duration_collapses_to_zero() {
        let samples = vec![sample(5, None)];
        let tl = TimelineBuilder::new()
            .session_total_distance(Some(100.0))
            .build(&samples);
        assert_eq!(tl.distance_at(5), 0.0);
    }

    #[test]
    fn test_no_knots_no_total_degrades_to_zero() {
        let samples = vec![sample(0, None), sample(10, None)];
        let tl = TimelineBuilder::new().build(&samples);
        assert_eq!(tl.distance_at(10), 0.0);
        assert!(!tl.is_empty());
    }

    #[test]
    fn test_empty_samples_yield_empty_timeline() {
        let tl = TimelineBuilder::new().build(&[]);
        assert!(tl.is_empty());
        assert_eq!(tl.distance_at(0), 0.0);
    }

    #[test]
    fn test_duplicate_timestamp_first_seen_default() {
        let samples = vec![sample(10, Some(40.0)), sample(10, Some(60.0))];
        let tl = TimelineBuilder::new().build(&samples);
        assert_eq!(tl.distance_at(10), 40.0);
    }

    #[test]
    fn test_duplicate_timestamp_last_seen() {
        let samples = vec![sample(10, Some(40.0)), sample(10, Some(60.0))];
        let tl = TimelineBuilder::new()
            .knot_policy(KnotPolicy::LastSeen)
            .build(&samples);
        assert_eq!(tl.distance_at(10), 60.0);
    }

    #[test]
    fn test_duplicate_timestamp_mean() {
        let samples = vec![
            sample(10, Some(40.0)),
            sample(10, Some(60.0)),
            sample(10, Some(80.0)),
        ];
        let tl = TimelineBuilder::new()
            .knot_policy(KnotPolicy::Mean)
            .build(&samples);
        assert_eq!(tl.distance_at(10), 60.0);
    }

    #[test]
    fn test_session_total_supersedes_max_knot_but_not_knots() {
        let samples = vec![sample(0, Some(0.0)), sample(10, Some(80.0))];
        let tl = TimelineBuilder::new()
            .session_total_distance(Some(500.0))
            .build(&samples);
        assert_eq!(tl.max_known_distance(), 500.0);
        // Known knot values stay untouched.
        assert_eq!(tl.distance_at(10), 80.0);
    }

    #[test]
    fn test_is_monotonic_detects_regression() {
        let good = TimelineBuilder::new()
            .build(&[sample(0, Some(0.0)), sample(10, Some(5.0))]);
        assert!(good.is_monotonic());

        let noisy = TimelineBuilder::new()
            .build(&[sample(0, Some(10.0)), sample(10, Some(5.0))]);
        assert!(!noisy.is_monotonic());
    }

    proptest! {
        // Interpolated distance between two distinct knots stays within
        // the bracketing knot distances.
        #[test]
        fn prop_interpolation_bounded_by_knots(
            d1 in 0.0_f64..10_000.0,
            d2 in 0.0_f64..10_000.0,
            t_mid in 1_i64..99,
        ) {
            let samples = vec![sample(0, Some(d1)), sample(100, Some(d2))];
            let tl = TimelineBuilder::new().build(&samples);
            let d = tl.distance_at(t_mid);
            let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
            prop_assert!(d >= lo - 1e-9 && d <= hi + 1e-9);
        }

        // Querying exactly at a knot returns exactly that knot's value.
        #[test]
        fn prop_knot_exactness(
            knots in proptest::collection::vec((0_i64..10_000, 0.0_f64..50_000.0), 1..20)
        ) {
            let mut ordered = knots.clone();
            ordered.sort_by_key(|(t, _)| *t);
            ordered.dedup_by_key(|(t, _)| *t);
            let samples: Vec<Sample> =
                ordered.iter().map(|(t, d)| sample(*t, Some(*d))).collect();
            let tl = TimelineBuilder::new().build(&samples);
            for (t, d) in &ordered {
                prop_assert_eq!(tl.distance_at(*t), *d);
            }
        }
    }
}
