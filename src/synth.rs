//! Synthetic track generation
//!
//! Projects a session's distance timeline onto a straight flat-earth course:
//! a start coordinate, a constant bearing, a constant grade, and optional
//! seeded altitude noise. Longitude scaling collapses near the poles; the
//! projection guards against that and holds longitude fixed there.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::messages::{degrees_to_semicircles, METERS_PER_DEGREE_LAT};
use crate::timeline::{DistanceTimeline, Sample};

/// Course parameters for track synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisParams {
    /// Start latitude in degrees.
    pub start_latitude: f64,
    /// Start longitude in degrees.
    pub start_longitude: f64,
    /// Start altitude in meters.
    pub start_altitude: f64,
    /// Course bearing in degrees, 0 = north, clockwise.
    pub bearing_degrees: f64,
    /// Constant grade as a ratio (0.10 = 10%).
    pub grade: f64,
    /// Peak-to-peak altitude noise amplitude in meters; 0 disables noise.
    pub noise_amplitude: f64,
    /// Noise seed; None draws from entropy.
    pub noise_seed: Option<u64>,
}

impl SynthesisParams {
    pub fn new(start_latitude: f64, start_longitude: f64) -> Self {
        Self {
            start_latitude,
            start_longitude,
            start_altitude: 0.0,
            bearing_degrees: 0.0,
            grade: 0.10,
            noise_amplitude: 0.0,
            noise_seed: None,
        }
    }
}

/// One synthesized point, aligned with one input sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub timestamp: i64,
    pub latitude_semicircles: i32,
    pub longitude_semicircles: i32,
    /// Altitude in meters, noise included.
    pub altitude: f64,
    /// Cumulative distance in meters at this point.
    pub distance: f64,
}

/// The synthesized track plus its altitude envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTrack {
    pub points: Vec<TrackPoint>,
    min_altitude: f64,
    max_altitude: f64,
}

impl SyntheticTrack {
    /// (min, max) altitude over the track; None when empty.
    pub fn altitude_range(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            None
        } else {
            Some((self.min_altitude, self.max_altitude))
        }
    }

    pub fn first(&self) -> Option<&TrackPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Synthesize one track point per sample.
///
/// Distances are relative to the first sample's interpolated distance, so a
/// session whose distance field does not start at zero still begins its
/// track at the start coordinate.
pub fn synthesize(
    timeline: &DistanceTimeline,
    samples: &[Sample],
    params: &SynthesisParams,
) -> SyntheticTrack {
    let mut rng = match params.noise_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let (sin_b, cos_b) = params.bearing_degrees.to_radians().sin_cos();
    // Longitude scale is fixed at the start latitude for the whole course;
    // a session-length straight line does not move far enough for the
    // per-point cos(lat) correction to matter.
    let meters_per_deg_lon = METERS_PER_DEGREE_LAT * params.start_latitude.to_radians().cos();

    let base_distance = samples
        .first()
        .map(|s| timeline.distance_at(s.timestamp))
        .unwrap_or(0.0);

    let mut points = Vec::with_capacity(samples.len());
    let mut min_altitude = f64::INFINITY;
    let mut max_altitude = f64::NEG_INFINITY;

    for sample in samples {
        let traveled = timeline.distance_at(sample.timestamp) - base_distance;

        let latitude = params.start_latitude + traveled * cos_b / METERS_PER_DEGREE_LAT;
        let longitude = if meters_per_deg_lon.abs() > f64::EPSILON {
            params.start_longitude + traveled * sin_b / meters_per_deg_lon
        } else {
            params.start_longitude
        };

        let mut altitude = params.start_altitude + traveled * params.grade;
        if params.noise_amplitude > 0.0 {
            altitude += (rng.gen::<f64>() - 0.5) * params.noise_amplitude;
        }

        min_altitude = min_altitude.min(altitude);
        max_altitude = max_altitude.max(altitude);

        points.push(TrackPoint {
            timestamp: sample.timestamp,
            latitude_semicircles: degrees_to_semicircles(latitude),
            longitude_semicircles: degrees_to_semicircles(longitude),
            altitude,
            distance: traveled,
        });
    }

    SyntheticTrack {
        points,
        min_altitude,
        max_altitude,
    }
}
