// Feature extraction module

pub mod segment;

use nalgebra::DVector;

pub use segment::{Roi, Segment, SegmentFeatureExtractor};

/// Snapshot of what a feature looked like when it was detected,
/// kept for later re-identification
#[derive(Debug, Clone, PartialEq)]
pub enum Appearance {
    Segment(Segment),
}

/// Measurement payload attached to an observation
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub measurement: DVector<f64>,
    pub match_score: f64,
    pub appearance: Option<Appearance>,
}

impl Feature {
    pub fn new(measurement: DVector<f64>, match_score: f64) -> Self {
        Feature {
            measurement,
            match_score,
            appearance: None,
        }
    }

    pub fn with_appearance(mut self, appearance: Appearance) -> Self {
        self.appearance = Some(appearance);
        self
    }
}
