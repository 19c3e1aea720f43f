//! Line segment feature selection
//!
//! The detector itself is external ([`SegmentDetector`]). This module only
//! decides which of the detected candidates becomes the measurement of a new
//! observation: the longest one, ties going to the first candidate reported.
//!
//! The region of interest is forwarded to the detector, but candidates are not
//! checked against it here. A candidate lying completely outside the region can
//! therefore still be selected.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::common::{Point2D, SegmentDetector};
use crate::features::{Appearance, Feature};

/// Match score given to every freshly extracted segment
pub const SEGMENT_MATCH_SCORE: f64 = 1.0;

/// Image line segment given by its two endpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Segment {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Segment { x1, y1, x2, y2 }
    }

    pub fn start(&self) -> Point2D {
        Point2D::new(self.x1, self.y1)
    }

    pub fn end(&self) -> Point2D {
        Point2D::new(self.x2, self.y2)
    }

    pub fn squared_length(&self) -> f64 {
        self.start().squared_distance(&self.end())
    }

    pub fn length(&self) -> f64 {
        self.squared_length().sqrt()
    }

    /// (x1, y1, x2, y2)
    pub fn to_measurement(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.x1, self.y1, self.x2, self.y2])
    }
}

/// Axis-aligned rectangular region of interest in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Roi {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Roi { x, y, width, height }
    }

    pub fn contains(&self, p: &Point2D) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }
}

/// Index and reference of the longest segment, first one on ties
pub fn select_longest(candidates: &[Segment]) -> Option<(usize, &Segment)> {
    let mut best: Option<(usize, &Segment)> = None;
    let mut best_sqr_length = -1.0;
    for (i, seg) in candidates.iter().enumerate() {
        let sqr_length = seg.squared_length();
        if sqr_length > best_sqr_length {
            best = Some((i, seg));
            best_sqr_length = sqr_length;
        }
    }
    best
}

/// Turns the output of a segment detector into at most one feature
#[derive(Debug, Clone)]
pub struct SegmentFeatureExtractor<D> {
    detector: D,
}

impl<D: SegmentDetector> SegmentFeatureExtractor<D> {
    pub fn new(detector: D) -> Self {
        SegmentFeatureExtractor { detector }
    }

    /// Detect in `image` and keep the longest candidate.
    /// Returns `None` when the detector reports nothing.
    pub fn extract(&self, image: &D::Image, roi: &Roi) -> Option<Feature> {
        let candidates = self.detector.detect_segments(image, roi);
        let (index, best) = select_longest(&candidates)?;
        tracing::debug!(
            index,
            candidates = candidates.len(),
            length = best.length(),
            "selected segment"
        );
        Some(
            Feature::new(best.to_measurement(), SEGMENT_MATCH_SCORE)
                .with_appearance(Appearance::Segment(*best)),
        )
    }
}
