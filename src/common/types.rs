//! Common types used throughout rtslam

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entity held by a map, one id pool per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Robot,
    Sensor,
    Landmark,
    Observation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Robot => "robot",
            EntityKind::Sensor => "sensor",
            EntityKind::Landmark => "landmark",
            EntityKind::Observation => "observation",
        };
        f.write_str(name)
    }
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl $name {
            pub const KIND: EntityKind = $kind;

            pub fn index(self) -> usize {
                self.0
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> usize {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a robot, unique among the live robots of one map
    RobotId,
    EntityKind::Robot
);
entity_id!(
    /// Identifier of a sensor, unique among the live sensors of one map
    SensorId,
    EntityKind::Sensor
);
entity_id!(
    /// Identifier of a landmark, unique among the live landmarks of one map
    LandmarkId,
    EntityKind::Landmark
);
entity_id!(
    /// Identifier of an observation. Observation ids are drawn from a single
    /// pool per map, not per sensor/landmark pair.
    ObservationId,
    EntityKind::Observation
);

/// 2D point in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn squared_distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        self.squared_distance(other).sqrt()
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}
