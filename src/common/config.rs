//! Map configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::common::error::{SlamError, SlamResult};

/// Anchored homogeneous point: anchor (3) + direction (3) + inverse distance (1)
pub const AHP_LANDMARK_SIZE: usize = 7;

/// Sensor extrinsic pose: position (3) + quaternion (4)
pub const SENSOR_POSE_SIZE: usize = 7;

/// Whether creating a sensor retroactively observes the existing landmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFanOut {
    /// One observation per existing landmark is created with the sensor
    Symmetric,
    /// Only landmark creation fans out
    None,
}

impl Default for SensorFanOut {
    fn default() -> Self {
        SensorFanOut::Symmetric
    }
}

/// Configuration for a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Capacity of the state vector
    pub max_size: usize,
    /// Slot size of a sensor whose pose is estimated
    pub sensor_pose_size: usize,
    /// Slot size of every landmark
    pub landmark_size: usize,
    /// Observation fan-out policy on sensor creation
    pub sensor_fan_out: SensorFanOut,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_size: 300,
            sensor_pose_size: SENSOR_POSE_SIZE,
            landmark_size: AHP_LANDMARK_SIZE,
            sensor_fan_out: SensorFanOut::default(),
        }
    }
}

impl MapConfig {
    /// Default configuration with a given capacity
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    pub fn from_json_str(s: &str) -> SlamResult<Self> {
        let config: MapConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> SlamResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check that every entity slot fits in the state vector
    pub fn validate(&self) -> SlamResult<()> {
        if self.max_size == 0 {
            return Err(SlamError::InvalidConfig("max_size must be positive".to_string()));
        }
        if self.landmark_size > self.max_size {
            return Err(SlamError::InvalidConfig(format!(
                "landmark_size {} exceeds max_size {}",
                self.landmark_size, self.max_size
            )));
        }
        if self.sensor_pose_size > self.max_size {
            return Err(SlamError::InvalidConfig(format!(
                "sensor_pose_size {} exceeds max_size {}",
                self.sensor_pose_size, self.max_size
            )));
        }
        Ok(())
    }
}
