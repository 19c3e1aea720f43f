//! Map entities: robots, sensors, landmarks and the observations linking them
//!
//! Entities never own each other. Each one stores the ids of its
//! counterparts and the map owns every entity by id, so a link is only
//! followed through the map that holds both ends.

use itertools::Itertools;
use nalgebra::DMatrix;
use std::collections::BTreeSet;
use std::fmt;

use crate::common::{LandmarkId, ObservationId, RobotId, SensorId};
use crate::features::Feature;
use crate::map::state_arena::Slot;

/// Mobile platform carrying sensors
#[derive(Debug, Clone)]
pub struct Robot {
    pub(crate) id: RobotId,
    pub(crate) name: String,
    pub(crate) slot: Slot,
    /// Jacobian of the pending motion step with respect to the robot state
    pub(crate) dx_by_dstate: DMatrix<f64>,
    /// Process noise of the pending motion step
    pub(crate) q: DMatrix<f64>,
    pub(crate) sensors: BTreeSet<SensorId>,
}

impl Robot {
    pub(crate) fn new(id: RobotId, name: String, slot: Slot) -> Self {
        let n = slot.len();
        Robot {
            id,
            name,
            slot,
            dx_by_dstate: DMatrix::identity(n, n),
            q: DMatrix::zeros(n, n),
            sensors: BTreeSet::new(),
        }
    }

    /// Forget the pending motion step: J = I, Q = 0
    pub(crate) fn reset_motion(&mut self) {
        let n = self.slot.len();
        self.dx_by_dstate = DMatrix::identity(n, n);
        self.q = DMatrix::zeros(n, n);
    }

    pub fn id(&self) -> RobotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn size(&self) -> usize {
        self.slot.len()
    }

    pub fn sensors(&self) -> impl Iterator<Item = SensorId> + '_ {
        self.sensors.iter().copied()
    }

    pub fn dx_by_dstate(&self) -> &DMatrix<f64> {
        &self.dx_by_dstate
    }

    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.q
    }
}

/// Measurement device mounted on a robot
#[derive(Debug, Clone)]
pub struct Sensor {
    pub(crate) id: SensorId,
    pub(crate) name: String,
    pub(crate) robot: RobotId,
    /// Present iff the sensor pose is estimated in the map
    pub(crate) slot: Option<Slot>,
    pub(crate) observations: BTreeSet<ObservationId>,
}

impl Sensor {
    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn robot(&self) -> RobotId {
        self.robot
    }

    pub fn slot(&self) -> Option<Slot> {
        self.slot
    }

    pub fn is_state_estimated(&self) -> bool {
        self.slot.is_some()
    }

    pub fn observations(&self) -> impl Iterator<Item = ObservationId> + '_ {
        self.observations.iter().copied()
    }
}

/// Persistent map feature
#[derive(Debug, Clone)]
pub struct Landmark {
    pub(crate) id: LandmarkId,
    pub(crate) name: String,
    pub(crate) slot: Slot,
    pub(crate) observations: BTreeSet<ObservationId>,
}

impl Landmark {
    pub fn id(&self) -> LandmarkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn observations(&self) -> impl Iterator<Item = ObservationId> + '_ {
        self.observations.iter().copied()
    }
}

/// Relation between exactly one sensor and exactly one landmark
#[derive(Debug, Clone)]
pub struct Observation {
    pub(crate) id: ObservationId,
    pub(crate) sensor: SensorId,
    pub(crate) landmark: LandmarkId,
    pub(crate) feature: Option<Feature>,
}

impl Observation {
    pub fn id(&self) -> ObservationId {
        self.id
    }

    pub fn sensor(&self) -> SensorId {
        self.sensor
    }

    pub fn landmark(&self) -> LandmarkId {
        self.landmark
    }

    /// Measured feature, if one has been attached
    pub fn feature(&self) -> Option<&Feature> {
        self.feature.as_ref()
    }

    pub fn match_score(&self) -> Option<f64> {
        self.feature.as_ref().map(|f| f.match_score)
    }
}

fn fmt_slot(f: &mut fmt::Formatter<'_>, slot: Option<Slot>) -> fmt::Result {
    match slot {
        Some(s) if !s.is_empty() => write!(f, "states [{}, {})", s.start(), s.end()),
        _ => write!(f, "not in map"),
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Robot {} \"{}\": ", self.id, self.name)?;
        fmt_slot(f, Some(self.slot))?;
        write!(f, ", sensors [{}]", self.sensors.iter().join(", "))
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  Sensor {} \"{}\" on robot {}: ", self.id, self.name, self.robot)?;
        fmt_slot(f, self.slot)
    }
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landmark {} \"{}\": ", self.id, self.name)?;
        fmt_slot(f, Some(self.slot))?;
        write!(f, ", observations [{}]", self.observations.iter().join(", "))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  Observation {}: sensor {} -> landmark {}",
            self.id, self.sensor, self.landmark
        )?;
        if let Some(feature) = &self.feature {
            write!(f, ", score {}", feature.match_score)?;
        }
        Ok(())
    }
}
