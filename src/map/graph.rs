//! The SLAM map: state arena, id pools and the entity graph
//!
//! Every mutation of the graph goes through [`Map`], which keeps each link
//! present in both directions:
//! - robot.sensors <-> sensor.robot
//! - sensor.observations <-> observation.sensor
//! - landmark.observations <-> observation.landmark
//!
//! Creation is transactional. The state slot is allocated before the id is
//! drawn, so a failure leaves the arena, the id pools and the stores exactly
//! as they were.

use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::common::{
    EntityKind, LandmarkId, MapConfig, MotionModel, ObservationId, PredictCoupling, RobotId,
    SensorFanOut, SensorId, SlamError, SlamResult,
};
use crate::features::Feature;
use crate::map::entities::{Landmark, Observation, Robot, Sensor};
use crate::map::id_pool::IdPool;
use crate::map::state_arena::StateArena;

/// Aggregate root owning the shared state and every entity in it
#[derive(Debug, Clone)]
pub struct Map {
    config: MapConfig,
    arena: StateArena,
    robot_ids: IdPool,
    sensor_ids: IdPool,
    landmark_ids: IdPool,
    observation_ids: IdPool,
    robots: BTreeMap<RobotId, Robot>,
    sensors: BTreeMap<SensorId, Sensor>,
    landmarks: BTreeMap<LandmarkId, Landmark>,
    observations: BTreeMap<ObservationId, Observation>,
}

impl Map {
    pub fn new(config: MapConfig) -> SlamResult<Self> {
        config.validate()?;
        Ok(Map {
            arena: StateArena::new(config.max_size),
            config,
            robot_ids: IdPool::new(EntityKind::Robot),
            sensor_ids: IdPool::new(EntityKind::Sensor),
            landmark_ids: IdPool::new(EntityKind::Landmark),
            observation_ids: IdPool::new(EntityKind::Observation),
            robots: BTreeMap::new(),
            sensors: BTreeMap::new(),
            landmarks: BTreeMap::new(),
            observations: BTreeMap::new(),
        })
    }

    /// Map with default configuration and a state vector of `max_size`
    pub fn with_capacity(max_size: usize) -> SlamResult<Self> {
        Self::new(MapConfig::with_capacity(max_size))
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn arena(&self) -> &StateArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut StateArena {
        &mut self.arena
    }

    pub fn used_indices(&self) -> Vec<usize> {
        self.arena.used_indices()
    }

    pub fn unused_states(&self, size: usize) -> bool {
        self.arena.unused_states(size)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Add a robot whose state occupies `state_size` entries
    pub fn create_robot(&mut self, name: impl Into<String>, state_size: usize) -> SlamResult<RobotId> {
        let slot = self.arena.allocate(state_size)?;
        let id = RobotId(self.robot_ids.get_id());
        let robot = Robot::new(id, name.into(), slot);
        debug!(robot = %id, name = robot.name(), start = slot.start(), size = state_size, "created robot");
        self.robots.insert(id, robot);
        Ok(id)
    }

    /// Add a sensor to `robot`. Its pose gets a slot only if it is estimated.
    pub fn create_sensor(
        &mut self,
        robot: RobotId,
        name: impl Into<String>,
        is_state_estimated: bool,
    ) -> SlamResult<SensorId> {
        if !self.robots.contains_key(&robot) {
            return Err(SlamError::unknown_id(EntityKind::Robot, robot));
        }
        let slot = if is_state_estimated {
            Some(self.arena.allocate(self.config.sensor_pose_size)?)
        } else {
            None
        };

        let id = SensorId(self.sensor_ids.get_id());
        let sensor = Sensor {
            id,
            name: name.into(),
            robot,
            slot,
            observations: Default::default(),
        };
        debug!(sensor = %id, robot = %robot, name = sensor.name(), estimated = is_state_estimated, "created sensor");
        self.sensors.insert(id, sensor);
        if let Some(r) = self.robots.get_mut(&robot) {
            r.sensors.insert(id);
        }

        if self.config.sensor_fan_out == SensorFanOut::Symmetric {
            let landmarks: Vec<LandmarkId> = self.landmarks.keys().copied().collect();
            for landmark in landmarks {
                self.link_observation(id, landmark);
            }
        }
        Ok(id)
    }

    /// Add a landmark and one observation of it per sensor in the map
    pub fn create_landmark(&mut self, name: impl Into<String>) -> SlamResult<LandmarkId> {
        let slot = self.arena.allocate(self.config.landmark_size)?;
        let id = LandmarkId(self.landmark_ids.get_id());
        let landmark = Landmark {
            id,
            name: name.into(),
            slot,
            observations: Default::default(),
        };
        self.landmarks.insert(id, landmark);

        let sensors: Vec<SensorId> = self
            .robots
            .values()
            .flat_map(|r| r.sensors.iter().copied())
            .collect();
        for sensor in &sensors {
            self.link_observation(*sensor, id);
        }
        debug!(landmark = %id, start = slot.start(), observations = sensors.len(), "created landmark");
        Ok(id)
    }

    /// Observation of `landmark` by `sensor`. An existing one is returned as is.
    pub fn create_observation(&mut self, sensor: SensorId, landmark: LandmarkId) -> SlamResult<ObservationId> {
        if !self.sensors.contains_key(&sensor) {
            return Err(SlamError::unknown_id(EntityKind::Sensor, sensor));
        }
        if !self.landmarks.contains_key(&landmark) {
            return Err(SlamError::unknown_id(EntityKind::Landmark, landmark));
        }
        if let Some(existing) = self.observation_between(sensor, landmark) {
            return Ok(existing);
        }
        Ok(self.link_observation(sensor, landmark))
    }

    /// Both endpoints must exist
    fn link_observation(&mut self, sensor: SensorId, landmark: LandmarkId) -> ObservationId {
        let id = ObservationId(self.observation_ids.get_id());
        self.observations.insert(
            id,
            Observation {
                id,
                sensor,
                landmark,
                feature: None,
            },
        );
        if let Some(s) = self.sensors.get_mut(&sensor) {
            s.observations.insert(id);
        }
        if let Some(l) = self.landmarks.get_mut(&landmark) {
            l.observations.insert(id);
        }
        id
    }

    /// Attach a measured feature to an observation
    pub fn set_observation_feature(&mut self, observation: ObservationId, feature: Feature) -> SlamResult<()> {
        let obs = self
            .observations
            .get_mut(&observation)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Observation, observation))?;
        obs.feature = Some(feature);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    pub fn destroy_observation(&mut self, id: ObservationId) -> SlamResult<()> {
        let obs = self
            .observations
            .remove(&id)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Observation, id))?;
        if let Some(s) = self.sensors.get_mut(&obs.sensor) {
            s.observations.remove(&id);
        }
        if let Some(l) = self.landmarks.get_mut(&obs.landmark) {
            l.observations.remove(&id);
        }
        self.observation_ids.release_id(id.0)
    }

    /// Remove a landmark, its observations and its slot
    pub fn destroy_landmark(&mut self, id: LandmarkId) -> SlamResult<()> {
        let landmark = self
            .landmarks
            .remove(&id)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Landmark, id))?;
        for obs in &landmark.observations {
            self.destroy_observation(*obs)?;
        }
        self.arena.release(landmark.slot)?;
        self.landmark_ids.release_id(id.0)?;
        debug!(landmark = %id, "destroyed landmark");
        Ok(())
    }

    /// Remove a sensor, its observations and its slot if any
    pub fn destroy_sensor(&mut self, id: SensorId) -> SlamResult<()> {
        let sensor = self
            .sensors
            .remove(&id)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Sensor, id))?;
        if let Some(r) = self.robots.get_mut(&sensor.robot) {
            r.sensors.remove(&id);
        }
        for obs in &sensor.observations {
            self.destroy_observation(*obs)?;
        }
        if let Some(slot) = sensor.slot {
            self.arena.release(slot)?;
        }
        self.sensor_ids.release_id(id.0)?;
        debug!(sensor = %id, "destroyed sensor");
        Ok(())
    }

    /// Remove a robot together with all its sensors
    pub fn destroy_robot(&mut self, id: RobotId) -> SlamResult<()> {
        let robot = self
            .robots
            .remove(&id)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Robot, id))?;
        for sensor in &robot.sensors {
            self.destroy_sensor(*sensor)?;
        }
        self.arena.release(robot.slot)?;
        self.robot_ids.release_id(id.0)?;
        debug!(robot = %id, "destroyed robot");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Motion and prediction
    // ------------------------------------------------------------------

    /// Run `model` on the robot state, write the result back into its slot
    /// and keep the Jacobian and process noise for the next predict.
    pub fn move_robot<M: MotionModel>(&mut self, id: RobotId, model: &M, control: &M::Control) -> SlamResult<()> {
        let robot = self
            .robots
            .get_mut(&id)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Robot, id))?;
        let n = robot.slot.len();
        if model.size() != n {
            return Err(SlamError::DimensionMismatch {
                what: "motion model",
                expected: (n, 1),
                found: (model.size(), 1),
            });
        }

        let state = self.arena.slot_mean(robot.slot).clone_owned();
        let out = model.propagate(&state, control)?;
        if out.state.len() != n {
            return Err(SlamError::DimensionMismatch {
                what: "propagated state",
                expected: (n, 1),
                found: (out.state.len(), 1),
            });
        }
        for (what, m) in [("jacobian", &out.jacobian), ("process noise", &out.noise)] {
            if m.shape() != (n, n) {
                return Err(SlamError::DimensionMismatch {
                    what,
                    expected: (n, n),
                    found: m.shape(),
                });
            }
        }

        self.arena.slot_mean_mut(robot.slot).copy_from(&out.state);
        robot.dx_by_dstate = out.jacobian;
        robot.q = out.noise;
        Ok(())
    }

    /// Propagate the shared covariance with the robot's last motion step.
    /// The step is consumed: J is reset to identity and Q to zero, so a
    /// second predict without a move leaves the covariance unchanged.
    pub fn predict_robot<F: PredictCoupling>(&mut self, id: RobotId, filter: &F) -> SlamResult<()> {
        let robot = self
            .robots
            .get_mut(&id)
            .ok_or_else(|| SlamError::unknown_id(EntityKind::Robot, id))?;
        let used = self.arena.used_indices();
        filter.predict(&mut self.arena, &used, &robot.dx_by_dstate, robot.slot, &robot.q)?;
        robot.reset_motion();
        Ok(())
    }

    /// `move_robot` followed by `predict_robot`
    pub fn step_robot<M: MotionModel, F: PredictCoupling>(
        &mut self,
        id: RobotId,
        model: &M,
        control: &M::Control,
        filter: &F,
    ) -> SlamResult<()> {
        self.move_robot(id, model, control)?;
        self.predict_robot(id, filter)
    }

    // ------------------------------------------------------------------
    // Lookup and traversal
    // ------------------------------------------------------------------

    pub fn robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(&id)
    }

    pub fn sensor(&self, id: SensorId) -> Option<&Sensor> {
        self.sensors.get(&id)
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn observation(&self, id: ObservationId) -> Option<&Observation> {
        self.observations.get(&id)
    }

    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.values()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn landmarks(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.values()
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.values()
    }

    pub fn robot_count(&self) -> usize {
        self.robots.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn landmark_count(&self) -> usize {
        self.landmarks.len()
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Sensors mounted on `robot`, empty if the robot does not exist
    pub fn sensors_of(&self, robot: RobotId) -> impl Iterator<Item = &Sensor> + '_ {
        self.robots
            .get(&robot)
            .into_iter()
            .flat_map(move |r| r.sensors.iter().filter_map(move |s| self.sensors.get(s)))
    }

    pub fn observations_of_sensor(&self, sensor: SensorId) -> impl Iterator<Item = &Observation> + '_ {
        self.sensors
            .get(&sensor)
            .into_iter()
            .flat_map(move |s| s.observations.iter().filter_map(move |o| self.observations.get(o)))
    }

    pub fn observations_of_landmark(&self, landmark: LandmarkId) -> impl Iterator<Item = &Observation> + '_ {
        self.landmarks
            .get(&landmark)
            .into_iter()
            .flat_map(move |l| l.observations.iter().filter_map(move |o| self.observations.get(o)))
    }

    pub fn observation_between(&self, sensor: SensorId, landmark: LandmarkId) -> Option<ObservationId> {
        self.observations_of_sensor(sensor)
            .find(|o| o.landmark == landmark)
            .map(|o| o.id)
    }

    /// Verify that every link has its counterpart and every slot is allocated
    pub fn check_consistency(&self) -> SlamResult<()> {
        for robot in self.robots.values() {
            if !self.arena.is_allocated(robot.slot) {
                return Err(SlamError::inconsistent(format!("robot {} slot not allocated", robot.id)));
            }
            for sid in &robot.sensors {
                match self.sensors.get(sid) {
                    Some(s) if s.robot == robot.id => {}
                    _ => {
                        return Err(SlamError::inconsistent(format!(
                            "robot {} lists sensor {} which does not point back",
                            robot.id, sid
                        )))
                    }
                }
            }
        }
        for sensor in self.sensors.values() {
            let owned = self
                .robots
                .get(&sensor.robot)
                .map_or(false, |r| r.sensors.contains(&sensor.id));
            if !owned {
                return Err(SlamError::inconsistent(format!(
                    "sensor {} not owned by robot {}",
                    sensor.id, sensor.robot
                )));
            }
            if let Some(slot) = sensor.slot {
                if !self.arena.is_allocated(slot) {
                    return Err(SlamError::inconsistent(format!("sensor {} slot not allocated", sensor.id)));
                }
            }
        }
        for landmark in self.landmarks.values() {
            if !self.arena.is_allocated(landmark.slot) {
                return Err(SlamError::inconsistent(format!("landmark {} slot not allocated", landmark.id)));
            }
        }
        for obs in self.observations.values() {
            let in_sensor = self
                .sensors
                .get(&obs.sensor)
                .map_or(false, |s| s.observations.contains(&obs.id));
            let in_landmark = self
                .landmarks
                .get(&obs.landmark)
                .map_or(false, |l| l.observations.contains(&obs.id));
            if !in_sensor || !in_landmark {
                return Err(SlamError::inconsistent(format!(
                    "observation {} not linked from both sensor {} and landmark {}",
                    obs.id, obs.sensor, obs.landmark
                )));
            }
        }
        let linked: usize = self.sensors.values().map(|s| s.observations.len()).sum();
        let linked_lmk: usize = self.landmarks.values().map(|l| l.observations.len()).sum();
        if linked != self.observations.len() || linked_lmk != self.observations.len() {
            return Err(SlamError::inconsistent("dangling observation ids"));
        }
        Ok(())
    }
}

impl fmt::Display for Map {
    /// Robots with their sensors, then landmarks with their observations
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "% MAP: {} / {} states used",
            self.arena.used_size(),
            self.arena.max_size()
        )?;
        writeln!(f, "\n% ROBOTS AND SENSORS\n%=========================")?;
        for robot in self.robots.values() {
            writeln!(f, "{}", robot)?;
            for sensor in self.sensors_of(robot.id) {
                writeln!(f, "{}", sensor)?;
            }
        }
        writeln!(f, "\n% LANDMARKS AND OBSERVATIONS\n%==========================")?;
        for landmark in self.landmarks.values() {
            writeln!(f, "{}", landmark)?;
            for obs in self.observations_of_landmark(landmark.id) {
                writeln!(f, "{}", obs)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MotionOutput;
    use crate::features::{Segment, SegmentFeatureExtractor};
    use crate::filter::EkfPredictor;
    use crate::motion::ConstantVelocity;
    use crate::common::SegmentDetector;
    use crate::features::Roi;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use proptest::prelude::*;

    fn small_config(max_size: usize, fan_out: SensorFanOut) -> MapConfig {
        MapConfig {
            max_size,
            sensor_pose_size: 3,
            landmark_size: 2,
            sensor_fan_out: fan_out,
        }
    }

    /// Robot "SUBMARINE" with sensors "FLEA" (not estimated) and "MARLIN" (estimated)
    fn reference_scene() -> (Map, RobotId, SensorId, SensorId) {
        let mut map = Map::with_capacity(300).unwrap();
        let rob = map.create_robot("SUBMARINE", 13).unwrap();
        let flea = map.create_sensor(rob, "FLEA", false).unwrap();
        let marlin = map.create_sensor(rob, "MARLIN", true).unwrap();
        (map, rob, flea, marlin)
    }

    #[test]
    fn test_reference_scene() {
        let (map, rob, flea, marlin) = reference_scene();
        assert_eq!(rob, RobotId(0));
        assert_eq!((flea, marlin), (SensorId(0), SensorId(1)));

        let robot = map.robot(rob).unwrap();
        assert_eq!(robot.slot().range(), 0..13);
        assert_eq!(robot.sensors().collect::<Vec<_>>(), vec![flea, marlin]);

        assert!(map.sensor(flea).unwrap().slot().is_none());
        assert_eq!(map.sensor(marlin).unwrap().slot().unwrap().range(), 13..20);
        assert_eq!(map.sensor(marlin).unwrap().robot(), rob);
        assert_eq!(map.used_indices(), (0..20).collect::<Vec<_>>());
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_landmark_fan_out() {
        let mut map = Map::new(small_config(100, SensorFanOut::None)).unwrap();
        let r0 = map.create_robot("r0", 4).unwrap();
        let r1 = map.create_robot("r1", 4).unwrap();
        map.create_sensor(r0, "s0", false).unwrap();
        map.create_sensor(r0, "s1", true).unwrap();
        map.create_sensor(r1, "s2", false).unwrap();

        let landmarks: Vec<LandmarkId> = (0..4).map(|_| map.create_landmark("").unwrap()).collect();

        assert_eq!(map.observation_count(), 3 * 4);
        for sensor in map.sensors() {
            assert_eq!(sensor.observations().count(), 4);
        }
        for &lmk in &landmarks {
            let sensors: Vec<SensorId> = map.observations_of_landmark(lmk).map(|o| o.sensor()).collect();
            assert_eq!(sensors, vec![SensorId(0), SensorId(1), SensorId(2)]);
        }
        for obs in map.observations() {
            let in_sensors = map
                .sensors()
                .filter(|s| s.observations().any(|o| o == obs.id()))
                .count();
            let in_landmarks = map
                .landmarks()
                .filter(|l| l.observations().any(|o| o == obs.id()))
                .count();
            assert_eq!((in_sensors, in_landmarks), (1, 1));
        }
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_sensor_fan_out_symmetric() {
        let mut map = Map::new(small_config(100, SensorFanOut::Symmetric)).unwrap();
        let rob = map.create_robot("rob", 4).unwrap();
        let l0 = map.create_landmark("l0").unwrap();
        let l1 = map.create_landmark("l1").unwrap();
        assert_eq!(map.observation_count(), 0);

        let sen = map.create_sensor(rob, "cam", false).unwrap();
        assert_eq!(map.observation_count(), 2);
        assert!(map.observation_between(sen, l0).is_some());
        assert!(map.observation_between(sen, l1).is_some());
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_sensor_fan_out_none() {
        let mut map = Map::new(small_config(100, SensorFanOut::None)).unwrap();
        let rob = map.create_robot("rob", 4).unwrap();
        let lmk = map.create_landmark("l0").unwrap();
        let sen = map.create_sensor(rob, "cam", false).unwrap();
        assert_eq!(map.observation_count(), 0);

        let obs = map.create_observation(sen, lmk).unwrap();
        assert_eq!(map.create_observation(sen, lmk).unwrap(), obs);
        assert_eq!(map.observation_count(), 1);
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_destroy_landmark_releases_everything() {
        let (mut map, _rob, flea, marlin) = reference_scene();
        let l0 = map.create_landmark("l0").unwrap();
        let l1 = map.create_landmark("l1").unwrap();
        let slot0 = map.landmark(l0).unwrap().slot();
        assert_eq!(map.observation_count(), 4);

        map.destroy_landmark(l0).unwrap();

        assert!(map.landmark(l0).is_none());
        assert_eq!(map.observation_count(), 2);
        for sensor in [flea, marlin] {
            let landmarks: Vec<LandmarkId> = map.observations_of_sensor(sensor).map(|o| o.landmark()).collect();
            assert_eq!(landmarks, vec![l1]);
        }
        assert!(!map.arena().is_allocated(slot0));
        assert!(map.check_consistency().is_ok());

        let l2 = map.create_landmark("l2").unwrap();
        assert_eq!(l2, l0);
        assert_eq!(map.landmark(l2).unwrap().slot(), slot0);
    }

    #[test]
    fn test_destroy_robot_cascades() {
        let (mut map, rob, flea, marlin) = reference_scene();
        map.create_landmark("l0").unwrap();
        map.destroy_robot(rob).unwrap();

        assert_eq!(map.robot_count(), 0);
        assert!(map.sensor(flea).is_none());
        assert!(map.sensor(marlin).is_none());
        assert_eq!(map.observation_count(), 0);
        assert_eq!(map.landmarks().next().unwrap().observations().count(), 0);
        assert_eq!(map.used_indices(), (20..27).collect::<Vec<_>>());
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_destroy_sensor_unlinks_robot() {
        let (mut map, rob, flea, marlin) = reference_scene();
        map.create_landmark("l0").unwrap();
        map.destroy_sensor(marlin).unwrap();
        assert_eq!(map.robot(rob).unwrap().sensors().collect::<Vec<_>>(), vec![flea]);
        assert_eq!(map.observation_count(), 1);
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_create_robot_failure_is_transactional() {
        let mut map = Map::new(small_config(10, SensorFanOut::Symmetric)).unwrap();
        map.create_robot("big", 8).unwrap();
        let before = map.used_indices();

        let err = map.create_robot("too big", 4).unwrap_err();
        assert!(matches!(err, SlamError::CapacityExceeded { requested: 4, .. }));
        assert_eq!(map.robot_count(), 1);
        assert_eq!(map.used_indices(), before);
        assert_eq!(map.create_robot("fits", 2).unwrap(), RobotId(1));
    }

    #[test]
    fn test_create_landmark_failure_is_transactional() {
        let mut map = Map::new(small_config(7, SensorFanOut::Symmetric)).unwrap();
        let rob = map.create_robot("rob", 4).unwrap();
        map.create_sensor(rob, "cam", false).unwrap();
        map.create_landmark("l0").unwrap();

        assert!(map.create_landmark("l1").is_err());
        assert_eq!(map.landmark_count(), 1);
        assert_eq!(map.observation_count(), 1);
        assert!(map.check_consistency().is_ok());
    }

    #[test]
    fn test_create_sensor_failure_is_transactional() {
        let mut map = Map::new(small_config(5, SensorFanOut::Symmetric)).unwrap();
        let rob = map.create_robot("rob", 4).unwrap();
        assert!(map.create_sensor(rob, "cam", true).is_err());
        assert_eq!(map.sensor_count(), 0);
        assert_eq!(map.create_sensor(rob, "cam", false).unwrap(), SensorId(0));
    }

    #[test]
    fn test_unknown_ids() {
        let (mut map, _, _, _) = reference_scene();
        assert!(matches!(
            map.create_sensor(RobotId(7), "x", false),
            Err(SlamError::UnknownId { kind: EntityKind::Robot, id: 7 })
        ));
        assert!(matches!(
            map.destroy_landmark(LandmarkId(0)),
            Err(SlamError::UnknownId { kind: EntityKind::Landmark, id: 0 })
        ));
        assert!(map.destroy_observation(ObservationId(3)).is_err());
        assert!(map.create_observation(SensorId(0), LandmarkId(5)).is_err());
        assert!(map.check_consistency().is_ok());
    }

    /// J = I, Q = 0
    struct Still(usize);

    impl MotionModel for Still {
        type Control = ();

        fn size(&self) -> usize {
            self.0
        }

        fn propagate(&self, state: &DVector<f64>, _control: &()) -> SlamResult<MotionOutput> {
            Ok(MotionOutput {
                state: state.clone(),
                jacobian: DMatrix::identity(self.0, self.0),
                noise: DMatrix::zeros(self.0, self.0),
            })
        }
    }

    fn predict_scene() -> (Map, RobotId, LandmarkId) {
        let mut map = Map::new(small_config(10, SensorFanOut::Symmetric)).unwrap();
        let rob = map.create_robot("rob", 2).unwrap();
        let lmk = map.create_landmark("lmk").unwrap();
        let p = DMatrix::from_row_slice(
            4,
            4,
            &[
                2.0, 0.3, 0.1, 0.2, //
                0.3, 1.5, 0.4, 0.1, //
                0.1, 0.4, 3.0, 0.5, //
                0.2, 0.1, 0.5, 2.5,
            ],
        );
        map.arena_mut().covariance_mut().view_mut((0, 0), (4, 4)).copy_from(&p);
        (map, rob, lmk)
    }

    #[test]
    fn test_predict_identity_leaves_landmark_blocks() {
        let (mut map, rob, lmk) = predict_scene();
        let before = map.arena().covariance().clone();

        map.step_robot(rob, &Still(2), &(), &EkfPredictor::new()).unwrap();

        let robot_slot = map.robot(rob).unwrap().slot();
        let lmk_slot = map.landmark(lmk).unwrap().slot();
        let arena = map.arena();
        assert_eq!(arena.slot_covariance(lmk_slot), before.view((2, 2), (2, 2)));
        assert_eq!(arena.cross_covariance(robot_slot, lmk_slot), before.view((0, 2), (2, 2)));
        assert_eq!(arena.slot_covariance(robot_slot), before.view((0, 0), (2, 2)));
    }

    #[test]
    fn test_predict_constant_velocity() {
        let (mut map, rob, lmk) = predict_scene();
        map.arena_mut().mean_mut()[1] = 2.0;
        let before = map.arena().covariance().clone();
        let model = ConstantVelocity::new(1, 0.5, 0.1);

        map.step_robot(rob, &model, &DVector::from_vec(vec![0.0]), &EkfPredictor::new())
            .unwrap();

        let robot = map.robot(rob).unwrap();
        let lmk_slot = map.landmark(lmk).unwrap().slot();
        let j = model.jacobian();
        assert_relative_eq!(map.arena().mean()[0], 1.0, epsilon = 1e-12);

        let p_rr = before.view((0, 0), (2, 2)).clone_owned();
        let expected = &j * p_rr * j.transpose() + model.process_noise();
        assert_relative_eq!(map.arena().slot_covariance(robot.slot()).clone_owned(), expected, epsilon = 1e-12);

        let p_rl = before.view((0, 2), (2, 2)).clone_owned();
        assert_relative_eq!(
            map.arena().cross_covariance(robot.slot(), lmk_slot).clone_owned(),
            &j * p_rl,
            epsilon = 1e-12
        );
        assert_eq!(map.arena().slot_covariance(lmk_slot), before.view((2, 2), (2, 2)));
    }

    #[test]
    fn test_move_robot_dimension_mismatch() {
        let (mut map, rob, _) = predict_scene();
        let result = map.move_robot(rob, &Still(3), &());
        assert!(matches!(result, Err(SlamError::DimensionMismatch { what: "motion model", .. })));
    }

    #[test]
    fn test_move_robot_control_mismatch() {
        let mut map = Map::new(small_config(10, SensorFanOut::Symmetric)).unwrap();
        let rob = map.create_robot("rob", 4).unwrap();
        let before = map.arena().mean().clone();
        let model = ConstantVelocity::new(2, 0.5, 0.1);

        let result = map.move_robot(rob, &model, &DVector::from_vec(vec![1.0]));
        assert!(matches!(result, Err(SlamError::DimensionMismatch { what: "control", .. })));
        assert!(map
            .step_robot(rob, &model, &DVector::from_vec(vec![1.0]), &EkfPredictor::new())
            .is_err());
        assert_eq!(map.arena().mean(), &before);
    }

    #[test]
    fn test_motion_step_is_consumed_by_predict() {
        let (mut map, rob, _) = predict_scene();
        let model = ConstantVelocity::new(1, 0.5, 1.0);
        map.move_robot(rob, &model, &DVector::from_vec(vec![0.0])).unwrap();
        assert_eq!(map.robot(rob).unwrap().dx_by_dstate(), &model.jacobian());
        assert_eq!(map.robot(rob).unwrap().process_noise(), &model.process_noise());

        map.predict_robot(rob, &EkfPredictor::new()).unwrap();
        let once = map.arena().covariance().clone();
        let robot = map.robot(rob).unwrap();
        assert_eq!(robot.dx_by_dstate(), &DMatrix::identity(2, 2));
        assert_eq!(robot.process_noise(), &DMatrix::zeros(2, 2));

        map.predict_robot(rob, &EkfPredictor::new()).unwrap();
        assert_eq!(map.arena().covariance(), &once);
    }

    struct FixedDetector(Vec<Segment>);

    impl SegmentDetector for FixedDetector {
        type Image = ();

        fn detect_segments(&self, _image: &(), _roi: &Roi) -> Vec<Segment> {
            self.0.clone()
        }
    }

    #[test]
    fn test_observation_feature_from_extractor() {
        let (mut map, _, flea, _) = reference_scene();
        let lmk = map.create_landmark("l0").unwrap();
        let obs = map.observation_between(flea, lmk).unwrap();
        let extractor = SegmentFeatureExtractor::new(FixedDetector(vec![
            Segment::new(0.0, 0.0, 1.0, 0.0),
            Segment::new(0.0, 0.0, 10.0, 0.0),
        ]));
        let feature = extractor.extract(&(), &Roi::new(0.0, 0.0, 64.0, 48.0)).unwrap();

        map.set_observation_feature(obs, feature).unwrap();

        let stored = map.observation(obs).unwrap();
        assert_eq!(stored.match_score(), Some(1.0));
        assert_eq!(stored.feature().unwrap().measurement[2], 10.0);
        assert!(map.set_observation_feature(ObservationId(99), Feature::new(DVector::zeros(4), 1.0)).is_err());
    }

    #[test]
    fn test_report() {
        let (mut map, _, _, _) = reference_scene();
        map.create_landmark("corner").unwrap();
        let report = map.to_string();
        assert!(report.contains("% ROBOTS AND SENSORS"));
        assert!(report.contains("\"SUBMARINE\""));
        assert!(report.contains("\"FLEA\" on robot 0: not in map"));
        assert!(report.contains("\"MARLIN\" on robot 0: states [13, 20)"));
        assert!(report.contains("Landmark 0 \"corner\": states [20, 27)"));
        assert!(report.contains("Observation 1: sensor 1 -> landmark 0"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Robot,
        Sensor(u8, bool),
        Landmark,
        DestroyRobot(u8),
        DestroySensor(u8),
        DestroyLandmark(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Robot),
            (any::<u8>(), any::<bool>()).prop_map(|(r, e)| Op::Sensor(r, e)),
            Just(Op::Landmark),
            Just(Op::Landmark),
            any::<u8>().prop_map(Op::DestroyRobot),
            any::<u8>().prop_map(Op::DestroySensor),
            any::<u8>().prop_map(Op::DestroyLandmark),
        ]
    }

    fn pick<T: Copy>(items: &[T], i: u8) -> Option<T> {
        if items.is_empty() {
            None
        } else {
            Some(items[i as usize % items.len()])
        }
    }

    proptest! {
        #[test]
        fn prop_graph_stays_consistent(ops in prop::collection::vec(op(), 0..60)) {
            let mut map = Map::new(small_config(80, SensorFanOut::Symmetric)).unwrap();
            for op in ops {
                let robots: Vec<RobotId> = map.robots().map(|r| r.id()).collect();
                let sensors: Vec<SensorId> = map.sensors().map(|s| s.id()).collect();
                let landmarks: Vec<LandmarkId> = map.landmarks().map(|l| l.id()).collect();
                match op {
                    Op::Robot => { let _ = map.create_robot("r", 3); }
                    Op::Sensor(r, e) => {
                        if let Some(r) = pick(&robots, r) {
                            let _ = map.create_sensor(r, "s", e);
                        }
                    }
                    Op::Landmark => { let _ = map.create_landmark("l"); }
                    Op::DestroyRobot(i) => {
                        if let Some(r) = pick(&robots, i) {
                            prop_assert!(map.destroy_robot(r).is_ok());
                        }
                    }
                    Op::DestroySensor(i) => {
                        if let Some(s) = pick(&sensors, i) {
                            prop_assert!(map.destroy_sensor(s).is_ok());
                        }
                    }
                    Op::DestroyLandmark(i) => {
                        if let Some(l) = pick(&landmarks, i) {
                            prop_assert!(map.destroy_landmark(l).is_ok());
                        }
                    }
                }
                prop_assert!(map.check_consistency().is_ok());
                prop_assert_eq!(map.observation_count(), map.sensor_count() * map.landmark_count());
                prop_assert!(map.arena().used_size() <= map.arena().max_size());
            }
        }
    }
}
