//! SLAM map: shared state buffer and the entity graph living in it

pub mod entities;
pub mod fill;
pub mod graph;
pub mod id_pool;
pub mod state_arena;

pub use entities::{Landmark, Observation, Robot, Sensor};
pub use graph::Map;
pub use id_pool::IdPool;
pub use state_arena::{Slot, StateArena};
