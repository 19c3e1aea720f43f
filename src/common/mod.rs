//! Common types, traits, configuration and error definitions for rtslam
//!
//! This module provides the foundational building blocks shared by the
//! state arena, the entity graph and the feature extractors.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
