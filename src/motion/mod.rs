// Motion models module

pub mod constant_velocity;

pub use constant_velocity::ConstantVelocity;
