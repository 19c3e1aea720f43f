// Filter backends module

pub mod ekf;

pub use ekf::EkfPredictor;
