//! Domain layer: models, ports, errors, and pure helpers.

pub mod errors;
pub mod models;
pub mod ports;
pub mod similarity;
