//! The boundary to the single machine boosting engine that runs on every worker.

mod baseline;
mod dataset;
mod engine;
pub mod error;
mod model;
pub mod network;
mod params;

pub use baseline::{BaselineEngine, Objective};
pub use dataset::Dataset;
pub use engine::Engine;
pub use error::{EngineErr, Result};
pub use model::{Model, Predictions};
pub use network::{NetworkConfig, Ring};
pub use params::Params;
