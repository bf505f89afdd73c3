//! Coordination of distributed gradient boosting rounds.
//!
//! A round assigns every worker of the cluster a place in the engine's
//! peer-to-peer ring, runs one local trainer task per worker concurrently and
//! reduces their outcomes to the single model shipped by the master worker.

mod address;
pub mod cluster;
pub mod configs;
mod dataset;
pub mod error;
mod model;
mod predict;
mod round;
mod store;
pub mod task;
mod topology;

pub use address::WorkerAddress;
pub use cluster::{Cluster, LocalCluster, RemoteCluster, WorkerInfo};
pub use configs::{RoundConfig, SessionConfig};
pub use dataset::{DistributedDataset, Placement, WorkerShard, WorkerShards};
pub use error::{CoordinatorErr, Result, TopologyErr};
pub use model::{LocalModel, TrainedModel};
pub use predict::{PredictionBatch, PredictionDispatcher};
pub use round::{RoundCoordinator, RoundState, reduce};
pub use store::{PartitionStore, StoreErr};
pub use topology::{Topology, build_topology};
