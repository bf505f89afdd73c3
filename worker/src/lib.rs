//! The worker node daemon: holds partitions and runs trainer and prediction
//! tasks for the coordinator.

mod node;

pub use node::Node;
