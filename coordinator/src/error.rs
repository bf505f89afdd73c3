use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use booster::EngineErr;
use comms::specs::{FailureKind, TaskFailure};

/// The result type used in the entire coordinator module.
pub type Result<T> = std::result::Result<T, CoordinatorErr>;

/// Failures while deriving a round's topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyErr {
    /// The local address isn't part of the round's address list.
    AddressNotFound { address: String },
    /// An address doesn't have the `[scheme://]host:port` shape.
    InvalidAddress { address: String, msg: String },
    /// `base_port` leaves no room for one port per worker.
    PortRangeExhausted { base_port: u16, workers: usize },
}

impl Display for TopologyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyErr::AddressNotFound { address } => {
                write!(f, "address {address} is not part of the round")
            }
            TopologyErr::InvalidAddress { address, msg } => {
                write!(f, "invalid worker address `{address}`: {msg}")
            }
            TopologyErr::PortRangeExhausted { base_port, workers } => write!(
                f,
                "base port {base_port} can't fit {workers} workers below port 65535"
            ),
        }
    }
}

impl Error for TopologyErr {}

/// Every way a training round or a prediction call can fail.
#[derive(Debug)]
pub enum CoordinatorErr {
    /// A worker isn't part of the address list it was handed.
    AddressNotFound { worker: String },
    /// Not every peer joined the ring within `listen_time_out`.
    PeerHandshakeTimeout { worker: String, msg: String },
    /// A worker task failed, the whole call fails with it.
    WorkerTaskFailure { worker: String, msg: String },
    /// A successful round must produce exactly one model.
    InconsistentResult { models: usize },
    InvalidConfig(String),
    /// The cluster has no worker to run a round on.
    NoWorkers,
    Topology(TopologyErr),
    Engine(EngineErr),
    Io(io::Error),
}

impl Display for CoordinatorErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorErr::AddressNotFound { worker } => {
                write!(f, "worker {worker} is not part of the round's topology")
            }
            CoordinatorErr::PeerHandshakeTimeout { worker, msg } => {
                write!(f, "worker {worker} couldn't reach its peers: {msg}")
            }
            CoordinatorErr::WorkerTaskFailure { worker, msg } => {
                write!(f, "task on worker {worker} failed: {msg}")
            }
            CoordinatorErr::InconsistentResult { models } => {
                write!(f, "expected exactly one trained model, got {models}")
            }
            CoordinatorErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            CoordinatorErr::NoWorkers => write!(f, "the cluster has no workers"),
            CoordinatorErr::Topology(e) => write!(f, "topology error: {e}"),
            CoordinatorErr::Engine(e) => write!(f, "engine error: {e}"),
            CoordinatorErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for CoordinatorErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoordinatorErr::Topology(e) => Some(e),
            CoordinatorErr::Engine(e) => Some(e),
            CoordinatorErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TopologyErr> for CoordinatorErr {
    fn from(value: TopologyErr) -> Self {
        match value {
            TopologyErr::AddressNotFound { address } => Self::AddressNotFound { worker: address },
            e => Self::Topology(e),
        }
    }
}

impl From<TaskFailure> for CoordinatorErr {
    fn from(value: TaskFailure) -> Self {
        let TaskFailure { worker, kind, msg } = value;

        match kind {
            FailureKind::AddressNotFound => Self::AddressNotFound { worker },
            FailureKind::HandshakeTimeout => Self::PeerHandshakeTimeout { worker, msg },
            _ => Self::WorkerTaskFailure { worker, msg },
        }
    }
}

impl From<EngineErr> for CoordinatorErr {
    fn from(value: EngineErr) -> Self {
        Self::Engine(value)
    }
}

impl From<io::Error> for CoordinatorErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
