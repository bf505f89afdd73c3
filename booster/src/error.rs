use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire booster module.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Failures raised by the boosting engine's entry points.
#[derive(Debug)]
pub enum EngineErr {
    /// The listening socket for the ring could not be bound.
    Bind { port: u16, source: io::Error },
    /// Not every peer showed up within `listen_time_out`.
    HandshakeTimeout {
        connected: usize,
        expected: usize,
        secs: u64,
    },
    /// The network keys of the parameters don't describe a valid ring.
    InvalidNetwork(String),
    /// A hyperparameter has the wrong type or an unsupported value.
    InvalidParam { key: &'static str, msg: String },
    /// The training or inference data is malformed.
    InvalidData(String),
    /// The model handle can't be used for the requested operation.
    InvalidModel(String),
    Io(io::Error),
}

impl Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::Bind { port, source } => {
                write!(f, "failed to bind the listen port {port}: {source}")
            }
            EngineErr::HandshakeTimeout {
                connected,
                expected,
                secs,
            } => write!(
                f,
                "timed out after {secs}s waiting for peers, connected to {connected} of {expected}"
            ),
            EngineErr::InvalidNetwork(msg) => write!(f, "invalid network config: {msg}"),
            EngineErr::InvalidParam { key, msg } => write!(f, "invalid parameter {key}: {msg}"),
            EngineErr::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            EngineErr::InvalidModel(msg) => write!(f, "invalid model: {msg}"),
            EngineErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineErr::Bind { source, .. } => Some(source),
            EngineErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
