use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    specs::{PartKey, PredictSpec, ScatterSpec, TaskFailure, TrainSpec, TrainingResult},
};

type Header = u64;
const HEADER_SIZE: usize = size_of::<Header>();

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    Predictions(&'a [f64]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Coordinator greeting, answered with `Welcome`.
    Hello,
    Welcome { ncores: usize },
    /// Store a partition on the worker, answered with `Stored`.
    Scatter(ScatterSpec),
    Stored { key: PartKey },
    /// Ask which of the keys the worker can't serve, answered with `Missing`.
    Status { keys: Vec<PartKey> },
    Missing { keys: Vec<PartKey> },
    /// Drop the partitions from the worker, answered with `Released`.
    Release { keys: Vec<PartKey> },
    Released { count: usize },
    /// Run a local trainer task, answered with `Trained`.
    Train(TrainSpec),
    Trained(TrainingResult),
    /// Run a prediction task, answered with `Predicted` followed by the values
    /// or with `Failed`.
    Predict(PredictSpec),
    Predicted { rows: usize, cols: usize },
    Failed(TaskFailure),
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(_) => "control",
            Msg::Data(Payload::Predictions(_)) => "data/predictions",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {byte}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&(0 as Header).to_be_bytes());
                Ok(Some(e.as_bytes()))
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&(1 as Header).to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
                Ok(None)
            }
            Msg::Data(Payload::Predictions(values)) => {
                buf.extend_from_slice(&(2 as Header).to_be_bytes());
                Ok(Some(bytemuck::cast_slice(values)))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);
        let mut kind = [0; HEADER_SIZE];
        kind.copy_from_slice(kind_buf);
        let rest: &'a [u8] = rest;

        match Header::from_be_bytes(kind) {
            0 => {
                let text = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(text)))
            }
            1 => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            2 => {
                let values = bytemuck::try_cast_slice(rest).map_err(|err| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("{err:?}"))
                })?;

                Ok(Self::Data(Payload::Predictions(values)))
            }
            kind => Self::invalid_kind_byte(kind),
        }
    }
}
