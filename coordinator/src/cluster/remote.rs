use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use booster::{Dataset, Predictions};
use comms::{
    Receiver, Sender,
    msg::{Command, Msg, Payload},
    specs::{FailureKind, PartKey, PredictSpec, ScatterSpec, TaskFailure, TrainSpec, TrainingResult},
};
use log::{debug, info};
use tokio::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

use super::{Cluster, WorkerInfo};
use crate::{CoordinatorErr, DistributedDataset, Placement, Result, WorkerAddress};

type NetRx = Receiver<OwnedReadHalf>;
type NetTx = Sender<OwnedWriteHalf>;

/// A cluster of `worker` nodes reached over TCP, one connection per request.
#[derive(Debug)]
pub struct RemoteCluster {
    workers: Vec<WorkerInfo>,
    next_key: AtomicUsize,
}

impl RemoteCluster {
    /// Greets every worker node and records the cores it reports.
    ///
    /// # Errors
    /// Returns `CoordinatorErr::Io` if a node can't be reached or doesn't
    /// speak the protocol.
    pub async fn connect(addresses: Vec<WorkerAddress>) -> Result<Self> {
        let mut workers = Vec::with_capacity(addresses.len());

        for address in addresses {
            let ncores = match Self::request(&address, Command::Hello).await? {
                Command::Welcome { ncores } => ncores,
                cmd => return Err(Self::unexpected_command(cmd).into()),
            };

            info!(worker = address.as_str(), ncores = ncores; "worker node connected");
            workers.push(WorkerInfo { address, ncores });
        }

        Ok(Self {
            workers,
            next_key: AtomicUsize::new(0),
        })
    }

    /// Creates a communication channel with a worker node.
    ///
    /// # Arguments
    /// * `address` - The worker's address.
    ///
    /// # Returns
    /// A communication channel or an io error if failed to do so.
    async fn open_channel(address: &WorkerAddress) -> io::Result<(NetRx, NetTx)> {
        let stream = TcpStream::connect((address.host(), address.port())).await?;
        let (rx, tx) = stream.into_split();
        Ok(comms::channel(rx, tx))
    }

    /// Sends `cmd` to `address` and waits for its single control reply.
    async fn request(address: &WorkerAddress, cmd: Command) -> io::Result<Command> {
        let (mut rx, mut tx) = Self::open_channel(address).await?;
        tx.send(&Msg::Control(cmd)).await?;

        let mut buf: Vec<u64> = Vec::new();
        let reply = match rx.recv_into::<Msg, _>(&mut buf).await? {
            Msg::Control(reply) => reply,
            Msg::Err(e) => return Err(io::Error::other(e.into_owned())),
            msg => return Err(Self::unexpected_message(&msg)),
        };

        tx.send(&Msg::Control(Command::Disconnect)).await?;
        Ok(reply)
    }

    /// Runs a prediction task, the outer error is a transport failure and the
    /// inner one a failure of the task itself.
    async fn predict(
        address: &WorkerAddress,
        spec: PredictSpec,
    ) -> io::Result<std::result::Result<Predictions, TaskFailure>> {
        let (mut rx, mut tx) = Self::open_channel(address).await?;
        tx.send(&Msg::Control(Command::Predict(spec))).await?;

        let mut buf: Vec<u64> = Vec::new();
        let (rows, cols) = match rx.recv_into::<Msg, _>(&mut buf).await? {
            Msg::Control(Command::Predicted { rows, cols }) => (rows, cols),
            Msg::Control(Command::Failed(mut failure)) => {
                failure.worker = address.to_string();
                return Ok(Err(failure));
            }
            Msg::Err(e) => return Err(io::Error::other(e.into_owned())),
            msg => return Err(Self::unexpected_message(&msg)),
        };

        let values = match rx.recv_into::<Msg, _>(&mut buf).await? {
            Msg::Data(Payload::Predictions(values)) => values.to_vec(),
            msg => return Err(Self::unexpected_message(&msg)),
        };

        tx.send(&Msg::Control(Command::Disconnect)).await?;

        let preds = Predictions::new(rows, cols, values)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(Ok(preds))
    }

    fn unexpected_message(msg: &Msg) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an unexpected message kind, got: {}", msg.kind()),
        )
    }

    fn unexpected_command(cmd: Command) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an unexpected command, got: {cmd:?}"),
        )
    }

    fn transport_failure(worker: &WorkerAddress, e: io::Error) -> TaskFailure {
        TaskFailure::new(worker.as_str(), FailureKind::Transport, e.to_string())
    }

    fn fresh_key(&self) -> PartKey {
        let id = self.next_key.fetch_add(1, Ordering::Relaxed);
        PartKey::new(format!("part-{id}"))
    }
}

#[async_trait]
impl Cluster for RemoteCluster {
    async fn workers(&self) -> Result<Vec<WorkerInfo>> {
        Ok(self.workers.clone())
    }

    async fn scatter(&self, parts: Vec<Dataset>) -> Result<DistributedDataset> {
        if self.workers.is_empty() {
            return Err(CoordinatorErr::NoWorkers);
        }

        let mut placements = Vec::with_capacity(parts.len());

        for (i, part) in parts.into_iter().enumerate() {
            let worker = &self.workers[i % self.workers.len()].address;
            let key = self.fresh_key();
            let rows = part.rows();

            let spec = ScatterSpec {
                key: key.clone(),
                part,
            };

            match Self::request(worker, Command::Scatter(spec)).await? {
                Command::Stored { key: stored } if stored == key => {}
                cmd => return Err(Self::unexpected_command(cmd).into()),
            }

            debug!(worker = worker.as_str(), rows = rows; "stored partition {key}");
            placements.push(Placement {
                key,
                worker: worker.clone(),
                rows,
            });
        }

        Ok(DistributedDataset::new(placements))
    }

    async fn who_has(&self, data: &DistributedDataset) -> Result<Vec<Placement>> {
        for (worker, keys) in data.keys_per_worker() {
            let missing = match Self::request(worker, Command::Status { keys }).await {
                Ok(Command::Missing { keys }) => keys,
                Ok(cmd) => return Err(Self::unexpected_command(cmd).into()),
                Err(e) => {
                    return Err(CoordinatorErr::WorkerTaskFailure {
                        worker: worker.to_string(),
                        msg: e.to_string(),
                    })
                }
            };

            if let Some(key) = missing.first() {
                return Err(CoordinatorErr::WorkerTaskFailure {
                    worker: worker.to_string(),
                    msg: format!("partition {key} is not available"),
                });
            }
        }

        Ok(data.placements().to_vec())
    }

    async fn release(&self, data: &DistributedDataset) -> Result<()> {
        for (worker, keys) in data.keys_per_worker() {
            match Self::request(worker, Command::Release { keys }).await? {
                Command::Released { count } => {
                    debug!(worker = worker.as_str(), count = count; "released partitions");
                }
                cmd => return Err(Self::unexpected_command(cmd).into()),
            }
        }

        Ok(())
    }

    async fn submit_train(&self, worker: &WorkerAddress, spec: TrainSpec) -> TrainingResult {
        match Self::request(worker, Command::Train(spec)).await {
            Ok(Command::Trained(result)) => result,
            Ok(cmd) => TrainingResult::Failed(Self::transport_failure(
                worker,
                Self::unexpected_command(cmd),
            )),
            Err(e) => TrainingResult::Failed(Self::transport_failure(worker, e)),
        }
    }

    async fn submit_predict(
        &self,
        worker: &WorkerAddress,
        spec: PredictSpec,
    ) -> std::result::Result<Predictions, TaskFailure> {
        Self::predict(worker, spec)
            .await
            .unwrap_or_else(|e| Err(Self::transport_failure(worker, e)))
    }
}
