use std::{io, sync::Arc};

use booster::Engine;
use comms::{
    Receiver, Sender,
    msg::{Command, Msg, Payload},
    specs::{FailureKind, TaskFailure, TrainingResult},
};
use coordinator::{
    PartitionStore,
    task::{run_predict, run_train},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task,
};

/// A worker node. It owns the partitions scattered to it and runs the tasks
/// the coordinator submits against them.
pub struct Node {
    address: String,
    engine: Arc<dyn Engine>,
    store: Arc<PartitionStore>,
    ncores: usize,
}

impl Node {
    /// Creates a new `Node`.
    ///
    /// # Arguments
    /// * `address` - The address the node listens at, used to tag its failures.
    /// * `engine` - The engine to train and predict with.
    /// * `ncores` - The cores reported to the coordinator.
    pub fn new(address: impl Into<String>, engine: Arc<dyn Engine>, ncores: usize) -> Self {
        Self {
            address: address.into(),
            engine,
            store: Arc::new(PartitionStore::new()),
            ncores,
        }
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    /// Accepts connections forever, serving each one on its own task.
    ///
    /// # Errors
    /// Returns the io error of a failed accept.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            debug!("coordinator connected from {addr}");

            let node = Arc::clone(&self);
            tokio::spawn(async move {
                let (rx, tx) = stream.into_split();
                let (rx, tx) = comms::channel(rx, tx);

                if let Err(e) = node.handle(rx, tx).await {
                    warn!("connection with {addr} failed: {e}");
                }
            });
        }
    }

    /// Serves the requests of a single connection until it's closed or a
    /// `Disconnect` arrives.
    ///
    /// # Arguments
    /// * `rx` - The receiving end of the communication.
    /// * `tx` - The sending end of the communication.
    ///
    /// # Errors
    /// Returns an io error if the connection breaks mid request.
    pub async fn handle<R, W>(&self, mut rx: Receiver<R>, mut tx: Sender<W>) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf: Vec<u64> = Vec::new();

        loop {
            let cmd = match rx.recv_into::<Msg, _>(&mut buf).await {
                Ok(Msg::Control(cmd)) => cmd,
                Ok(msg) => {
                    let text = format!("expected a command, got {}", msg.kind());
                    tx.send(&Msg::Err(text.into())).await?;
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };

            let reply = match cmd {
                Command::Hello => Command::Welcome {
                    ncores: self.ncores,
                },
                Command::Scatter(spec) => {
                    debug!(rows = spec.part.rows(); "storing partition {}", spec.key);
                    self.store.insert(spec.key.clone(), spec.part);
                    Command::Stored { key: spec.key }
                }
                Command::Status { keys } => Command::Missing {
                    keys: self.store.missing(&keys),
                },
                Command::Release { keys } => Command::Released {
                    count: self.store.release(&keys),
                },
                Command::Train(spec) => {
                    info!(worker = spec.worker.as_str(); "running a trainer task");
                    let worker = spec.worker.clone();
                    let (engine, store) = (Arc::clone(&self.engine), Arc::clone(&self.store));

                    let result = task::spawn_blocking(move || {
                        run_train(engine.as_ref(), &store, &spec)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        TrainingResult::Failed(TaskFailure::new(
                            worker,
                            FailureKind::Engine,
                            format!("the trainer task died: {e}"),
                        ))
                    });

                    Command::Trained(result)
                }
                Command::Predict(spec) => {
                    let (engine, store) = (Arc::clone(&self.engine), Arc::clone(&self.store));
                    let name = self.address.clone();

                    let result = task::spawn_blocking(move || {
                        run_predict(engine.as_ref(), &store, &name, &spec)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(TaskFailure::new(
                            self.address.as_str(),
                            FailureKind::Engine,
                            format!("the prediction task died: {e}"),
                        ))
                    });

                    match result {
                        Ok(preds) => {
                            let shape = Command::Predicted {
                                rows: preds.rows(),
                                cols: preds.cols(),
                            };
                            tx.send(&Msg::Control(shape)).await?;
                            tx.send(&Msg::Data(Payload::Predictions(preds.values())))
                                .await?;
                            continue;
                        }
                        Err(failure) => Command::Failed(failure),
                    }
                }
                Command::Disconnect => {
                    debug!("coordinator disconnected");
                    return Ok(());
                }
                cmd => {
                    let text = format!("unexpected command {cmd:?}");
                    tx.send(&Msg::Err(text.into())).await?;
                    continue;
                }
            };

            tx.send(&Msg::Control(reply)).await?;
        }
    }
}
