use std::{env, io, sync::Arc, thread};

use booster::BaselineEngine;
use log::info;
use tokio::{net::TcpListener, signal};
use worker::Node;

const DEFAULT_HOST: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let addr = format!(
        "{}:{}",
        env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
        env::var("PORT").map_err(io::Error::other)?,
    );

    let ncores = thread::available_parallelism().map_or(1, |n| n.get());
    let listener = TcpListener::bind(&addr).await?;
    info!(ncores = ncores; "listening at {addr}");

    let node = Arc::new(Node::new(addr, Arc::new(BaselineEngine::new()), ncores));

    tokio::select! {
        ret = node.serve(listener) => ret?,
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}
