//! Ring formation between the engine instances of a distributed round.
//!
//! Every instance binds `local_listen_port`, dials every other machine and
//! greets it with its own rank, then waits for a greeting from every peer. The
//! whole exchange is bounded by `listen_time_out`. The sockets are released
//! when the `Ring` is dropped.

use std::{
    io::{self, Read, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::{EngineErr, Params, Result};

pub const MACHINES: &str = "machines";
pub const LOCAL_LISTEN_PORT: &str = "local_listen_port";
pub const NUM_MACHINES: &str = "num_machines";
pub const LISTEN_TIME_OUT: &str = "listen_time_out";

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// One entry of the `machines` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub host: String,
    pub port: u16,
}

/// The network section of the engine's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    machines: Vec<Machine>,
    rank: usize,
    listen_time_out: Duration,
}

impl NetworkConfig {
    /// Reads the network keys out of `params`.
    ///
    /// A missing `machines` key means a single machine ring listening on
    /// `local_listen_port`.
    ///
    /// # Errors
    /// Returns `EngineErr::InvalidNetwork` if the keys contradict each other.
    pub fn from_params(params: &Params) -> Result<Self> {
        let port = params
            .get_u64(LOCAL_LISTEN_PORT)?
            .ok_or_else(|| EngineErr::InvalidNetwork(format!("missing {LOCAL_LISTEN_PORT}")))?;
        let port = u16::try_from(port)
            .map_err(|_| EngineErr::InvalidNetwork(format!("port {port} is out of range")))?;

        let machines = match params.get_str(MACHINES)? {
            Some(machines) => parse_machines(machines)?,
            None => vec![Machine {
                host: "127.0.0.1".into(),
                port,
            }],
        };

        if let Some(num_machines) = params.get_u64(NUM_MACHINES)? {
            if num_machines as usize != machines.len() {
                return Err(EngineErr::InvalidNetwork(format!(
                    "{NUM_MACHINES} is {num_machines} but {} machines were listed",
                    machines.len()
                )));
            }
        }

        let mut ranks = machines
            .iter()
            .enumerate()
            .filter(|(_, machine)| machine.port == port);
        let rank = match (ranks.next(), ranks.next()) {
            (Some((rank, _)), None) => rank,
            (None, _) => {
                return Err(EngineErr::InvalidNetwork(format!(
                    "no machine listens on {LOCAL_LISTEN_PORT} {port}"
                )))
            }
            (Some(_), Some(_)) => {
                return Err(EngineErr::InvalidNetwork(format!(
                    "more than one machine listens on port {port}"
                )))
            }
        };

        let listen_time_out = Duration::from_secs(params.get_u64(LISTEN_TIME_OUT)?.unwrap_or(120));

        Ok(Self {
            machines,
            rank,
            listen_time_out,
        })
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn local_listen_port(&self) -> u16 {
        self.machines[self.rank].port
    }

    pub fn listen_time_out(&self) -> Duration {
        self.listen_time_out
    }
}

fn parse_machines(machines: &str) -> Result<Vec<Machine>> {
    machines
        .split(',')
        .map(|entry| {
            let (host, port) = entry.trim().rsplit_once(':').ok_or_else(|| {
                EngineErr::InvalidNetwork(format!("machine `{entry}` is not host:port"))
            })?;

            let port = port.parse().map_err(|_| {
                EngineErr::InvalidNetwork(format!("machine `{entry}` has an invalid port"))
            })?;

            let host = host.trim_start_matches('[').trim_end_matches(']');
            if host.is_empty() {
                return Err(EngineErr::InvalidNetwork(format!(
                    "machine `{entry}` has no host"
                )));
            }

            Ok(Machine {
                host: host.to_string(),
                port,
            })
        })
        .collect()
}

/// A formed ring. Holds the listening socket and one stream per direction and peer.
#[derive(Debug)]
pub struct Ring {
    rank: usize,
    size: usize,
    port: u16,
    _listener: TcpListener,
    _peers: Vec<TcpStream>,
}

impl Ring {
    /// Joins the ring described by `config`, blocking until every peer greeted us.
    ///
    /// # Errors
    /// Returns `EngineErr::Bind` if the port is taken and `EngineErr::HandshakeTimeout`
    /// if the peers didn't show up in time.
    pub fn connect(config: &NetworkConfig) -> Result<Self> {
        let rank = config.rank;
        let size = config.machines.len();
        let port = config.local_listen_port();
        let secs = config.listen_time_out.as_secs();

        let listener = TcpListener::bind((wildcard(&config.machines[rank]), port))
            .map_err(|source| EngineErr::Bind { port, source })?;
        listener.set_nonblocking(true)?;
        debug!(rank = rank, port = port; "listening for peers");

        let deadline = Instant::now() + config.listen_time_out;
        let timeout = |connected| EngineErr::HandshakeTimeout {
            connected,
            expected: size - 1,
            secs,
        };

        let mut peers = Vec::with_capacity(2 * size.saturating_sub(1));

        for (i, machine) in config.machines.iter().enumerate() {
            if i == rank {
                continue;
            }

            let Some(mut stream) = dial(machine, deadline)? else {
                return Err(timeout(peers.len()));
            };

            stream.write_all(&(rank as u32).to_be_bytes())?;
            peers.push(stream);
        }

        let mut greeted = vec![false; size];
        greeted[rank] = true;
        let mut connected = 0;

        while connected + 1 < size {
            let mut stream = match listener.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(timeout(connected));
                    }
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(remaining.max(POLL_INTERVAL)))?;

            let mut hello = [0; 4];
            match stream.read_exact(&mut hello) {
                Ok(()) => {}
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Err(timeout(connected));
                }
                Err(e) => return Err(e.into()),
            }

            let peer = u32::from_be_bytes(hello) as usize;
            if peer >= size || greeted[peer] {
                return Err(EngineErr::InvalidNetwork(format!(
                    "unexpected greeting from rank {peer}"
                )));
            }

            greeted[peer] = true;
            connected += 1;
            peers.push(stream);
        }

        info!(rank = rank, size = size; "ring formed");

        Ok(Self {
            rank,
            size,
            port,
            _listener: listener,
            _peers: peers,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        debug!(rank = self.rank, port = self.port; "leaving ring");
    }
}

/// The unspecified address of the family the peers reach `machine` by.
fn wildcard(machine: &Machine) -> IpAddr {
    let ipv6 = match machine.host.parse::<IpAddr>() {
        Ok(ip) => ip.is_ipv6(),
        Err(_) => (machine.host.as_str(), machine.port)
            .to_socket_addrs()
            .map(|addrs| {
                let addrs: Vec<_> = addrs.collect();
                !addrs.is_empty() && addrs.iter().all(SocketAddr::is_ipv6)
            })
            .unwrap_or(false),
    };

    if ipv6 {
        Ipv6Addr::UNSPECIFIED.into()
    } else {
        Ipv4Addr::UNSPECIFIED.into()
    }
}

fn dial(machine: &Machine, deadline: Instant) -> Result<Option<TcpStream>> {
    loop {
        for addr in (machine.host.as_str(), machine.port).to_socket_addrs()? {
            if let Ok(stream) = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                return Ok(Some(stream));
            }
        }

        if Instant::now() >= deadline {
            return Ok(None);
        }

        thread::sleep(POLL_INTERVAL);
    }
}
