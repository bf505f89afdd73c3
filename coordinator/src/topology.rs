//! Deterministic assignment of ring identities to the workers of a round.

use booster::{
    Params,
    network::{LISTEN_TIME_OUT, LOCAL_LISTEN_PORT, MACHINES, NUM_MACHINES},
};

use crate::{TopologyErr, WorkerAddress};

/// The engine's view of the ring, as seen by a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    machines: Vec<String>,
    local_listen_port: u16,
    listen_time_out: u64,
}

impl Topology {
    /// Every `host:port` ring endpoint, in round order.
    pub fn machines(&self) -> &[String] {
        &self.machines
    }

    /// The machines list in its wire form, comma separated without spaces.
    pub fn machines_string(&self) -> String {
        self.machines.join(",")
    }

    pub fn local_listen_port(&self) -> u16 {
        self.local_listen_port
    }

    pub fn num_machines(&self) -> usize {
        self.machines.len()
    }

    /// Seconds the engine waits for every peer to join.
    pub fn listen_time_out(&self) -> u64 {
        self.listen_time_out
    }

    /// The engine parameters describing this topology.
    pub fn to_params(&self) -> Params {
        Params::new()
            .with(MACHINES, self.machines_string())
            .with(LOCAL_LISTEN_PORT, self.local_listen_port)
            .with(NUM_MACHINES, self.num_machines())
            .with(LISTEN_TIME_OUT, self.listen_time_out)
    }
}

/// Builds the topology for `local` out of every worker of the round.
///
/// The i-th worker of `addresses` listens on `base_port + i` at its own host.
/// The addresses are used exactly in the given order, so every worker of a
/// round must be handed the same list.
///
/// # Arguments
/// * `addresses` - Every worker of the round, in round order.
/// * `local` - The worker this topology is built for.
/// * `base_port` - The ring port of the first worker.
/// * `listen_time_out` - Seconds to wait for the ring to form.
///
/// # Errors
/// * `TopologyErr::AddressNotFound` if `local` isn't in `addresses`.
/// * `TopologyErr::PortRangeExhausted` if the last port wouldn't fit in a `u16`.
pub fn build_topology(
    addresses: &[WorkerAddress],
    local: &WorkerAddress,
    base_port: u16,
    listen_time_out: u64,
) -> Result<Topology, TopologyErr> {
    let last_port = base_port as usize + addresses.len().saturating_sub(1);
    if last_port > u16::MAX as usize {
        return Err(TopologyErr::PortRangeExhausted {
            base_port,
            workers: addresses.len(),
        });
    }

    let index = addresses
        .iter()
        .position(|addr| addr == local)
        .ok_or_else(|| TopologyErr::AddressNotFound {
            address: local.to_string(),
        })?;

    let machines = addresses
        .iter()
        .enumerate()
        .map(|(i, addr)| format!("{}:{}", addr.host(), base_port as usize + i))
        .collect();

    Ok(Topology {
        machines,
        local_listen_port: base_port + index as u16,
        listen_time_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(raw: &[&str]) -> Vec<WorkerAddress> {
        raw.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn assigns_ports_by_position() {
        let workers = addrs(&[
            "tcp://192.168.0.1:34545",
            "tcp://192.168.0.2:34346",
            "tcp://192.168.0.3:33122",
        ]);

        let topology = build_topology(&workers, &workers[1], 12400, 120).unwrap();

        assert_eq!(
            topology.machines_string(),
            "192.168.0.1:12400,192.168.0.2:12401,192.168.0.3:12402"
        );
        assert_eq!(topology.local_listen_port(), 12401);
        assert_eq!(topology.num_machines(), 3);
        assert_eq!(topology.listen_time_out(), 120);
    }

    #[test]
    fn every_worker_sees_the_same_machines() {
        let workers = addrs(&["tcp://b:1", "tcp://a:2", "tcp://c:3"]);

        let topologies: Vec<_> = workers
            .iter()
            .map(|w| build_topology(&workers, w, 20000, 30).unwrap())
            .collect();

        for (i, t) in topologies.iter().enumerate() {
            assert_eq!(t.machines(), topologies[0].machines());
            assert_eq!(t.local_listen_port(), 20000 + i as u16);
        }
        assert_eq!(topologies[0].machines()[0], "b:20000");
    }

    #[test]
    fn is_deterministic() {
        let workers = addrs(&["tcp://10.0.0.1:1", "tcp://10.0.0.2:2"]);
        let a = build_topology(&workers, &workers[0], 12400, 60).unwrap();
        let b = build_topology(&workers, &workers[0], 12400, 60).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicated_hosts_get_distinct_ports() {
        let workers = addrs(&["tcp://127.0.0.1:1", "tcp://127.0.0.1:2"]);
        let topology = build_topology(&workers, &workers[1], 12400, 60).unwrap();
        assert_eq!(topology.machines_string(), "127.0.0.1:12400,127.0.0.1:12401");
    }

    #[test]
    fn single_worker_round() {
        let workers = addrs(&["tcp://10.0.0.7:5555"]);
        let topology = build_topology(&workers, &workers[0], 12400, 120).unwrap();
        assert_eq!(topology.machines_string(), "10.0.0.7:12400");
        assert_eq!(topology.local_listen_port(), 12400);
        assert_eq!(topology.num_machines(), 1);
    }

    #[test]
    fn unknown_local_address() {
        let workers = addrs(&["tcp://10.0.0.1:1", "tcp://10.0.0.2:2"]);
        let stranger: WorkerAddress = "tcp://10.0.0.3:3".parse().unwrap();

        let err = build_topology(&workers, &stranger, 12400, 120).unwrap_err();
        assert_eq!(
            err,
            TopologyErr::AddressNotFound {
                address: "tcp://10.0.0.3:3".into()
            }
        );
    }

    #[test]
    fn never_wraps_ports() {
        let workers = addrs(&["tcp://a:1", "tcp://b:2"]);
        let err = build_topology(&workers, &workers[0], u16::MAX, 120).unwrap_err();
        assert!(matches!(err, TopologyErr::PortRangeExhausted { workers: 2, .. }));

        assert!(build_topology(&workers[..1], &workers[0], u16::MAX, 120).is_ok());
    }

    #[test]
    fn wire_params_are_exact() {
        let workers = addrs(&["tcp://10.0.0.1:1", "tcp://10.0.0.2:2"]);
        let params = build_topology(&workers, &workers[1], 12400, 90)
            .unwrap()
            .to_params();

        assert_eq!(params.get_str(MACHINES).unwrap(), Some("10.0.0.1:12400,10.0.0.2:12401"));
        assert_eq!(params.get_u64(LOCAL_LISTEN_PORT).unwrap(), Some(12401));
        assert_eq!(params.get_u64(NUM_MACHINES).unwrap(), Some(2));
        assert_eq!(params.get_u64(LISTEN_TIME_OUT).unwrap(), Some(90));
        assert_eq!(params.len(), 4);
    }
}
