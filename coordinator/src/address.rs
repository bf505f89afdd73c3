use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::TopologyErr;

/// A worker's coordination address, `[scheme://]host:port`.
///
/// The port is the cluster's own identifier for the worker and never the
/// engine's ring port. Two addresses are equal when their text is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerAddress {
    raw: String,
    host: String,
    port: u16,
}

impl WorkerAddress {
    /// Parses `raw` as a worker address.
    ///
    /// # Errors
    /// Returns `TopologyErr::InvalidAddress` when there's no host or no valid port.
    pub fn parse(raw: &str) -> Result<Self, TopologyErr> {
        let invalid = |msg: &str| TopologyErr::InvalidAddress {
            address: raw.to_string(),
            msg: msg.to_string(),
        };

        let rest = raw.split_once("://").map_or(raw, |(_, rest)| rest);
        let rest = rest.trim_end_matches('/');
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let port = port.parse().map_err(|_| invalid("the port isn't a number"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            raw: raw.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// The bare host, without scheme, port or IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Display for WorkerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for WorkerAddress {
    type Err = TopologyErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WorkerAddress {
    type Error = TopologyErr;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WorkerAddress> for String {
    fn from(value: WorkerAddress) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_and_port() {
        let addr = WorkerAddress::parse("tcp://192.168.0.1:34545").unwrap();
        assert_eq!(addr.host(), "192.168.0.1");
        assert_eq!(addr.port(), 34545);
        assert_eq!(addr.to_string(), "tcp://192.168.0.1:34545");

        let addr = WorkerAddress::parse("worker-3:8786").unwrap();
        assert_eq!(addr.host(), "worker-3");
    }

    #[test]
    fn strips_ipv6_brackets() {
        let addr = WorkerAddress::parse("tcp://[::1]:9000").unwrap();
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn compares_by_text() {
        let a = WorkerAddress::parse("tcp://10.0.0.1:1").unwrap();
        let b = WorkerAddress::parse("10.0.0.1:1").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, "tcp://10.0.0.1:1".parse().unwrap());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "tcp://host", "tcp://:80", "host:port", "host:70000"] {
            assert!(
                matches!(WorkerAddress::parse(raw), Err(TopologyErr::InvalidAddress { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn serde_uses_the_raw_text() {
        let addr = WorkerAddress::parse("tcp://127.0.0.1:4000").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"tcp://127.0.0.1:4000\"");

        let back: WorkerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<WorkerAddress>("\"nope\"").is_err());
    }
}
