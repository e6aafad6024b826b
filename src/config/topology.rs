use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::NodeAddrs;
use crate::Result;

const PORT_STRIDE: u16 = 2000;
const CONTROL_OFFSET: u16 = 1000;

/// Address layout: node `i` (0 = leader) serves clients on
/// `base_port + 2000 * i` and control on `base_port + 2000 * i + 1000`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopologyConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
        }
    }
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_port == 0 {
            return Err(Error::InvalidConfig("topology.base_port must be non-zero".into()));
        }
        Ok(())
    }

    /// Builds a topology with a leader and `replicas` replicas.
    pub fn topology(
        &self,
        replicas: usize,
    ) -> Result<Topology> {
        let leader = self.addrs(0)?;
        let replicas = (1..=replicas).map(|i| self.addrs(i)).collect::<Result<Vec<_>>>()?;
        Ok(Topology { leader, replicas })
    }

    fn addrs(
        &self,
        index: usize,
    ) -> Result<NodeAddrs> {
        let client = u16::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(PORT_STRIDE))
            .and_then(|offset| self.base_port.checked_add(offset))
            .ok_or_else(|| {
                Error::InvalidConfig(format!("node #{index} does not fit above port {}", self.base_port))
            })?;
        let control = client.checked_add(CONTROL_OFFSET).ok_or_else(|| {
            Error::InvalidConfig(format!("control port of node #{index} overflows"))
        })?;
        Ok(NodeAddrs::new(
            SocketAddr::new(self.host, client),
            SocketAddr::new(self.host, control),
        ))
    }
}

/// Concrete addresses of the nodes a scenario spawns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub leader: NodeAddrs,
    pub replicas: Vec<NodeAddrs>,
}

impl Topology {
    /// Keeps the leader and the first `count` replicas.
    pub fn with_replicas(
        &self,
        count: usize,
    ) -> Result<Topology> {
        if count > self.replicas.len() {
            return Err(Error::InvalidConfig(format!(
                "topology has {} replicas, {} requested",
                self.replicas.len(),
                count
            )));
        }
        Ok(Topology {
            leader: self.leader,
            replicas: self.replicas[..count].to_vec(),
        })
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_base_port() -> u16 {
    40000
}
