//! Shared components for unit tests: stub node processes that never touch
//! the OS, and a launcher that hands them out.
mod stub_process;

pub(crate) use stub_process::*;

use std::net::SocketAddr;

use crate::NodeAddrs;

pub(crate) fn addrs(client: u16) -> NodeAddrs {
    NodeAddrs::new(
        SocketAddr::from(([127, 0, 0, 1], client)),
        SocketAddr::from(([127, 0, 0, 1], client + 1000)),
    )
}
