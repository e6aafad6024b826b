use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Something accepts TCP connections on `addr` within `connect_timeout`.
///
/// A host that silently drops SYNs counts as not ready once the timeout
/// elapses.
pub(crate) async fn is_server_ready(
    addr: SocketAddr,
    connect_timeout: Duration,
) -> bool {
    matches!(timeout(connect_timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
