//! Dialer capability consumed from the transport layer
//!
//! The routing core does not understand upstream wire protocols. Everything
//! it needs from a transport is captured by the [`Dialer`] trait: open a TCP
//! stream or UDP socket to a target address, and expose a stable label for
//! logging.
//!
//! Two implementations ship with the crate:
//!
//! - [`DirectDialer`]: direct egress, optionally pinned to a source
//!   interface or source address.
//! - [`RejectDialer`]: a sink whose dials fail immediately with
//!   [`DialError::RejectedByPolicy`], used to enforce time-window rejection.
//!
//! Hosts wrap their own transports (SOCKS5, encrypted tunnels, …) by
//! implementing `Dialer` and handing the object to
//! [`Forwarder::new`](crate::forwarder::Forwarder::new).

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};

use crate::error::DialError;

mod direct;
mod reject;

pub use direct::DirectDialer;
pub use reject::RejectDialer;

/// Capability to open outbound connections to a `host:port` target.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a TCP stream to `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`DialError`] if connection establishment fails or times out.
    async fn dial(&self, addr: &str) -> Result<TcpStream, DialError>;

    /// Open a UDP socket connected to `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`DialError`] if socket setup or the connect fails.
    async fn dial_udp(&self, addr: &str) -> Result<UdpSocket, DialError>;

    /// Stable URL/label for this dialer, used in log lines.
    fn addr(&self) -> &str;
}
