//! Direct egress dialer
//!
//! Connects straight to the destination, optionally pinned to a source
//! interface (`SO_BINDTODEVICE`) or a source address. Connection
//! establishment is bounded by the configured dial timeout.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use super::Dialer;
use crate::error::DialError;

/// Direct egress: no upstream proxy between the router and the destination.
///
/// The `interface` config option is a single string that names either a
/// source IP address or a network interface; it is disambiguated here by
/// attempting an address parse first.
pub struct DirectDialer {
    /// Source interface name for `SO_BINDTODEVICE`, if configured.
    bind_interface: Option<String>,
    /// Source address to bind before connecting, if configured.
    bind_address: Option<IpAddr>,
    /// Bound on connection establishment; zero disables the bound.
    dial_timeout: Duration,
}

impl DirectDialer {
    /// Stable label for direct dialers.
    pub const LABEL: &'static str = "direct://";

    /// Create a direct dialer.
    ///
    /// `interface` is the raw `interface` config value: empty for none, a
    /// source IP address, or an interface name.
    #[must_use]
    pub fn new(interface: &str, dial_timeout: Duration) -> Self {
        let (bind_interface, bind_address) = if interface.is_empty() {
            (None, None)
        } else if let Ok(addr) = interface.parse::<IpAddr>() {
            (None, Some(addr))
        } else {
            (Some(interface.to_string()), None)
        };

        Self {
            bind_interface,
            bind_address,
            dial_timeout,
        }
    }

    /// Resolve `addr` to the first usable socket address.
    async fn resolve(&self, addr: &str) -> Result<SocketAddr, DialError> {
        lookup_host(addr)
            .await
            .map_err(|e| DialError::dial(addr, e.to_string()))?
            .next()
            .ok_or_else(|| DialError::dial(addr, "no addresses resolved"))
    }

    /// Apply the configured source bindings to a fresh socket.
    fn bind_source(&self, socket: &Socket, dest: SocketAddr) -> Result<(), DialError> {
        if let Some(ref iface) = self.bind_interface {
            socket
                .bind_device(Some(iface.as_bytes()))
                .map_err(|e| DialError::dial(dest.to_string(), format!("bind to {iface}: {e}")))?;
            debug!(interface = %iface, "bound socket to source interface");
        }

        if let Some(ip) = self.bind_address {
            let local = SocketAddr::new(ip, 0);
            socket
                .bind(&local.into())
                .map_err(|e| DialError::dial(dest.to_string(), format!("bind to {local}: {e}")))?;
            debug!(source = %ip, "bound socket to source address");
        }

        Ok(())
    }

    /// Connect a TCP stream to `dest`, honoring source bindings.
    async fn connect_tcp(&self, dest: SocketAddr) -> Result<TcpStream, DialError> {
        if self.bind_interface.is_none() && self.bind_address.is_none() {
            return TcpStream::connect(dest)
                .await
                .map_err(|e| DialError::dial(dest.to_string(), e.to_string()));
        }

        let domain = Domain::for_address(dest);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;
        self.bind_source(&socket, dest)?;
        socket
            .set_nonblocking(true)
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;

        let socket = tokio::net::TcpSocket::from_std_stream(socket.into());
        socket
            .connect(dest)
            .await
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, addr: &str) -> Result<TcpStream, DialError> {
        let dest = self.resolve(addr).await?;

        let stream = if self.dial_timeout.is_zero() {
            self.connect_tcp(dest).await?
        } else {
            timeout(self.dial_timeout, self.connect_tcp(dest))
                .await
                .map_err(|_| DialError::timeout(addr, self.dial_timeout.as_secs()))??
        };

        // Low-latency relaying matters more than throughput batching here.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr, error = %e, "failed to set TCP_NODELAY");
        }

        Ok(stream)
    }

    async fn dial_udp(&self, addr: &str) -> Result<UdpSocket, DialError> {
        let dest = self.resolve(addr).await?;

        let domain = Domain::for_address(dest);
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;
        self.bind_source(&socket, dest)?;
        if self.bind_address.is_none() {
            let any: SocketAddr = if dest.is_ipv4() {
                "0.0.0.0:0".parse().expect("literal addr")
            } else {
                "[::]:0".parse().expect("literal addr")
            };
            socket
                .bind(&any.into())
                .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;
        }
        socket
            .set_nonblocking(true)
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;
        socket
            .connect(dest)
            .await
            .map_err(|e| DialError::dial(dest.to_string(), e.to_string()))?;

        Ok(socket)
    }

    fn addr(&self) -> &str {
        Self::LABEL
    }
}

impl std::fmt::Debug for DirectDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectDialer")
            .field("bind_interface", &self.bind_interface)
            .field("bind_address", &self.bind_address)
            .field("dial_timeout", &self.dial_timeout)
            .finish()
    }
}
