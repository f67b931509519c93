//! Reject dialer
//!
//! A sink transport whose dials fail immediately. The strategy group hands
//! it out when a time window forbids forwarding, so callers can close the
//! client connection cleanly instead of hanging.

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};

use super::Dialer;
use crate::error::DialError;

/// Dialer that rejects every connection with
/// [`DialError::RejectedByPolicy`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectDialer;

impl RejectDialer {
    /// Stable label for reject dialers.
    pub const LABEL: &'static str = "reject://";

    /// Create a reject dialer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialer for RejectDialer {
    async fn dial(&self, _addr: &str) -> Result<TcpStream, DialError> {
        Err(DialError::RejectedByPolicy)
    }

    async fn dial_udp(&self, _addr: &str) -> Result<UdpSocket, DialError> {
        Err(DialError::RejectedByPolicy)
    }

    fn addr(&self) -> &str {
        Self::LABEL
    }
}
