//! Forwarder: an upstream egress endpoint with health state
//!
//! A [`Forwarder`] wraps a [`Dialer`] with the mutable status the strategy
//! engine and health checker operate on: an enabled flag, a consecutive
//! failure counter, a latency estimate from the most recent successful
//! probe, and an immutable selection priority.
//!
//! Status transitions notify registered observers (the owning strategy
//! group) so the group can recompute its available subset. The observer list
//! is append-only and must be complete before health checks start.
//!
//! The invariant `enabled == (failures < max_failures)` holds after every
//! transition: `enable` zeroes the counter, `disable` saturates it, and
//! `inc_failures` flips the flag exactly when the threshold is reached.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::{TcpStream, UdpSocket};

use crate::dialer::{Dialer, DirectDialer, RejectDialer};
use crate::error::{ConfigError, DialError};

/// Callback invoked whenever a forwarder flips between enabled and disabled.
pub type StatusObserver = Box<dyn Fn(&Forwarder) + Send + Sync>;

/// An upstream egress endpoint with attached health state.
///
/// Forwarders are exclusively owned by one strategy group and always handled
/// through `Arc` so observers and probe tasks can hold them.
pub struct Forwarder {
    dialer: Arc<dyn Dialer>,
    /// Stable spec string for logging, e.g. `direct://` or the original URL.
    url: String,
    /// Selection priority; higher is preferred. Immutable after construction.
    priority: u32,
    /// Consecutive failures needed to disable this forwarder.
    max_failures: u32,
    enabled: AtomicBool,
    failures: AtomicU32,
    /// Most recent probe latency in nanoseconds; 0 means unmeasured.
    latency_ns: AtomicI64,
    observers: RwLock<Vec<StatusObserver>>,
}

impl Forwarder {
    /// Wrap a host-provided dialer.
    ///
    /// The forwarder starts enabled with zero failures and unmeasured
    /// latency.
    #[must_use]
    pub fn new(dialer: Arc<dyn Dialer>, priority: u32, max_failures: u32) -> Arc<Self> {
        let url = dialer.addr().to_string();
        Arc::new(Self {
            dialer,
            url,
            priority,
            max_failures,
            enabled: AtomicBool::new(true),
            failures: AtomicU32::new(0),
            latency_ns: AtomicI64::new(0),
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Build a forwarder from a spec URL.
    ///
    /// Recognized forms are `direct://` and `reject://`, optionally with a
    /// `priority=N` query parameter (`scheme://host?priority=2`). Other
    /// schemes belong to host-provided transports and are rejected here.
    ///
    /// `interface` and `dial_timeout` configure the direct dialer; they are
    /// ignored for `reject://`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedUrl`] for specs without a scheme or
    /// with an unparsable priority, and [`ConfigError::UnsupportedScheme`]
    /// for schemes this crate has no dialer for.
    pub fn from_url(
        spec: &str,
        interface: &str,
        dial_timeout: Duration,
        max_failures: u32,
    ) -> Result<Arc<Self>, ConfigError> {
        let (scheme, rest) = spec
            .split_once("://")
            .ok_or_else(|| ConfigError::malformed_url(spec, "missing scheme"))?;

        let priority = parse_priority(rest)
            .map_err(|reason| ConfigError::malformed_url(spec, reason))?;

        let dialer: Arc<dyn Dialer> = match scheme.to_ascii_lowercase().as_str() {
            "direct" => Arc::new(DirectDialer::new(interface, dial_timeout)),
            "reject" => Arc::new(RejectDialer::new()),
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };

        // Keep the user's spec string as the log label.
        Ok(Arc::new(Self {
            dialer,
            url: spec.to_string(),
            priority,
            max_failures,
            enabled: AtomicBool::new(true),
            failures: AtomicU32::new(0),
            latency_ns: AtomicI64::new(0),
            observers: RwLock::new(Vec::new()),
        }))
    }

    /// Open a TCP stream to `addr` through this forwarder's transport.
    ///
    /// # Errors
    ///
    /// Propagates the dialer's [`DialError`]; the caller reports the outcome
    /// via [`StrategyGroup::record_outcome`](crate::strategy::StrategyGroup::record_outcome).
    pub async fn dial(&self, addr: &str) -> Result<TcpStream, DialError> {
        self.dialer.dial(addr).await
    }

    /// Open a connected UDP socket to `addr` through this forwarder's
    /// transport.
    ///
    /// # Errors
    ///
    /// Propagates the dialer's [`DialError`].
    pub async fn dial_udp(&self, addr: &str) -> Result<UdpSocket, DialError> {
        self.dialer.dial_udp(addr).await
    }

    /// Stable spec string for logging.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.url
    }

    /// Selection priority; higher is preferred.
    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Whether the forwarder is currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Failure threshold that disables this forwarder.
    #[must_use]
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Latency of the most recent successful probe in nanoseconds; 0 means
    /// unmeasured.
    #[must_use]
    pub fn latency(&self) -> i64 {
        self.latency_ns.load(Ordering::Acquire)
    }

    /// Record a probe latency in nanoseconds.
    pub fn set_latency(&self, ns: i64) {
        self.latency_ns.store(ns, Ordering::Release);
    }

    /// Mark the forwarder enabled and reset its failure counter.
    ///
    /// Idempotent: observers fire only when the flag actually flips. The
    /// counter reset happens on every call so a successful dial always
    /// restarts the consecutive-failure run.
    pub fn enable(&self) {
        self.failures.store(0, Ordering::Release);
        if !self.enabled.swap(true, Ordering::AcqRel) {
            self.notify();
        }
    }

    /// Mark the forwarder disabled.
    ///
    /// Idempotent: observers fire only when the flag actually flips. The
    /// failure counter saturates at the threshold so the status invariant
    /// holds.
    pub fn disable(&self) {
        self.failures.store(self.max_failures, Ordering::Release);
        if self.enabled.swap(false, Ordering::AcqRel) {
            self.notify();
        }
    }

    /// Record one dial failure; disables the forwarder when the consecutive
    /// count reaches the threshold.
    pub fn inc_failures(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.max_failures && self.enabled.swap(false, Ordering::AcqRel) {
            self.notify();
        }
    }

    /// Register a status-change observer.
    ///
    /// Observers run in registration order on every enabled/disabled flip,
    /// receiving the transitioned forwarder. Registration must complete
    /// before health checks start; it is not synchronized against in-flight
    /// transitions.
    pub fn add_observer(&self, observer: StatusObserver) {
        self.observers.write().push(observer);
    }

    fn notify(&self) {
        for observer in self.observers.read().iter() {
            observer(self);
        }
    }
}

/// Parse an optional `priority=N` query parameter from the part after
/// `scheme://`.
fn parse_priority(rest: &str) -> Result<u32, String> {
    let Some((_, query)) = rest.split_once('?') else {
        return Ok(0);
    };

    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("priority=") {
            return value
                .parse::<u32>()
                .map_err(|_| format!("invalid priority '{value}'"));
        }
    }

    Ok(0)
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled())
            .field("failures", &self.failures())
            .field("max_failures", &self.max_failures)
            .field("latency_ns", &self.latency())
            .finish_non_exhaustive()
    }
}
