//! Health checking for strategy groups
//!
//! One probe task per forwarder, spawned when a group's checker starts.
//! Tasks run independently and never synchronize with each other; each owns
//! a private 4-byte response buffer and a backoff ladder.
//!
//! A probe dials the configured check site through the forwarder, writes a
//! minimal `HTTP/1.0` request, and reads the first four response bytes. Any
//! dial/write/read error, a response not starting with `HTTP`, or an elapsed
//! time beyond the check timeout disables the forwarder; success records the
//! measured latency and re-enables it. Transitions are observed by the
//! owning group, which recomputes its available subset.
//!
//! Probe cadence: the task sleeps `interval * wait` before each attempt
//! (`wait` starts at 0, so every forwarder is probed once immediately).
//! Success pins `wait` to 1; failures double it up to a cap of 16. Once a
//! higher tier is live, lower-tier forwarders are skipped after their first
//! probe.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::forwarder::Forwarder;
use crate::strategy::StrategyGroup;

/// Request written to the check site.
const PROBE_REQUEST: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

/// Expected response prefix.
const PROBE_PREFIX: &[u8; 4] = b"HTTP";

/// Backoff cap, in multiples of the check interval.
const MAX_WAIT: u8 = 16;

/// Background health checker for one strategy group.
///
/// Dropping the checker aborts its probe tasks; an in-flight probe's
/// connection is closed when the task dies.
pub struct HealthChecker {
    tasks: Vec<JoinHandle<()>>,
}

impl HealthChecker {
    /// Spawn one probe task per forwarder of `group`.
    ///
    /// The reject forwarder is not part of the group's pool and is never
    /// probed. Tasks hold the group weakly: when the last strong reference
    /// goes away, in-flight loops wind down on their own.
    #[must_use]
    pub fn start(group: Arc<StrategyGroup>) -> Self {
        let tasks = group
            .forwarders()
            .iter()
            .map(|fwdr| {
                let group = Arc::downgrade(&group);
                let fwdr = Arc::clone(fwdr);
                tokio::spawn(check_loop(group, fwdr))
            })
            .collect();

        Self { tasks }
    }

    /// Abort all probe tasks.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Number of running probe tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-forwarder probe loop.
async fn check_loop(group: Weak<StrategyGroup>, fwdr: Arc<Forwarder>) {
    let (interval, timeout, site, disabled_only) = match group.upgrade() {
        Some(g) => (
            g.config().check_interval(),
            g.config().check_timeout(),
            g.config().check_website.clone(),
            g.config().check_disabled_only,
        ),
        None => return,
    };

    let mut wait: u8 = 0;
    let mut buf = [0u8; 4];

    loop {
        tokio::time::sleep(interval * u32::from(wait)).await;

        let Some(g) = group.upgrade() else {
            return;
        };

        // The wait == 0 first pass probes every forwarder once; after that,
        // lower tiers are left alone while a higher tier is live.
        if wait > 0 && fwdr.priority() < g.active_priority() {
            continue;
        }
        drop(g);

        if fwdr.enabled() && disabled_only {
            // Keep the ladder ticking so the skip doesn't spin.
            wait = wait.max(1);
            continue;
        }

        if probe(&fwdr, &site, timeout, &mut buf).await {
            wait = 1;
            continue;
        }

        wait = wait.max(1).saturating_mul(2).min(MAX_WAIT);
    }
}

/// Run one probe attempt; returns whether the forwarder passed.
///
/// The enable/disable transition and its log line happen here, so the caller
/// only adjusts its backoff.
pub(crate) async fn probe(
    fwdr: &Arc<Forwarder>,
    site: &str,
    timeout: Duration,
    buf: &mut [u8; 4],
) -> bool {
    let start = Instant::now();

    let attempt = probe_io(fwdr, site, buf);
    let outcome = if timeout.is_zero() {
        attempt.await
    } else {
        match tokio::time::timeout(timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err("probe timed out".to_string()),
        }
    };

    if let Err(reason) = outcome {
        fwdr.disable();
        warn!(
            forwarder = fwdr.addr(),
            priority = fwdr.priority(),
            site,
            reason = %reason,
            "health check failed, forwarder disabled"
        );
        return false;
    }

    if buf != PROBE_PREFIX {
        fwdr.disable();
        warn!(
            forwarder = fwdr.addr(),
            priority = fwdr.priority(),
            site,
            response = %String::from_utf8_lossy(buf),
            "unexpected probe response, forwarder disabled"
        );
        return false;
    }

    let elapsed = start.elapsed();
    fwdr.set_latency(i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX));

    if !timeout.is_zero() && elapsed > timeout {
        fwdr.disable();
        warn!(
            forwarder = fwdr.addr(),
            priority = fwdr.priority(),
            site,
            elapsed = ?elapsed,
            "health check exceeded timeout, forwarder disabled"
        );
        return false;
    }

    fwdr.enable();
    info!(
        forwarder = fwdr.addr(),
        priority = fwdr.priority(),
        site,
        elapsed = ?elapsed,
        "health check passed, forwarder enabled"
    );
    true
}

/// Dial, write the request, read the 4-byte prefix.
async fn probe_io(fwdr: &Arc<Forwarder>, site: &str, buf: &mut [u8; 4]) -> Result<(), String> {
    let mut stream = fwdr
        .dial(site)
        .await
        .map_err(|e| format!("dial: {e}"))?;

    stream
        .write_all(PROBE_REQUEST)
        .await
        .map_err(|e| format!("write: {e}"))?;

    stream
        .read_exact(buf)
        .await
        .map_err(|e| format!("read: {e}"))?;

    debug!(forwarder = fwdr.addr(), site, "probe exchange complete");
    Ok(())
}
