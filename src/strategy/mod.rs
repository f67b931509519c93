//! Strategy groups: named forwarder pools with a selection policy
//!
//! A [`StrategyGroup`] owns an ordered set of forwarders (sorted by priority,
//! descending, stable on ties) and maintains the *available subset*: enabled
//! forwarders at the current active priority tier. Picks are served from
//! that subset through the group's [`Policy`]; forwarder status changes
//! arrive through observer callbacks and trigger incremental maintenance or
//! a full rebuild.
//!
//! Admission is gated by weekly time windows before any policy runs: an
//! empty `forwardtime` list allows always, and any matching `rejecttime`
//! window overrides the allow decision. A rejected pick returns the group's
//! reject forwarder, whose dials fail with `RejectedByPolicy`.
//!
//! When every forwarder is disabled the group still serves picks: it falls
//! back to round robin over the raw forwarder list so traffic keeps probing
//! paths until the health checker recovers one.
//!
//! # Locking
//!
//! The available subset sits behind a `parking_lot::RwLock`. Picks take the
//! read lock only for the duration of policy selection; observer callbacks
//! and rebuilds take the write lock. Forwarder scalars are atomics and never
//! need the lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use chrono::{Local, NaiveDateTime};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::checker::HealthChecker;
use crate::config::StrategyConfig;
use crate::dialer::{DirectDialer, RejectDialer};
use crate::error::ConfigError;
use crate::forwarder::Forwarder;

mod policy;

pub use policy::Policy;

/// A named, ordered set of forwarders plus a selection policy.
pub struct StrategyGroup {
    name: String,
    config: StrategyConfig,
    policy: Policy,
    /// All forwarders, sorted by priority descending, stable on ties.
    fwdrs: Vec<Arc<Forwarder>>,
    /// Enabled forwarders at the active priority tier.
    avail: RwLock<Vec<Arc<Forwarder>>>,
    /// Sink returned when a time window forbids forwarding.
    reject: Arc<Forwarder>,
    /// Shared round-robin counter, also used by the emergency path.
    index: AtomicU32,
    /// Active priority tier; 0 when no forwarder is enabled.
    priority: AtomicU32,
    /// Running health checker, if started.
    checker: Mutex<Option<HealthChecker>>,
    /// Back-reference handed to probe tasks; see [`check`](Self::check).
    self_ref: Weak<Self>,
}

impl StrategyGroup {
    /// Build a group from forwarder spec URLs.
    ///
    /// An empty URL list substitutes one implicit direct forwarder and
    /// forces the policy to round robin, whatever the config said.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any forwarder spec fails to parse.
    pub fn new(
        name: impl Into<String>,
        urls: &[String],
        config: StrategyConfig,
    ) -> Result<Arc<Self>, ConfigError> {
        let fwdrs = urls
            .iter()
            .map(|url| {
                Forwarder::from_url(
                    url,
                    &config.interface,
                    config.dial_timeout(),
                    config.max_failures,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_forwarders(name, fwdrs, config))
    }

    /// Build a group from already-constructed forwarders.
    ///
    /// This is the seam for hosts that wrap their own transports: construct
    /// forwarders over custom [`Dialer`](crate::dialer::Dialer)s and hand
    /// them over. The same empty-pool substitution as [`new`](Self::new)
    /// applies.
    #[must_use]
    pub fn from_forwarders(
        name: impl Into<String>,
        mut fwdrs: Vec<Arc<Forwarder>>,
        mut config: StrategyConfig,
    ) -> Arc<Self> {
        let name = name.into();
        config.normalize();

        if fwdrs.is_empty() {
            fwdrs.push(Forwarder::new(
                Arc::new(DirectDialer::new(&config.interface, config.dial_timeout())),
                0,
                config.max_failures,
            ));
            config.strategy = "rr".into();
            debug!(group = %name, "no forwarders configured, using direct");
        }

        // Stable sort keeps insertion order within a priority tier.
        fwdrs.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let policy = Policy::parse_lossy(&config.strategy, &name);
        let reject = Forwarder::new(Arc::new(RejectDialer::new()), 0, config.max_failures);

        let group = Arc::new_cyclic(|weak| Self {
            name,
            config,
            policy,
            fwdrs,
            avail: RwLock::new(Vec::new()),
            reject,
            index: AtomicU32::new(0),
            priority: AtomicU32::new(0),
            checker: Mutex::new(None),
            self_ref: weak.clone(),
        });

        for fwdr in &group.fwdrs {
            let weak: Weak<Self> = Arc::downgrade(&group);
            fwdr.add_observer(Box::new(move |f: &Forwarder| {
                if let Some(g) = weak.upgrade() {
                    g.on_forwarder_changed(f);
                }
            }));
        }

        group.rebuild_available();

        info!(group = %group.name, policy = %group.policy, "forwarding strategy ready");
        group
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Strategy settings this group was built from.
    #[must_use]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Selection policy in effect (after any fallback).
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// All forwarders in priority order.
    #[must_use]
    pub fn forwarders(&self) -> &[Arc<Forwarder>] {
        &self.fwdrs
    }

    /// The group's reject forwarder.
    #[must_use]
    pub fn reject_forwarder(&self) -> &Arc<Forwarder> {
        &self.reject
    }

    /// Current active priority tier; 0 when no forwarder is enabled.
    #[must_use]
    pub fn active_priority(&self) -> u32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Snapshot of the available subset.
    #[must_use]
    pub fn available(&self) -> Vec<Arc<Forwarder>> {
        self.avail.read().clone()
    }

    /// Pick a forwarder for `dst_addr` at the current wall-clock time.
    #[must_use]
    pub fn pick_forwarder(&self, dst_addr: &str) -> Arc<Forwarder> {
        self.pick_forwarder_at(dst_addr, Local::now().naive_local())
    }

    /// Pick a forwarder for `dst_addr` as of `now`.
    ///
    /// Admission first: `forwardtime` windows must allow the instant (an
    /// empty list allows always) and no `rejecttime` window may match.
    /// Rejected picks return the reject forwarder. With an empty available
    /// subset the pick round-robins over the raw forwarder list so possibly
    /// disabled paths keep carrying traffic until one recovers.
    #[must_use]
    pub fn pick_forwarder_at(&self, dst_addr: &str, now: NaiveDateTime) -> Arc<Forwarder> {
        let mut allowed = self.config.forward_time.is_empty()
            || self.config.forward_time.iter().any(|w| w.contains(&now));

        if !allowed {
            warn!(group = %self.name, dst = dst_addr, "outside forward windows, rejecting");
        } else if let Some(window) = self.config.reject_time.iter().find(|w| w.contains(&now)) {
            warn!(
                group = %self.name,
                window = %window,
                dst = dst_addr,
                "inside reject window, rejecting"
            );
            allowed = false;
        }

        if !allowed {
            return Arc::clone(&self.reject);
        }

        let avail = self.avail.read();
        if avail.is_empty() {
            let len = u32::try_from(self.fwdrs.len()).expect("forwarder pool fits in u32");
            let i = self.index.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            return Arc::clone(&self.fwdrs[(i % len) as usize]);
        }

        self.policy.select(&avail, dst_addr, &self.index)
    }

    /// Report the outcome of a dial through `fwdr`.
    ///
    /// Success re-enables the forwarder (and resets its failure run);
    /// failure advances the consecutive-failure counter. Forwarders not
    /// owned by this group are ignored.
    pub fn record_outcome(&self, fwdr: &Arc<Forwarder>, success: bool) {
        if !self.fwdrs.iter().any(|f| Arc::ptr_eq(f, fwdr)) {
            return;
        }
        if success {
            fwdr.enable();
        } else {
            fwdr.inc_failures();
        }
    }

    /// Restore the available-subset invariant from scratch.
    ///
    /// The active tier becomes the priority of the first enabled forwarder
    /// in priority order, or 0 when none is enabled (so the health checker
    /// probes every tier).
    pub fn rebuild_available(&self) {
        let mut avail = self.avail.write();
        self.rebuild_locked(&mut avail);
    }

    /// Rebuild under an already-held write guard; observer callbacks use
    /// this to avoid re-entering the non-reentrant lock.
    fn rebuild_locked(&self, avail: &mut Vec<Arc<Forwarder>>) {
        let mut active = 0;
        for fwdr in &self.fwdrs {
            if fwdr.enabled() {
                active = fwdr.priority();
                break;
            }
        }
        self.priority.store(active, Ordering::Release);

        avail.clear();
        for fwdr in &self.fwdrs {
            if fwdr.enabled() && fwdr.priority() >= active {
                avail.push(Arc::clone(fwdr));
            }
        }
    }

    /// Observer callback: one forwarder flipped status.
    ///
    /// The callback receives a bare reference; the owned `Arc` is recovered
    /// by pointer identity from the group's pool.
    fn on_forwarder_changed(&self, fwdr: &Forwarder) {
        let mut avail = self.avail.write();

        if fwdr.enabled() {
            info!(group = %self.name, forwarder = fwdr.addr(), "status changed to enabled");
            if fwdr.priority() == self.active_priority() {
                if let Some(owned) = self
                    .fwdrs
                    .iter()
                    .find(|f| std::ptr::eq(Arc::as_ptr(f), fwdr))
                {
                    avail.push(Arc::clone(owned));
                }
            } else if fwdr.priority() > self.active_priority() {
                // A better tier came back; rebuild around it.
                self.rebuild_locked(&mut avail);
            }
        } else {
            info!(group = %self.name, forwarder = fwdr.addr(), "status changed to disabled");
            if let Some(i) = avail
                .iter()
                .position(|f| std::ptr::eq(Arc::as_ptr(f), fwdr))
            {
                avail.swap_remove(i);
            }
        }

        if avail.is_empty() {
            // Possibly drop to a lower tier.
            self.rebuild_locked(&mut avail);
        }
    }

    /// Start this group's health checker.
    ///
    /// Groups with fewer than two forwarders are not checked: there is no
    /// alternative to fail over to. Restarting replaces (and aborts) any
    /// previous checker.
    pub fn check(&self) {
        if self.fwdrs.len() < 2 {
            debug!(group = %self.name, "single forwarder, health check skipped");
            return;
        }
        let Some(me) = self.self_ref.upgrade() else {
            return;
        };
        let checker = HealthChecker::start(me);
        *self.checker.lock() = Some(checker);
    }

    /// Stop this group's health checker, aborting in-flight probes.
    pub fn stop_check(&self) {
        if let Some(mut checker) = self.checker.lock().take() {
            checker.stop();
        }
    }
}

impl std::fmt::Debug for StrategyGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyGroup")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("forwarders", &self.fwdrs.len())
            .field("available", &self.avail.read().len())
            .field("active_priority", &self.active_priority())
            .finish_non_exhaustive()
    }
}
