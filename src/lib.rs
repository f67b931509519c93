//! rule-router: routing and forwarder-selection core for a forward proxy
//!
//! This crate decides, for each outbound connection request (TCP or UDP),
//! which upstream forwarder should carry the traffic. It combines three
//! concerns:
//!
//! - **Rule routing**: map a destination address to a named forwarder group
//!   by longest-suffix domain matching, exact-IP matching, or CIDR
//!   containment, falling back to a default group.
//! - **Selection strategy**: pick one live forwarder from the group's
//!   ranked pool using round robin, primary-preferred high availability,
//!   latency-preferred high availability, or destination-hash affinity.
//! - **Health checking**: probe each forwarder on an exponentially
//!   backing-off schedule and drive enable/disable transitions, respecting
//!   weekly time-of-week admission and rejection windows.
//!
//! The concrete wire protocols of upstream proxies, the listener plumbing,
//! and the bidirectional relay live outside this crate: transports are
//! injected as [`Dialer`] capabilities, and callers report dial outcomes
//! back through [`RuleRouter::record_outcome`].
//!
//! # Architecture
//!
//! ```text
//! Client request ─→ RuleRouter::next_group() ─→ StrategyGroup
//!                        (domain/ip/cidr)            │
//!                                          pick_forwarder(dst)
//!                                    (time windows, then policy)
//!                                                    │
//!                                               Forwarder ─→ dial
//!                                                    ↑
//!                               HealthChecker probes (background)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use rule_router::{load_rule_dir, RuleRouter, StrategyConfig, StrategyGroup};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // One group per rule file, plus a direct default group.
//! let rules = load_rule_dir("/etc/rule-router/rules.d")?;
//! let default_group = StrategyGroup::new("default", &[], StrategyConfig::default())?;
//! let router = RuleRouter::new(&rules, default_group)?;
//!
//! // Start background health checks.
//! router.check();
//!
//! // Per connection: pick, dial, report.
//! let fwdr = router.next_dialer("www.example.com:443");
//! match fwdr.dial("www.example.com:443").await {
//!     Ok(stream) => {
//!         router.record_outcome(&fwdr, true);
//!         // hand the stream to the relay...
//!         # drop(stream);
//!     }
//!     Err(e) => {
//!         router.record_outcome(&fwdr, false);
//!         return Err(e.into());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: rule and strategy configuration, rule-file loading
//! - [`checker`]: background health checking
//! - [`dialer`]: transport capability trait plus direct/reject dialers
//! - [`error`]: error types
//! - [`forwarder`]: forwarder state and failure accounting
//! - [`router`]: destination → group dispatch
//! - [`strategy`]: strategy groups and selection policies
//! - [`timewindow`]: weekly admission windows

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod checker;
pub mod config;
pub mod dialer;
pub mod error;
pub mod forwarder;
pub mod router;
pub mod strategy;
pub mod timewindow;

// Re-export commonly used types at the crate root
pub use checker::HealthChecker;
pub use config::{load_rule_dir, load_rule_file, RuleConfig, StrategyConfig};
pub use dialer::{Dialer, DirectDialer, RejectDialer};
pub use error::{ConfigError, DialError};
pub use forwarder::{Forwarder, StatusObserver};
pub use router::RuleRouter;
pub use strategy::{Policy, StrategyGroup};
pub use timewindow::TimeWindow;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
