//! Configuration types for rule-router
//!
//! A [`RuleConfig`] describes one routing rule: the forwarder pool, the
//! strategy settings, and the destination keys (domains, IPs, CIDRs) that
//! route traffic into it. Rule files are TOML; discovery and parsing live in
//! [`loader`].

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::timewindow::TimeWindow;

mod loader;

pub use loader::{load_rule_dir, load_rule_file};

/// Strategy settings for one forwarder group.
///
/// Field defaults match the rule-file option table; unknown keys in rule
/// files (e.g. `ipset`, `dnsserver` consumed by collaborators) are ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Selection policy: one of `rr`, `ha`, `lha`, `dh`. Unknown values fall
    /// back to round robin with a warning at group construction.
    pub strategy: String,

    /// Probe target, `host[:port]`; the port defaults to 80 via
    /// [`normalize`](Self::normalize).
    #[serde(rename = "checkwebsite")]
    pub check_website: String,

    /// Base sleep unit between probes, in seconds.
    #[serde(rename = "checkinterval")]
    pub check_interval_secs: u64,

    /// Bound per probe attempt, in seconds; 0 disables the bound.
    #[serde(rename = "checktimeout")]
    pub check_timeout_secs: u64,

    /// If true, probes skip currently-enabled forwarders.
    #[serde(rename = "checkdisabledonly")]
    pub check_disabled_only: bool,

    /// Consecutive failures needed to disable a forwarder.
    #[serde(rename = "maxfailures")]
    pub max_failures: u32,

    /// Per-dial bound, in seconds; 0 disables the bound.
    #[serde(rename = "dialtimeout")]
    pub dial_timeout_secs: u64,

    /// Idle bound on the relay, in seconds; enforced outside the core.
    #[serde(rename = "relaytimeout")]
    pub relay_timeout_secs: u64,

    /// Source IP address or source interface name; empty for none.
    pub interface: String,

    /// Allow-list of time windows. Empty means always allow.
    #[serde(rename = "forwardtime")]
    pub forward_time: Vec<TimeWindow>,

    /// Reject windows; these override `forward_time` when matching.
    #[serde(rename = "rejecttime")]
    pub reject_time: Vec<TimeWindow>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy: "rr".into(),
            check_website: "www.apple.com".into(),
            check_interval_secs: 30,
            check_timeout_secs: 10,
            check_disabled_only: false,
            max_failures: 3,
            dial_timeout_secs: 3,
            relay_timeout_secs: 0,
            interface: String::new(),
            forward_time: Vec::new(),
            reject_time: Vec::new(),
        }
    }
}

impl StrategyConfig {
    /// Append the default probe port when `check_website` has none.
    pub fn normalize(&mut self) {
        if !self.check_website.contains(':') {
            self.check_website.push_str(":80");
        }
    }

    /// Base sleep unit between probes.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Bound per probe attempt; zero disables the bound.
    #[must_use]
    pub const fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    /// Per-dial bound; zero disables the bound.
    #[must_use]
    pub const fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Idle bound on the relay; zero disables the bound.
    #[must_use]
    pub const fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }
}

/// One routing rule: a forwarder group plus the destination keys that select
/// it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Rule name; set from the file stem by the loader.
    #[serde(skip)]
    pub name: String,

    /// Upstream forwarder specs. Empty means one implicit direct forwarder.
    pub forward: Vec<String>,

    /// Strategy settings, flattened into the same table as the routing keys.
    #[serde(flatten)]
    pub strategy: StrategyConfig,

    /// Domains routed into this group (exact labels, matched by dot-suffix
    /// probing at lookup time).
    pub domain: Vec<String>,

    /// IP addresses routed into this group.
    pub ip: Vec<String>,

    /// CIDR blocks routed into this group.
    pub cidr: Vec<String>,
}

impl RuleConfig {
    /// Validate the rule.
    ///
    /// Duplicate routing keys within one rule are an operator mistake worth
    /// failing on; unparsable CIDRs are deliberately NOT an error here (they
    /// are warned about and skipped at router construction).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] on duplicate domain or IP
    /// keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for domain in &self.domain {
            if !seen.insert(domain.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "rule '{}': duplicate domain key '{domain}'",
                    self.name
                )));
            }
        }

        seen.clear();
        for ip in &self.ip {
            if !seen.insert(ip.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "rule '{}': duplicate ip key '{ip}'",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Defaults
    // ========================================================================

    #[test]
    fn test_strategy_defaults_match_option_table() {
        let c = StrategyConfig::default();
        assert_eq!(c.strategy, "rr");
        assert_eq!(c.check_website, "www.apple.com");
        assert_eq!(c.check_interval_secs, 30);
        assert_eq!(c.check_timeout_secs, 10);
        assert!(!c.check_disabled_only);
        assert_eq!(c.max_failures, 3);
        assert_eq!(c.dial_timeout_secs, 3);
        assert_eq!(c.relay_timeout_secs, 0);
        assert!(c.interface.is_empty());
        assert!(c.forward_time.is_empty());
        assert!(c.reject_time.is_empty());
    }

    #[test]
    fn test_duration_accessors() {
        let c = StrategyConfig::default();
        assert_eq!(c.check_interval(), Duration::from_secs(30));
        assert_eq!(c.check_timeout(), Duration::from_secs(10));
        assert_eq!(c.dial_timeout(), Duration::from_secs(3));
        assert_eq!(c.relay_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_normalize_appends_default_port() {
        let mut c = StrategyConfig::default();
        c.normalize();
        assert_eq!(c.check_website, "www.apple.com:80");

        // Explicit ports are left alone; normalize is idempotent.
        c.check_website = "probe.example.net:8080".into();
        c.normalize();
        c.normalize();
        assert_eq!(c.check_website, "probe.example.net:8080");
    }

    // ========================================================================
    // TOML parsing
    // ========================================================================

    #[test]
    fn test_rule_from_toml() {
        let text = r#"
            forward = ["direct://?priority=2", "direct://"]
            strategy = "ha"
            checkwebsite = "probe.example.net"
            checkinterval = 15
            maxfailures = 5
            forwardtime = ["MON 09:00 17:00"]
            rejecttime = ["MON 12:00 13:00"]
            domain = ["example.com", "api.example.com"]
            ip = ["10.9.9.9"]
            cidr = ["10.0.0.0/8"]
        "#;

        let rule: RuleConfig = toml::from_str(text).unwrap();
        assert_eq!(rule.forward.len(), 2);
        assert_eq!(rule.strategy.strategy, "ha");
        assert_eq!(rule.strategy.check_interval_secs, 15);
        assert_eq!(rule.strategy.max_failures, 5);
        assert_eq!(rule.strategy.forward_time.len(), 1);
        assert_eq!(rule.strategy.reject_time.len(), 1);
        assert_eq!(rule.domain, vec!["example.com", "api.example.com"]);
        assert_eq!(rule.ip, vec!["10.9.9.9"]);
        assert_eq!(rule.cidr, vec!["10.0.0.0/8"]);
        // Unset keys keep their defaults.
        assert_eq!(rule.strategy.check_timeout_secs, 10);
    }

    #[test]
    fn test_rule_from_empty_toml() {
        let rule: RuleConfig = toml::from_str("").unwrap();
        assert!(rule.forward.is_empty());
        assert_eq!(rule.strategy.strategy, "rr");
    }

    #[test]
    fn test_rule_ignores_collaborator_keys() {
        // ipset / dnsserver are consumed by other subsystems.
        let text = r#"
            domain = ["example.com"]
            ipset = "glider"
            dnsserver = ["8.8.8.8:53"]
        "#;
        let rule: RuleConfig = toml::from_str(text).unwrap();
        assert_eq!(rule.domain, vec!["example.com"]);
    }

    #[test]
    fn test_rule_rejects_bad_time_window() {
        let text = r#"forwardtime = ["MON 25:00 17:00"]"#;
        assert!(toml::from_str::<RuleConfig>(text).is_err());
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_validate_duplicate_keys() {
        let mut rule = RuleConfig {
            name: "office".into(),
            domain: vec!["a.com".into(), "a.com".into()],
            ..Default::default()
        };
        assert!(rule.validate().is_err());

        rule.domain = vec!["a.com".into(), "b.com".into()];
        assert!(rule.validate().is_ok());

        rule.ip = vec!["10.0.0.1".into(), "10.0.0.1".into()];
        assert!(rule.validate().is_err());
    }
}
