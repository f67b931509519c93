//! Rule router: destination → strategy group dispatch
//!
//! The router owns a default group plus one group per rule, indexed three
//! ways: exact domain labels, exact IP strings, and CIDR blocks. Lookups
//! resolve in that order — IP before CIDR for numeric hosts, then
//! longest-to-shortest dot-suffix probing for names — and fall back to the
//! default group.
//!
//! The domain and CIDR indices are frozen after construction. The IP index
//! stays live: a DNS collaborator can teach the router the addresses behind
//! a domain rule through [`add_domain_ip`](RuleRouter::add_domain_ip), so
//! IP-only traffic (e.g. from transparent interception) inherits the same
//! routing decision.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use ipnet::IpNet;
use tracing::{info, warn};

use crate::config::RuleConfig;
use crate::error::ConfigError;
use crate::forwarder::Forwarder;
use crate::strategy::StrategyGroup;

/// Dispatches destinations to strategy groups by domain, IP, and CIDR rules.
pub struct RuleRouter {
    default_group: Arc<StrategyGroup>,
    groups: Vec<Arc<StrategyGroup>>,
    /// Lowercased exact domain label → group. Frozen after construction;
    /// matching happens by suffix probing at lookup time.
    domain_map: HashMap<String, Arc<StrategyGroup>>,
    /// IP string → group. Mutated at runtime by learned domain-IP pairs.
    ip_map: DashMap<String, Arc<StrategyGroup>>,
    /// CIDR → group, scanned in rule order; first containing block wins.
    cidr_map: Vec<(IpNet, Arc<StrategyGroup>)>,
}

impl RuleRouter {
    /// Build a router from rule configs and a default group.
    ///
    /// Unparsable CIDR entries are logged and skipped; they never fail the
    /// load.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any rule's forwarder specs fail to parse.
    pub fn new(
        rules: &[RuleConfig],
        default_group: Arc<StrategyGroup>,
    ) -> Result<Self, ConfigError> {
        let mut groups = Vec::with_capacity(rules.len());
        let mut domain_map = HashMap::new();
        let ip_map = DashMap::new();
        let mut cidr_map = Vec::new();

        for rule in rules {
            let group = StrategyGroup::new(&rule.name, &rule.forward, rule.strategy.clone())?;
            groups.push(Arc::clone(&group));

            for domain in &rule.domain {
                domain_map.insert(domain.to_ascii_lowercase(), Arc::clone(&group));
            }

            for ip in &rule.ip {
                ip_map.insert(normalize_ip(ip), Arc::clone(&group));
            }

            for cidr in &rule.cidr {
                match cidr.parse::<IpNet>() {
                    Ok(net) => cidr_map.push((net, Arc::clone(&group))),
                    Err(e) => {
                        warn!(rule = %rule.name, cidr = %cidr, error = %e, "skipping unparsable cidr");
                    }
                }
            }
        }

        Ok(Self {
            default_group,
            groups,
            domain_map,
            ip_map,
            cidr_map,
        })
    }

    /// The fallback group for destinations no rule matches.
    #[must_use]
    pub fn default_group(&self) -> &Arc<StrategyGroup> {
        &self.default_group
    }

    /// Look up a rule group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Arc<StrategyGroup>> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// All rule groups, in rule order (excluding the default group).
    #[must_use]
    pub fn groups(&self) -> &[Arc<StrategyGroup>] {
        &self.groups
    }

    /// Resolve the strategy group for a destination `host:port`.
    ///
    /// Resolution order: exact IP, first containing CIDR, then
    /// longest-to-shortest dot-suffix probing over the lowercased host
    /// (`a.b.example.com` probes `a.b.example.com`, `b.example.com`,
    /// `example.com`, `com`, and finally the empty label). Unsplittable
    /// destinations go to the default group.
    #[must_use]
    pub fn next_group(&self, dst_addr: &str) -> Arc<StrategyGroup> {
        let Some(host) = split_host(dst_addr) else {
            return Arc::clone(&self.default_group);
        };

        if let Ok(ip) = host.parse::<IpAddr>() {
            if let Some(group) = self.ip_map.get(&ip.to_string()) {
                return Arc::clone(group.value());
            }
            for (net, group) in &self.cidr_map {
                if net.contains(&ip) {
                    return Arc::clone(group);
                }
            }
        }

        let host = host.to_ascii_lowercase();
        let mut suffix = host.as_str();
        loop {
            if let Some(group) = self.domain_map.get(suffix) {
                return Arc::clone(group);
            }
            match suffix.split_once('.') {
                Some((_, rest)) => suffix = rest,
                None => break,
            }
        }
        if let Some(group) = self.domain_map.get("") {
            return Arc::clone(group);
        }

        Arc::clone(&self.default_group)
    }

    /// Teach the router an IP observed behind a domain rule.
    ///
    /// Every dot-suffix of `domain` present in the domain index stores
    /// `ip → group`, shortest suffix first, so the most specific rule wins
    /// the final mapping. Empty IPs are ignored.
    pub fn add_domain_ip(&self, domain: &str, ip: &str) {
        if ip.is_empty() {
            return;
        }

        let domain = domain.to_ascii_lowercase();
        let key = normalize_ip(ip);

        let mut end = domain.len();
        loop {
            let (suffix, next) = match domain[..end].rfind('.') {
                Some(dot) => (&domain[dot + 1..], Some(dot)),
                None => (domain.as_str(), None),
            };

            if let Some(group) = self.domain_map.get(suffix) {
                info!(
                    ip = %key,
                    domain = %domain,
                    rule_domain = suffix,
                    group = group.name(),
                    "learned ip for domain rule"
                );
                self.ip_map.insert(key.clone(), Arc::clone(group));
            }

            match next {
                Some(dot) => end = dot,
                None => break,
            }
        }
    }

    /// Convenience: pick a forwarder for the destination in one step.
    #[must_use]
    pub fn next_dialer(&self, dst_addr: &str) -> Arc<Forwarder> {
        self.next_group(dst_addr).pick_forwarder(dst_addr)
    }

    /// Report a dial outcome for a forwarder picked through this router.
    ///
    /// Dispatches straight to the forwarder's own accounting; the forwarder
    /// is the source of truth regardless of which group owns it.
    pub fn record_outcome(&self, fwdr: &Arc<Forwarder>, success: bool) {
        if success {
            fwdr.enable();
        } else {
            fwdr.inc_failures();
        }
    }

    /// Start health checkers on the default group and every rule group.
    pub fn check(&self) {
        self.default_group.check();
        for group in &self.groups {
            group.check();
        }
    }

    /// Stop all health checkers started by [`check`](Self::check).
    pub fn stop_checks(&self) {
        self.default_group.stop_check();
        for group in &self.groups {
            group.stop_check();
        }
    }
}

/// Extract the host part of `host:port`, unbracketing IPv6 literals.
/// Returns `None` when the destination has no parsable port.
fn split_host(dst_addr: &str) -> Option<&str> {
    let (host, port) = dst_addr.rsplit_once(':')?;
    port.parse::<u16>().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Some(host)
}

/// Canonicalize IP strings so learned entries and lookups agree on a key.
fn normalize_ip(ip: &str) -> String {
    ip.parse::<IpAddr>()
        .map_or_else(|_| ip.to_string(), |addr| addr.to_string())
}

impl std::fmt::Debug for RuleRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRouter")
            .field("default_group", &self.default_group.name())
            .field("groups", &self.groups.len())
            .field("domain_rules", &self.domain_map.len())
            .field("ip_rules", &self.ip_map.len())
            .field("cidr_rules", &self.cidr_map.len())
            .finish()
    }
}
