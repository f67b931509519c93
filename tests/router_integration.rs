//! End-to-end routing scenarios: rule dispatch, selection policies, time
//! window gating, and failure-driven failover through the public API.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rule_router::{
    DialError, RuleConfig, RuleRouter, StrategyConfig, StrategyGroup, TimeWindow,
};

mod common;

fn direct_pool(n: usize) -> Vec<String> {
    (0..n).map(|_| "direct://".to_string()).collect()
}

fn default_group() -> Arc<StrategyGroup> {
    StrategyGroup::new("default", &[], StrategyConfig::default()).unwrap()
}

/// 2026-01-05 is a Monday.
fn monday(hour: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 5)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
}

#[test]
fn rr_basic_rotation() {
    common::init_tracing();
    let config = StrategyConfig {
        strategy: "rr".into(),
        ..Default::default()
    };
    let group = StrategyGroup::new("pool", &direct_pool(3), config).unwrap();

    // Counter pre-increments from 0: rotation starts at the second element.
    let picks: Vec<usize> = (0..5)
        .map(|_| {
            let f = group.pick_forwarder("x");
            group
                .forwarders()
                .iter()
                .position(|a| Arc::ptr_eq(a, &f))
                .unwrap()
        })
        .collect();

    assert_eq!(picks, vec![1, 2, 0, 1, 2]);
}

#[test]
fn ha_failover_and_recovery() {
    common::init_tracing();
    let config = StrategyConfig {
        strategy: "ha".into(),
        ..Default::default()
    };
    let group = StrategyGroup::new(
        "ha-pool",
        &[
            "direct://?priority=2".to_string(),
            "direct://?priority=1".to_string(),
        ],
        config,
    )
    .unwrap();

    let a = Arc::clone(&group.forwarders()[0]);
    let b = Arc::clone(&group.forwarders()[1]);

    for _ in 0..10 {
        assert!(Arc::ptr_eq(&group.pick_forwarder("x"), &a));
    }

    // maxfailures defaults to 3: three failures disable the primary.
    for _ in 0..3 {
        group.record_outcome(&a, false);
    }
    assert!(Arc::ptr_eq(&group.pick_forwarder("x"), &b));

    // Recovery restores the higher tier.
    a.enable();
    assert!(Arc::ptr_eq(&group.pick_forwarder("x"), &a));
}

#[tokio::test]
async fn time_window_gating_returns_reject_forwarder() {
    common::init_tracing();
    let config = StrategyConfig {
        forward_time: vec![TimeWindow::parse("MON 09:00 17:00").unwrap()],
        reject_time: vec![TimeWindow::parse("MON 12:00 13:00").unwrap()],
        ..Default::default()
    };
    let group = StrategyGroup::new("gated", &direct_pool(2), config).unwrap();

    let picked = group.pick_forwarder_at("target.example.com:443", monday(12, 30));
    assert!(Arc::ptr_eq(&picked, group.reject_forwarder()));

    let err = picked.dial("target.example.com:443").await.unwrap_err();
    assert!(matches!(err, DialError::RejectedByPolicy));
    assert!(!err.is_recoverable());

    // The same instant outside the reject window forwards normally.
    let picked = group.pick_forwarder_at("target.example.com:443", monday(14, 0));
    assert!(!Arc::ptr_eq(&picked, group.reject_forwarder()));
}

#[test]
fn longest_suffix_domain_dispatch() {
    common::init_tracing();
    let rules = vec![
        RuleConfig {
            name: "r1".into(),
            domain: vec!["example.com".into()],
            ..Default::default()
        },
        RuleConfig {
            name: "r2".into(),
            domain: vec!["api.example.com".into()],
            ..Default::default()
        },
    ];
    let router = RuleRouter::new(&rules, default_group()).unwrap();

    assert_eq!(router.next_group("x.api.example.com:443").name(), "r2");
    assert_eq!(router.next_group("www.example.com:443").name(), "r1");
    assert_eq!(router.next_group("other.org:80").name(), "default");
}

#[test]
fn cidr_dispatch_and_learned_ips() {
    common::init_tracing();
    let rules = vec![RuleConfig {
        name: "r".into(),
        domain: vec!["inner.example.com".into()],
        cidr: vec!["10.0.0.0/8".into()],
        ..Default::default()
    }];
    let router = RuleRouter::new(&rules, default_group()).unwrap();

    assert_eq!(router.next_group("10.1.2.3:22").name(), "r");
    assert_eq!(router.next_group("11.0.0.1:22").name(), "default");

    // A DNS collaborator teaches the router the IP behind the domain rule;
    // subsequent IP-only traffic inherits the routing decision.
    assert_eq!(router.next_group("192.0.2.55:80").name(), "default");
    router.add_domain_ip("inner.example.com", "192.0.2.55");
    assert_eq!(router.next_group("192.0.2.55:80").name(), "r");
}

#[test]
fn router_end_to_end_pick_and_outcome() {
    common::init_tracing();
    let rules = vec![RuleConfig {
        name: "pool".into(),
        forward: direct_pool(2),
        strategy: StrategyConfig {
            strategy: "dh".into(),
            ..Default::default()
        },
        domain: vec!["example.com".into()],
        ..Default::default()
    }];
    let router = RuleRouter::new(&rules, default_group()).unwrap();

    // Destination hashing pins the destination to one forwarder.
    let first = router.next_dialer("www.example.com:443");
    for _ in 0..10 {
        let again = router.next_dialer("www.example.com:443");
        assert!(Arc::ptr_eq(&first, &again));
    }

    // Failures eventually disable the pinned forwarder; the hash then runs
    // over the shrunken available subset.
    for _ in 0..3 {
        router.record_outcome(&first, false);
    }
    assert!(!first.enabled());
    let fallback = router.next_dialer("www.example.com:443");
    assert!(!Arc::ptr_eq(&fallback, &first));

    // Success puts it back.
    router.record_outcome(&first, true);
    assert!(first.enabled());
    assert_eq!(first.failures(), 0);
}

#[test]
fn rule_files_drive_router_construction() {
    use std::io::Write;

    common::init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let mut f = std::fs::File::create(dir.path().join("office.rule")).unwrap();
    write!(
        f,
        r#"
            forward = ["direct://?priority=2", "direct://"]
            strategy = "ha"
            checkwebsite = "probe.example.net"
            domain = ["example.com"]
            cidr = ["10.0.0.0/8"]
        "#
    )
    .unwrap();

    let rules = rule_router::load_rule_dir(dir.path()).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "office");
    // Probe port defaulting happens at group construction.
    let router = RuleRouter::new(&rules, default_group()).unwrap();
    let group = router.group("office").unwrap();
    assert_eq!(group.config().check_website, "probe.example.net:80");

    assert_eq!(router.next_group("www.example.com:443").name(), "office");
    assert_eq!(router.next_group("10.4.5.6:22").name(), "office");
}
