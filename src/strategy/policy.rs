//! Selection policies
//!
//! Each strategy group stores one [`Policy`] and dispatches selection
//! through it. All policies operate on the group's available subset, which
//! is priority-ordered and non-empty at the call site.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::forwarder::Forwarder;

/// Selection policy for a strategy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Round robin across the available subset.
    #[default]
    Rr,
    /// High availability: always the highest-priority available forwarder.
    Ha,
    /// Latency-based high availability: the available forwarder with the
    /// smallest probe latency. An unmeasured forwarder (latency 0) wins the
    /// scan until its first probe completes; this mirrors the reference
    /// behavior and keeps fresh forwarders in play immediately.
    Lha,
    /// Destination hashing: FNV-1a over the destination address pins each
    /// destination to one member of the current available subset.
    Dh,
}

impl Policy {
    /// Parse a strategy string, falling back to round robin with a warning
    /// for anything unrecognized.
    #[must_use]
    pub fn parse_lossy(name: &str, group: &str) -> Self {
        match name {
            "rr" => Self::Rr,
            "ha" => Self::Ha,
            "lha" => Self::Lha,
            "dh" => Self::Dh,
            other => {
                warn!(
                    group,
                    strategy = other,
                    "unsupported forward strategy, using round robin"
                );
                Self::Rr
            }
        }
    }

    /// Select one forwarder from the available subset.
    ///
    /// `index` is the group's shared round-robin counter; it pre-increments
    /// with u32 wrap-around before the modulo, so the first pick of a fresh
    /// group lands on element 1.
    ///
    /// # Panics
    ///
    /// Panics if `avail` is empty; the group guarantees a non-empty subset
    /// at every call site.
    #[must_use]
    pub fn select(
        &self,
        avail: &[Arc<Forwarder>],
        dst_addr: &str,
        index: &AtomicU32,
    ) -> Arc<Forwarder> {
        debug_assert!(!avail.is_empty());
        let len = u32::try_from(avail.len()).expect("available subset fits in u32");

        let picked = match self {
            Self::Rr => {
                let i = index.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                &avail[(i % len) as usize]
            }
            Self::Ha => &avail[0],
            Self::Lha => {
                let mut picked = &avail[0];
                let mut lowest = picked.latency();
                for f in avail {
                    if f.latency() < lowest {
                        lowest = f.latency();
                        picked = f;
                    }
                }
                picked
            }
            Self::Dh => {
                let hash = fnv1a_32(dst_addr.as_bytes());
                &avail[(hash % len) as usize]
            }
        };

        Arc::clone(picked)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rr => write!(f, "round robin"),
            Self::Ha => write!(f, "high availability"),
            Self::Lha => write!(f, "latency based high availability"),
            Self::Dh => write!(f, "destination hashing"),
        }
    }
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a 32-bit hash.
pub(crate) fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::DirectDialer;
    use std::time::Duration;

    fn pool(n: usize) -> Vec<Arc<Forwarder>> {
        (0..n)
            .map(|_| {
                Forwarder::new(
                    Arc::new(DirectDialer::new("", Duration::from_secs(3))),
                    0,
                    3,
                )
            })
            .collect()
    }

    // ========================================================================
    // FNV-1a
    // ========================================================================

    #[test]
    fn test_fnv1a_empty_string() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        // Reference vectors for the 32-bit FNV-1a function.
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_parse_lossy() {
        assert_eq!(Policy::parse_lossy("rr", "g"), Policy::Rr);
        assert_eq!(Policy::parse_lossy("ha", "g"), Policy::Ha);
        assert_eq!(Policy::parse_lossy("lha", "g"), Policy::Lha);
        assert_eq!(Policy::parse_lossy("dh", "g"), Policy::Dh);
        assert_eq!(Policy::parse_lossy("fastest", "g"), Policy::Rr);
        assert_eq!(Policy::parse_lossy("", "g"), Policy::Rr);
    }

    // ========================================================================
    // Selection
    // ========================================================================

    #[test]
    fn test_rr_pre_increments() {
        let avail = pool(3);
        let index = AtomicU32::new(0);

        let picks: Vec<usize> = (0..5)
            .map(|_| {
                let f = Policy::Rr.select(&avail, "x", &index);
                avail.iter().position(|a| Arc::ptr_eq(a, &f)).unwrap()
            })
            .collect();

        // Counter pre-increments from 0, so rotation starts at element 1.
        assert_eq!(picks, vec![1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_rr_counter_wraps() {
        let avail = pool(3);
        let index = AtomicU32::new(u32::MAX);

        // fetch_add wraps the counter to 0; pre-increment selects element 1.
        let f = Policy::Rr.select(&avail, "x", &index);
        assert!(Arc::ptr_eq(&f, &avail[1]));
    }

    #[test]
    fn test_ha_picks_head() {
        let avail = pool(3);
        let index = AtomicU32::new(0);

        for _ in 0..10 {
            let f = Policy::Ha.select(&avail, "x", &index);
            assert!(Arc::ptr_eq(&f, &avail[0]));
        }
    }

    #[test]
    fn test_lha_picks_lowest_latency() {
        let avail = pool(3);
        avail[0].set_latency(30);
        avail[1].set_latency(10);
        avail[2].set_latency(20);

        let index = AtomicU32::new(0);
        let f = Policy::Lha.select(&avail, "x", &index);
        assert!(Arc::ptr_eq(&f, &avail[1]));
    }

    #[test]
    fn test_lha_unmeasured_wins() {
        let avail = pool(3);
        avail[0].set_latency(30);
        avail[2].set_latency(20);
        // avail[1] is unmeasured (0) and wins the scan.

        let index = AtomicU32::new(0);
        let f = Policy::Lha.select(&avail, "x", &index);
        assert!(Arc::ptr_eq(&f, &avail[1]));
    }

    #[test]
    fn test_lha_first_wins_ties() {
        let avail = pool(3);
        avail[0].set_latency(10);
        avail[1].set_latency(10);
        avail[2].set_latency(10);

        let index = AtomicU32::new(0);
        let f = Policy::Lha.select(&avail, "x", &index);
        assert!(Arc::ptr_eq(&f, &avail[0]));
    }

    #[test]
    fn test_dh_deterministic() {
        let avail = pool(4);
        let index = AtomicU32::new(0);

        let first = Policy::Dh.select(&avail, "example.com:443", &index);
        for _ in 0..20 {
            let again = Policy::Dh.select(&avail, "example.com:443", &index);
            assert!(Arc::ptr_eq(&first, &again));
        }
    }

    #[test]
    fn test_dh_matches_hash() {
        let avail = pool(4);
        let index = AtomicU32::new(0);
        let dst = "example.com:443";

        let expected = (fnv1a_32(dst.as_bytes()) % 4) as usize;
        let f = Policy::Dh.select(&avail, dst, &index);
        assert!(Arc::ptr_eq(&f, &avail[expected]));
    }

    #[test]
    fn test_dh_single_member() {
        let avail = pool(1);
        let index = AtomicU32::new(0);

        for dst in ["a:1", "b:2", "c:3"] {
            let f = Policy::Dh.select(&avail, dst, &index);
            assert!(Arc::ptr_eq(&f, &avail[0]));
        }
    }
}
