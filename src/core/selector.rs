//! Deterministic host selection.
//!
//! A process id is mapped to a *candidate sequence*: a cyclic rotation of the
//! host pool starting at `stable_hash(process_id) % N`. Selection is a pure
//! function of the process id and the configured host order, so independently
//! running gateways agree on placement without sharing any state.
//!
//! # Hash function
//! The hash is 64-bit FNV-1a over the UTF-8 bytes of the process id
//! (offset basis `0xcbf29ce484222325`, prime `0x100000001b3`), reduced with
//! `u64` modulo. It is written out here instead of going through
//! `std::hash::Hasher`, whose `str` impl appends a terminator byte and whose
//! default algorithm is not stable across releases. Changing this function
//! reshuffles every process, exactly like changing the host list.
use std::slice;

use crate::core::{
    host::{Host, HostPool},
    process_id::ProcessId,
};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over raw bytes.
pub fn stable_hash(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Index of the primary host for `process_id` in a pool of `pool_len` hosts.
///
/// `pool_len` must be non-zero; the pool constructor guarantees it.
pub fn primary_index(process_id: &str, pool_len: usize) -> usize {
    (stable_hash(process_id.as_bytes()) % pool_len as u64) as usize
}

/// Ordered attempt list for one process.
///
/// Either a rotation of the whole pool or a single subrouter host. It borrows
/// nothing from the pool so it can outlive a request-local borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSequence {
    hosts: Vec<Host>,
}

impl CandidateSequence {
    /// A one-element sequence; used for the subrouter, which has no failover target.
    pub fn single(host: Host) -> Self {
        Self { hosts: vec![host] }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// The host tried first (and the only one referenced in redirect mode).
    pub fn primary(&self) -> Option<&Host> {
        self.hosts.first()
    }

    pub fn iter(&self) -> slice::Iter<'_, Host> {
        self.hosts.iter()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }
}

impl<'a> IntoIterator for &'a CandidateSequence {
    type Item = &'a Host;
    type IntoIter = slice::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Maps process ids onto the configured pool.
#[derive(Debug, Clone)]
pub struct DeterministicSelector;

impl DeterministicSelector {
    /// Build the candidate sequence for `process_id`.
    ///
    /// `sequence[k] = pool[(primary + k) % N]` for `k` in `0..N`.
    pub fn select(process_id: &ProcessId, pool: &HostPool) -> CandidateSequence {
        let len = pool.len();
        let primary = primary_index(process_id.as_str(), len);
        let hosts = pool
            .hosts()
            .iter()
            .cycle()
            .skip(primary)
            .take(len)
            .cloned()
            .collect();
        CandidateSequence { hosts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(urls: &[&str]) -> HostPool {
        HostPool::new(urls).unwrap()
    }

    fn urls(sequence: &CandidateSequence) -> Vec<&str> {
        sequence.iter().map(|h| h.url().as_str()).collect()
    }

    #[test]
    fn test_stable_hash_known_vectors() {
        assert_eq!(stable_hash(b""), 0xcbf29ce484222325);
        assert_eq!(stable_hash(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(stable_hash(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_primary_index_values() {
        assert_eq!(primary_index("pid-a", 3), 1);
        assert_eq!(primary_index("process-1", 3), 0);
        assert_eq!(primary_index("process-3", 3), 2);
        assert_eq!(primary_index("process-4", 4), 3);
    }

    #[test]
    fn test_failover_order_from_primary() {
        let pool = pool(&["http://a", "http://b", "http://c"]);
        let pid = ProcessId::new("pid-a").unwrap();

        let sequence = DeterministicSelector::select(&pid, &pool);
        assert_eq!(urls(&sequence), vec!["http://b", "http://c", "http://a"]);
        assert_eq!(sequence.primary().unwrap().index(), 1);
    }

    #[test]
    fn test_selection_is_deterministic_across_pools() {
        let hosts = ["http://a", "http://b", "http://c", "http://d", "http://e"];
        for i in 0..50 {
            let pid = ProcessId::new(format!("process-{i}")).unwrap();
            let first = DeterministicSelector::select(&pid, &pool(&hosts));
            let second = DeterministicSelector::select(&pid, &pool(&hosts));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_sequence_is_a_rotation_of_the_pool() {
        let hosts = ["http://a", "http://b", "http://c", "http://d"];
        let pool = pool(&hosts);
        for i in 0..50 {
            let pid = ProcessId::new(format!("pid-{i}")).unwrap();
            let sequence = DeterministicSelector::select(&pid, &pool);
            assert_eq!(sequence.len(), hosts.len());

            let start = sequence.primary().unwrap().index();
            for (k, host) in sequence.iter().enumerate() {
                assert_eq!(host.index(), (start + k) % hosts.len());
            }

            let mut seen: Vec<usize> = sequence.iter().map(Host::index).collect();
            seen.sort_unstable();
            assert_eq!(seen, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_single_host_pool() {
        let pool = pool(&["http://only"]);
        let pid = ProcessId::new("anything").unwrap();
        let sequence = DeterministicSelector::select(&pid, &pool);
        assert_eq!(urls(&sequence), vec!["http://only"]);
    }

    #[test]
    fn test_distribution_touches_every_host() {
        let pool = pool(&["http://a", "http://b", "http://c"]);
        let mut counts = [0usize; 3];
        for i in 0..300 {
            let pid = ProcessId::new(format!("proc-{i}")).unwrap();
            counts[DeterministicSelector::select(&pid, &pool)
                .primary()
                .unwrap()
                .index()] += 1;
        }
        assert!(counts.iter().all(|c| *c > 50), "skewed distribution: {counts:?}");
    }
}
