//! Placement Function (§3, §4.4). Pure, deterministic mapping from (file
//! key, live mask) to an ordered replica set. Grounded on
//! `clustering::dht`'s consistent-hash ring walk, simplified to the spec's
//! single-hash-plus-clockwise-walk (no virtual nodes — the cluster is fixed
//! and small) and on `file_sys_remote.go`'s `GetMachinesHoldingFileFromMemList`,
//! which this is a direct, typed port of.

use crate::identity::Ordinal;
use sha2::{Digest, Sha256};

/// `placement(key, live_mask, r) -> ordered list of ordinals of length <= r`.
/// `live_mask[i]` means ordinal `i` is live; `live_mask[0]` is ignored.
pub fn placement(key: &str, live_mask: &[bool], r: usize) -> Vec<Ordinal> {
    let n = (live_mask.len() as u32).saturating_sub(1);
    if n == 0 {
        return Vec::new();
    }
    let start = (hash_to_ordinal(key, n)) as Ordinal;

    let mut replicas = Vec::with_capacity(r);
    let mut cur = start;
    loop {
        if live_mask.get(cur as usize).copied().unwrap_or(false) {
            replicas.push(cur);
            if replicas.len() == r {
                break;
            }
        }
        cur = (cur % n) + 1;
        if cur == start {
            break;
        }
    }
    replicas
}

/// SHA-256 truncated to the first 8 bytes, read big-endian, mod N, +1 — the
/// deterministic starting ordinal for `key` (§4.4, scenario 1 in §8).
pub fn hash_to_ordinal(key: &str, n: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut be_bytes = [0u8; 8];
    be_bytes.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(be_bytes);
    (hash % n as u64) as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let mask = vec![
            false, true, true, true, true, true, true, true, true, true, true,
        ];
        let a = placement("sdfs_files/hello", &mask, 4);
        let b = placement("sdfs_files/hello", &mask, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn literal_scenario_1() {
        let mask = vec![
            false, true, true, true, true, true, true, true, true, true, true,
        ];
        let start = hash_to_ordinal("sdfs_files/hello", 10);
        let replicas = placement("sdfs_files/hello", &mask, 4);
        assert_eq!(replicas[0], start);
        assert_eq!(replicas.len(), 4);
        // Clockwise contiguous since every peer is live.
        for w in replicas.windows(2) {
            assert_eq!(w[1], (w[0] % 10) + 1);
        }
    }

    #[test]
    fn skips_dead_ordinals() {
        let mut mask = vec![true; 11];
        mask[0] = false;
        mask[3] = false; // ordinal 3 is dead
        let replicas = placement("k", &mask, 4);
        assert!(!replicas.contains(&3));
    }

    #[test]
    fn total_when_fewer_than_r_live() {
        let mut mask = vec![false; 11];
        mask[1] = true;
        mask[5] = true;
        let replicas = placement("k", &mask, 4);
        assert_eq!(replicas.len(), 2);
    }

    #[test]
    fn empty_when_nothing_live() {
        let mask = vec![false; 11];
        assert!(placement("k", &mask, 4).is_empty());
    }
}
