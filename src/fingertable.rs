//! Finger Table (§3, §4.2). A log-stride routing structure rebuilt lazily
//! from the membership list. Grounded on `clustering::dht`'s ring-walk idiom
//! (`VirtualNode`/consistent-hash scanning), adapted to the spec's exact
//! algorithm: slot `i` is the first live, non-self, not-yet-placed ordinal
//! found scanning clockwise from `(self + 2^i - 1) mod N + 1`.

use crate::identity::Ordinal;
use crate::membership::MembershipList;
use std::collections::HashSet;

/// Up to `finger_table_size` routing targets. A `None` slot means no
/// qualifying live peer was found scanning that stride (§3 "empty slot").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerTable {
    pub slots: Vec<Option<Ordinal>>,
}

impl FingerTable {
    pub fn live_targets(&self) -> impl Iterator<Item = Ordinal> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }
}

/// §4.2 `rebuild`. Reads membership live state (not atomically, per §5) and
/// recomputes every slot.
pub fn rebuild(membership: &MembershipList, size: usize) -> FingerTable {
    let n = membership.n();
    let self_ordinal = membership.self_ordinal();
    let live = membership.snapshot_live();
    let mut placed: HashSet<Ordinal> = HashSet::new();
    let mut slots = Vec::with_capacity(size);

    let mut power_of_two: u64 = 1;
    for _ in 0..size {
        let start = ((self_ordinal as u64 - 1 + power_of_two) % n as u64) as u32 + 1;
        let mut look = start;
        let mut found = None;
        loop {
            let is_live = live.get(look as usize).copied().unwrap_or(false);
            if look != self_ordinal && is_live && !placed.contains(&look) {
                found = Some(look);
                break;
            }
            look = (look % n) + 1;
            if look == start {
                break;
            }
        }
        if let Some(target) = found {
            placed.insert(target);
        }
        slots.push(found);
        power_of_two *= 2;
    }

    FingerTable { slots }
}
