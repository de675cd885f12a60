//! Membership List (§3, §4.1). Grounded on
//! `clustering::membership::{Member, MemberState}` for the per-entry shape,
//! reworked to the spec's exact fields (`ordinal`, `incarnation`, `failed`,
//! `dirty`, `ack_pending`) and per-entry `parking_lot::Mutex` locking rather
//! than a single `RwLock<HashMap<_>>`, since the spec explicitly calls for
//! no list-wide lock.

use crate::error::Result;
use crate::event_bus::{EventBus, MembershipEvent};
use crate::identity::{now_millis, Ordinal};
use parking_lot::Mutex;

/// Wire-level membership fact: what gets gossiped. Mirrors
/// `shared.go`'s `MembershipId{TimeStamp, ServNum, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct WireEntry {
    pub ordinal: u32,
    pub incarnation: u64,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MembershipEntry {
    pub ordinal: Ordinal,
    pub incarnation: u64,
    pub failed: bool,
    pub dirty: bool,
    pub ack_pending: bool,
    /// Has this ordinal's entry ever been adopted? Distinguishes the
    /// "no prior record" case (I1) from a legitimately-zero incarnation.
    seen: bool,
}

impl MembershipEntry {
    fn placeholder(ordinal: Ordinal) -> Self {
        Self {
            ordinal,
            incarnation: 0,
            failed: true,
            dirty: false,
            ack_pending: false,
            seen: false,
        }
    }

    fn wire(&self) -> WireEntry {
        WireEntry {
            ordinal: self.ordinal,
            incarnation: self.incarnation,
            failed: self.failed,
        }
    }
}

/// Fixed-size membership table, one mutex-guarded entry per ordinal
/// (index 0 unused so ordinals can index directly).
pub struct MembershipList {
    entries: Vec<Mutex<MembershipEntry>>,
    self_ordinal: Ordinal,
    n: u32,
    fingertable_stale: Mutex<bool>,
}

impl MembershipList {
    pub fn new(n: u32, self_ordinal: Ordinal) -> Self {
        let entries = (0..=n)
            .map(|i| Mutex::new(MembershipEntry::placeholder(i)))
            .collect();
        Self {
            entries,
            self_ordinal,
            n,
            fingertable_stale: Mutex::new(true),
        }
    }

    pub fn self_ordinal(&self) -> Ordinal {
        self.self_ordinal
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    fn entry(&self, ordinal: Ordinal) -> &Mutex<MembershipEntry> {
        &self.entries[ordinal as usize]
    }

    /// Join-time self-announcement: set our own entry alive with a fresh
    /// incarnation, mark dirty, and mark the finger table stale.
    pub fn announce_self(&self) {
        let mut e = self.entry(self.self_ordinal).lock();
        e.incarnation = now_millis();
        e.failed = false;
        e.dirty = true;
        e.seen = true;
        drop(e);
        *self.fingertable_stale.lock() = true;
    }

    /// Leave-time self-mark: fail our own entry so the next (and only,
    /// best-effort) gossip tick disseminates it.
    pub fn mark_self_failed(&self) {
        let mut e = self.entry(self.self_ordinal).lock();
        e.failed = true;
        e.dirty = true;
    }

    /// §4.1 `update`. Applies each incoming delta under its own entry lock,
    /// publishing an (old, new) snapshot to `bus` on every adoption.
    pub async fn update(&self, deltas: &[WireEntry], bus: &EventBus) -> Result<()> {
        for delta in deltas {
            let old_mask = self.snapshot_live();
            let adopted = self.apply_one(delta);
            if adopted {
                let new_mask = self.snapshot_live();
                *self.fingertable_stale.lock() = true;
                bus.publish(MembershipEvent { old_mask, new_mask }).await?;
            }
        }
        Ok(())
    }

    /// Apply a single delta under its entry's lock. Returns true if the
    /// entry was adopted (and thus an event/fingertable-staleness should
    /// follow).
    fn apply_one(&self, delta: &WireEntry) -> bool {
        if delta.ordinal == 0 || delta.ordinal > self.n {
            return false;
        }
        let mut local = self.entry(delta.ordinal).lock();

        if !local.seen {
            *local = MembershipEntry {
                seen: true,
                dirty: true,
                ..MembershipEntry::from_wire(*delta)
            };
            return true;
        }

        if delta.incarnation > local.incarnation {
            let ack_pending = local.ack_pending;
            *local = MembershipEntry {
                seen: true,
                dirty: true,
                ack_pending,
                ..MembershipEntry::from_wire(*delta)
            };
            return true;
        }

        if delta.failed && !local.failed && delta.incarnation == local.incarnation {
            if delta.ordinal == self.self_ordinal {
                // I3: self-incarnation race. Re-announce rather than
                // adopting the failure (P2 self-preservation).
                local.incarnation = now_millis();
                local.failed = false;
                local.dirty = true;
            } else {
                local.failed = true;
                local.dirty = true;
            }
            return true;
        }

        false
    }

    /// §4.1 `collect_dirty`. `include_all=false` drains and clears dirty
    /// entries (outbound gossip payload); `include_all=true` returns every
    /// non-failed entry without touching `dirty` (introducer bootstrap
    /// reply).
    pub fn collect_dirty(&self, include_all: bool) -> Vec<WireEntry> {
        let mut out = Vec::new();
        for ordinal in 1..=self.n {
            let mut e = self.entry(ordinal).lock();
            if !e.seen {
                continue;
            }
            if include_all {
                if !e.failed {
                    out.push(e.wire());
                }
            } else if e.dirty {
                out.push(e.wire());
                e.dirty = false;
            }
        }
        out
    }

    /// §3 `snapshot_live`. Index 0 is always `false` (unused).
    pub fn snapshot_live(&self) -> Vec<bool> {
        let mut mask = vec![false; (self.n + 1) as usize];
        for ordinal in 1..=self.n {
            let e = self.entry(ordinal).lock();
            mask[ordinal as usize] = e.seen && !e.failed;
        }
        mask
    }

    pub fn is_fingertable_stale(&self) -> bool {
        *self.fingertable_stale.lock()
    }

    pub fn clear_fingertable_stale(&self) {
        *self.fingertable_stale.lock() = false;
    }

    pub fn ack_pending(&self, ordinal: Ordinal) -> bool {
        self.entry(ordinal).lock().ack_pending
    }

    pub fn set_ack_pending(&self, ordinal: Ordinal, value: bool) {
        self.entry(ordinal).lock().ack_pending = value;
    }

    /// Ack-timeout firing (§4.3 step 3c): mark `ordinal` failed if it never
    /// acked this tick. Returns true if this call is the one that marked it.
    pub fn mark_failed_on_timeout(
        &self,
        ordinal: Ordinal,
        bus_event: &mut Option<MembershipEvent>,
    ) -> bool {
        let old_mask = self.snapshot_live();
        let mut e = self.entry(ordinal).lock();
        if e.seen && !e.ack_pending && !e.failed {
            e.failed = true;
            e.dirty = true;
            drop(e);
            *self.fingertable_stale.lock() = true;
            let new_mask = self.snapshot_live();
            *bus_event = Some(MembershipEvent { old_mask, new_mask });
            true
        } else {
            false
        }
    }

    pub fn is_failed(&self, ordinal: Ordinal) -> bool {
        self.entry(ordinal).lock().failed
    }

    pub fn is_self(&self, ordinal: Ordinal) -> bool {
        ordinal == self.self_ordinal
    }
}

impl MembershipEntry {
    fn from_wire(w: WireEntry) -> Self {
        Self {
            ordinal: w.ordinal,
            incarnation: w.incarnation,
            failed: w.failed,
            dirty: false,
            ack_pending: false,
            seen: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> EventBus {
        let (bus, sub) = EventBus::with_subscriber(5);
        // Tests only exercise the publisher side; keep the receiver alive
        // for the test's duration so `publish` doesn't see a closed channel.
        std::mem::forget(sub);
        bus
    }

    #[tokio::test]
    async fn adopts_unseen_ordinal() {
        let ml = MembershipList::new(10, 1);
        let bus = bus();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 100,
                failed: false,
            }],
            &bus,
        )
        .await
        .unwrap();
        assert!(ml.snapshot_live()[2]);
    }

    #[tokio::test]
    async fn later_incarnation_wins() {
        let ml = MembershipList::new(10, 1);
        let bus = bus();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 100,
                failed: true,
            }],
            &bus,
        )
        .await
        .unwrap();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 200,
                failed: false,
            }],
            &bus,
        )
        .await
        .unwrap();
        assert!(ml.snapshot_live()[2]);
    }

    #[tokio::test]
    async fn stale_incarnation_dropped() {
        let ml = MembershipList::new(10, 1);
        let bus = bus();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 200,
                failed: false,
            }],
            &bus,
        )
        .await
        .unwrap();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 100,
                failed: true,
            }],
            &bus,
        )
        .await
        .unwrap();
        assert!(ml.snapshot_live()[2]);
    }

    #[tokio::test]
    async fn self_failure_rumor_triggers_reannounce_not_suicide() {
        let ml = MembershipList::new(10, 1);
        let bus = bus();
        ml.announce_self();
        let before = ml.entry(1).lock().incarnation;
        ml.update(
            &[WireEntry {
                ordinal: 1,
                incarnation: before,
                failed: true,
            }],
            &bus,
        )
        .await
        .unwrap();
        assert!(ml.snapshot_live()[1], "self must never adopt failed=true");
        assert!(ml.entry(1).lock().incarnation >= before);
    }

    #[tokio::test]
    async fn same_incarnation_failure_rumor_for_peer_is_adopted() {
        let ml = MembershipList::new(10, 1);
        let bus = bus();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 100,
                failed: false,
            }],
            &bus,
        )
        .await
        .unwrap();
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 100,
                failed: true,
            }],
            &bus,
        )
        .await
        .unwrap();
        assert!(!ml.snapshot_live()[2]);
    }

    #[test]
    fn collect_dirty_drains_and_clears() {
        let ml = MembershipList::new(10, 1);
        ml.announce_self();
        let first = ml.collect_dirty(false);
        assert_eq!(first.len(), 1);
        let second = ml.collect_dirty(false);
        assert!(second.is_empty());
    }

    #[test]
    fn collect_all_returns_every_live_entry_without_clearing_dirty() {
        let ml = MembershipList::new(10, 1);
        ml.announce_self();
        let all = ml.collect_dirty(true);
        assert_eq!(all.len(), 1);
        assert!(ml.entry(1).lock().dirty, "include_all must not clear dirty");
    }

    /// Regression: `update` must publish the mask as it stood *before* the
    /// adopted delta alongside the mask *after* it, not the same snapshot
    /// twice -- otherwise the replication controller's old/new diff is
    /// always empty and rebalancing never happens.
    #[tokio::test]
    async fn update_publishes_distinct_old_and_new_masks() {
        let (bus, mut sub) = EventBus::with_subscriber(5);
        let ml = MembershipList::new(10, 1);
        ml.update(
            &[WireEntry {
                ordinal: 2,
                incarnation: 100,
                failed: false,
            }],
            &bus,
        )
        .await
        .unwrap();
        let event = sub.recv().await.unwrap();
        assert!(!event.old_mask[2], "ordinal 2 was not yet live beforehand");
        assert!(event.new_mask[2], "ordinal 2 is live after adoption");
        assert_ne!(event.old_mask, event.new_mask);
    }

    /// Same regression, for the ack-timeout failure path.
    #[test]
    fn mark_failed_on_timeout_publishes_distinct_old_and_new_masks() {
        let ml = MembershipList::new(10, 1);
        ml.apply_one(&WireEntry {
            ordinal: 2,
            incarnation: 100,
            failed: false,
        });
        ml.set_ack_pending(2, false);
        let mut event = None;
        assert!(ml.mark_failed_on_timeout(2, &mut event));
        let event = event.expect("a failure event must be produced");
        assert!(event.old_mask[2], "ordinal 2 was live beforehand");
        assert!(!event.new_mask[2], "ordinal 2 is failed afterward");
        assert_ne!(event.old_mask, event.new_mask);
    }
}
