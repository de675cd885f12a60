//! Membership Event Bus (§3, §4.7 data flow, §9 "cyclic reference"
//! inversion). A bounded, blocking-publisher queue carrying (old-mask,
//! new-mask) snapshots from membership mutations to the replication
//! controller, so the file subsystem never reaches back into the
//! membership list directly.
//!
//! Grounded on the teacher's `mpsc`-based event channels in
//! `networking::membership::swim::SwimMembership` (`event_tx: mpsc::Sender
//! <MembershipEvent>`), sized to the spec's literal capacity of 5.

use crate::error::{Result, SdfsError};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MembershipEvent {
    pub old_mask: Vec<bool>,
    pub new_mask: Vec<bool>,
}

pub struct EventBus {
    tx: mpsc::Sender<MembershipEvent>,
}

pub struct EventSubscriber {
    rx: mpsc::Receiver<MembershipEvent>,
}

impl EventBus {
    /// `capacity` is the bounded queue size (default 5 per §4.7). Returns
    /// the publisher handle and its single consumer; overflow blocks the
    /// publisher until the consumer drains, coupling membership propagation
    /// speed to rebalance speed by design (§9).
    pub fn with_subscriber(capacity: usize) -> (Self, EventSubscriber) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, EventSubscriber { rx })
    }

    pub async fn publish(&self, event: MembershipEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SdfsError::Network("event bus consumer dropped".into()))
    }
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Option<MembershipEvent> {
        self.rx.recv().await
    }
}
