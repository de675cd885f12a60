//! Replication Controller (§4.7). Subscribes to the membership event bus;
//! for each (old, new) snapshot, recomputes placement for every locally
//! held file and ships newly-gained replicas or drops ones it no longer
//! owns. Grounded on the teacher's `replication::manager` event-driven
//! rebalance loop, generalized to the spec's exact old/new-set diff rule.

use crate::config::Config;
use crate::event_bus::{EventSubscriber, MembershipEvent};
use crate::identity::Ordinal;
use crate::placement;
use crate::rpc::client;
use crate::store::FileStore;
use std::sync::Arc;

/// Runs until the event bus closes (i.e. the gossip engine and its
/// publishers are gone). Consumes events strictly in arrival order per §4.7.
pub async fn run(
    config: Arc<Config>,
    store: Arc<FileStore>,
    self_ordinal: Ordinal,
    mut subscriber: EventSubscriber,
) {
    while let Some(event) = subscriber.recv().await {
        if let Err(e) = handle_event(&config, &store, self_ordinal, &event).await {
            tracing::warn!("replication controller failed to process event: {e}");
        }
    }
}

async fn handle_event(
    config: &Config,
    store: &FileStore,
    self_ordinal: Ordinal,
    event: &MembershipEvent,
) -> crate::error::Result<()> {
    for name in store.local_names()? {
        let old_set = placement::placement(&name, &event.old_mask, config.r);
        let new_set = placement::placement(&name, &event.new_mask, config.r);

        for &target in &new_set {
            if target != self_ordinal && !old_set.contains(&target) {
                match store.get(&name) {
                    Ok(bytes) => {
                        if let Err(e) = client::replicate_send(config, target, &name, &bytes).await
                        {
                            tracing::warn!("failed to ship {name} to ordinal {target}: {e}");
                        }
                    }
                    Err(e) => tracing::warn!("could not read {name} to ship: {e}"),
                }
            }
        }

        if old_set.contains(&self_ordinal) && !new_set.contains(&self_ordinal) {
            store.delete(&name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::server;
    use tempfile::tempdir;

    fn test_config(file_port: u16) -> Config {
        let mut c = Config::default();
        c.r = 1;
        c.host_template = "127.0.0.{}".to_string();
        c.file_port = file_port;
        c
    }

    #[tokio::test]
    async fn sheds_dropped_replica_and_ships_gained_one() {
        let config = Arc::new(test_config(15781));

        let dir1 = tempdir().unwrap();
        let store1 = Arc::new(FileStore::init(dir1.path().join("s"), 4).unwrap());
        store1.put("f.txt", b"payload").unwrap();

        let dir2 = tempdir().unwrap();
        let store2 = Arc::new(FileStore::init(dir2.path().join("s"), 4).unwrap());

        let serve_config = config.clone();
        let serve_store = store2.clone();
        tokio::spawn(async move {
            let _ = server::serve(serve_config, serve_store, 2).await;
        });
        // Give the ordinal-2 listener a moment to bind before dialing it.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // r=1: old mask has only ordinal 1 live -> old_set=[1]; new mask has
        // only ordinal 2 live -> new_set=[2]. Deterministic regardless of
        // f.txt's hash since there's exactly one live candidate each side.
        let old_mask = vec![false, true, false];
        let new_mask = vec![false, false, true];
        let event = MembershipEvent { old_mask, new_mask };

        handle_event(&config, &store1, 1, &event).await.unwrap();

        assert!(
            !store1.list("f.txt"),
            "ordinal 1 must shed the file it no longer owns"
        );
        assert_eq!(store2.get("f.txt").unwrap(), b"payload");
    }
}
