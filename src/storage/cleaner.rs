use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::auth::RevocationStore;

/// Periodically drop expired blacklist and index entries.
pub fn spawn_purge_task(store: Arc<dyn RevocationStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "purged expired revocation entries"),
                Err(err) => warn!("revocation purge failed: {err:#}"),
            }
        }
    })
}
