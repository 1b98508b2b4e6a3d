//! Periodic cleanup of expired revocation entries

use crate::revocation::RevocationStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

/// Runs [`RevocationStore::sweep`] on a fixed cadence
pub struct RevocationSweeper {
    store: Arc<dyn RevocationStore>,
    every: Duration,
}

impl RevocationSweeper {
    pub fn new(store: Arc<dyn RevocationStore>, every: Duration) -> Self {
        Self { store, every }
    }

    /// Sweep once. Store errors are logged and counted as nothing removed.
    pub async fn sweep_once(&self) -> usize {
        match self.store.sweep(Utc::now()).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(error = %e, store = self.store.store_type(), "Revocation sweep failed");
                0
            }
        }
    }

    /// Spawn the sweep loop onto the current tokio runtime.
    ///
    /// The first sweep runs immediately. Dropping the returned handle also
    /// stops the loop.
    pub fn start(self) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        info!(
            interval_secs = self.every.as_secs(),
            store = self.store.store_type(),
            "Starting revocation sweeper"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_once().await;
                        debug!(removed = removed, "Revocation sweep tick");
                    }
                    _ = stop_rx.changed() => break,
                }
            }

            info!("Revocation sweeper stopped");
        });

        SweeperHandle { stop_tx, task }
    }
}

/// Handle to a running [`RevocationSweeper`]
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Revocation sweeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation::MemoryRevocationStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_sweep_once() {
        let store = Arc::new(MemoryRevocationStore::new());
        store
            .revoke("old", Utc::now() - ChronoDuration::seconds(5))
            .await
            .unwrap();
        store
            .revoke("live", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let sweeper = RevocationSweeper::new(store.clone(), Duration::from_secs(60));
        assert_eq!(sweeper.sweep_once().await, 1);
        assert!(store.is_revoked("live").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeps_and_shutdown() {
        let store = Arc::new(MemoryRevocationStore::new());
        store
            .revoke("old", Utc::now() - ChronoDuration::seconds(5))
            .await
            .unwrap();

        let handle = RevocationSweeper::new(store.clone(), Duration::from_secs(60)).start();

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.len().await.unwrap(), 0);

        store
            .revoke("later", Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len().await.unwrap(), 0);

        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
