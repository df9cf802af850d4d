//! Active TTL Expiration
//!
//! Background task that probabilistically samples TTL-bearing keys and
//! removes the expired ones, after Redis's active-expiration heuristic.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use super::Store;

/// Sleep while no key carries a TTL
const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// Sleep between bounded sampling passes
const SWEEP_SLEEP: Duration = Duration::from_millis(100);

/// Background expiration task.
///
/// Each pass holds the store lock for at most the sampling budget, then
/// yields for 100 ms so command traffic is never starved.
pub struct ExpirationSweeper {
    store: Store,
}

impl ExpirationSweeper {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run the sweeper (should be spawned as a task)
    pub async fn run(self) {
        info!("expiration sweeper started");

        loop {
            match self.store.sweep_expired() {
                None => sleep(IDLE_SLEEP).await,
                Some(expired) => {
                    if expired > 0 {
                        debug!(expired, "removed expired keys");
                    }
                    sleep(SWEEP_SLEEP).await;
                }
            }
        }
    }

    /// Spawn the sweeper as a background task
    pub fn spawn(store: Store) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Self::new(store).run())
    }
}
