//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheCore;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task runs in a loop, sleeping for the given interval between sweeps,
/// then taking the write lock just long enough to remove what has expired.
/// It holds only a weak reference to the engine: once the owning cache is
/// gone the next tick fails to upgrade and the task exits on its own, so a
/// sweep can never keep a torn-down cache alive.
///
/// # Arguments
/// * `core` - Weak reference to the shared cache engine
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, used to abort the sweep on
/// `stop_cleanup` or `destroy`.
pub fn spawn_sweep_task(core: Weak<RwLock<CacheCore>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting TTL sweep task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = match core.upgrade() {
                Some(core) => core.write().await.cleanup_expired(),
                None => {
                    debug!("Cache engine dropped, TTL sweep task exiting");
                    break;
                }
            };

            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
