//! Page-reach hit counter.
//!
//! Hits accumulate in memory and are merged into durable storage by addition
//! on a fixed interval. The in-memory delta is taken with an atomic swap, and
//! flushes within a process are serialised, so no hit is counted twice or
//! dropped by this process. A failed merge puts the delta back.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::store::PageReachStore;
use crate::Result;

#[derive(Debug, Default)]
pub struct PageReachCounter {
    pending: AtomicI64,
    flush_lock: Mutex<()>,
}

impl PageReachCounter {
    pub fn new() -> Self { Self::default() }

    pub fn hit(&self) { self.pending.fetch_add(1, Ordering::Relaxed); }

    /// Hits not yet merged into durable storage.
    pub fn pending(&self) -> i64 { self.pending.load(Ordering::Relaxed) }

    /// Merges pending hits into `store`; returns how many were merged.
    pub async fn flush<S: PageReachStore + ?Sized>(&self, store: &S) -> Result<i64> {
        let _guard = self.flush_lock.lock().await;
        let delta = self.pending.swap(0, Ordering::AcqRel);
        if delta == 0 {
            return Ok(0);
        }
        if let Err(e) = store.add_page_reach(delta).await {
            self.pending.fetch_add(delta, Ordering::AcqRel);
            return Err(e);
        }
        debug!(delta, "page reach flushed");
        Ok(delta)
    }

    /// Runs [`flush`](Self::flush) every `period`, and once more when
    /// `shutdown` changes or its sender is dropped. Exactly one flusher should
    /// run per process.
    pub fn spawn_flusher<S: PageReachStore + 'static>(
        self: Arc<Self>,
        store: Arc<S>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.flush(store.as_ref()).await {
                            warn!(error = %e, pending = self.pending(), "page reach flush failed; will retry next tick");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            match self.flush(store.as_ref()).await {
                Ok(flushed) => info!(flushed, "final page reach flush"),
                Err(e) => error!(error = %e, pending = self.pending(), "final page reach flush failed"),
            }
        })
    }
}
