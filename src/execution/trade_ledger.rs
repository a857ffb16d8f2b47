use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Coins we currently hold open through mirroring.
///
/// Only the copy engine worker mutates the ledger, and only after a
/// *successful* open/close execution; the status API reads snapshots. The
/// set never grows beyond `max_concurrent`.
#[derive(Clone)]
pub struct TradeLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

struct LedgerInner {
    active: BTreeSet<String>,
    max_concurrent: usize,
}

impl TradeLedger {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                active: BTreeSet::new(),
                max_concurrent,
            })),
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    pub async fn contains(&self, coin: &str) -> bool {
        self.inner.lock().await.active.contains(coin)
    }

    /// Sorted copy of the tracked coins.
    pub async fn snapshot(&self) -> Vec<String> {
        self.inner.lock().await.active.iter().cloned().collect()
    }

    /// Record a successful open. Returns `false` when a new coin would exceed
    /// the cap; re-opening an already tracked coin is a no-op.
    pub async fn mark_opened(&self, coin: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.active.contains(coin) {
            return true;
        }
        if inner.active.len() >= inner.max_concurrent {
            tracing::warn!(
                coin,
                active = inner.active.len(),
                max = inner.max_concurrent,
                "Trade ledger full, not tracking coin"
            );
            return false;
        }
        inner.active.insert(coin.to_string());
        metrics::gauge!("active_trades").set(inner.active.len() as f64);
        tracing::debug!(coin, active = inner.active.len(), "Trade ledger: opened");
        true
    }

    /// Record a successful close. Returns whether the coin was tracked.
    pub async fn mark_closed(&self, coin: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.active.remove(coin);
        if removed {
            metrics::gauge!("active_trades").set(inner.active.len() as f64);
            tracing::debug!(coin, active = inner.active.len(), "Trade ledger: closed");
        }
        removed
    }
}
