//! Client-side caches mirroring backend collections.
//!
//! Each store exclusively owns one [`Cache`]; nothing else writes to it.
//! Cross-store consistency is achieved only through explicit
//! [`Refreshable::invalidate`] calls issued by workflows after a mutation.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::ClientResult;

pub mod appointments;
pub mod notifications;
pub mod payments;

pub use appointments::AppointmentStore;
pub use notifications::NotificationStore;
pub use payments::PaymentStore;

/// The invalidate-and-refetch contract shared by every store.
#[async_trait]
pub trait Refreshable: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mark the cache stale and refetch it from the backend. Readers using
    /// `snapshot()` see stale-marked data until the refetch lands.
    async fn invalidate(&self) -> ClientResult<()>;
}

/// Point-in-time copy of a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub stale: bool,
    /// Number of refetches that completed successfully.
    pub fetches: u64,
}

type Patch<T> = Arc<dyn Fn(&mut Vec<T>) + Send + Sync>;

struct CacheState<T> {
    items: Vec<T>,
    loading: bool,
    stale: bool,
    fetches: u64,
    epoch: u64,
    // Patches confirmed while a refetch was in flight; re-applied to its result.
    journal: Vec<(u64, Patch<T>)>,
}

pub struct Cache<T> {
    state: RwLock<CacheState<T>>,
    gate: Mutex<()>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(CacheState {
                items: Vec::new(),
                loading: false,
                stale: true,
                fetches: 0,
                epoch: 0,
                journal: Vec::new(),
            }),
            gate: Mutex::new(()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Cache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Snapshot<T> {
        let st = self.state.read().await;
        Snapshot {
            items: st.items.clone(),
            loading: st.loading,
            stale: st.stale,
            fetches: st.fetches,
        }
    }

    pub async fn items(&self) -> Vec<T> {
        self.state.read().await.items.clone()
    }

    pub async fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.state.read().await.items.iter().find(|it| pred(it)).cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn is_stale(&self) -> bool {
        self.state.read().await.stale
    }

    pub async fn mark_stale(&self) {
        self.state.write().await.stale = true;
    }

    /// Replace the cached collection with a full fetch. Refetches are
    /// serialised; a failed fetch leaves the previous items in place.
    pub async fn refetch<F, Fut>(&self, fetch: F) -> ClientResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<Vec<T>>>,
    {
        let _gate = self.gate.lock().await;
        self.refetch_locked(fetch).await
    }

    /// Wait for any in-flight refetch, then refetch if the cache is stale.
    /// Concurrent callers on a stale cache share one fetch.
    pub async fn fresh<F, Fut>(&self, fetch: F) -> ClientResult<Vec<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<Vec<T>>>,
    {
        let gate = self.gate.lock().await;
        if self.is_stale().await {
            self.refetch_locked(fetch).await?;
        }
        drop(gate);
        Ok(self.items().await)
    }

    // Caller holds `gate`.
    async fn refetch_locked<F, Fut>(&self, fetch: F) -> ClientResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<Vec<T>>>,
    {
        let started = {
            let mut st = self.state.write().await;
            st.loading = true;
            st.epoch
        };

        let result = fetch().await;

        let mut st = self.state.write().await;
        st.loading = false;
        let outcome = match result {
            Ok(mut items) => {
                for (epoch, patch) in st.journal.iter() {
                    if *epoch > started {
                        patch(&mut items);
                    }
                }
                st.items = items;
                st.stale = false;
                st.fetches += 1;
                Ok(())
            }
            Err(err) => Err(err),
        };
        st.journal.clear();
        outcome
    }

    /// Apply a server-confirmed local change.
    pub async fn patch(&self, patch: impl Fn(&mut Vec<T>) + Send + Sync + 'static) {
        let mut guard = self.state.write().await;
        let st = &mut *guard;
        patch(&mut st.items);
        st.epoch += 1;
        if st.loading {
            st.journal.push((st.epoch, Arc::new(patch)));
        }
    }
}
