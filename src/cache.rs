use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    error::RemoteError,
    forge::Forge,
    types::{PullRequest, PullRequestId},
};

/// Diff text keyed by pull request identity.
///
/// `get` is fetch-through: callers cannot tell whether the text came from
/// the cache or the forge. `remove` evicts an entry so a later `get` fetches
/// again.
#[async_trait]
pub trait PatchCache: Send + Sync {
    async fn get(&self, pr: &PullRequest) -> Result<Option<String>, RemoteError>;

    fn remove(&self, id: &PullRequestId);
}

type Slot = Arc<OnceCell<Option<String>>>;

/// In-memory [`PatchCache`] backed by a [`Forge`].
///
/// Each pull request's diff is fetched at most once while its entry is
/// present; concurrent `get`s for the same key wait on a single fetch.
/// A fetch that fails or is abandoned drops its entry once no other caller
/// is waiting on it, so the next `get` tries again.
pub struct InMemoryPatchCache {
    forge: Arc<dyn Forge>,
    slots: Mutex<HashMap<PullRequestId, Slot>>,
}

impl InMemoryPatchCache {
    pub fn new(forge: Arc<dyn Forge>) -> Self {
        Self {
            forge,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, id: &PullRequestId) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|slot| slot.initialized())
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &PullRequestId) -> Slot {
        self.lock().entry(id.clone()).or_default().clone()
    }

    /// Removes `slot` from the map if its fetch never completed and no other
    /// `get` holds it. Clones are only taken under the lock, so a strong
    /// count of two (map plus `slot`) means nobody else is waiting.
    fn forget_if_empty(&self, id: &PullRequestId, slot: &Slot) {
        let mut slots = self.lock();
        let abandoned = slots.get(id).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
        if abandoned {
            slots.remove(id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PullRequestId, Slot>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs [`InMemoryPatchCache::forget_if_empty`] when a `get` returns or is
/// dropped mid-fetch.
struct EmptySlotGuard<'a> {
    cache: &'a InMemoryPatchCache,
    id: &'a PullRequestId,
    slot: &'a Slot,
}

impl Drop for EmptySlotGuard<'_> {
    fn drop(&mut self) {
        if !self.slot.initialized() {
            self.cache.forget_if_empty(self.id, self.slot);
        }
    }
}

#[async_trait]
impl PatchCache for InMemoryPatchCache {
    async fn get(&self, pr: &PullRequest) -> Result<Option<String>, RemoteError> {
        let slot = self.slot(&pr.id);
        let _guard = EmptySlotGuard {
            cache: self,
            id: &pr.id,
            slot: &slot,
        };
        let patch = slot
            .get_or_try_init(|| async {
                debug!(pr = %pr.id, "Fetching diff");
                self.forge.pull_request_diff(&pr.id).await
            })
            .await?;
        Ok(patch.clone())
    }

    fn remove(&self, id: &PullRequestId) {
        if self.lock().remove(id).is_some() {
            debug!(pr = %id, "Evicted cached diff");
        }
    }
}
