use crate::types::TransactionDetail;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Bounded least-recently-used cache of fetched transactions, keyed by digest.
///
/// Shared by every venue watcher. Contents are never authoritative: a miss
/// only costs one extra RPC round trip.
pub struct TransactionCache {
    inner: Mutex<LruCache<String, Arc<TransactionDetail>>>,
}

impl TransactionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, digest: &str) -> Option<Arc<TransactionDetail>> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(digest).cloned()
    }

    pub fn insert(&self, detail: TransactionDetail) -> Arc<TransactionDetail> {
        let detail = Arc::new(detail);
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(detail.digest.clone(), Arc::clone(&detail));
        detail
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
