use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use folio_core::Result;

use crate::index::VectorIndex;

/// Shared access to the live index.
///
/// Queries take a cheap snapshot and keep using it even if a rebuild swaps
/// in a new index meanwhile. Rebuilds run one at a time.
pub struct IndexHandle {
    current: RwLock<Arc<VectorIndex>>,
    rebuild: tokio::sync::Mutex<()>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self { current: RwLock::new(Arc::new(index)), rebuild: tokio::sync::Mutex::new(()) }
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Build a replacement from the current snapshot and swap it in.
    /// On error the current index stays in place.
    pub async fn rebuild<F, Fut>(&self, f: F) -> Result<Arc<VectorIndex>>
    where
        F: FnOnce(Arc<VectorIndex>) -> Fut,
        Fut: Future<Output = Result<VectorIndex>>,
    {
        let _guard = self.rebuild.lock().await;
        let next = Arc::new(f(self.snapshot()).await?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        tracing::info!(entries = next.len(), "index swapped in");
        Ok(next)
    }
}
