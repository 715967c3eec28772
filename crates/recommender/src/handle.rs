//! Shared handle to the current context. Queries take a snapshot and keep
//! using it; a rebuilt context replaces the old one wholesale.

use crate::context::RecommenderContext;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

pub struct ContextHandle {
    current: RwLock<Arc<RecommenderContext>>,
}

impl ContextHandle {
    pub fn new(context: RecommenderContext) -> Self {
        Self {
            current: RwLock::new(Arc::new(context)),
        }
    }

    /// The context in effect right now. In-flight holders are unaffected by
    /// later replacements.
    pub fn snapshot(&self) -> Arc<RecommenderContext> {
        self.current.read().clone()
    }

    /// Swap in a new context and return the one it replaced.
    pub fn replace(&self, context: RecommenderContext) -> Arc<RecommenderContext> {
        let next = Arc::new(context);
        let previous = std::mem::replace(&mut *self.current.write(), next.clone());
        info!(
            previous_batch = %previous.store().batch_id(),
            batch_id = %next.store().batch_id(),
            "Recommender context replaced"
        );
        previous
    }
}
