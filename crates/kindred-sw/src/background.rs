//! Lifetime extension for work that outlives the response.
//!
//! A stale-while-revalidate hit answers the page from cache and keeps
//! refreshing the entry afterwards. The refresh is registered here so the
//! host can wait for it before letting the agent go idle.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Registry of in-flight background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and keep the agent alive until it finishes.
    pub fn wait_until<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        trace!(label, "Background task registered");
        let mut handles = self.lock();
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((label, handle));
    }

    /// Tasks registered and not yet finished.
    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Await every registered task, including ones registered meanwhile.
    pub async fn drain(&self) {
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return;
            }
            for (label, handle) in batch {
                if let Err(e) = handle.await {
                    warn!(label, error = %e, "Background task failed");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
