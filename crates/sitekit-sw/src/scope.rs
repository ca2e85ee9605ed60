//! Event lifetime extension (`ExtendableEvent.waitUntil`).

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::warn;

/// Work registered against a single event.
///
/// The worker must not be recycled until [`EventScope::settle`] has
/// returned for every event it handled.
#[derive(Debug, Default)]
pub struct EventScope {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn work that extends the event's lifetime.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    /// Wait for all registered work, including work registered while waiting.
    pub async fn settle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = match self.tasks.lock() {
                Ok(mut tasks) => tasks.drain(..).collect(),
                Err(poisoned) => poisoned.into_inner().drain(..).collect(),
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Extended event work panicked");
                }
            }
        }
    }
}
