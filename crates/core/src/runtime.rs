//! Task spawning abstraction.
//!
//! Everything long-running in this crate - the frame clock's metronomes,
//! per-session pipelines, room socket upkeep - is spawned through
//! [`TaskSpawner`] instead of calling `tokio::spawn` directly, so an
//! embedding application can route background work onto its own runtime
//! (or wrap it for instrumentation) without the media modules knowing.

use std::future::Future;

use futures::future::BoxFuture;

/// Object-safe spawner for detached background tasks.
///
/// Tasks are fire-and-forget: no join handle comes back, and stopping one
/// is the task's own business (the frame clock watches a stop flag, room
/// sockets a cancellation token). Callers go through the inherent
/// [`spawn`](dyn TaskSpawner::spawn) helper rather than boxing futures by
/// hand.
pub trait TaskSpawner: Send + Sync {
    /// Spawns an already-boxed future as a background task.
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>);
}

impl dyn TaskSpawner {
    /// Spawns `future` as a detached background task.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_boxed(Box::pin(future));
    }
}

/// Spawner backed by a Tokio runtime handle. The standalone server uses
/// this; it is also the sensible default for any Tokio-hosted embedding.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the ambient runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn_boxed(&self, future: BoxFuture<'static, ()>) {
        self.handle.spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawns_through_the_trait_object() {
        // Exercised the way the rest of the crate holds it: erased.
        let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioSpawner::current());
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        spawner.spawn(async move {
            executed_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(executed.load(Ordering::SeqCst));
    }
}
