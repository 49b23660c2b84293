//! Background task registry for reveals and the scheduler loop.
//!
//! Handles live in a `parking_lot::Mutex` that is never held across an
//! `.await`.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a task that stops early if the registry shuts down
    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            tracing::debug!("Task registry is shut down, not spawning");
            return;
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });
        self.track(handle);
    }

    /// Run `f` on every tick until it returns false or the registry shuts down
    pub fn spawn_interval_until<F, Fut>(&self, interval: Duration, mut f: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if self.is_shut_down() {
            tracing::debug!("Task registry is shut down, not spawning");
            return;
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if !f().await {
                            break;
                        }
                    }
                }
            }
        });
        self.track(handle);
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait until every tracked task, including ones spawned meanwhile, has finished
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<_> = self.handles.lock().drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    if e.is_panic() {
                        tracing::error!("Background task panicked: {}", e);
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_idle_joins_tasks() {
        let registry = TaskRegistry::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            registry.spawn_cancellable(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        registry.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(registry.handles.lock().is_empty());
    }

    #[tokio::test]
    async fn test_interval_stops_when_callback_says_so() {
        let registry = TaskRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        registry.spawn_interval_until(Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 }
        });

        registry.wait_idle().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_long_tasks() {
        let registry = TaskRegistry::new();
        registry.spawn_cancellable(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        registry.shutdown();
        registry.wait_idle().await;
        assert!(registry.handles.lock().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_ignored() {
        let registry = TaskRegistry::new();
        registry.shutdown();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        registry.spawn_cancellable(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry.wait_idle().await;

        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
