//! Handle for recurring background work

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned background loop that stops when its token is cancelled.
///
/// Dropping the handle cancels the token too, so a loop never outlives the
/// component that started it.
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `body` with a fresh cancellation token
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(body(token.clone()));
        tracing::debug!(task = name, "Started background task");
        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Token that stops the loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// True until the loop has exited
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Cancel the loop and wait for it to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(task = self.name, error = %e, "Background task ended abnormally");
            }
        }
        tracing::debug!(task = self.name, "Stopped background task");
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ticking(counter: Arc<AtomicUsize>) -> BackgroundTask {
        BackgroundTask::spawn("ticker", move |token| async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = ticking(counter.clone());
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        task.stop().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancellation_stops_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = ticking(counter);
        task.cancellation_token().cancel();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_loop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = ticking(counter.clone());
        let token = task.cancellation_token();
        drop(task);

        assert!(token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(counter.load(Ordering::SeqCst) <= 1);
    }
}
