//! Periodic side-channel tasks (heartbeat, emotion capture).
//!
//! Each task owns a child [`CancellationToken`]; cancelling the parent token
//! stops every task spawned from it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Periodic {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Periodic {
    /// Runs `tick` every `period`, first after one full period.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        parent: &CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            info!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }

            debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancels and waits for the in-flight tick to unwind.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!(task = self.name, error = %e, "Periodic task ended abnormally");
            }
        }
    }
}

impl Drop for Periodic {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let root = CancellationToken::new();

        let task = Periodic::spawn("test", Duration::from_secs(3), &root, move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(6_200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        task.shutdown().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_children() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let root = CancellationToken::new();

        let task = Periodic::spawn("child", Duration::from_secs(1), &root, move || {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        root.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        task.shutdown().await;
    }
}
