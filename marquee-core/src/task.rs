//! Repeating background task handle.
//!
//! Periodic maintenance (cache cleanup, connection probing) runs as a
//! [`RepeatingTask`]: the first tick fires immediately, later ticks follow
//! the configured period, and the task stops only when its handle is shut
//! down or dropped. A running tick is never interrupted.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Handle to a spawned repeating task.
///
/// Dropping the handle signals the task to stop after its current tick.
#[derive(Debug)]
pub struct RepeatingTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl RepeatingTask {
    /// Spawn `tick` on the current tokio runtime every `period`.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = 0u64;

            tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Repeating task started");

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        tick().await;
                        ticks += 1;
                    }
                }
            }

            tracing::debug!(task = name, ticks, "Repeating task stopped");
            ticks
        });

        Self {
            name,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal the task to stop without waiting for it.
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the task and wait for it to finish. Returns the number of
    /// completed ticks.
    pub async fn shutdown(mut self) -> u64 {
        self.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
