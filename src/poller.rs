//! Periodic fetch for live views (gainers, health).

use std::{future::Future, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};

/// Runs `fetch` immediately and then every period, sending each result to
/// the paired receiver. Stops when dropped or when the receiver goes away.
pub struct Poller {
    task: JoinHandle<()>,
}

impl Poller {
    pub fn spawn<T, E, F, Fut>(period: Duration, mut fetch: F) -> (Self, mpsc::Receiver<Result<T, E>>)
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let result = fetch().await;
                if tx.send(result).await.is_err() {
                    log::debug!("poller.stopped reason=receiver_dropped");
                    break;
                }
            }
        });
        (Self { task }, rx)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
