//! Owned timer resources. Each one runs as a tokio task that is aborted when
//! the owner drops it, so no timer outlives the state that armed it.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Notify, task::JoinHandle, time::MissedTickBehavior};

/// Fires `on_expire` once after `period` without a [`IdleTimer::touch`].
pub struct IdleTimer {
    activity: Arc<Notify>,
    task: JoinHandle<()>,
}

impl IdleTimer {
    pub fn start<F>(period: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let activity = Arc::new(Notify::new());
        let notified = Arc::clone(&activity);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        on_expire();
                        return;
                    }
                    // A touch restarts the countdown.
                    _ = notified.notified() => {}
                }
            }
        });
        Self { activity, task }
    }

    pub fn touch(&self) {
        self.activity.notify_one();
    }

    /// False once the timer fired (or was cancelled).
    pub fn is_armed(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Calls `on_tick` every `period`, first after one full period.
pub struct Ticker {
    task: JoinHandle<()>,
}

impl Ticker {
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut tick = tokio::time::interval_at(start, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                on_tick();
            }
        });
        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&c), c)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_fires_after_quiet_period() {
        let (fired, seen) = counter();
        let timer = IdleTimer::start(Duration::from_secs(60), move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_never_fires_with_activity_each_window() {
        let (fired, seen) = counter();
        let timer = IdleTimer::start(Duration::from_secs(60), move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(45)).await;
            timer.touch();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        // Quiet again: fires one period after the last touch.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_idle_timer_never_fires() {
        let (fired, seen) = counter();
        let timer = IdleTimer::start(Duration::from_secs(10), move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        drop(timer);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_first_tick_after_one_period() {
        let (ticks, seen) = counter();
        let ticker = Ticker::start(Duration::from_secs(50), move || {
            ticks.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(49)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(102)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(ticker.is_running());

        drop(ticker);
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
