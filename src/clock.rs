use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Drives the periodic refresh loops. Swapped for [`ManualTicker`] in tests.
#[async_trait]
pub trait Ticker: Send {
    /// Resolves when the next scheduled refresh is due.
    async fn tick(&mut self);
}

/// Wall-clock ticker. The first tick fires one full period after creation,
/// since the initial poll is issued eagerly by the caller.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Ticker that only advances when its [`TickHandle`] fires.
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl TickHandle {
    /// Releases one tick. Returns false once the ticker is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

pub fn manual() -> (TickHandle, ManualTicker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TickHandle { tx }, ManualTicker { rx })
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            // every handle dropped: the clock has stopped
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn interval_ticker_waits_a_full_period_first() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(15));
        let start = Instant::now();
        ticker.tick().await;
        assert!(start.elapsed() >= Duration::from_secs(15));
        ticker.tick().await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn manual_ticker_releases_one_tick_per_fire() {
        let (handle, mut ticker) = manual();
        assert!(timeout(Duration::from_millis(20), ticker.tick()).await.is_err());

        assert!(handle.fire());
        assert!(timeout(Duration::from_millis(20), ticker.tick()).await.is_ok());
        assert!(timeout(Duration::from_millis(20), ticker.tick()).await.is_err());
    }

    #[tokio::test]
    async fn fire_reports_dropped_ticker() {
        let (handle, ticker) = manual();
        drop(ticker);
        assert!(!handle.fire());
    }
}
