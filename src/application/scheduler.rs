use crate::infrastructure::error::InfraError;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Owns the single periodic scan timer. Reconfiguring always cancels the
/// running timer before a new one is started.
#[derive(Debug, Default)]
pub struct ScanScheduler {
    timer: Option<JoinHandle<()>>,
    interval_minutes: u32,
}

impl ScanScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Replaces the timer. `tick` runs every `interval_minutes`, first one
    /// period after this call; `0` leaves no timer running.
    pub fn reconfigure<F, Fut>(&mut self, interval_minutes: u32, tick: F) -> Result<(), InfraError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.reconfigure_every(
            Duration::from_secs(u64::from(interval_minutes) * 60),
            tick,
        )?;
        self.interval_minutes = interval_minutes;
        Ok(())
    }

    /// Each tick runs as its own task, so stopping or replacing the timer
    /// never cancels a tick already in progress. A tick that is due while
    /// the previous one is still running is skipped.
    pub fn reconfigure_every<F, Fut>(&mut self, period: Duration, tick: F) -> Result<(), InfraError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        if period.is_zero() {
            return Ok(());
        }

        let runtime = Handle::try_current()
            .map_err(|error| InfraError::Scheduler(format!("no async runtime: {error}")))?;
        let tick_runtime = runtime.clone();
        self.timer = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight: Option<JoinHandle<()>> = None;
            loop {
                ticker.tick().await;
                if in_flight.as_ref().is_some_and(|running| !running.is_finished()) {
                    continue;
                }
                in_flight = Some(tick_runtime.spawn(tick()));
            }
        }));
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.interval_minutes = 0;
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
