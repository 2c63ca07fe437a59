//! Shuffle server self-assessment
//!
//! A [`HealthCheck`] periodically runs the storage checker and publishes the
//! resulting [`HealthSignal`]. The heartbeat reporter reads the latest value
//! without waiting on the check.

pub mod checker;
pub mod evaluator;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use shufflehub_core::metrics::server as metrics;
use shufflehub_core::models::HealthSignal;

pub use checker::LocalStorageChecker;
pub use evaluator::{transition, HealthState, Thresholds};

pub struct HealthCheck {
    checker: Option<Arc<Mutex<LocalStorageChecker>>>,
    check_interval: Duration,
    signal_tx: watch::Sender<HealthSignal>,
    cancel_token: CancellationToken,
}

impl HealthCheck {
    /// A check that runs `checker` every `check_interval`
    #[must_use]
    pub fn new(checker: LocalStorageChecker, check_interval: Duration) -> Self {
        Self::build(Some(checker), check_interval)
    }

    /// Health checking turned off: always reports healthy
    #[must_use]
    pub fn disabled() -> Self {
        Self::build(None, Duration::ZERO)
    }

    fn build(checker: Option<LocalStorageChecker>, check_interval: Duration) -> Self {
        let (signal_tx, _) = watch::channel(HealthSignal::default());
        metrics::IS_HEALTHY.set(1);
        Self {
            checker: checker.map(|c| Arc::new(Mutex::new(c))),
            check_interval,
            signal_tx,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.checker.is_some()
    }

    /// Latest published signal
    #[must_use]
    pub fn current(&self) -> HealthSignal {
        *self.signal_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthSignal> {
        self.signal_tx.subscribe()
    }

    /// Run one check now and publish its result
    pub async fn check_once(&self) -> HealthSignal {
        let Some(checker) = self.checker.clone() else {
            return self.current();
        };

        let signal = match tokio::task::spawn_blocking(move || checker.lock().check()).await {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(error = %e, "Storage health check task failed");
                return self.current();
            }
        };

        metrics::STORAGE_USAGE_RATIO.set(signal.usage_ratio);
        metrics::IS_HEALTHY.set(i64::from(signal.healthy));
        self.signal_tx.send_replace(signal);
        signal
    }

    /// Start the periodic check; a no-op task when checking is disabled
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let check = Arc::clone(self);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            if !check.is_enabled() {
                tracing::info!("Storage health check disabled, reporting healthy");
                return;
            }

            let mut timer = interval(check.check_interval.max(Duration::from_millis(1)));
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Storage health check shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        check.check_once().await;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
