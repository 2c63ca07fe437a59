//! Application liveness bookkeeping
//!
//! Applications are remembered from their last assignment request or app
//! heartbeat until they have been idle for the expiry interval. This is
//! independent of shuffle server health.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use shufflehub_core::metrics::coordinator as metrics;

pub struct ApplicationManager {
    apps: DashMap<String, Instant>,
    expired_interval: Duration,
    cancel_token: CancellationToken,
}

impl ApplicationManager {
    #[must_use]
    pub fn new(expired_interval: Duration) -> Self {
        Self {
            apps: DashMap::new(),
            expired_interval,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Record activity for `app_id`; returns true when the app was not known
    pub fn refresh_app(&self, app_id: &str, now: Instant) -> bool {
        if let Some(mut last) = self.apps.get_mut(app_id) {
            *last = (*last).max(now);
            return false;
        }

        let inserted = self.apps.insert(app_id.to_string(), now).is_none();
        if inserted {
            tracing::info!(app_id = %app_id, "Application registered");
            metrics::TOTAL_APP_NUM.inc();
            metrics::RUNNING_APP_NUM.set(self.apps.len() as i64);
        }
        inserted
    }

    #[must_use]
    pub fn contains(&self, app_id: &str) -> bool {
        self.apps.contains_key(app_id)
    }

    /// Known application ids, sorted
    #[must_use]
    pub fn app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.apps.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Forget applications idle for longer than the expiry interval
    pub fn expire_stale(&self, now: Instant) -> Vec<String> {
        let ids: Vec<String> = self.apps.iter().map(|e| e.key().clone()).collect();
        let limit = self.expired_interval;

        let mut expired = Vec::new();
        for id in ids {
            if let Some((id, _)) = self
                .apps
                .remove_if(&id, |_, last| now.saturating_duration_since(*last) > limit)
            {
                tracing::info!(app_id = %id, "Application expired");
                expired.push(id);
            }
        }
        metrics::RUNNING_APP_NUM.set(self.apps.len() as i64);
        expired
    }

    /// Start the periodic application expiry sweep, twice per interval
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let cancel_token = self.cancel_token.clone();
        let period = (self.expired_interval / 2).max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Application expiry sweep shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        manager.expire_stale(Instant::now());
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
