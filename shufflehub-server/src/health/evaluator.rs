//! Two-threshold storage hysteresis

/// Health of a single storage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Healthy,
    Unhealthy,
}

impl HealthState {
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Usage thresholds, in percent of total capacity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Healthy turns unhealthy at or above this
    pub max_usage: f64,
    /// Unhealthy turns healthy at or below this; strictly less than `max_usage`
    pub recovery_usage: f64,
}

impl Thresholds {
    #[must_use]
    pub const fn new(max_usage: f64, recovery_usage: f64) -> Self {
        Self {
            max_usage,
            recovery_usage,
        }
    }
}

/// Next state after observing `usage_percent`
///
/// Usage strictly between the two thresholds never changes the state.
#[must_use]
pub fn transition(state: HealthState, usage_percent: f64, thresholds: &Thresholds) -> HealthState {
    match state {
        HealthState::Healthy if usage_percent >= thresholds.max_usage => HealthState::Unhealthy,
        HealthState::Unhealthy if usage_percent <= thresholds.recovery_usage => {
            HealthState::Healthy
        }
        unchanged => unchanged,
    }
}
