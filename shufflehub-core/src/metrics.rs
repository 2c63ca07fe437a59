//! Prometheus metrics for the coordinator and shuffle servers
//!
//! Everything registers into [`REGISTRY`], which the coordinator exposes on
//! `/metrics` via [`gather_metrics`].

use prometheus::{
    register_counter_vec_with_registry, register_gauge_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, CounterVec, Encoder,
    Gauge, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Coordinator-side cluster metrics
pub mod coordinator {
    use super::{
        register_counter_vec_with_registry, register_int_counter_with_registry,
        register_int_gauge_with_registry, CounterVec, IntCounter, IntGauge, REGISTRY,
    };

    /// Registered shuffle servers, healthy or not
    pub static TOTAL_SERVER_NUM: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "coordinator_total_server_num",
            "Number of registered shuffle servers",
            REGISTRY.clone()
        )
        .expect("Failed to register TOTAL_SERVER_NUM")
    });

    pub static HEALTHY_SERVER_NUM: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "coordinator_healthy_server_num",
            "Number of registered shuffle servers reporting healthy",
            REGISTRY.clone()
        )
        .expect("Failed to register HEALTHY_SERVER_NUM")
    });

    pub static EXPIRED_SERVERS_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "coordinator_expired_servers_total",
                "Shuffle servers evicted for missing heartbeats",
                REGISTRY.clone()
            )
            .expect("Failed to register EXPIRED_SERVERS_TOTAL")
        });

    pub static RUNNING_APP_NUM: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "coordinator_running_app_num",
            "Applications seen within the expiry window",
            REGISTRY.clone()
        )
        .expect("Failed to register RUNNING_APP_NUM")
    });

    pub static TOTAL_APP_NUM: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "coordinator_total_app_num",
            "Applications registered since start",
            REGISTRY.clone()
        )
        .expect("Failed to register TOTAL_APP_NUM")
    });

    pub static ASSIGNMENT_REQUESTS_TOTAL: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "coordinator_assignment_requests_total",
                "Shuffle assignment requests by response status",
                &["status"],
                REGISTRY.clone()
            )
            .expect("Failed to register ASSIGNMENT_REQUESTS_TOTAL")
        });
}

/// Shuffle-server-side health metrics
pub mod server {
    use super::{
        register_gauge_with_registry, register_int_counter_with_registry,
        register_int_gauge_with_registry, Gauge, IntCounter, IntGauge, REGISTRY,
    };

    pub static STORAGE_USAGE_RATIO: std::sync::LazyLock<Gauge> = std::sync::LazyLock::new(|| {
        register_gauge_with_registry!(
            "server_storage_usage_ratio",
            "Used over total bytes across local storage directories",
            REGISTRY.clone()
        )
        .expect("Failed to register STORAGE_USAGE_RATIO")
    });

    /// 1 when healthy, 0 otherwise
    pub static IS_HEALTHY: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "server_is_healthy",
            "Whether the storage health check currently passes",
            REGISTRY.clone()
        )
        .expect("Failed to register IS_HEALTHY")
    });

    pub static HEARTBEAT_FAILURES_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "server_heartbeat_failures_total",
                "Heartbeats that could not be delivered to the coordinator",
                REGISTRY.clone()
            )
            .expect("Failed to register HEARTBEAT_FAILURES_TOTAL")
        });
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::Error::Internal(format!("Failed to encode metrics: {e}")))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::Error::Internal(format!("Metrics are not valid UTF-8: {e}")))
}
