use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

pub static LAYER_MEMORY: &str = "memory";
pub static LAYER_DISK: &str = "disk";
pub static LAYER_ISSUER: &str = "issuer";

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Identity provider calls
    pub source_fetch_requests: IntCounterVec,
    pub source_fetch_failures: IntCounterVec,
    pub source_fetch_duration: HistogramVec,

    // Token manager
    pub token_requests: IntCounterVec,
    pub token_expiry_unix: IntGaugeVec,
    pub persistence_failures: IntCounterVec,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("oidctokenagent".into()), None)
            .expect("metrics registry");

        let metrics: Arc<Metrics> = Arc::new(Self {
            source_fetch_requests: IntCounterVec::new(Opts::new("source_fetch_requests_total", "Identity provider requests by step"), &["client_id", "step"]).expect("metric"),
            source_fetch_failures: IntCounterVec::new(Opts::new("source_fetch_failures_total", "Token acquisition failures by reason"), &["client_id", "reason"]).expect("metric"),
            source_fetch_duration: HistogramVec::new(HistogramOpts::new("source_fetch_duration_seconds", "Token acquisition duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["client_id"]).expect("metric"),

            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Tokens handed out by serving layer"), &["client_id", "layer"]).expect("metric"),
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Expiry of the current token"), &["client_id"]).expect("metric"),
            persistence_failures: IntCounterVec::new(Opts::new("persistence_failures_total", "Token file read/write failures"), &["client_id", "operation"]).expect("metric"),

            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").expect("metric"),
            up: IntGauge::new("up", "1 if service is healthy").expect("metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.source_fetch_requests.clone()),
            Box::new(metrics.source_fetch_failures.clone()),
            Box::new(metrics.source_fetch_duration.clone()),
            Box::new(metrics.token_requests.clone()),
            Box::new(metrics.token_expiry_unix.clone()),
            Box::new(metrics.persistence_failures.clone()),
            Box::new(metrics.config_validation_errors.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            reg.register(collector).expect("metric registration");
        }

        metrics
    }
}
