// src/metrics.rs

//! Process-wide metrics registry.
//!
//! Wraps a `prometheus::Registry` with a lookup-or-create table so stages can
//! request the same metric by name without coordinating registration order.
//! The hub is an explicit handle passed into the services rather than a
//! module global, so tests can construct their own.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

#[derive(Clone)]
enum Handle {
    Counter(Counter),
    CounterVec(CounterVec),
    Gauge(Gauge),
    GaugeVec(GaugeVec),
    Histogram(HistogramVec),
}

/// Registry of counters, gauges and histograms, idempotent by metric name.
pub struct MetricsHub {
    registry: Registry,
    store: Mutex<HashMap<String, Handle>>,
}

impl MetricsHub {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Lookup-or-create an unlabelled counter.
    pub fn counter(&self, name: &str, help: &str) -> Result<Counter> {
        let mut store = self.store.lock().unwrap();
        if let Some(handle) = store.get(name) {
            return match handle {
                Handle::Counter(c) => Ok(c.clone()),
                _ => Err(mismatch(name)),
            };
        }
        let counter =
            Counter::new(name, help).map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        self.registry
            .register(Box::new(counter.clone()))
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        store.insert(name.to_string(), Handle::Counter(counter.clone()));
        Ok(counter)
    }

    /// Lookup-or-create a labelled counter.
    pub fn counter_vec(&self, name: &str, help: &str, labels: &[&str]) -> Result<CounterVec> {
        let mut store = self.store.lock().unwrap();
        if let Some(handle) = store.get(name) {
            return match handle {
                Handle::CounterVec(c) => Ok(c.clone()),
                _ => Err(mismatch(name)),
            };
        }
        let counter = CounterVec::new(Opts::new(name, help), labels)
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        self.registry
            .register(Box::new(counter.clone()))
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        store.insert(name.to_string(), Handle::CounterVec(counter.clone()));
        Ok(counter)
    }

    /// Lookup-or-create an unlabelled gauge.
    pub fn gauge(&self, name: &str, help: &str) -> Result<Gauge> {
        let mut store = self.store.lock().unwrap();
        if let Some(handle) = store.get(name) {
            return match handle {
                Handle::Gauge(g) => Ok(g.clone()),
                _ => Err(mismatch(name)),
            };
        }
        let gauge = Gauge::new(name, help).map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        store.insert(name.to_string(), Handle::Gauge(gauge.clone()));
        Ok(gauge)
    }

    /// Lookup-or-create a labelled gauge.
    pub fn gauge_vec(&self, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
        let mut store = self.store.lock().unwrap();
        if let Some(handle) = store.get(name) {
            return match handle {
                Handle::GaugeVec(g) => Ok(g.clone()),
                _ => Err(mismatch(name)),
            };
        }
        let gauge = GaugeVec::new(Opts::new(name, help), labels)
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        store.insert(name.to_string(), Handle::GaugeVec(gauge.clone()));
        Ok(gauge)
    }

    /// Lookup-or-create a labelled histogram.
    pub fn histogram_vec(
        &self,
        name: &str,
        help: &str,
        buckets: Vec<f64>,
        labels: &[&str],
    ) -> Result<HistogramVec> {
        let mut store = self.store.lock().unwrap();
        if let Some(handle) = store.get(name) {
            return match handle {
                Handle::Histogram(h) => Ok(h.clone()),
                _ => Err(mismatch(name)),
            };
        }
        let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        self.registry
            .register(Box::new(histogram.clone()))
            .map_err(|e| AppError::config(format!("metric {name}: {e}")))?;
        store.insert(name.to_string(), Handle::Histogram(histogram.clone()));
        Ok(histogram)
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| AppError::config(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::config(format!("metrics output is not UTF-8: {e}")))
    }

    /// Serve `GET /metrics` until the token is cancelled.
    ///
    /// Binding failures are fatal at startup.
    pub async fn serve(self: Arc<Self>, port: u16, cancel: CancellationToken) -> Result<()> {
        let app = Router::new()
            .route("/metrics", get(scrape))
            .with_state(self);

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::config(format!("failed to bind metrics port {port}: {e}")))?;

        tracing::info!("Metrics endpoint listening on {addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| AppError::config(format!("metrics server error: {e}")))
    }
}

impl Default for MetricsHub {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(name: &str) -> AppError {
    AppError::config(format!("metric {name} already registered with a different type"))
}

async fn scrape(State(hub): State<Arc<MetricsHub>>) -> (axum::http::StatusCode, String) {
    match hub.render() {
        Ok(body) => (axum::http::StatusCode::OK, body),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_or_create_is_idempotent() {
        let hub = MetricsHub::new();
        let first = hub
            .counter_vec("scraper_scrape_total", "Total scrapes", &["company"])
            .unwrap();
        let second = hub
            .counter_vec("scraper_scrape_total", "Total scrapes", &["company"])
            .unwrap();

        first.with_label_values(&["Example"]).inc();
        second.with_label_values(&["Example"]).inc();
        assert_eq!(first.with_label_values(&["Example"]).get(), 2.0);
    }

    #[test]
    fn test_kind_mismatch_is_an_error() {
        let hub = MetricsHub::new();
        hub.gauge("job_reference_queue_size", "Queue size").unwrap();
        assert!(hub
            .counter_vec("job_reference_queue_size", "Queue size", &["x"])
            .is_err());
    }

    #[test]
    fn test_render_includes_metric_names() {
        let hub = MetricsHub::new();
        let gauge = hub.gauge("job_reference_queue_size", "Queue size").unwrap();
        gauge.set(7.0);

        let body = hub.render().unwrap();
        assert!(body.contains("job_reference_queue_size 7"));
    }
}
