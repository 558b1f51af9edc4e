//! # Prometheus Metrics
//!
//! Exposes peer-authentication metrics for the node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s inside) so it can be
/// shared across connection tasks and the HTTP handler.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Peer certificates that failed parsing or validation. Handed to both
    /// upgraders.
    pub invalid_peer_certificates_total: IntCounter,
    /// Connections that completed an upgrade.
    pub peer_upgrades_total: IntCounter,
    /// Address claims that failed to decode or verify.
    pub address_claims_rejected_total: IntCounter,
    /// Number of currently connected peers.
    pub connected_peers: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("keybind".into()), None)
            .expect("failed to create prometheus registry");

        let invalid_peer_certificates_total = IntCounter::new(
            "invalid_peer_certificates_total",
            "Peer certificates rejected during channel upgrade",
        )
        .expect("metric creation");
        registry
            .register(Box::new(invalid_peer_certificates_total.clone()))
            .expect("metric registration");

        let peer_upgrades_total = IntCounter::new(
            "peer_upgrades_total",
            "Connections successfully upgraded to an authenticated peer",
        )
        .expect("metric creation");
        registry
            .register(Box::new(peer_upgrades_total.clone()))
            .expect("metric registration");

        let address_claims_rejected_total = IntCounter::new(
            "address_claims_rejected_total",
            "Signed address claims that failed to decode or verify",
        )
        .expect("metric creation");
        registry
            .register(Box::new(address_claims_rejected_total.clone()))
            .expect("metric registration");

        let connected_peers = IntGauge::new("connected_peers", "Number of currently connected peers")
            .expect("metric creation");
        registry
            .register(Box::new(connected_peers.clone()))
            .expect("metric registration");

        Self {
            registry,
            invalid_peer_certificates_total,
            peer_upgrades_total,
            address_claims_rejected_total,
            connected_peers,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Router serving `GET /metrics`.
pub fn router(metrics: SharedMetrics) -> axum::Router {
    axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .with_state(metrics)
}

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
