use crate::exporter::Exporter;
use crate::metrics::{self, ExporterStats};
use crate::transport::Exchange;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub struct ApiState<E: Exchange> {
    pub exporter: Arc<Exporter<E>>,
    pub stats: Arc<ExporterStats>,
    /// Held for the duration of a cycle; one cycle runs at a time.
    cycle_lock: Arc<Mutex<()>>,
}

impl<E: Exchange> Clone for ApiState<E> {
    fn clone(&self) -> Self {
        ApiState {
            exporter: self.exporter.clone(),
            stats: self.stats.clone(),
            cycle_lock: self.cycle_lock.clone(),
        }
    }
}

pub fn create_router<E: Exchange>(exporter: Arc<Exporter<E>>) -> Router {
    let state = ApiState {
        stats: exporter.stats(),
        exporter,
        cycle_lock: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route("/health", get(health_check::<E>))
        .route("/metrics", get(get_metrics::<E>))
        .with_state(state)
}

async fn health_check<E: Exchange>(State(state): State<ApiState<E>>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();

    Json(json!({
        "status": "healthy",
        "service": "dnssec-exporter",
        "uptime_seconds": snapshot.uptime.as_secs(),
        "checks": state.exporter.check_count(),
        "resolvers": state.exporter.resolvers(),
        "cycles": {
            "total": snapshot.cycles,
            "last_ms": snapshot.last_cycle.as_millis() as u64,
            "max_ms": snapshot.max_cycle.as_millis() as u64
        },
        "pairs": {
            "total": snapshot.pairs,
            "resolved": snapshot.resolved,
            "unresolved": snapshot.unresolved
        },
        "errors": {
            "timeouts": snapshot.timeouts,
            "transport": snapshot.transport_errors,
            "transfer": snapshot.transfer_failures,
            "internal": snapshot.internal_errors
        }
    }))
}

async fn get_metrics<E: Exchange>(State(state): State<ApiState<E>>) -> Response {
    let report = {
        let _guard = state.cycle_lock.lock().await;
        state.exporter.collect().await
    };

    match metrics::render_report(&report) {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)).into_response()
        }
    }
}
