use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::connection::Connection;
use crate::driver::{Driver, ReadTarget};
use crate::metrics::MetricSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    status: String,
    database: String,
    replica_set: bool,
    primary: bool,
    secondary: bool,
}

pub fn router<D: Driver>(conn: Arc<Connection<D>>) -> Router {
    Router::new()
        .route("/health", get(health_check::<D>))
        .route("/metrics", get(metrics_report::<D>))
        .with_state(conn)
}

/// `ok` when both roles answer, `degraded` with one, `unavailable` with none.
pub async fn health_check<D: Driver>(
    State(conn): State<Arc<Connection<D>>>,
) -> (StatusCode, Json<HealthCheckResponse>) {
    let primary = conn.ping(ReadTarget::Primary).await.is_ok();
    let secondary = conn.ping(ReadTarget::Secondary).await.is_ok();

    let (code, status) = match (primary, secondary) {
        (true, true) => (StatusCode::OK, "ok"),
        (false, false) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        _ => (StatusCode::OK, "degraded"),
    };

    let response = HealthCheckResponse {
        status: status.to_string(),
        database: conn.db_name().to_string(),
        replica_set: conn.replica_set(),
        primary,
        secondary,
    };
    (code, Json(response))
}

pub async fn metrics_report<D: Driver>(
    State(conn): State<Arc<Connection<D>>>,
) -> Json<Vec<MetricSnapshot>> {
    Json(conn.metrics().snapshots())
}
