//! HTTP server for the index, metrics and health endpoints

use crate::metrics::MetricsSink;
use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const INDEX_HTML: &str = r#"<html>
<head><title>Speedtest Exporter</title></head>
<body>
<h1>Speedtest Prometheus Exporter</h1>
<ul>
    <li><a href="/metrics">Metrics</a></li>
    <li><a href="/health">Health</a></li>
</ul>
</body>
</html>
"#;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

pub fn router(sink: Arc<MetricsSink>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(sink)
}

pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `cancel_token` fires.
pub async fn serve(
    listener: TcpListener,
    sink: Arc<MetricsSink>,
    cancel_token: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(sink))
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            debug!("HTTP server shutting down");
        })
        .await?;

    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn metrics_handler(State(sink): State<Arc<MetricsSink>>) -> Response {
    match sink.render().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, sink.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn health_handler(State(sink): State<Arc<MetricsSink>>) -> (StatusCode, Json<HealthResponse>) {
    let up = sink.is_up().await;

    let response = HealthResponse {
        status: if up { "UP" } else { "DOWN" },
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    };
    let status = if up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
