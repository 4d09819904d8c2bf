use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — Prometheus text exposition.
///
/// Surfaces the recognition counters registered in `main`
/// (`ocr_sync_requests_total`, `ocr_jobs_total`, `ocr_processing_seconds`,
/// `ocr_queue_depth`) plus whatever the exporter collects on its own.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
