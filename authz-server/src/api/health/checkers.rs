use super::models::ComponentStatus;
use crate::cache::CacheBackend;
use crate::state::AppState;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;

pub fn check_cache_health<'a>(
    state: &'a AppState,
) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + 'a>> {
    let cache = state.cache.clone();
    Box::pin(async move {
        let details = Some(json!({ "backend": cache.backend_name() }));
        match cache.health_check().await {
            Ok(()) => ComponentStatus::ok(details),
            Err(err) => ComponentStatus::error(format!("Cache health check failed: {}", err), details),
        }
    })
}

/// Reports every pipeline; a pipeline whose queue is full is unhealthy since new
/// deliveries are being turned away
pub fn check_pipelines_health<'a>(
    state: &'a AppState,
) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + 'a>> {
    let statuses = state.pipeline_statuses();
    Box::pin(async move {
        let saturated: Vec<&str> = statuses
            .iter()
            .filter(|status| status.is_saturated())
            .map(|status| status.kind)
            .collect();
        let details = statuses
            .iter()
            .map(|status| (status.kind.to_string(), json!(status)))
            .collect::<serde_json::Map<_, _>>();
        let details = Some(serde_json::Value::Object(details));

        if saturated.is_empty() {
            ComponentStatus::ok(details)
        } else {
            ComponentStatus::error(
                format!("queue full for: {}", saturated.join(", ")),
                details,
            )
        }
    })
}

pub async fn run_health_check<F>(
    checker_name: &'static str,
    check_fn: F,
    state: AppState,
) -> ComponentStatus
where
    F: for<'a> FnOnce(&'a AppState) -> Pin<Box<dyn Future<Output = ComponentStatus> + Send + 'a>>
        + Send
        + 'static,
{
    let timeout_duration = Duration::from_secs_f64(state.config.healthcheck_timeout);
    match timeout(timeout_duration, check_fn(&state)).await {
        Ok(status) => status,
        Err(_) => ComponentStatus::error(
            format!(
                "{} health check timed out after {} seconds",
                checker_name, state.config.healthcheck_timeout
            ),
            None,
        ),
    }
}
