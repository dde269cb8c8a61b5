use super::checkers::{check_cache_health, check_pipelines_health, run_health_check};
use super::models::{ComponentHealth, ComponentStatus, HealthQuery, HealthResponse, HealthStatusType};
use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use log::{debug, error, info};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Check the health of all components
async fn check_all_health(state: &AppState, check_cache: bool) -> HealthResponse {
    let pipelines_handle = tokio::spawn(run_health_check(
        "Pipelines",
        check_pipelines_health,
        state.clone(),
    ));
    let cache_handle = check_cache.then(|| {
        tokio::spawn(run_health_check(
            "Cache",
            check_cache_health,
            state.clone(),
        ))
    });

    let pipelines = pipelines_handle.await.unwrap_or_else(|e| {
        error!("Pipelines check task panicked: {e:?}");
        ComponentStatus::error("Pipelines check task failed", None)
    });
    let cache = match cache_handle {
        Some(handle) => Some(handle.await.unwrap_or_else(|e| {
            error!("Cache check task panicked: {e:?}");
            ComponentStatus::error("Cache check task failed", None)
        })),
        None => None,
    };

    let components = ComponentHealth { pipelines, cache };
    let mut issues = Vec::new();
    if let Some(error) = components.pipelines.error.as_deref() {
        issues.push(format!("pipelines: {error}"));
    }
    if let Some(error) = components.cache.as_ref().and_then(|c| c.error.as_deref()) {
        issues.push(format!("cache: {error}"));
    }

    let all_healthy = components.pipelines.is_ok()
        && components.cache.as_ref().is_none_or(ComponentStatus::is_ok);
    if all_healthy {
        debug!("Health check passed for all components");
    } else {
        info!("Health check failed: {}", issues.join(", "));
    }

    HealthResponse {
        status: if all_healthy {
            HealthStatusType::Ok
        } else {
            HealthStatusType::Error
        },
        components,
        status_code: if all_healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
    }
}

/// Health check handler
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    params(
        HealthQuery
    ),
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is not healthy", body = HealthResponse)
    )
)]
async fn health_check(
    State(state): State<AppState>,
    Query(params): Query<HealthQuery>,
) -> impl IntoResponse {
    check_all_health(&state, params.check_cache).await
}

/// Ready check handler, alias of the health check
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    params(
        HealthQuery
    ),
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service is not ready", body = HealthResponse)
    )
)]
async fn ready_check(
    State(state): State<AppState>,
    Query(params): Query<HealthQuery>,
) -> impl IntoResponse {
    check_all_health(&state, params.check_cache).await
}

/// Healthy check handler, alias of the health check
#[utoipa::path(
    get,
    path = "/healthy",
    tag = HEALTH_TAG,
    params(
        HealthQuery
    ),
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is not healthy", body = HealthResponse)
    )
)]
async fn healthy_check(
    State(state): State<AppState>,
    Query(params): Query<HealthQuery>,
) -> impl IntoResponse {
    check_all_health(&state, params.check_cache).await
}

pub(crate) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(health_check))
        .routes(routes!(ready_check))
        .routes(routes!(healthy_check))
}
