//! Persistence side of a multi-tenant OAuth2/OIDC authorization server.
//!
//! The protocol layer calls the services in [`services`]; they write records into
//! the cache and publish them to the broker. Consumers feed the write-behind
//! pipelines, which commit records to the store in batches and acknowledge the
//! deliveries once they are durable.

mod api;
pub mod cache;
pub mod committers;
pub mod config;
pub mod models;
mod openapi;
pub mod persistence;
pub mod services;
pub mod state;
#[cfg(test)]
mod test_utils;

use crate::state::AppState;
use axum::Router;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

/// Create a new application instance with a given state
pub fn create_app(state: AppState) -> Router {
    let (router, api_doc) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(api::router())
        .split_for_parts();

    Router::new()
        .merge(router)
        .merge(openapi::router(api_doc))
        .with_state(state)
}
