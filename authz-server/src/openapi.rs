use crate::state::AppState;
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use utoipa::openapi::OpenApi as OpenApiDoc;
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
    ),
    info(
        title = "Authorization Server Persistence API",
        description = "Operational endpoints of the write-behind persistence service",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

/// Serves the collected OpenAPI document at `/openapi.json`
pub(crate) fn router(api_doc: OpenApiDoc) -> Router<AppState> {
    let api_doc = Arc::new(api_doc);
    Router::new().route("/openapi.json", get(move || openapi_json(api_doc.clone())))
}

async fn openapi_json(api_doc: Arc<OpenApiDoc>) -> Json<OpenApiDoc> {
    Json(api_doc.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;

    #[tokio::test]
    async fn test_openapi_document_lists_health_routes() {
        let fixture = TestFixture::new().await;

        let response = fixture.get("/openapi.json").await;

        response.assert_ok();
        assert_eq!(
            response.json["info"]["title"],
            "Authorization Server Persistence API"
        );
        for path in ["/health", "/ready", "/healthy"] {
            assert!(
                response.json["paths"].get(path).is_some(),
                "missing {path} in OpenAPI document"
            );
        }
        fixture.shutdown().await;
    }
}
