pub(crate) mod health;

use crate::state::AppState;
use utoipa_axum::router::OpenApiRouter;

/// Combines all API routes into a single router
pub(crate) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().merge(health::router())
}
