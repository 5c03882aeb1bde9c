//! Static content fallback (`/*`).

use std::path::Path;

use axum::Router;
use tower_http::services::ServeDir;

pub fn router(root: &Path) -> Router {
    tracing::debug!(root = %root.display(), "Serving static content");
    Router::new().fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
}
