use crate::AppState;
use axum::{extract::State, response::Html};

const INDEX_HTML: &str = include_str!("../../../static/index.html");

/// Serves the map page. Loading it starts a fresh session, so every stored
/// raster and result is swept first.
pub async fn index(State(state): State<AppState>) -> Html<&'static str> {
    tracing::info!("Loading index page");

    match state.storage.sweep().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!("Swept {} files from {}", removed, state.storage.root().display()),
        Err(e) => tracing::error!("Failed to sweep upload directory: {}", e),
    }

    Html(INDEX_HTML)
}
