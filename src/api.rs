use std::{path::Path, sync::Arc};

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use bon::Builder;
use http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use tower_http::{compression::CompressionLayer, services::ServeFile};
use tracing::debug;

use crate::{auth::Authenticator, cib::CibCache};

#[derive(Builder, Clone)]
pub struct ApiState {
    cache: Arc<CibCache>,
    authenticator: Arc<dyn Authenticator>,
}

/// Build the application's routes: the CIB API, the favicon, and the index page for anything else.
pub fn router(state: ApiState, index_file: &Path, favicon_file: &Path) -> Router {
    Router::new()
        .route("/api/v1/cib", get(get_cib))
        .route_service("/favicon.ico", ServeFile::new(favicon_file))
        .fallback_service(ServeFile::new(index_file))
        .layer(CompressionLayer::new())
        .with_state(state)
}

async fn get_cib(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if !state.authenticator.authorize(&headers).await {
        debug!("Rejecting unauthorized CIB request.");
        return (StatusCode::UNAUTHORIZED, "Unauthorized request.").into_response();
    }
    ([(CONTENT_TYPE, "application/xml")], state.cache.read()).into_response()
}
