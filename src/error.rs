use std::path::PathBuf;

use axum::response::IntoResponse;
use hyper::StatusCode;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub(crate) enum ServerError {
    #[error("No certificates found in {0}")]
    MissingCertificate(PathBuf),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum HttpError {
    #[error("Missing Host header")]
    MissingHostHeader,
    #[error("Invalid Host header")]
    InvalidHostHeader,
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(#[from] http::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        debug!(error = %self, "HTTP redirect error.");
        match self {
            HttpError::MissingHostHeader
            | HttpError::InvalidHostHeader
            | HttpError::InvalidRedirectUri(_) => StatusCode::BAD_REQUEST,
        }
        .into_response()
    }
}
