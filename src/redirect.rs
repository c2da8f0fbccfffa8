use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::response::{IntoResponse, Response};
use http::{
    Request, StatusCode, Uri,
    header::{HOST, LOCATION},
    uri::{Authority, PathAndQuery, Scheme},
};
use tower::{Layer, Service};
use tracing::{field, info};

use crate::{classifier::Protocol, error::HttpError, split_listener::ConnectionInfo};

/// Wraps a service with [`HttpsRedirect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpsRedirectLayer;

impl<S> Layer<S> for HttpsRedirectLayer {
    type Service = HttpsRedirect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpsRedirect { inner }
    }
}

/// Answers every request that arrived over a plain connection with a permanent redirect to the
/// same URL over HTTPS. Requests over encrypted connections reach the inner service unchanged.
///
/// Requests without a [`ConnectionInfo`] extension are treated as plain.
#[derive(Debug, Clone)]
pub struct HttpsRedirect<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for HttpsRedirect<S>
where
    S: Service<Request<B>, Response = Response>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let info = request.extensions().get::<ConnectionInfo>().copied();
        let protocol = info.map_or(Protocol::Plain, |info| info.protocol);
        if protocol.is_encrypted() {
            return Box::pin(self.inner.call(request));
        }
        let response = match https_url(&request) {
            Ok(url) => {
                info!(
                    remote_address = info.map(|info| field::display(info.remote_address)),
                    "http -> {url}"
                );
                (StatusCode::MOVED_PERMANENTLY, [(LOCATION, url.to_string())]).into_response()
            }
            Err(error) => error.into_response(),
        };
        Box::pin(async move { Ok(response) })
    }
}

// Build the HTTPS equivalent of the request's URL, keeping host, port, path, and query.
fn https_url<B>(request: &Request<B>) -> Result<Uri, HttpError> {
    let authority = match request.uri().authority() {
        Some(authority) => authority.clone(),
        None => {
            let host = request
                .headers()
                .get(HOST)
                .ok_or(HttpError::MissingHostHeader)?;
            Authority::try_from(host.as_bytes()).map_err(|_| HttpError::InvalidHostHeader)?
        }
    };
    let path_and_query = request
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    Ok(Uri::builder()
        .scheme(Scheme::HTTPS)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()?)
}
