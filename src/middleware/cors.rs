//! CORS Configuration
//!
//! Sibling applications call the JSON API from their own subdomains, so the
//! CORS policy admits any origin whose host is the parent domain or a
//! direct subdomain of it, with credentials allowed. Because the origin is
//! checked by predicate and echoed back, there is never a wildcard paired
//! with credentials.

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AppConfig;

pub fn cors_layer(config: Arc<AppConfig>) -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin_is_trusted(&config, origin)
        }))
}

/// Accepts `http(s)` origins whose host passes the parent-domain check.
fn origin_is_trusted(config: &AppConfig, origin: &HeaderValue) -> bool {
    let Ok(raw) = origin.to_str() else {
        return false;
    };
    let Ok(parsed) = url::Url::parse(raw) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    parsed
        .host_str()
        .map(|host| config.host_is_trusted(host))
        .unwrap_or(false)
}
