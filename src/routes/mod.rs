//! Request routing
//!
//! | Verb | Path | Handler |
//! |------|------|---------|
//! | GET  | `/health` | [`health::health`] |
//! | GET  | `/api/cla` | [`cla::list`] |
//! | POST | `/api/cla/{slug}/agree` | [`cla::agree`] |
//! | POST | `/api/cla/{slug}/disagree` | [`cla::disagree`] |
//! | POST | `/api/cla/webhook` | [`cla::webhook`] |
//! | GET  | `/cla` | [`app::app_page`] |
//! | GET  | `/cla/auth/github` | [`app::github_auth`] |
//! | GET  | `/api/team` | [`team::team`] |
//!
//! `OPTIONS` on any path is answered with a CORS preflight.

pub mod app;
pub mod cla;
pub mod health;
pub mod team;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::context::AppContext;
use crate::error::ClaError;
use crate::http::ApiRequest;

/// A resolved route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    ListAgreements,
    Agree(String),
    Disagree(String),
    Webhook,
    AppPage,
    GithubAuth,
    Team,
}

/// Resolve a method and path against the routing table
///
/// Unknown paths are `NotFound`; a known path with the wrong verb is
/// `MethodNotAllowed`.
pub fn resolve(method: &Method, path: &str) -> Result<Route, ClaError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (route, allowed) = match segments.as_slice() {
        ["health"] => (Route::Health, Method::GET),
        ["api", "cla"] => (Route::ListAgreements, Method::GET),
        ["api", "cla", "webhook"] => (Route::Webhook, Method::POST),
        ["api", "cla", slug, "agree"] if !slug.is_empty() => {
            (Route::Agree(slug.to_string()), Method::POST)
        }
        ["api", "cla", slug, "disagree"] if !slug.is_empty() => {
            (Route::Disagree(slug.to_string()), Method::POST)
        }
        ["api", "team"] => (Route::Team, Method::GET),
        ["cla"] => (Route::AppPage, Method::GET),
        ["cla", "auth", "github"] => (Route::GithubAuth, Method::GET),
        _ => return Err(ClaError::NotFound(path.to_string())),
    };

    if *method != allowed {
        return Err(ClaError::MethodNotAllowed(format!("{} {}", method, path)));
    }
    Ok(route)
}

/// Route a request and render the handler result
pub async fn dispatch(ctx: &AppContext, req: ApiRequest) -> Response<Full<Bytes>> {
    if req.method == Method::OPTIONS {
        return cors_preflight();
    }

    let result = match resolve(&req.method, &req.path) {
        Ok(route) => {
            debug!(route = ?route, "Dispatching");
            handle(ctx, route, &req).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn handle(
    ctx: &AppContext,
    route: Route,
    req: &ApiRequest,
) -> Result<Response<Full<Bytes>>, ClaError> {
    match route {
        Route::Health => health::health(ctx).await,
        Route::ListAgreements => cla::list(ctx, req).await,
        Route::Agree(slug) => cla::agree(ctx, &slug, req).await,
        Route::Disagree(slug) => cla::disagree(ctx, &slug, req).await,
        Route::Webhook => cla::webhook(ctx, req).await,
        Route::AppPage => app::app_page(ctx).await,
        Route::GithubAuth => app::github_auth(ctx).await,
        Route::Team => team::team(ctx, req).await,
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Render an error, logging server-side failures
pub fn error_response(err: &ClaError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "Request failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "Request rejected");
    }
    json_response(
        status,
        &ErrorBody {
            error: &err.public_message(),
        },
    )
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    response(status, "application/json", json)
}

pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    response(status, "text/plain; charset=utf-8", body)
}

pub fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}

pub fn cors_preflight() -> Response<Full<Bytes>> {
    let mut response = response(StatusCode::NO_CONTENT, "text/plain", Bytes::new());
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        header::HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        header::HeaderValue::from_static("86400"),
    );
    response
}
