//! Signing web app and OAuth entry point

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use tracing::debug;

use super::response;
use crate::context::AppContext;
use crate::error::ClaError;

pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

/// Scopes requested from the OAuth provider
const OAUTH_SCOPES: &str = "user repo";

/// GET /cla
pub async fn app_page(ctx: &AppContext) -> Result<Response<Full<Bytes>>, ClaError> {
    let path = ctx.config.server.static_dir.join("cla").join("app.html");
    match tokio::fs::read(&path).await {
        Ok(content) => Ok(response(StatusCode::OK, "text/html; charset=utf-8", content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Signing app not installed");
            Err(ClaError::NotFound("/cla".to_string()))
        }
        Err(e) => Err(ClaError::Internal(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Authorization URL for the configured OAuth application
pub fn authorize_url(client_id: &str, state: &str) -> String {
    let query = serde_urlencoded::to_string([
        ("access_type", "offline"),
        ("client_id", client_id),
        ("response_type", "code"),
        ("scope", OAUTH_SCOPES),
        ("state", state),
    ])
    .unwrap_or_default();
    format!("{}?{}", GITHUB_AUTHORIZE_URL, query)
}

/// GET /cla/auth/github
///
/// Redirects to the provider's consent screen. The token exchange happens
/// in the web app.
pub async fn github_auth(ctx: &AppContext) -> Result<Response<Full<Bytes>>, ClaError> {
    let client_id = ctx
        .config
        .cla
        .client_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ClaError::Internal("OAuth client id is not configured".to_string()))?;

    let state = uuid::Uuid::new_v4().simple().to_string();
    let location = authorize_url(client_id, &state);

    let mut redirect = response(StatusCode::TEMPORARY_REDIRECT, "text/plain", Bytes::new());
    let location = header::HeaderValue::from_str(&location)
        .map_err(|e| ClaError::Internal(format!("Invalid redirect URL: {}", e)))?;
    redirect.headers_mut().insert(header::LOCATION, location);
    Ok(redirect)
}
