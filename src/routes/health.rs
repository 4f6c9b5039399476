use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use super::json_response;
use crate::context::AppContext;
use crate::error::ClaError;

/// GET /health
pub async fn health(ctx: &AppContext) -> Result<Response<Full<Bytes>>, ClaError> {
    let agreements = ctx.registry.list_agreements()?.len();
    let body = serde_json::json!({
        "status": "ok",
        "agreements": agreements,
    });
    Ok(json_response(StatusCode::OK, &body))
}
