//! CLA API and webhook ingress

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{json_response, text_response};
use crate::context::AppContext;
use crate::error::ClaError;
use crate::http::ApiRequest;
use crate::store::ExternalIdentity;
use crate::webhook::{self, WebhookEvent, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER};

#[derive(Debug, Serialize)]
struct SignatureResponse<'a> {
    slug: &'a str,
    user_id: u64,
    signed: bool,
}

#[derive(Debug, Serialize)]
struct ReconcileResponse<'a> {
    state: &'a str,
    description: &'a str,
    updated: bool,
}

/// GET /api/cla
///
/// Ordered slug array, or the full records with `?detail=true`.
pub async fn list(ctx: &AppContext, req: &ApiRequest) -> Result<Response<Full<Bytes>>, ClaError> {
    let detail = req
        .query_param("detail")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if detail {
        let agreements = ctx.registry.list_details()?;
        Ok(json_response(StatusCode::OK, &agreements))
    } else {
        let slugs = ctx.registry.list_agreements()?;
        Ok(json_response(StatusCode::OK, &slugs))
    }
}

/// POST /api/cla/{slug}/agree
pub async fn agree(
    ctx: &AppContext,
    slug: &str,
    req: &ApiRequest,
) -> Result<Response<Full<Bytes>>, ClaError> {
    let identity = published_identity(ctx, slug, req)?;
    ctx.ledger.record_signature(&identity, slug)?;
    Ok(json_response(
        StatusCode::OK,
        &SignatureResponse {
            slug,
            user_id: identity.id,
            signed: true,
        },
    ))
}

/// POST /api/cla/{slug}/disagree
pub async fn disagree(
    ctx: &AppContext,
    slug: &str,
    req: &ApiRequest,
) -> Result<Response<Full<Bytes>>, ClaError> {
    let identity = published_identity(ctx, slug, req)?;
    ctx.ledger.revoke_signature(&identity, slug)?;
    Ok(json_response(
        StatusCode::OK,
        &SignatureResponse {
            slug,
            user_id: identity.id,
            signed: false,
        },
    ))
}

/// Decode the acting identity, refusing unpublished agreements
fn published_identity(
    ctx: &AppContext,
    slug: &str,
    req: &ApiRequest,
) -> Result<ExternalIdentity, ClaError> {
    if !ctx.registry.has_agreement(slug)? {
        return Err(ClaError::NotFound(format!("agreement {}", slug)));
    }
    let identity: ExternalIdentity = req.json()?;
    if identity.id == 0 {
        return Err(ClaError::BadRequest("identity id is required".to_string()));
    }
    Ok(identity)
}

/// POST /api/cla/webhook
///
/// The signature is checked before the body is parsed; a rejected delivery
/// never reaches the store or the status API.
pub async fn webhook(ctx: &AppContext, req: &ApiRequest) -> Result<Response<Full<Bytes>>, ClaError> {
    let secret = ctx.config.cla.hook_secret.as_deref().unwrap_or("");
    if secret.is_empty() {
        return Err(ClaError::Internal("webhook secret is not configured".to_string()));
    }

    let delivery = req.header(DELIVERY_HEADER).unwrap_or("-").to_string();
    webhook::verify_signature(secret.as_bytes(), req.header(SIGNATURE_HEADER), &req.body)
        .inspect_err(|e| warn!(delivery = %delivery, error = %e, "Webhook signature rejected"))?;

    let event = webhook::parse_event(
        req.header(EVENT_HEADER),
        req.header(header::CONTENT_TYPE.as_str()),
        &req.body,
    )?;

    match event {
        WebhookEvent::Ping => {
            info!(delivery = %delivery, "Webhook ping");
            Ok(text_response(StatusCode::OK, "OK"))
        }
        WebhookEvent::PullRequest(event) => {
            if !event.needs_reconcile() {
                debug!(
                    delivery = %delivery,
                    repo = %event.repository.full_name,
                    action = %event.action,
                    "Pull request action ignored"
                );
                return Ok(text_response(StatusCode::OK, "OK"));
            }

            let outcome = ctx.reconciler.reconcile(&event).await?;
            Ok(json_response(
                StatusCode::OK,
                &ReconcileResponse {
                    state: outcome.verdict.state().as_str(),
                    description: outcome.verdict.description(),
                    updated: outcome.updated_existing,
                },
            ))
        }
    }
}
