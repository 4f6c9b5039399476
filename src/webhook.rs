//! Webhook ingress
//!
//! Signature verification and event parsing for deliveries from the
//! code-hosting platform. Nothing here touches the store: a delivery that
//! fails verification or parsing is rejected before any side effect.

use hmac::{Hmac, Mac};
use hyper::StatusCode;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::store::User;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Pull-request actions that can change the verdict for the head commit
const RECONCILED_ACTIONS: &[&str] = &["opened", "reopened", "synchronize", "edited"];

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// The X-Hub-Signature-256 header is missing.
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// HMAC verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    #[error("missing event type header")]
    MissingEventType,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),
}

impl WebhookError {
    /// Signature problems are 401, everything else is a 400
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::InvalidSignature | Self::InvalidSignatureFormat(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::MissingEventType | Self::InvalidPayload(_) | Self::UnsupportedEventType(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    /// Generic message that leaks nothing about the secret or the payload
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingSignature => "Missing signature",
            Self::InvalidSignatureFormat(_) => "Invalid signature format",
            Self::InvalidSignature => "Invalid signature",
            Self::MissingEventType => "Missing event type",
            Self::InvalidPayload(_) => "Invalid payload",
            Self::UnsupportedEventType(_) => "Unsupported event type",
        }
    }
}

/// Verify `X-Hub-Signature-256` against the raw request body
///
/// The comparison is constant time.
pub fn verify_signature(
    secret: &[u8],
    header: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let hex_digest = header.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
        WebhookError::InvalidSignatureFormat("expected sha256= prefix".to_string())
    })?;
    let expected = hex::decode(hex_digest)
        .map_err(|e| WebhookError::InvalidSignatureFormat(e.to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| WebhookError::InvalidSignatureFormat(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Compute the signature header value for a body
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    )
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Account,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    #[serde(default)]
    pub number: u64,
    pub head: CommitRef,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    #[serde(default)]
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    #[serde(default)]
    pub sender: Option<User>,
}

impl PullRequestEvent {
    /// Acting user, falling back to the pull request's author
    pub fn author(&self) -> Option<&User> {
        self.sender.as_ref().or(self.pull_request.user.as_ref())
    }

    /// Reject payloads that can never be reconciled
    pub fn validate(&self) -> Result<(), WebhookError> {
        if self.author().is_none() {
            return Err(WebhookError::InvalidPayload(
                "pull request event has no author".to_string(),
            ));
        }
        if self.pull_request.head.sha.trim().is_empty() {
            return Err(WebhookError::InvalidPayload(
                "pull request event has no head commit".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether this action can change the status of the head commit
    pub fn needs_reconcile(&self) -> bool {
        RECONCILED_ACTIONS.contains(&self.action.as_str())
    }
}

/// A verified, parsed delivery
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// Connectivity check sent when a hook is installed
    Ping,
    PullRequest(Box<PullRequestEvent>),
}

impl WebhookEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::PullRequest(_) => "pull_request",
        }
    }
}

/// Extract the JSON document from a delivery body
///
/// Hooks configured with the form content type wrap the JSON in a `payload`
/// field.
pub fn payload_json(content_type: Option<&str>, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if !is_form {
        return Ok(body.to_vec());
    }

    #[derive(Deserialize)]
    struct Form {
        payload: String,
    }

    let form: Form = serde_urlencoded::from_bytes(body)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    Ok(form.payload.into_bytes())
}

/// Parse a delivery whose signature has already been verified
pub fn parse_event(
    event_type: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<WebhookEvent, WebhookError> {
    let event_type = event_type.ok_or(WebhookError::MissingEventType)?;
    match event_type {
        "ping" => Ok(WebhookEvent::Ping),
        "pull_request" => {
            let json = payload_json(content_type, body)?;
            let event: PullRequestEvent = serde_json::from_slice(&json)
                .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
            event.validate()?;
            Ok(WebhookEvent::PullRequest(Box::new(event)))
        }
        other => Err(WebhookError::UnsupportedEventType(other.to_string())),
    }
}
