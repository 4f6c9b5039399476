//! End-to-end flow through the routing table with an in-memory status API

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Response, StatusCode};
use std::sync::Arc;
use tempfile::TempDir;

use cla_ledger::routes;
use cla_ledger::status_api::StatusState;
use cla_ledger::store::{Agreement, ENTITY_AGREEMENT, INDIVIDUAL_AGREEMENT};
use cla_ledger::webhook;
use cla_ledger::{ApiRequest, AppContext, Config, MemoryStatusApi, Store};

const SECRET: &str = "hook-secret";
const SHA: &str = "6dcb09b5b57875f334f61aebed695e2e4193db5e";

struct Harness {
    ctx: AppContext,
    api: Arc<MemoryStatusApi>,
    _temp: TempDir,
}

impl Harness {
    fn new(seed: &[(String, Agreement)]) -> Self {
        let temp = TempDir::new().unwrap();

        let mut config = Config::default();
        config.cla.database_path = temp.path().join("cla.sled");
        config.cla.token = Some("token".to_string());
        config.cla.hook_secret = Some(SECRET.to_string());
        config.cla.client_id = Some("client".to_string());
        config.server.site_url = "https://liri.io".to_string();
        config.server.static_dir = temp.path().join("static");
        config.validate().unwrap();

        let store = Arc::new(Store::open_with_seed(&config.cla.database_path, seed).unwrap());
        let api = Arc::new(MemoryStatusApi::new());
        let ctx = AppContext::new(Arc::new(config), store, api.clone()).unwrap();

        Self {
            ctx,
            api,
            _temp: temp,
        }
    }

    async fn send(&self, req: ApiRequest) -> (StatusCode, serde_json::Value) {
        let response = routes::dispatch(&self.ctx, req).await;
        let status = response.status();
        let body = body_bytes(response).await;
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn sign(&self, user_id: u64, slug: &str, verb: &str) -> StatusCode {
        let req = ApiRequest::new(Method::POST, &format!("/api/cla/{}/{}", slug, verb))
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({"id": user_id, "login": "octocat", "name": "The Octocat"})
                    .to_string(),
            );
        self.send(req).await.0
    }

    async fn deliver(&self, event: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let signature = webhook::sign(SECRET.as_bytes(), &body);
        self.deliver_signed(event, body, &signature).await
    }

    async fn deliver_signed(
        &self,
        event: &str,
        body: Vec<u8>,
        signature: &str,
    ) -> (StatusCode, serde_json::Value) {
        let req = ApiRequest::new(Method::POST, "/api/cla/webhook")
            .with_header("content-type", "application/json")
            .with_header("x-github-event", event)
            .with_header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
            .with_header("x-hub-signature-256", signature)
            .with_body(body);
        self.send(req).await
    }
}

async fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn pull_request(action: &str, sender_id: u64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "action": action,
        "number": 12,
        "pull_request": {
            "id": 279147437,
            "number": 12,
            "head": {"sha": SHA},
            "user": {"id": sender_id, "login": "octocat"}
        },
        "repository": {
            "name": "shell",
            "full_name": "lirios/shell",
            "owner": {"login": "lirios"}
        },
        "sender": {"id": sender_id, "login": "octocat"}
    }))
    .unwrap()
}

#[tokio::test]
async fn test_sign_reconcile_revoke() {
    let h = Harness::new(&[
        (
            INDIVIDUAL_AGREEMENT.to_string(),
            Agreement::individual("Individual CLA", "/cla/documents/individual-1.0.pdf"),
        ),
        (
            ENTITY_AGREEMENT.to_string(),
            Agreement::entity("Entity CLA", "/cla/documents/entity-1.0.pdf"),
        ),
    ]);

    assert_eq!(h.sign(42, INDIVIDUAL_AGREEMENT, "agree").await, StatusCode::OK);

    let (status, body) = h.deliver("pull_request", pull_request("opened", 42)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "success");
    assert!(body["description"].as_str().unwrap().contains("signed"));

    let statuses = h.api.statuses("lirios", "shell", SHA).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, StatusState::Success);
    assert_eq!(
        statuses[0].target_url.as_deref(),
        Some("https://liri.io/cla/agree?utm_source=github_status&utm_medium=notification&repo=lirios/shell&pullrequest=279147437")
    );

    assert_eq!(h.sign(42, INDIVIDUAL_AGREEMENT, "disagree").await, StatusCode::OK);

    let (status, body) = h.deliver("pull_request", pull_request("synchronize", 42)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "pending");
    assert_eq!(body["updated"], true);

    let statuses = h.api.statuses("lirios", "shell", SHA).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, StatusState::Pending);

    // Profile was refreshed on every call
    let user = h.ctx.store.user(42).unwrap().unwrap();
    assert_eq!(user.name, "The Octocat");
}

#[tokio::test]
async fn test_malformed_signature_has_no_side_effects() {
    let h = Harness::new(&cla_ledger::store::canonical_agreements());

    let (status, body) = h
        .deliver_signed("pull_request", pull_request("opened", 42), "sha256=zz")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid signature format");

    let (status, _) = h
        .deliver_signed(
            "pull_request",
            pull_request("opened", 42),
            &webhook::sign(b"wrong secret", &pull_request("opened", 42)),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.api.calls(), 0);
    assert!(h.ctx.store.user(42).unwrap().is_none());
}

#[tokio::test]
async fn test_incomplete_pull_request_is_rejected() {
    let h = Harness::new(&cla_ledger::store::canonical_agreements());

    let mut event: serde_json::Value = serde_json::from_slice(&pull_request("opened", 42)).unwrap();
    event["pull_request"]["head"]["sha"] = "".into();
    let (status, body) = h.deliver("pull_request", serde_json::to_vec(&event).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid payload");

    let mut event: serde_json::Value = serde_json::from_slice(&pull_request("opened", 42)).unwrap();
    event.as_object_mut().unwrap().remove("sender");
    event["pull_request"].as_object_mut().unwrap().remove("user");
    let (status, _) = h.deliver("pull_request", serde_json::to_vec(&event).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn test_ping_and_unknown_events() {
    let h = Harness::new(&[]);

    let (status, _) = h.deliver("ping", b"{\"zen\":\"Design for failure.\"}".to_vec()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h.deliver("issues", b"{}".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.deliver("pull_request", pull_request("closed", 1)).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn test_unconfigured_organization() {
    let h = Harness::new(&[]);

    let (status, body) = h.deliver("pull_request", pull_request("opened", 42)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "failure");
    assert_eq!(body["description"], "Organization is not properly configured");
}

#[tokio::test]
async fn test_agreement_api() {
    let h = Harness::new(&cla_ledger::store::canonical_agreements());

    let (status, body) = h.send(ApiRequest::new(Method::GET, "/api/cla")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["entity-1.0", "individual-1.0"]));

    let (status, body) = h
        .send(ApiRequest::new(Method::GET, "/api/cla?detail=true"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[1]["slug"], "individual-1.0");
    assert_eq!(body[0]["is_entity"], true);

    assert_eq!(h.sign(42, "unknown-9.9", "agree").await, StatusCode::NOT_FOUND);

    let (status, body) = h.send(ApiRequest::new(Method::GET, "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agreements"], 2);

    let (status, _) = h.send(ApiRequest::new(Method::GET, "/api/cla/webhook")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = h.send(ApiRequest::new(Method::GET, "/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = routes::dispatch(&h.ctx, ApiRequest::new(Method::OPTIONS, "/api/cla")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_oauth_redirect_and_app_page() {
    let h = Harness::new(&[]);

    let response = routes::dispatch(&h.ctx, ApiRequest::new(Method::GET, "/cla/auth/github")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with("https://github.com/login/oauth/authorize?"));
    assert!(location.contains("client_id=client"));
    assert!(location.contains("scope=user+repo"));

    let (status, _) = h.send(ApiRequest::new(Method::GET, "/cla")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let app_dir = h.ctx.config.server.static_dir.join("cla");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join("app.html"), "<html>CLA</html>").unwrap();

    let response = routes::dispatch(&h.ctx, ApiRequest::new(Method::GET, "/cla")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, Bytes::from("<html>CLA</html>"));
}
