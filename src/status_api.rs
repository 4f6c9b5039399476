//! Commit status API client
//!
//! The reconciler only needs two operations from the code-hosting platform:
//! list the statuses attached to a commit, and create one. Both live behind
//! [`StatusApi`] so tests can swap in [`MemoryStatusApi`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Largest page the statuses endpoint serves
const STATUSES_PER_PAGE: u32 = 100;

/// State of a commit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
    Error,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

/// A status attached to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    /// Identity assigned by the platform; absent for a status not yet created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub state: StatusState,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

impl RepoStatus {
    pub fn new(state: StatusState) -> Self {
        Self {
            id: None,
            state,
            description: None,
            target_url: None,
            context: None,
        }
    }

    pub fn context(&self) -> &str {
        self.context.as_deref().unwrap_or("")
    }
}

/// Body of a create-status request
#[derive(Debug, Serialize)]
struct CreateStatusRequest<'a> {
    state: StatusState,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

/// Errors from the status API
#[derive(Debug, Error)]
pub enum StatusApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for StatusApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Commit status operations keyed by (owner, repo, sha)
#[async_trait]
pub trait StatusApi: Send + Sync {
    /// Statuses currently attached to a commit
    async fn list_statuses(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<RepoStatus>, StatusApiError>;

    /// Attach a status to a commit
    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        status: &RepoStatus,
    ) -> Result<RepoStatus, StatusApiError>;
}

// ============================================================================
// GitHub
// ============================================================================

/// GitHub REST implementation
pub struct GitHubStatusClient {
    api_url: String,
    http_client: reqwest::Client,
}

impl GitHubStatusClient {
    /// Build a client authenticated with a long-lived token
    pub fn new(
        api_url: impl Into<String>,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, StatusApiError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("token {}", token))
            .map_err(|_| StatusApiError::Network("Invalid API token".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cla-ledger/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StatusApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        #[derive(Deserialize)]
        struct ApiMessage {
            message: String,
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or(body);
        Err(StatusApiError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl StatusApi for GitHubStatusClient {
    async fn list_statuses(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<RepoStatus>, StatusApiError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}/statuses?per_page={}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            urlencoding::encode(sha),
            STATUSES_PER_PAGE
        );
        debug!(url = %url, "Listing commit statuses");

        let response = self.http_client.get(&url).send().await?;
        let statuses = Self::check(response).await?.json().await?;
        Ok(statuses)
    }

    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        status: &RepoStatus,
    ) -> Result<RepoStatus, StatusApiError> {
        let url = format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            urlencoding::encode(sha)
        );
        let body = CreateStatusRequest {
            state: status.state,
            target_url: status.target_url.as_deref(),
            description: status.description.as_deref(),
            context: status.context.as_deref(),
        };
        debug!(url = %url, state = status.state.as_str(), "Creating commit status");

        let response = self.http_client.post(&url).json(&body).send().await?;
        let created = Self::check(response).await?.json().await?;
        Ok(created)
    }
}

// ============================================================================
// In-memory implementation (tests, local runs)
// ============================================================================

/// In-memory status API
///
/// A status submitted with the id of an existing entry replaces that entry;
/// anything else is appended with a fresh id. Calls are counted.
#[derive(Default)]
pub struct MemoryStatusApi {
    statuses: RwLock<HashMap<(String, String, String), Vec<RepoStatus>>>,
    next_id: AtomicU64,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl MemoryStatusApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses stored for a commit
    pub async fn statuses(&self, owner: &str, repo: &str, sha: &str) -> Vec<RepoStatus> {
        self.statuses
            .read()
            .await
            .get(&key(owner, repo, sha))
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Total number of API calls made
    pub fn calls(&self) -> usize {
        self.list_calls() + self.create_calls()
    }
}

fn key(owner: &str, repo: &str, sha: &str) -> (String, String, String) {
    (owner.to_string(), repo.to_string(), sha.to_string())
}

#[async_trait]
impl StatusApi for MemoryStatusApi {
    async fn list_statuses(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<RepoStatus>, StatusApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.statuses(owner, repo, sha).await)
    }

    async fn create_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        status: &RepoStatus,
    ) -> Result<RepoStatus, StatusApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let mut statuses = self.statuses.write().await;
        let entries = statuses.entry(key(owner, repo, sha)).or_default();

        let existing = status
            .id
            .and_then(|id| entries.iter_mut().find(|s| s.id == Some(id)));
        if let Some(entry) = existing {
            *entry = status.clone();
            return Ok(entry.clone());
        }

        let mut created = status.clone();
        created.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        entries.push(created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_from_github() {
        let json = r#"{
            "id": 1,
            "state": "success",
            "description": "Build has completed successfully",
            "target_url": "https://ci.example.com/1000/output",
            "context": "continuous-integration/jenkins",
            "creator": {"login": "octocat", "id": 1}
        }"#;
        let status: RepoStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.id, Some(1));
        assert_eq!(status.state, StatusState::Success);
        assert_eq!(status.context(), "continuous-integration/jenkins");
    }

    #[test]
    fn test_create_request_omits_empty_fields() {
        let body = CreateStatusRequest {
            state: StatusState::Pending,
            target_url: None,
            description: Some("waiting"),
            context: Some("license/cla"),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["state"], "pending");
        assert!(value.get("target_url").is_none());
    }

    #[tokio::test]
    async fn test_memory_api_replaces_by_id() {
        let api = MemoryStatusApi::new();
        let mut status = RepoStatus::new(StatusState::Pending);
        status.context = Some("license/cla".to_string());

        let created = api.create_status("o", "r", "abc", &status).await.unwrap();
        assert_eq!(created.id, Some(1));

        let mut update = created.clone();
        update.state = StatusState::Success;
        api.create_status("o", "r", "abc", &update).await.unwrap();

        let stored = api.list_statuses("o", "r", "abc").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].state, StatusState::Success);
        assert_eq!(api.create_calls(), 2);
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_api_appends_without_id() {
        let api = MemoryStatusApi::new();
        let status = RepoStatus::new(StatusState::Failure);

        api.create_status("o", "r", "abc", &status).await.unwrap();
        api.create_status("o", "r", "abc", &status).await.unwrap();

        assert_eq!(api.statuses("o", "r", "abc").await.len(), 2);
        assert!(api.statuses("o", "r", "other").await.is_empty());
    }

    #[test]
    fn test_github_client_builds() {
        let client =
            GitHubStatusClient::new("https://api.github.com/", "secret", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.api_url, "https://api.github.com");
    }

    mod github {
        use super::*;
        use wiremock::matchers::{body_partial_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const SHA: &str = "6dcb09b5b57875f334f61aebed695e2e4193db5e";

        fn client(server: &MockServer) -> GitHubStatusClient {
            GitHubStatusClient::new(server.uri(), "s3cr3t", Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn test_list_statuses_request() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(format!("/repos/lirios/shell/commits/{}/statuses", SHA)))
                .and(query_param("per_page", "100"))
                .and(header("authorization", "token s3cr3t"))
                .and(header("accept", "application/vnd.github+json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                    {"id": 11, "state": "pending", "context": "license/cla",
                     "description": "Contributor License Agreement is not signed yet"},
                    {"id": 12, "state": "success", "context": "ci/build"}
                ])))
                .expect(1)
                .mount(&server)
                .await;

            let statuses = client(&server).list_statuses("lirios", "shell", SHA).await.unwrap();
            assert_eq!(statuses.len(), 2);
            assert_eq!(statuses[0].id, Some(11));
            assert_eq!(statuses[0].state, StatusState::Pending);
            assert_eq!(statuses[1].context(), "ci/build");
        }

        #[tokio::test]
        async fn test_create_status_request() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(format!("/repos/lirios/shell/statuses/{}", SHA)))
                .and(header("authorization", "token s3cr3t"))
                .and(body_partial_json(serde_json::json!({
                    "state": "success",
                    "context": "license/cla"
                })))
                .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                    "id": 99, "state": "success", "context": "license/cla",
                    "description": "Contributor License Agreement signed"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let mut status = RepoStatus::new(StatusState::Success);
            status.context = Some("license/cla".to_string());
            status.description = Some("Contributor License Agreement signed".to_string());

            let created = client(&server)
                .create_status("lirios", "shell", SHA, &status)
                .await
                .unwrap();
            assert_eq!(created.id, Some(99));
        }

        #[tokio::test]
        async fn test_error_body_maps_to_api_error() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(422)
                        .set_body_json(serde_json::json!({"message": "Validation Failed"})),
                )
                .mount(&server)
                .await;

            let err = client(&server)
                .create_status("lirios", "shell", SHA, &RepoStatus::new(StatusState::Pending))
                .await
                .unwrap_err();
            match err {
                StatusApiError::Api { status, message } => {
                    assert_eq!(status, 422);
                    assert_eq!(message, "Validation Failed");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_plain_error_body_is_kept() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
                .mount(&server)
                .await;

            let err = client(&server)
                .list_statuses("lirios", "shell", SHA)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                StatusApiError::Api { status: 502, ref message } if message == "bad gateway"
            ));
        }
    }
}
