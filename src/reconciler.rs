//! Status reconciler
//!
//! Turns a pull-request event into a single `license/cla` status on the
//! head commit. The platform has no "upsert by context" call, so existing
//! statuses are listed first and a matching entry is reused as the update
//! target. Repeated deliveries for the same commit therefore converge on one
//! status line.
//!
//! No store transaction is held while the status API is called.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::error::StoreError;
use crate::ledger::SignatureLedger;
use crate::registry::AgreementRegistry;
use crate::status_api::{RepoStatus, StatusApi, StatusApiError, StatusState};
use crate::webhook::PullRequestEvent;

/// Context string of the status line owned by this service
pub const DEFAULT_STATUS_CONTEXT: &str = "license/cla";

/// Outcome of checking an author against the published agreements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No agreement is published
    Unconfigured,
    /// The author signed at least one published agreement
    Signed,
    /// The author signed none of them
    Unsigned,
}

impl Verdict {
    pub fn state(&self) -> StatusState {
        match self {
            Self::Unconfigured => StatusState::Failure,
            Self::Signed => StatusState::Success,
            Self::Unsigned => StatusState::Pending,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unconfigured => "Organization is not properly configured",
            Self::Signed => "Contributor License Agreement signed",
            Self::Unsigned => "Contributor License Agreement is not signed yet",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("status API error: {0}")]
    StatusApi(#[from] StatusApiError),

    #[error("event is missing {0}")]
    IncompleteEvent(&'static str),
}

/// Settings for [`StatusReconciler`]
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Public site URL used to build the status target link
    pub site_url: String,
    /// Context string of the managed status
    pub context: String,
    /// Bound applied to each status API call
    pub request_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:8080".to_string(),
            context: DEFAULT_STATUS_CONTEXT.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub verdict: Verdict,
    pub status: RepoStatus,
    /// Whether an existing status line was reused
    pub updated_existing: bool,
}

#[derive(Clone)]
pub struct StatusReconciler {
    config: ReconcilerConfig,
    registry: AgreementRegistry,
    ledger: SignatureLedger,
    status_api: Arc<dyn StatusApi>,
}

impl StatusReconciler {
    pub fn new(
        config: ReconcilerConfig,
        registry: AgreementRegistry,
        ledger: SignatureLedger,
        status_api: Arc<dyn StatusApi>,
    ) -> Self {
        Self {
            config,
            registry,
            ledger,
            status_api,
        }
    }

    /// Compute the verdict for an author
    ///
    /// No published agreement means unconfigured. An author without a
    /// per-user collection has never signed anything and counts as unsigned.
    pub fn verdict(&self, author_id: u64) -> Result<Verdict, StoreError> {
        let slugs = self.registry.list_agreements()?;
        if slugs.is_empty() {
            return Ok(Verdict::Unconfigured);
        }

        match self.ledger.has_signed_any(author_id, &slugs)? {
            Some(_) => Ok(Verdict::Signed),
            None => Ok(Verdict::Unsigned),
        }
    }

    /// Link back to the signing page for a pull request
    pub fn target_url(&self, repo_full_name: &str, pull_request_id: u64) -> String {
        format!(
            "{}/cla/agree?utm_source=github_status&utm_medium=notification&repo={}&pullrequest={}",
            self.config.site_url.trim_end_matches('/'),
            repo_full_name,
            pull_request_id
        )
    }

    /// Set the managed status on the event's head commit
    pub async fn reconcile(
        &self,
        event: &PullRequestEvent,
    ) -> Result<Reconciliation, ReconcileError> {
        let author = event
            .author()
            .ok_or(ReconcileError::IncompleteEvent("sender"))?;
        let owner = event.repository.owner.login.as_str();
        let repo = event.repository.name.as_str();
        let full_name = event.repository.full_name.as_str();
        let sha = event.pull_request.head.sha.as_str();
        if sha.is_empty() {
            return Err(ReconcileError::IncompleteEvent("head commit"));
        }

        info!(
            repo = %full_name,
            number = event.number,
            action = %event.action,
            sender = %author.login,
            "Reconciling pull request"
        );

        let result = self
            .reconcile_commit(author.id, owner, repo, full_name, sha, event.pull_request.id)
            .await;
        if let Err(ref e) = result {
            error!(
                repo = %full_name,
                sha = %sha,
                user_id = author.id,
                error = %e,
                "Failed to reconcile pull request status"
            );
        }
        result
    }

    async fn reconcile_commit(
        &self,
        author_id: u64,
        owner: &str,
        repo: &str,
        full_name: &str,
        sha: &str,
        pull_request_id: u64,
    ) -> Result<Reconciliation, ReconcileError> {
        let existing = self
            .bounded(self.status_api.list_statuses(owner, repo, sha))
            .await?
            .into_iter()
            .find(|s| s.context() == self.config.context);
        let updated_existing = existing.is_some();

        let verdict = self.verdict(author_id)?;

        let mut status = existing.unwrap_or_else(|| RepoStatus::new(verdict.state()));
        status.state = verdict.state();
        status.description = Some(verdict.description().to_string());
        status.target_url = Some(self.target_url(full_name, pull_request_id));
        status.context = Some(self.config.context.clone());

        let status = self
            .bounded(self.status_api.create_status(owner, repo, sha, &status))
            .await?;

        info!(
            repo = %full_name,
            sha = %sha,
            user_id = author_id,
            state = verdict.state().as_str(),
            updated = updated_existing,
            "Status reconciled"
        );

        Ok(Reconciliation {
            verdict,
            status,
            updated_existing,
        })
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StatusApiError>>,
    ) -> Result<T, StatusApiError> {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| StatusApiError::Timeout(self.config.request_timeout))?
    }
}
