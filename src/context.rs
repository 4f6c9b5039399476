//! Application context
//!
//! Everything a request handler needs, constructed once at startup and
//! passed explicitly. There are no process-wide globals.

use std::sync::Arc;

use crate::config::Config;
use crate::error::ClaError;
use crate::ledger::SignatureLedger;
use crate::reconciler::StatusReconciler;
use crate::registry::AgreementRegistry;
use crate::status_api::StatusApi;
use crate::store::Store;

pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub registry: AgreementRegistry,
    pub ledger: SignatureLedger,
    pub reconciler: StatusReconciler,
    /// Client for the team roster proxy
    pub http_client: reqwest::Client,
}

impl AppContext {
    /// Wire the services over an open store and a status API
    pub fn new(
        config: Arc<Config>,
        store: Arc<Store>,
        status_api: Arc<dyn StatusApi>,
    ) -> Result<Self, ClaError> {
        let registry = AgreementRegistry::new(store.clone());
        let ledger = SignatureLedger::new(store.clone());
        let reconciler = StatusReconciler::new(
            config.reconciler(),
            registry.clone(),
            ledger.clone(),
            status_api,
        );
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("cla-ledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClaError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            store,
            registry,
            ledger,
            reconciler,
            http_client,
        })
    }
}
