//! cla-ledger - Contributor License Agreement tracking
//!
//! Records which contributors signed which agreement and reports the result
//! as a commit status on every pull request.
//!
//! ## Flow
//!
//! 1. Agreements are published into the store (seeded at startup).
//! 2. Contributors sign or revoke through the CLA API.
//! 3. Each pull-request webhook is verified, then the reconciler sets a single
//!    `license/cla` status on the head commit.
//!
//! ## Storage Layout
//!
//! ```text
//! cla.sled/
//! ├── agreements             # slug -> Agreement
//! ├── users                  # user id -> profile
//! ├── useragreements         # user id -> sub-collection marker
//! ├── useragreements/{id}    # slug -> UserAgreement
//! ├── companies              # company slug -> Company
//! └── companyagreements      # company slug -> [agreement slug]
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod ledger;
pub mod reconciler;
pub mod registry;
pub mod routes;
pub mod status_api;
pub mod store;
pub mod webhook;

pub use config::Config;
pub use context::AppContext;
pub use error::{ClaError, StoreError};
pub use http::{ApiRequest, HttpServer};
pub use ledger::SignatureLedger;
pub use reconciler::{StatusReconciler, Verdict};
pub use registry::AgreementRegistry;
pub use status_api::{GitHubStatusClient, MemoryStatusApi, StatusApi};
pub use store::Store;
