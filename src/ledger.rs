//! Signature ledger
//!
//! Records and revokes signatures keyed by the platform's stable account id.
//! The ledger keeps no state of its own; every call is one store transaction.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::StoreError;
use crate::store::{ExternalIdentity, Store};

#[derive(Clone)]
pub struct SignatureLedger {
    store: Arc<Store>,
}

impl SignatureLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Refresh the user's profile and record a signature dated now
    pub fn record_signature(&self, user: &ExternalIdentity, slug: &str) -> Result<(), StoreError> {
        self.store.sign(user, slug, Utc::now())?;
        info!(user_id = user.id, login = %user.login, slug = %slug, "Agreement signed");
        Ok(())
    }

    /// Refresh the user's profile and delete the signature if present
    pub fn revoke_signature(&self, user: &ExternalIdentity, slug: &str) -> Result<(), StoreError> {
        self.store.unsign(user, slug)?;
        info!(user_id = user.id, login = %user.login, slug = %slug, "Agreement revoked");
        Ok(())
    }

    /// Whether the user has a signature for `slug`
    ///
    /// Fails with `StoreError::MissingCollection` for a user with no recorded
    /// activity. Use [`SignatureLedger::has_signed_any`] when that should
    /// simply count as unsigned.
    pub fn has_signed(&self, user_id: u64, slug: &str) -> Result<bool, StoreError> {
        Ok(self.store.user_agreement(user_id, slug)?.is_some())
    }

    /// First of `slugs` the user has signed, if any
    pub fn has_signed_any<'a>(
        &self,
        user_id: u64,
        slugs: &'a [String],
    ) -> Result<Option<&'a str>, StoreError> {
        for slug in slugs {
            match self.has_signed(user_id, slug) {
                Ok(true) => return Ok(Some(slug.as_str())),
                Ok(false) => {}
                Err(e) if e.is_missing_collection() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Record that a company signed an entity agreement
    pub fn record_company_signature(&self, company: &str, slug: &str) -> Result<(), StoreError> {
        self.store.record_company_agreement(company, slug)?;
        info!(company = %company, slug = %slug, "Company agreement recorded");
        Ok(())
    }

    /// Agreements signed by a company
    pub fn company_signatures(&self, company: &str) -> Result<Vec<String>, StoreError> {
        self.store.company_agreements(company)
    }
}
