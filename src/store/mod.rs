//! Agreement store backed by sled
//!
//! Layout (one sled database, one tree per collection):
//!
//! ```text
//! agreements            slug -> Agreement
//! users                 user id -> User
//! useragreements        user id -> SubCollection marker
//! useragreements/{id}   slug -> UserAgreement      (one tree per user)
//! companies             company slug -> Company
//! companyagreements     company slug -> [agreement slug]
//! ```
//!
//! Writes go through sled transactions behind a single writer lock, so a
//! signature and the profile refresh that accompanies it commit together or
//! not at all. Reads never take the lock.

pub mod models;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::StoreError;
pub use models::{
    user_key, Agreement, Company, ExternalIdentity, SubCollection, User, UserAgreement,
};

/// Collection of published agreements
pub const AGREEMENTS: &str = "agreements";
/// Collection of user profiles
pub const USERS: &str = "users";
/// Root of the per-user signature sub-collections
pub const USER_AGREEMENTS: &str = "useragreements";
/// Company slug to signed agreement slugs
pub const COMPANY_AGREEMENTS: &str = "companyagreements";
/// Company profiles
pub const COMPANIES: &str = "companies";

/// Slug of the canonical individual agreement
pub const INDIVIDUAL_AGREEMENT: &str = "individual-1.0";
/// Slug of the canonical entity agreement
pub const ENTITY_AGREEMENT: &str = "entity-1.0";

/// Agreements written on every open
pub fn canonical_agreements() -> Vec<(String, Agreement)> {
    vec![
        (
            INDIVIDUAL_AGREEMENT.to_string(),
            Agreement::individual(
                "Individual Contributor License Agreement v1.0",
                "/cla/documents/individual-1.0.pdf",
            ),
        ),
        (
            ENTITY_AGREEMENT.to_string(),
            Agreement::entity(
                "Entity Contributor License Agreement v1.0",
                "/cla/documents/entity-1.0.pdf",
            ),
        ),
    ]
}

/// Name of the tree holding one user's signatures
pub fn user_collection_name(user_id: u64) -> String {
    format!("{}/{}", USER_AGREEMENTS, user_id)
}

/// Agreement store
pub struct Store {
    db: Db,
    path: PathBuf,
    agreements: Tree,
    users: Tree,
    user_agreements: Tree,
    company_agreements: Tree,
    companies: Tree,
    writer: Mutex<()>,
}

impl Store {
    /// Open or create the store and seed the canonical agreements
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_seed(path, &canonical_agreements())
    }

    /// Open or create the store, upserting `seed` by slug
    pub fn open_with_seed<P: AsRef<Path>>(
        path: P,
        seed: &[(String, Agreement)],
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = sled::Config::new().path(&path).open()?;

        let store = Self {
            agreements: db.open_tree(AGREEMENTS)?,
            users: db.open_tree(USERS)?,
            user_agreements: db.open_tree(USER_AGREEMENTS)?,
            company_agreements: db.open_tree(COMPANY_AGREEMENTS)?,
            companies: db.open_tree(COMPANIES)?,
            db,
            path,
            writer: Mutex::new(()),
        };

        for (slug, agreement) in seed {
            store.put_agreement(slug, agreement)?;
        }

        info!(
            path = %store.path.display(),
            agreements = store.agreements.len(),
            "Opened agreement store"
        );
        Ok(store)
    }

    /// Flush outstanding writes and release the database
    pub fn close(self) -> Result<(), StoreError> {
        self.db.flush()?;
        info!(path = %self.path.display(), "Closed agreement store");
        Ok(())
    }

    /// Flush outstanding writes without closing
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Location of the database on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up an existing collection by name without creating it
    pub fn collection(&self, name: &str) -> Result<Tree, StoreError> {
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|n| &n[..] == name.as_bytes());
        if !exists {
            return Err(StoreError::MissingCollection(name.to_string()));
        }
        Ok(self.db.open_tree(name)?)
    }

    // ------------------------------------------------------------------
    // Agreements
    // ------------------------------------------------------------------

    /// Upsert an agreement by slug
    pub fn put_agreement(&self, slug: &str, agreement: &Agreement) -> Result<(), StoreError> {
        let value = serde_json::to_vec(agreement)?;
        let _guard = self.write_lock();

        self.agreements.transaction(|tx| {
            tx.insert(slug.as_bytes(), value.as_slice())?;
            Ok::<_, ConflictableTransactionError<StoreError>>(())
        })?;
        self.db.flush()?;

        debug!(slug = %slug, "Stored agreement");
        Ok(())
    }

    /// Get an agreement by slug
    pub fn agreement(&self, slug: &str) -> Result<Option<Agreement>, StoreError> {
        match self.agreements.get(slug.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Whether an agreement with this slug has been published
    pub fn has_agreement(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self.agreements.contains_key(slug.as_bytes())?)
    }

    /// Slugs of all published agreements, in key order
    pub fn agreement_slugs(&self) -> Result<Vec<String>, StoreError> {
        let mut slugs = Vec::new();
        for key in self.agreements.iter().keys() {
            slugs.push(decode_key(AGREEMENTS, &key?)?);
        }
        Ok(slugs)
    }

    /// All published agreements, in key order
    pub fn agreements(&self) -> Result<Vec<(String, Agreement)>, StoreError> {
        let mut result = Vec::new();
        for item in self.agreements.iter() {
            let (key, value) = item?;
            result.push((decode_key(AGREEMENTS, &key)?, serde_json::from_slice(&value)?));
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Users and signatures
    // ------------------------------------------------------------------

    /// Get a stored user profile
    pub fn user(&self, user_id: u64) -> Result<Option<User>, StoreError> {
        match self.users.get(user_key(user_id).as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Refresh the user profile and record a signature, atomically
    pub fn sign(
        &self,
        identity: &ExternalIdentity,
        slug: &str,
        signed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = serde_json::to_vec(&UserAgreement { signed_at })?;
        self.write_user_agreement(identity, |sub| {
            sub.insert(slug.as_bytes(), record.as_slice())?;
            Ok(())
        })?;

        debug!(user_id = identity.id, slug = %slug, "Recorded signature");
        Ok(())
    }

    /// Refresh the user profile and remove a signature, atomically
    ///
    /// Removing a signature that does not exist succeeds.
    pub fn unsign(&self, identity: &ExternalIdentity, slug: &str) -> Result<(), StoreError> {
        self.write_user_agreement(identity, |sub| {
            sub.remove(slug.as_bytes())?;
            Ok(())
        })?;

        debug!(user_id = identity.id, slug = %slug, "Removed signature");
        Ok(())
    }

    /// Get a user's signature of an agreement
    ///
    /// Returns `MissingCollection` when the user has no sub-collection yet,
    /// i.e. no signature activity was ever recorded for them.
    pub fn user_agreement(
        &self,
        user_id: u64,
        slug: &str,
    ) -> Result<Option<UserAgreement>, StoreError> {
        let name = user_collection_name(user_id);
        if !self.user_agreements.contains_key(user_key(user_id).as_bytes())? {
            return Err(StoreError::MissingCollection(name));
        }

        let sub = self.collection(&name)?;
        match sub.get(slug.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Slugs a user has signed, in key order
    pub fn user_agreement_slugs(&self, user_id: u64) -> Result<Vec<String>, StoreError> {
        let name = user_collection_name(user_id);
        if !self.user_agreements.contains_key(user_key(user_id).as_bytes())? {
            return Err(StoreError::MissingCollection(name));
        }

        let sub = self.collection(&name)?;
        let mut slugs = Vec::new();
        for key in sub.iter().keys() {
            slugs.push(decode_key(&name, &key?)?);
        }
        Ok(slugs)
    }

    /// Upsert the profile, register the sub-collection and apply `op` to it in one transaction
    fn write_user_agreement<F>(&self, identity: &ExternalIdentity, op: F) -> Result<(), StoreError>
    where
        F: Fn(&TransactionalTree) -> Result<(), ConflictableTransactionError<StoreError>>,
    {
        let key = identity.key();
        let profile = serde_json::to_vec(identity)?;
        let name = user_collection_name(identity.id);
        let marker = serde_json::to_vec(&SubCollection {
            tree: name.clone(),
            created_at: Utc::now(),
        })?;

        let _guard = self.write_lock();
        let sub_tree = self.db.open_tree(&name)?;

        (&self.users, &self.user_agreements, &sub_tree).transaction(|(users, root, sub)| {
            users.insert(key.as_bytes(), profile.as_slice())?;
            if root.get(key.as_bytes())?.is_none() {
                root.insert(key.as_bytes(), marker.as_slice())?;
            }
            op(sub)
        })?;
        self.db.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Companies
    // ------------------------------------------------------------------

    /// Upsert a company profile
    pub fn save_company(&self, slug: &str, company: &Company) -> Result<(), StoreError> {
        let value = serde_json::to_vec(company)?;
        let _guard = self.write_lock();

        self.companies.transaction(|tx| {
            tx.insert(slug.as_bytes(), value.as_slice())?;
            Ok::<_, ConflictableTransactionError<StoreError>>(())
        })?;
        self.db.flush()?;
        Ok(())
    }

    /// Get a company profile
    pub fn company(&self, slug: &str) -> Result<Option<Company>, StoreError> {
        match self.companies.get(slug.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Add an agreement to the list a company has signed
    pub fn record_company_agreement(
        &self,
        company: &str,
        agreement: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock();

        self.company_agreements.transaction(|tx| {
            let mut slugs: Vec<String> = match tx.get(company.as_bytes())? {
                Some(value) => decode_in_tx(&value)?,
                None => Vec::new(),
            };
            if !slugs.iter().any(|s| s == agreement) {
                slugs.push(agreement.to_string());
                let value = serde_json::to_vec(&slugs)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::Json(e)))?;
                tx.insert(company.as_bytes(), value)?;
            }
            Ok(())
        })?;
        self.db.flush()?;
        Ok(())
    }

    /// Agreements a company has signed; empty when none
    pub fn company_agreements(&self, company: &str) -> Result<Vec<String>, StoreError> {
        match self.company_agreements.get(company.as_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), so a poisoned lock carries no broken state.
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn decode_key(collection: &str, key: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(key.to_vec()).map_err(|_| StoreError::InvalidKey {
        collection: collection.to_string(),
        key: hex::encode(key),
    })
}

fn decode_in_tx<T: DeserializeOwned>(
    value: &[u8],
) -> Result<T, ConflictableTransactionError<StoreError>> {
    serde_json::from_slice(value).map_err(|e| ConflictableTransactionError::Abort(StoreError::Json(e)))
}
