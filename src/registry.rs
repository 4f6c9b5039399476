//! Agreement registry
//!
//! Stateless view over the store's `agreements` collection. The set of
//! agreements only grows at runtime; there is no unpublish.

use std::sync::Arc;
use tracing::info;

use crate::config::AgreementConfig;
use crate::error::StoreError;
use crate::store::{Agreement, Store};

/// Published agreement with its slug
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgreementEntry {
    pub slug: String,
    #[serde(flatten)]
    pub agreement: Agreement,
}

#[derive(Clone)]
pub struct AgreementRegistry {
    store: Arc<Store>,
}

impl AgreementRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Slugs of all published agreements
    ///
    /// An empty list is a valid answer and means the organization has not
    /// published anything yet.
    pub fn list_agreements(&self) -> Result<Vec<String>, StoreError> {
        self.store.agreement_slugs()
    }

    /// Published agreements with their details
    pub fn list_details(&self) -> Result<Vec<AgreementEntry>, StoreError> {
        Ok(self
            .store
            .agreements()?
            .into_iter()
            .map(|(slug, agreement)| AgreementEntry { slug, agreement })
            .collect())
    }

    pub fn has_agreement(&self, slug: &str) -> Result<bool, StoreError> {
        self.store.has_agreement(slug)
    }

    pub fn agreement(&self, slug: &str) -> Result<Option<Agreement>, StoreError> {
        self.store.agreement(slug)
    }

    /// Publish (upsert) an agreement definition
    pub fn publish(&self, slug: &str, agreement: &Agreement) -> Result<(), StoreError> {
        self.store.put_agreement(slug, agreement)?;
        info!(slug = %slug, entity = agreement.is_entity, "Published agreement");
        Ok(())
    }

    /// Publish the agreements listed in configuration
    pub fn seed(&self, agreements: &[AgreementConfig]) -> Result<usize, StoreError> {
        for entry in agreements {
            self.publish(&entry.slug, &entry.to_agreement())?;
        }
        Ok(agreements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(seed: &[(String, Agreement)]) -> (AgreementRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_with_seed(temp_dir.path().join("cla.sled"), seed).unwrap();
        (AgreementRegistry::new(Arc::new(store)), temp_dir)
    }

    #[test]
    fn test_empty_registry_lists_nothing() {
        let (registry, _temp) = registry(&[]);
        assert!(registry.list_agreements().unwrap().is_empty());
        assert!(!registry.has_agreement("individual-1.0").unwrap());
    }

    #[test]
    fn test_publish_is_visible_and_idempotent() {
        let (registry, _temp) = registry(&[]);
        let agreement = Agreement::individual("Individual CLA", "https://example.org/i.pdf");

        registry.publish("individual-1.0", &agreement).unwrap();
        registry.publish("individual-1.0", &agreement).unwrap();

        assert_eq!(registry.list_agreements().unwrap(), vec!["individual-1.0"]);
        assert!(registry.has_agreement("individual-1.0").unwrap());
        assert_eq!(registry.agreement("individual-1.0").unwrap(), Some(agreement));
    }

    #[test]
    fn test_seed_from_config() {
        let (registry, _temp) = registry(&crate::store::canonical_agreements());
        let extra = AgreementConfig {
            slug: "individual-2.0".to_string(),
            title: "Individual CLA v2".to_string(),
            url: "https://example.org/individual-2.0.pdf".to_string(),
            is_entity: false,
        };

        assert_eq!(registry.seed(&[extra]).unwrap(), 1);

        let details = registry.list_details().unwrap();
        assert_eq!(details.len(), 3);
        assert_eq!(details[2].slug, "individual-2.0");
        assert_eq!(details[2].agreement.title, "Individual CLA v2");
    }
}
