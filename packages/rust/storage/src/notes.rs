//! Persisted operator research notes.

use std::sync::Arc;

use tracing::warn;

use crate::Storage;

/// Notes previously recorded for one contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    pub notes: String,
    /// `manual` or `auto`.
    pub source: String,
    pub updated_at: String,
}

/// Research notes keyed by (company key, contact name).
///
/// Like the response cache, a missing store makes every lookup empty.
#[derive(Debug, Clone, Default)]
pub struct ResearchNotes {
    store: Option<Arc<Storage>>,
}

impl ResearchNotes {
    pub fn new(store: Option<Arc<Storage>>) -> Self {
        Self { store }
    }

    pub async fn get(&self, company_key: &str, contact_name: &str) -> Option<StoredNote> {
        let store = self.store.as_ref()?;
        match store.get_notes(company_key, contact_name).await {
            Ok(found) => found.map(|(notes, source, updated_at)| StoredNote {
                notes,
                source,
                updated_at,
            }),
            Err(e) => {
                warn!(error = %e, company_key, "research notes read failed");
                None
            }
        }
    }

    pub async fn save(&self, company_key: &str, contact_name: &str, notes: &str, source: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.put_notes(company_key, contact_name, notes, source).await {
            warn!(error = %e, company_key, "research notes write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_storage;

    #[tokio::test]
    async fn save_then_get() {
        let notes = ResearchNotes::new(Some(Arc::new(test_storage().await)));
        assert!(notes.get("helix therapeutics", "Maria Okafor").await.is_none());

        notes
            .save("helix therapeutics", "Maria Okafor", "Out-licensing oral GLP-1", "auto")
            .await;
        let stored = notes
            .get("helix therapeutics", "maria okafor")
            .await
            .expect("stored note");
        assert_eq!(stored.notes, "Out-licensing oral GLP-1");
        assert_eq!(stored.source, "auto");
    }

    #[tokio::test]
    async fn without_store_everything_is_empty() {
        let notes = ResearchNotes::default();
        notes.save("a", "b", "c", "manual").await;
        assert!(notes.get("a", "b").await.is_none());
    }
}
