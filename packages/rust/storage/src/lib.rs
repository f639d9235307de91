//! libSQL storage layer (embedded, local file).
//!
//! The [`Storage`] struct wraps a libSQL database holding the provider
//! response cache and operator research notes. Higher-level wrappers
//! ([`ResponseCache`], [`ResearchNotes`]) degrade to no-ops when the
//! database is unavailable so that a broken cache never fails a run.

mod cache;
mod migrations;
mod notes;

use std::path::Path;

use chrono::Utc;
use leadscout_shared::{LeadScoutError, Result};
use libsql::{Connection, Database, params};

pub use cache::{ResponseCache, fingerprint, normalize_query};
pub use notes::{ResearchNotes, StoredNote};

fn storage_err(e: impl std::fmt::Display) -> LeadScoutError {
    LeadScoutError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LeadScoutError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadScoutError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Response cache operations
    // -----------------------------------------------------------------------

    /// Fetch a cached payload. An entry expired at `now_ms` is deleted and reads as absent.
    pub async fn cache_get(&self, fingerprint: &str, now_ms: i64) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload, expires_at FROM response_cache WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;

        let row = match rows.next().await.map_err(storage_err)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let payload = row.get::<String>(0).map_err(storage_err)?;
        let expires_at = row.get::<i64>(1).map_err(storage_err)?;
        drop(rows);

        if expires_at <= now_ms {
            self.conn
                .execute(
                    "DELETE FROM response_cache WHERE fingerprint = ?1",
                    params![fingerprint],
                )
                .await
                .map_err(storage_err)?;
            return Ok(None);
        }
        Ok(Some(payload))
    }

    /// Store a payload (upsert, last write wins).
    pub async fn cache_put(
        &self,
        fingerprint: &str,
        provider: &str,
        payload: &str,
        now_ms: i64,
        expires_at_ms: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO response_cache (fingerprint, provider, payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                    provider = excluded.provider,
                    payload = excluded.payload,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at",
                params![fingerprint, provider, payload, now_ms, expires_at_ms],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Delete entries expired at `now_ms`. Returns the number removed.
    pub async fn cache_purge_expired(&self, now_ms: i64) -> Result<u64> {
        self.conn
            .execute(
                "DELETE FROM response_cache WHERE expires_at <= ?1",
                params![now_ms],
            )
            .await
            .map_err(storage_err)
    }

    /// Delete every cache entry. Returns the number removed.
    pub async fn cache_clear(&self) -> Result<u64> {
        self.conn
            .execute("DELETE FROM response_cache", params![])
            .await
            .map_err(storage_err)
    }

    /// Number of stored cache entries, expired or not.
    pub async fn cache_len(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM response_cache", params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Research notes operations
    // -----------------------------------------------------------------------

    /// Get stored notes for a contact. Returns `(notes, source, updated_at)`.
    pub async fn get_notes(
        &self,
        company_key: &str,
        contact_name: &str,
    ) -> Result<Option<(String, String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT notes, source, updated_at FROM research_notes
                 WHERE company_key = ?1 AND contact_name = ?2",
                params![company_key, contact_name.to_lowercase()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<String>(1).map_err(storage_err)?,
                row.get::<String>(2).map_err(storage_err)?,
            ))),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Store notes for a contact (upserts).
    pub async fn put_notes(
        &self,
        company_key: &str,
        contact_name: &str,
        notes: &str,
        source: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO research_notes (company_key, contact_name, notes, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(company_key, contact_name) DO UPDATE SET
                    notes = excluded.notes,
                    source = excluded.source,
                    updated_at = excluded.updated_at",
                params![
                    company_key,
                    contact_name.to_lowercase(),
                    notes,
                    source,
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ls_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ls_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        s1.cache_put("fp", "serpapi", "[]", 0, i64::MAX).await.unwrap();
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
        assert_eq!(s2.cache_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cache_expiry_deletes_on_read() {
        let storage = test_storage().await;
        storage
            .cache_put("fp1", "serpapi", r#"[{"title":"a"}]"#, 1_000, 2_000)
            .await
            .expect("put");

        let hit = storage.cache_get("fp1", 1_500).await.expect("get");
        assert_eq!(hit.as_deref(), Some(r#"[{"title":"a"}]"#));

        let miss = storage.cache_get("fp1", 2_000).await.expect("get expired");
        assert!(miss.is_none());
        assert_eq!(storage.cache_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_upsert_is_last_write_wins() {
        let storage = test_storage().await;
        storage.cache_put("fp", "brave", "old", 0, 10_000).await.unwrap();
        storage.cache_put("fp", "brave", "new", 0, 10_000).await.unwrap();
        assert_eq!(
            storage.cache_get("fp", 5).await.unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(storage.cache_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_and_clear() {
        let storage = test_storage().await;
        storage.cache_put("stale", "serpapi", "x", 0, 100).await.unwrap();
        storage.cache_put("fresh", "serpapi", "y", 0, 10_000).await.unwrap();

        assert_eq!(storage.cache_purge_expired(500).await.unwrap(), 1);
        assert_eq!(storage.cache_len().await.unwrap(), 1);

        assert_eq!(storage.cache_clear().await.unwrap(), 1);
        assert_eq!(storage.cache_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn notes_roundtrip_case_insensitive_contact() {
        let storage = test_storage().await;
        assert!(storage.get_notes("acme", "Jane Doe").await.unwrap().is_none());

        storage
            .put_notes("acme", "Jane Doe", "Keynote at BIO", "manual")
            .await
            .expect("put notes");
        storage
            .put_notes("acme", "jane doe", "Keynote at BIO; ex-Genentech", "manual")
            .await
            .expect("overwrite notes");

        let (notes, source, _) = storage
            .get_notes("acme", "JANE DOE")
            .await
            .unwrap()
            .expect("stored notes");
        assert_eq!(notes, "Keynote at BIO; ex-Genentech");
        assert_eq!(source, "manual");
    }
}
