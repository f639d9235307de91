//! SQL migration definitions for the LeadScout local database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: response_cache",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Provider responses keyed by request fingerprint (times in unix millis)
CREATE TABLE IF NOT EXISTS response_cache (
    fingerprint TEXT PRIMARY KEY,
    provider    TEXT NOT NULL,
    payload     TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_expires ON response_cache(expires_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Operator research notes per company contact",
            sql: r#"
CREATE TABLE IF NOT EXISTS research_notes (
    company_key  TEXT NOT NULL,
    contact_name TEXT NOT NULL,
    notes        TEXT NOT NULL,
    source       TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (company_key, contact_name)
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
