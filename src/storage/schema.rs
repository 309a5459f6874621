//! Database schema definitions
//!
//! All SQL schema for the crawler database. Character, team and item
//! tables belong to the entity parsers and are created by them; the core
//! only owns the work-queue-bearing tables.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Realm clusters (topology metadata)
CREATE TABLE IF NOT EXISTS battlegroups (
    name TEXT NOT NULL,
    site TEXT NOT NULL,
    PRIMARY KEY (name, site)
);

-- Realms: the top-level unit of crawl work. lock_owner/lock_time implement
-- the optimistic per-host claim; last_refresh marks completed work.
CREATE TABLE IF NOT EXISTS realms (
    name TEXT NOT NULL,
    site TEXT NOT NULL,
    battlegroup TEXT NOT NULL,
    server_type TEXT NOT NULL,
    language TEXT NOT NULL,
    last_refresh TEXT,
    lock_owner TEXT,
    lock_time TEXT,
    PRIMARY KEY (name, site),
    FOREIGN KEY (battlegroup, site) REFERENCES battlegroups(name, site)
);

CREATE INDEX IF NOT EXISTS idx_realms_last_refresh ON realms(last_refresh);
CREATE INDEX IF NOT EXISTS idx_realms_lock_owner ON realms(lock_owner);

-- Guilds discovered within realms
CREATE TABLE IF NOT EXISTS guilds (
    name TEXT NOT NULL,
    realm TEXT NOT NULL,
    site TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    last_refresh TEXT,
    PRIMARY KEY (name, realm, site)
);

CREATE INDEX IF NOT EXISTS idx_guilds_last_refresh ON guilds(last_refresh);
CREATE INDEX IF NOT EXISTS idx_guilds_realm ON guilds(realm, site);
"#;

/// Initializes the database schema. Idempotent.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["battlegroups", "realms", "guilds"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
