//! SQLite storage implementation

use crate::armory::Site;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{BattlegroupRecord, GuildRecord, RealmRecord, StorageCounts};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (creating if needed) the crawler database at `path`.
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL so concurrent crawler processes on one host can share a file.
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn column_site(row: &Row<'_>, idx: usize) -> rusqlite::Result<Site> {
    let value: String = row.get(idx)?;
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown site code {:?}", value).into(),
        )
    })
}

fn column_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
                })
        })
        .transpose()
}

fn realm_from_row(row: &Row<'_>) -> rusqlite::Result<RealmRecord> {
    Ok(RealmRecord {
        name: row.get(0)?,
        site: column_site(row, 1)?,
        battlegroup: row.get(2)?,
        server_type: row.get(3)?,
        language: row.get(4)?,
        last_refresh: column_timestamp(row, 5)?,
        lock_owner: row.get(6)?,
        lock_time: column_timestamp(row, 7)?,
    })
}

fn guild_from_row(row: &Row<'_>) -> rusqlite::Result<GuildRecord> {
    Ok(GuildRecord {
        name: row.get(0)?,
        realm: row.get(1)?,
        site: column_site(row, 2)?,
        first_seen: column_timestamp(row, 3)?.unwrap_or_else(Utc::now),
        last_refresh: column_timestamp(row, 4)?,
    })
}

const REALM_COLUMNS: &str =
    "name, site, battlegroup, server_type, language, last_refresh, lock_owner, lock_time";
const GUILD_COLUMNS: &str = "name, realm, site, first_seen, last_refresh";

impl Storage for SqliteStorage {
    fn upsert_battlegroup(&mut self, battlegroup: &BattlegroupRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO battlegroups (name, site) VALUES (?1, ?2)
             ON CONFLICT (name, site) DO NOTHING",
            params![battlegroup.name, battlegroup.site.as_str()],
        )?;
        Ok(())
    }

    fn upsert_realm(&mut self, realm: &RealmRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO realms (name, site, battlegroup, server_type, language)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (name, site) DO UPDATE SET
                battlegroup = excluded.battlegroup,
                server_type = excluded.server_type,
                language = excluded.language",
            params![
                realm.name,
                realm.site.as_str(),
                realm.battlegroup,
                realm.server_type,
                realm.language
            ],
        )?;
        Ok(())
    }

    fn get_realm(&self, name: &str, site: Site) -> StorageResult<Option<RealmRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM realms WHERE name = ?1 AND site = ?2",
            REALM_COLUMNS
        ))?;
        let realm = stmt
            .query_row(params![name, site.as_str()], realm_from_row)
            .optional()?;
        Ok(realm)
    }

    fn find_realm_locked_by(&self, owner: &str) -> StorageResult<Option<RealmRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM realms WHERE lock_owner = ?1 ORDER BY name LIMIT 1",
            REALM_COLUMNS
        ))?;
        let realm = stmt.query_row(params![owner], realm_from_row).optional()?;
        Ok(realm)
    }

    fn count_unclaimed_realms(&self, site: Site) -> StorageResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM realms
             WHERE site = ?1 AND last_refresh IS NULL AND lock_owner IS NULL",
            params![site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn unclaimed_realm_at(&self, site: Site, index: u32) -> StorageResult<Option<RealmRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM realms
             WHERE site = ?1 AND last_refresh IS NULL AND lock_owner IS NULL
             ORDER BY name LIMIT 1 OFFSET ?2",
            REALM_COLUMNS
        ))?;
        let realm = stmt
            .query_row(params![site.as_str(), index], realm_from_row)
            .optional()?;
        Ok(realm)
    }

    fn lock_realm(
        &mut self,
        name: &str,
        site: Site,
        owner: &str,
        time: DateTime<Utc>,
    ) -> StorageResult<()> {
        // Unconditional write: the claim scheme is optimistic and a race
        // resolves last-writer-wins. See DESIGN.md.
        let changed = self.conn.execute(
            "UPDATE realms SET lock_owner = ?1, lock_time = ?2 WHERE name = ?3 AND site = ?4",
            params![owner, time.to_rfc3339(), name, site.as_str()],
        )?;
        if changed == 0 {
            return Err(StorageError::RealmNotFound {
                name: name.to_string(),
                site,
            });
        }
        Ok(())
    }

    fn finish_realm(
        &mut self,
        name: &str,
        site: Site,
        refreshed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE realms SET last_refresh = ?1, lock_owner = NULL, lock_time = NULL
             WHERE name = ?2 AND site = ?3",
            params![refreshed_at.to_rfc3339(), name, site.as_str()],
        )?;
        if changed == 0 {
            return Err(StorageError::RealmNotFound {
                name: name.to_string(),
                site,
            });
        }
        Ok(())
    }

    fn upsert_guild(&mut self, guild: &GuildRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO guilds (name, realm, site, first_seen, last_refresh)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (name, realm, site) DO NOTHING",
            params![
                guild.name,
                guild.realm,
                guild.site.as_str(),
                guild.first_seen.to_rfc3339(),
                guild.last_refresh.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn get_guild(&self, name: &str, realm: &str, site: Site) -> StorageResult<Option<GuildRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM guilds WHERE name = ?1 AND realm = ?2 AND site = ?3",
            GUILD_COLUMNS
        ))?;
        let guild = stmt
            .query_row(params![name, realm, site.as_str()], guild_from_row)
            .optional()?;
        Ok(guild)
    }

    fn count_unrefreshed_guilds(&self, realm: &str, site: Site) -> StorageResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM guilds
             WHERE realm = ?1 AND site = ?2 AND last_refresh IS NULL",
            params![realm, site.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn unrefreshed_guild_at(
        &self,
        realm: &str,
        site: Site,
        index: u32,
    ) -> StorageResult<Option<GuildRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM guilds
             WHERE realm = ?1 AND site = ?2 AND last_refresh IS NULL
             ORDER BY name LIMIT 1 OFFSET ?3",
            GUILD_COLUMNS
        ))?;
        let guild = stmt
            .query_row(params![realm, site.as_str(), index], guild_from_row)
            .optional()?;
        Ok(guild)
    }

    fn set_guild_refreshed(
        &mut self,
        name: &str,
        realm: &str,
        site: Site,
        refreshed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE guilds SET last_refresh = ?1 WHERE name = ?2 AND realm = ?3 AND site = ?4",
            params![refreshed_at.to_rfc3339(), name, realm, site.as_str()],
        )?;
        if changed == 0 {
            return Err(StorageError::GuildNotFound {
                name: name.to_string(),
                realm: realm.to_string(),
                site,
            });
        }
        Ok(())
    }

    fn counts(&self) -> StorageResult<StorageCounts> {
        let single = |sql: &str| -> StorageResult<u32> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(StorageCounts {
            battlegroups: single("SELECT COUNT(*) FROM battlegroups")?,
            realms: single("SELECT COUNT(*) FROM realms")?,
            refreshed_realms: single("SELECT COUNT(*) FROM realms WHERE last_refresh IS NOT NULL")?,
            locked_realms: single("SELECT COUNT(*) FROM realms WHERE lock_owner IS NOT NULL")?,
            guilds: single("SELECT COUNT(*) FROM guilds")?,
            refreshed_guilds: single("SELECT COUNT(*) FROM guilds WHERE last_refresh IS NOT NULL")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_storage() -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .upsert_battlegroup(&BattlegroupRecord {
                name: "Whirlwind".into(),
                site: Site::Us,
            })
            .unwrap();
        storage
            .upsert_realm(&RealmRecord::new(
                "Test", Site::Us, "Whirlwind", "PvE", "en",
            ))
            .unwrap();
        storage
    }

    #[test]
    fn test_upsert_and_get_realm() {
        let storage = seeded_storage();
        let realm = storage.get_realm("Test", Site::Us).unwrap().unwrap();

        assert_eq!(realm.name, "Test");
        assert_eq!(realm.battlegroup, "Whirlwind");
        assert!(realm.last_refresh.is_none());
        assert!(realm.lock_owner.is_none());
        assert!(realm.lock_time.is_none());
    }

    #[test]
    fn test_get_realm_wrong_site_misses() {
        let storage = seeded_storage();
        assert!(storage.get_realm("Test", Site::Eu).unwrap().is_none());
    }

    #[test]
    fn test_upsert_realm_preserves_lock_and_refresh() {
        let mut storage = seeded_storage();
        storage
            .lock_realm("Test", Site::Us, "host-a", Utc::now())
            .unwrap();

        // Re-seeding with updated topology must not drop the claim.
        let mut reseeded = RealmRecord::new("Test", Site::Us, "Whirlwind", "PvP", "en");
        reseeded.battlegroup = "Whirlwind".into();
        storage.upsert_realm(&reseeded).unwrap();

        let realm = storage.get_realm("Test", Site::Us).unwrap().unwrap();
        assert_eq!(realm.server_type, "PvP");
        assert_eq!(realm.lock_owner.as_deref(), Some("host-a"));
        assert!(realm.lock_time.is_some());
    }

    #[test]
    fn test_lock_sets_both_columns_finish_clears_both() {
        let mut storage = seeded_storage();
        let locked_at = Utc::now();
        storage
            .lock_realm("Test", Site::Us, "host-a", locked_at)
            .unwrap();

        let realm = storage.get_realm("Test", Site::Us).unwrap().unwrap();
        assert_eq!(realm.lock_owner.as_deref(), Some("host-a"));
        assert_eq!(realm.lock_time.unwrap().timestamp(), locked_at.timestamp());

        storage.finish_realm("Test", Site::Us, Utc::now()).unwrap();
        let realm = storage.get_realm("Test", Site::Us).unwrap().unwrap();
        assert!(realm.last_refresh.is_some());
        assert!(realm.lock_owner.is_none());
        assert!(realm.lock_time.is_none());
    }

    #[test]
    fn test_lock_missing_realm_errors() {
        let mut storage = seeded_storage();
        let err = storage
            .lock_realm("Nowhere", Site::Us, "host-a", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StorageError::RealmNotFound { .. }));
    }

    #[test]
    fn test_unclaimed_selection_excludes_locked_and_refreshed() {
        let mut storage = seeded_storage();
        for name in ["Alpha", "Beta", "Gamma"] {
            storage
                .upsert_realm(&RealmRecord::new(name, Site::Us, "Whirlwind", "PvE", "en"))
                .unwrap();
        }
        assert_eq!(storage.count_unclaimed_realms(Site::Us).unwrap(), 4);

        storage
            .lock_realm("Alpha", Site::Us, "host-b", Utc::now())
            .unwrap();
        storage.finish_realm("Beta", Site::Us, Utc::now()).unwrap();

        assert_eq!(storage.count_unclaimed_realms(Site::Us).unwrap(), 2);
        let names: Vec<String> = (0..2)
            .map(|i| {
                storage
                    .unclaimed_realm_at(Site::Us, i)
                    .unwrap()
                    .unwrap()
                    .name
            })
            .collect();
        assert_eq!(names, vec!["Gamma".to_string(), "Test".to_string()]);
        assert!(storage.unclaimed_realm_at(Site::Us, 2).unwrap().is_none());
    }

    #[test]
    fn test_find_realm_locked_by_ignores_site() {
        let mut storage = seeded_storage();
        storage
            .upsert_battlegroup(&BattlegroupRecord {
                name: "Bloodlust".into(),
                site: Site::Eu,
            })
            .unwrap();
        storage
            .upsert_realm(&RealmRecord::new(
                "Argent Dawn",
                Site::Eu,
                "Bloodlust",
                "RP",
                "en",
            ))
            .unwrap();
        storage
            .lock_realm("Argent Dawn", Site::Eu, "host-a", Utc::now())
            .unwrap();

        let found = storage.find_realm_locked_by("host-a").unwrap().unwrap();
        assert_eq!(found.name, "Argent Dawn");
        assert_eq!(found.site, Site::Eu);
        assert!(storage.find_realm_locked_by("host-z").unwrap().is_none());
    }

    #[test]
    fn test_guild_stub_and_refresh_cycle() {
        let mut storage = seeded_storage();
        storage
            .upsert_guild(&GuildRecord::stub("Alpha", "Test", Site::Us))
            .unwrap();
        storage
            .upsert_guild(&GuildRecord::stub("Beta", "Test", Site::Us))
            .unwrap();

        assert_eq!(storage.count_unrefreshed_guilds("Test", Site::Us).unwrap(), 2);

        storage
            .set_guild_refreshed("Alpha", "Test", Site::Us, Utc::now())
            .unwrap();
        assert_eq!(storage.count_unrefreshed_guilds("Test", Site::Us).unwrap(), 1);

        let remaining = storage
            .unrefreshed_guild_at("Test", Site::Us, 0)
            .unwrap()
            .unwrap();
        assert_eq!(remaining.name, "Beta");

        // Rediscovery must not clear the refresh stamp.
        storage
            .upsert_guild(&GuildRecord::stub("Alpha", "Test", Site::Us))
            .unwrap();
        let alpha = storage.get_guild("Alpha", "Test", Site::Us).unwrap().unwrap();
        assert!(alpha.last_refresh.is_some());
    }

    #[test]
    fn test_counts() {
        let mut storage = seeded_storage();
        storage
            .upsert_guild(&GuildRecord::stub("Alpha", "Test", Site::Us))
            .unwrap();
        storage
            .lock_realm("Test", Site::Us, "host-a", Utc::now())
            .unwrap();

        let counts = storage.counts().unwrap();
        assert_eq!(counts.battlegroups, 1);
        assert_eq!(counts.realms, 1);
        assert_eq!(counts.locked_realms, 1);
        assert_eq!(counts.refreshed_realms, 0);
        assert_eq!(counts.guilds, 1);
        assert_eq!(counts.refreshed_guilds, 0);
    }
}
