//! Storage trait and error types

use crate::armory::Site;
use crate::storage::{BattlegroupRecord, GuildRecord, RealmRecord, StorageCounts};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Realm not found: {name} ({site})")]
    RealmNotFound { name: String, site: Site },

    #[error("Guild not found: {name} on {realm} ({site})")]
    GuildNotFound {
        name: String,
        realm: String,
        site: Site,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations.
///
/// The count/at pairs back the queue manager's uniform random selection:
/// callers count the eligible rows, pick a uniform index, then fetch the
/// row at that offset. Both queries use the same fixed ordering, so an
/// index observed against a count is stable absent concurrent writes (and
/// a racing write at worst selects a different eligible row).
pub trait Storage {
    // ===== Battlegroups & realms =====

    /// Inserts a battlegroup, or does nothing if it already exists.
    fn upsert_battlegroup(&mut self, battlegroup: &BattlegroupRecord) -> StorageResult<()>;

    /// Inserts a realm, or refreshes its topology metadata if it exists.
    /// Never touches `last_refresh` or the lock columns: re-running a seed
    /// must not release anyone's claim.
    fn upsert_realm(&mut self, realm: &RealmRecord) -> StorageResult<()>;

    /// Gets a realm by primary key.
    fn get_realm(&self, name: &str, site: Site) -> StorageResult<Option<RealmRecord>>;

    /// Finds a realm currently locked by `owner`, any site.
    fn find_realm_locked_by(&self, owner: &str) -> StorageResult<Option<RealmRecord>>;

    /// Counts realms for `site` with no `last_refresh` and no lock.
    fn count_unclaimed_realms(&self, site: Site) -> StorageResult<u32>;

    /// Returns the unclaimed realm at `index` in fixed (name) order.
    fn unclaimed_realm_at(&self, site: Site, index: u32) -> StorageResult<Option<RealmRecord>>;

    /// Writes the lock columns for a realm (both together).
    fn lock_realm(
        &mut self,
        name: &str,
        site: Site,
        owner: &str,
        time: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Stamps `last_refresh` and clears both lock columns.
    fn finish_realm(
        &mut self,
        name: &str,
        site: Site,
        refreshed_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ===== Guilds =====

    /// Inserts a guild stub, or does nothing if it already exists (an
    /// existing guild's refresh state must survive rediscovery).
    fn upsert_guild(&mut self, guild: &GuildRecord) -> StorageResult<()>;

    /// Gets a guild by primary key.
    fn get_guild(&self, name: &str, realm: &str, site: Site) -> StorageResult<Option<GuildRecord>>;

    /// Counts guilds in a realm with no `last_refresh`.
    fn count_unrefreshed_guilds(&self, realm: &str, site: Site) -> StorageResult<u32>;

    /// Returns the unrefreshed guild at `index` in fixed (name) order.
    fn unrefreshed_guild_at(
        &self,
        realm: &str,
        site: Site,
        index: u32,
    ) -> StorageResult<Option<GuildRecord>>;

    /// Stamps a guild's `last_refresh`.
    fn set_guild_refreshed(
        &mut self,
        name: &str,
        realm: &str,
        site: Site,
        refreshed_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ===== Reporting =====

    /// Summary counts for `--stats`.
    fn counts(&self) -> StorageResult<StorageCounts>;
}
