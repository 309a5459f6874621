//! Persistent storage for crawl records
//!
//! The crawler's unit of work lives here: battlegroups and their realms
//! (with the lock and refresh columns the work queue coordinates on) and
//! the guilds discovered inside each realm.

pub mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::armory::Site;
use chrono::{DateTime, Utc};

/// A named cluster of realms. Topology metadata only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattlegroupRecord {
    pub name: String,
    pub site: Site,
}

/// A realm row: the top-level unit of crawl work.
///
/// Invariant: `lock_owner` and `lock_time` are always both set or both
/// null; every write path sets or clears them together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmRecord {
    pub name: String,
    pub site: Site,
    pub battlegroup: String,
    pub server_type: String,
    pub language: String,
    pub last_refresh: Option<DateTime<Utc>>,
    pub lock_owner: Option<String>,
    pub lock_time: Option<DateTime<Utc>>,
}

impl RealmRecord {
    /// A realm nobody has crawled or claimed yet.
    pub fn new(
        name: &str,
        site: Site,
        battlegroup: &str,
        server_type: &str,
        language: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            site,
            battlegroup: battlegroup.to_string(),
            server_type: server_type.to_string(),
            language: language.to_string(),
            last_refresh: None,
            lock_owner: None,
            lock_time: None,
        }
    }
}

/// A guild row within a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRecord {
    pub name: String,
    pub realm: String,
    pub site: Site,
    pub first_seen: DateTime<Utc>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl GuildRecord {
    /// A freshly discovered, never-refreshed guild stub.
    pub fn stub(name: &str, realm: &str, site: Site) -> Self {
        Self {
            name: name.to_string(),
            realm: realm.to_string(),
            site,
            first_seen: Utc::now(),
            last_refresh: None,
        }
    }
}

/// Summary counts surfaced by `--stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageCounts {
    pub battlegroups: u32,
    pub realms: u32,
    pub refreshed_realms: u32,
    pub locked_realms: u32,
    pub guilds: u32,
    pub refreshed_guilds: u32,
}
