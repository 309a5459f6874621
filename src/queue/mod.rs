//! Locking realm work queue
//!
//! Coordinates concurrent crawler processes through the realms table:
//! each caller claims one realm at a time under its host identity, and
//! the claim is visible to (and honored by) every other caller sharing
//! the database. Selection among unclaimed realms is uniformly random
//! so independent crawlers spread out instead of marching in name order.

use crate::armory::Site;
use crate::storage::{GuildRecord, RealmRecord, Storage};
use crate::Result;
use chrono::Utc;
use rand::Rng;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// The identity a caller locks realms under. One identity per host:
/// every process on a machine shares it, which is what lets a restarted
/// crawler reclaim work its predecessor left locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Uses the machine hostname, falling back to a fixed placeholder
    /// when the platform cannot report one.
    pub fn from_hostname() -> Self {
        let name = sysinfo::System::host_name().unwrap_or_else(|| "unknown-host".to_string());
        Self(name)
    }

    /// An explicit identity, e.g. from configuration.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out realms and guilds to a crawl loop.
pub struct QueueManager<S: Storage> {
    storage: Arc<Mutex<S>>,
    site: Site,
    identity: CallerIdentity,
}

impl<S: Storage> QueueManager<S> {
    /// Creates a queue manager scoped to `site`. When no site is given,
    /// one is chosen at random so a fleet of default-configured crawlers
    /// covers both regions.
    pub fn new(storage: Arc<Mutex<S>>, site: Option<Site>, identity: CallerIdentity) -> Self {
        let site = site.unwrap_or_else(|| {
            let choice = Site::ALL[rand::thread_rng().gen_range(0..Site::ALL.len())];
            info!(site = %choice, "no site configured, picked one at random");
            choice
        });
        Self {
            storage,
            site,
            identity,
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Claims the next realm to crawl.
    ///
    /// A realm already locked under this caller's identity is returned
    /// first, whatever its site: it is leftover work from a crawl that
    /// did not finish. Otherwise a uniformly random unclaimed realm for
    /// this queue's site is locked and returned. `None` means the site
    /// has no work left.
    ///
    /// The claim is optimistic. Between selection and the lock write
    /// another caller may lock the same realm; the later write wins and
    /// both callers proceed. The duplicated crawl is wasted effort, not
    /// corruption, since finishing a realm is idempotent.
    pub fn next_realm(&self) -> Result<Option<RealmRecord>> {
        let mut storage = self.storage.lock().unwrap();

        if let Some(realm) = storage.find_realm_locked_by(self.identity.as_str())? {
            info!(
                realm = %realm.name,
                site = %realm.site,
                "reclaiming realm still locked by this host"
            );
            return Ok(Some(realm));
        }

        let count = storage.count_unclaimed_realms(self.site)?;
        if count == 0 {
            debug!(site = %self.site, "no unclaimed realms");
            return Ok(None);
        }

        let index = rand::thread_rng().gen_range(0..count);
        let Some(mut realm) = storage.unclaimed_realm_at(self.site, index)? else {
            // A concurrent caller shrank the set between count and fetch.
            return Ok(None);
        };

        let now = Utc::now();
        storage.lock_realm(&realm.name, realm.site, self.identity.as_str(), now)?;
        realm.lock_owner = Some(self.identity.as_str().to_string());
        realm.lock_time = Some(now);

        info!(realm = %realm.name, site = %realm.site, "locked realm");
        Ok(Some(realm))
    }

    /// Picks a uniformly random unrefreshed guild from `realm`, or `None`
    /// when every discovered guild has been refreshed. The site comes from
    /// the realm being crawled, which for a reclaimed realm may differ
    /// from this queue's own site.
    pub fn next_guild(&self, realm: &str, site: Site) -> Result<Option<GuildRecord>> {
        let storage = self.storage.lock().unwrap();

        let count = storage.count_unrefreshed_guilds(realm, site)?;
        if count == 0 {
            return Ok(None);
        }

        let index = rand::thread_rng().gen_range(0..count);
        Ok(storage.unrefreshed_guild_at(realm, site, index)?)
    }

    /// Marks a realm crawled: stamps `last_refresh` and releases the lock
    /// in the same statement, so no realm is ever observed finished but
    /// still held.
    pub fn finish_realm(&self, name: &str, site: Site) -> Result<()> {
        let mut storage = self.storage.lock().unwrap();
        storage.finish_realm(name, site, Utc::now())?;
        info!(realm = %name, site = %site, "finished realm");
        Ok(())
    }

    /// Stamps a guild's `last_refresh` so it drops out of `next_guild`.
    pub fn finish_guild(&self, name: &str, realm: &str, site: Site) -> Result<()> {
        let mut storage = self.storage.lock().unwrap();
        storage.set_guild_refreshed(name, realm, site, Utc::now())?;
        Ok(())
    }
}
