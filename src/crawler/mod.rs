//! Realm crawl driver
//!
//! Ties the work queue, the download pool and storage together. One
//! `crawl_next_realm` call claims a realm, walks its arena ladders to
//! discover teams, walks the team rosters to discover guilds, downloads
//! every guild roster, and finally releases the realm with a refresh
//! stamp. Guild-level failures are logged and skipped so one broken
//! roster cannot wedge the realm.

pub mod seed;

use crate::armory::{extract_attribute_values, max_pages, ArmoryUrls, LADDER_SIZES};
use crate::fetch::FetchError;
use crate::pool::Downloader;
use crate::queue::QueueManager;
use crate::storage::{GuildRecord, RealmRecord, Storage};
use crate::Result;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Drives the crawl of one site.
pub struct Crawler<S: Storage> {
    urls: ArmoryUrls,
    downloader: Downloader,
    queue: QueueManager<S>,
    storage: Arc<Mutex<S>>,
    refresh_all: bool,
}

impl<S: Storage> Crawler<S> {
    pub fn new(
        urls: ArmoryUrls,
        downloader: Downloader,
        queue: QueueManager<S>,
        storage: Arc<Mutex<S>>,
        refresh_all: bool,
    ) -> Self {
        Self {
            urls,
            downloader,
            queue,
            storage,
            refresh_all,
        }
    }

    /// Crawls realms until the site has none left unclaimed. Returns the
    /// number of realms finished.
    pub async fn run(&self) -> Result<u32> {
        let mut finished = 0;
        while self.crawl_next_realm().await? {
            finished += 1;
        }
        info!(finished, site = %self.queue.site(), "site crawl complete");
        Ok(finished)
    }

    /// Claims and crawls one realm. Returns `false` when no realm was
    /// available.
    ///
    /// Errors during discovery leave the realm locked; this caller's
    /// identity reclaims it on the next attempt, so partial work is
    /// resumed rather than lost.
    pub async fn crawl_next_realm(&self) -> Result<bool> {
        let Some(realm) = self.queue.next_realm()? else {
            return Ok(false);
        };
        info!(realm = %realm.name, site = %realm.site, "crawling realm");

        let discovered = self.discover_guilds(&realm).await?;
        info!(
            realm = %realm.name,
            guilds = discovered.len(),
            "guild discovery complete"
        );

        if self.refresh_all {
            // Stamped guilds never come back out of the queue, so a full
            // refresh crawls the rediscovered ones directly.
            for name in &discovered {
                let already_refreshed = {
                    let storage = self.storage.lock().unwrap();
                    storage
                        .get_guild(name, &realm.name, realm.site)?
                        .and_then(|g| g.last_refresh)
                        .is_some()
                };
                if already_refreshed {
                    self.crawl_guild(name, &realm).await?;
                    self.queue.finish_guild(name, &realm.name, realm.site)?;
                }
            }
        }

        while let Some(guild) = self.queue.next_guild(&realm.name, realm.site)? {
            self.crawl_guild(&guild.name, &realm).await?;
            // Stamped even on a failed download, or the queue would hand
            // the same broken guild back forever.
            self.queue.finish_guild(&guild.name, &realm.name, realm.site)?;
        }

        self.queue.finish_realm(&realm.name, realm.site)?;
        Ok(true)
    }

    /// Walks the realm's arena ladders and team rosters, stubbing a guild
    /// row for every guild name seen. Returns the distinct names found.
    async fn discover_guilds(&self, realm: &RealmRecord) -> Result<BTreeSet<String>> {
        let mut teams: BTreeSet<(String, u32)> = BTreeSet::new();

        for size in LADDER_SIZES {
            let first_page = self.urls.arena_ladder(
                &realm.battlegroup,
                &realm.name,
                realm.site,
                size,
                1,
            );
            let source = self.downloader.download(&first_page).await?;
            let pages = max_pages(&source);
            debug!(realm = %realm.name, size, pages, "arena ladder paginated");

            for name in extract_attribute_values(&source, "name") {
                teams.insert((name, size));
            }
            for page in 2..=pages {
                let url = self.urls.arena_ladder(
                    &realm.battlegroup,
                    &realm.name,
                    realm.site,
                    size,
                    page,
                );
                let source = self.downloader.download(&url).await?;
                for name in extract_attribute_values(&source, "name") {
                    teams.insert((name, size));
                }
            }
        }

        let mut guilds = BTreeSet::new();
        for (team, size) in &teams {
            let url = self.urls.team_info(team, &realm.name, realm.site, *size);
            let source = match self.downloader.download(&url).await {
                Ok(source) => source,
                Err(e) if is_page_error(&e) => {
                    warn!(team = %team, error = %e, "skipping unreadable team roster");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for name in extract_attribute_values(&source, "guildName") {
                if !name.is_empty() {
                    guilds.insert(name);
                }
            }
        }

        {
            let mut storage = self.storage.lock().unwrap();
            for name in &guilds {
                storage.upsert_guild(&GuildRecord::stub(name, &realm.name, realm.site))?;
            }
        }
        Ok(guilds)
    }

    /// Downloads every page of one guild's roster. Page errors are logged
    /// and swallowed; the caller stamps the guild regardless.
    async fn crawl_guild(&self, name: &str, realm: &RealmRecord) -> Result<()> {
        let first_page = self.urls.guild_info(name, &realm.name, realm.site, 1);
        let source = match self.downloader.download(&first_page).await {
            Ok(source) => source,
            Err(e) if is_page_error(&e) => {
                warn!(guild = %name, error = %e, "guild roster unavailable");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let pages = max_pages(&source);
        debug!(guild = %name, pages, "crawling guild roster");
        for page in 2..=pages {
            let url = self.urls.guild_info(name, &realm.name, realm.site, page);
            if let Err(e) = self.downloader.download(&url).await {
                if is_page_error(&e) {
                    warn!(guild = %name, page, error = %e, "guild roster page failed");
                    continue;
                }
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// True for failures scoped to one page. Pool lifecycle errors are not:
/// once the pool is gone, no further download can succeed.
fn is_page_error(error: &FetchError) -> bool {
    !matches!(error, FetchError::PoolClosed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_errors_are_survivable() {
        assert!(is_page_error(&FetchError::NotFound {
            url: "http://example.com/guild-info.xml".to_string()
        }));
        assert!(is_page_error(&FetchError::Unavailable {
            url: "http://example.com/guild-info.xml".to_string(),
            attempts: 3
        }));
        assert!(is_page_error(&FetchError::WorkerFaulted));
        assert!(!is_page_error(&FetchError::PoolClosed));
    }
}
