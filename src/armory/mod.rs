//! Armory site selection and URL construction
//!
//! Every upstream resource is a GET against a regional host: the "us" site
//! is served from `www.<domain>` and the "eu" site from `eu.<domain>`. All
//! page-specific query formats live here so the rest of the crawler only
//! ever handles opaque URLs.

mod pages;

pub use pages::{extract_attribute_values, max_pages};

use crate::SpyderError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Two-letter region code partitioning which host serves a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Us,
    Eu,
}

impl Site {
    /// All sites a crawler process may be assigned.
    pub const ALL: [Site; 2] = [Site::Us, Site::Eu];

    /// The two-letter code stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Us => "us",
            Site::Eu => "eu",
        }
    }

    /// The host label prefixed to the Armory domain for this site.
    fn host_prefix(&self) -> &'static str {
        match self {
            Site::Us => "www",
            Site::Eu => "eu",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Site {
    type Err = SpyderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(Site::Us),
            "eu" => Ok(Site::Eu),
            other => Err(SpyderError::UnknownSite(other.to_string())),
        }
    }
}

/// Arena ladder bracket sizes the Armory paginates separately.
pub const LADDER_SIZES: [u32; 3] = [2, 3, 5];

/// Statistic category ids requested per character.
pub const STATISTIC_CATEGORIES: [u32; 10] =
    [130, 141, 128, 122, 133, 14807, 132, 134, 131, 21];

/// Achievement category ids requested per character.
pub const ACHIEVEMENT_CATEGORIES: [u32; 9] = [92, 96, 97, 95, 168, 169, 201, 155, 81];

/// Builds URLs for every Armory resource the crawler touches.
#[derive(Debug, Clone)]
pub struct ArmoryUrls {
    scheme: String,
    domain: String,
}

impl ArmoryUrls {
    /// Creates a URL builder for the given Armory domain
    /// (e.g. `wowarmory.example`).
    pub fn new(scheme: &str, domain: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            domain: domain.to_string(),
        }
    }

    /// Root URL for the site's regional host.
    pub fn site_root(&self, site: Site) -> String {
        format!("{}://{}.{}/", self.scheme, site.host_prefix(), self.domain)
    }

    /// The session probe: fetching this establishes the login cookie.
    pub fn login_status(&self, site: Site) -> String {
        format!("{}login-status.xml", self.site_root(site))
    }

    /// One page of the arena ladder for a battlegroup, filtered to a realm.
    pub fn arena_ladder(
        &self,
        battlegroup: &str,
        realm: &str,
        site: Site,
        ladder_size: u32,
        page: u32,
    ) -> String {
        self.build(site, "arena-ladder.xml", |q| {
            q.append_pair("b", battlegroup);
            q.append_pair("ts", &ladder_size.to_string());
            q.append_pair("fv", realm);
            q.append_pair("ff", "realm");
            q.append_pair("p", &page.to_string());
        })
    }

    /// Team roster page.
    pub fn team_info(&self, name: &str, realm: &str, site: Site, size: u32) -> String {
        self.build(site, "team-info.xml", |q| {
            q.append_pair("r", realm);
            q.append_pair("ts", &size.to_string());
            q.append_pair("t", name);
        })
    }

    /// One page of a guild's member roster.
    pub fn guild_info(&self, name: &str, realm: &str, site: Site, page: u32) -> String {
        self.build(site, "guild-info.xml", |q| {
            q.append_pair("r", realm);
            q.append_pair("n", name);
            q.append_pair("p", &page.to_string());
        })
    }

    /// A character's gear and profile sheet.
    pub fn character_sheet(&self, name: &str, realm: &str, site: Site) -> String {
        self.build(site, "character-sheet.xml", |q| {
            q.append_pair("r", realm);
            q.append_pair("n", name);
        })
    }

    /// A character's talent build.
    pub fn character_talents(&self, name: &str, realm: &str, site: Site) -> String {
        self.build(site, "character-talents.xml", |q| {
            q.append_pair("r", realm);
            q.append_pair("n", name);
        })
    }

    /// Per-category statistics pages for a character.
    pub fn character_statistics(&self, name: &str, realm: &str, site: Site) -> Vec<String> {
        STATISTIC_CATEGORIES
            .iter()
            .map(|category| {
                self.build(site, "character-statistics.xml", |q| {
                    q.append_pair("r", realm);
                    q.append_pair("n", name);
                    q.append_pair("c", &category.to_string());
                })
            })
            .collect()
    }

    /// Per-category achievement pages for a character.
    pub fn character_achievements(&self, name: &str, realm: &str, site: Site) -> Vec<String> {
        ACHIEVEMENT_CATEGORIES
            .iter()
            .map(|category| {
                self.build(site, "character-achievements.xml", |q| {
                    q.append_pair("r", realm);
                    q.append_pair("n", name);
                    q.append_pair("c", &category.to_string());
                })
            })
            .collect()
    }

    /// Item tooltip data. Items are region-agnostic, so the "us" host serves
    /// every lookup.
    pub fn item_info(&self, item_id: u32) -> String {
        self.build(Site::Us, "item-info.xml", |q| {
            q.append_pair("i", &item_id.to_string());
        })
    }

    fn build<F>(&self, site: Site, resource: &str, fill: F) -> String
    where
        F: FnOnce(&mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>),
    {
        // The root and resource names are static, so parsing cannot fail.
        let mut url = Url::parse(&self.site_root(site))
            .and_then(|root| root.join(resource))
            .expect("static armory URL");
        fill(&mut url.query_pairs_mut());
        url.to_string()
    }
}
