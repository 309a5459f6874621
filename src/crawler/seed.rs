//! Seed file ingestion
//!
//! The crawler cannot discover realms on its own; the realm list is
//! topology data loaded once from a TOML seed file and upserted into the
//! database. Re-running a seed refreshes metadata without disturbing
//! refresh stamps or locks.

use crate::armory::Site;
use crate::storage::{BattlegroupRecord, RealmRecord, Storage};
use crate::{Result, SpyderError};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// A parsed seed file: battlegroups with their realms.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default, rename = "battlegroup")]
    pub battlegroups: Vec<BattlegroupSeed>,
}

/// One battlegroup and the realms it clusters.
#[derive(Debug, Deserialize)]
pub struct BattlegroupSeed {
    pub name: String,
    pub site: Site,
    #[serde(default, rename = "realm")]
    pub realms: Vec<RealmSeed>,
}

/// One realm row of the seed.
#[derive(Debug, Deserialize)]
pub struct RealmSeed {
    pub name: String,
    #[serde(rename = "server-type")]
    pub server_type: String,
    pub language: String,
}

/// Loads and validates a seed file.
pub fn load_seed(path: &Path) -> Result<SeedFile> {
    let content = std::fs::read_to_string(path)?;
    let seed: SeedFile = toml::from_str(&content)
        .map_err(|e| SpyderError::Seed(format!("{}: {}", path.display(), e)))?;

    if seed.battlegroups.is_empty() {
        return Err(SpyderError::Seed(format!(
            "{}: no battlegroups defined",
            path.display()
        )));
    }
    for battlegroup in &seed.battlegroups {
        if battlegroup.name.is_empty() {
            return Err(SpyderError::Seed("battlegroup with empty name".to_string()));
        }
        for realm in &battlegroup.realms {
            if realm.name.is_empty() {
                return Err(SpyderError::Seed(format!(
                    "battlegroup {:?} has a realm with an empty name",
                    battlegroup.name
                )));
            }
        }
    }

    Ok(seed)
}

/// Upserts every battlegroup and realm of a seed. Returns the counts
/// written, for reporting.
pub fn apply_seed<S: Storage>(storage: &mut S, seed: &SeedFile) -> Result<(u32, u32)> {
    let mut battlegroups = 0;
    let mut realms = 0;

    for battlegroup in &seed.battlegroups {
        storage.upsert_battlegroup(&BattlegroupRecord {
            name: battlegroup.name.clone(),
            site: battlegroup.site,
        })?;
        battlegroups += 1;

        for realm in &battlegroup.realms {
            storage.upsert_realm(&RealmRecord::new(
                &realm.name,
                battlegroup.site,
                &battlegroup.name,
                &realm.server_type,
                &realm.language,
            ))?;
            realms += 1;
        }
    }

    info!(battlegroups, realms, "seed applied");
    Ok((battlegroups, realms))
}
