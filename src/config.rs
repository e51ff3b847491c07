//! Ladder Configuration
//!
//! Two layers of configuration live here:
//! - Named settings stored with the ladder (`signup_only`, `num_cancels`,
//!   `challenge_timeout`, ...). Ladder-scoped rows override global rows.
//! - [`EngineConfig`], the process level TOML file read by the binary
//!   (database location, default ladder, sweep schedule).

use crate::error::{LadderError, Result};
use crate::storage::{LadderTx, GLOBAL_SCOPE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CURRENT_LADDER: &str = "current_ladder";
pub const RANKING_CHANNEL: &str = "ranking_channel";
pub const GENERAL_CHANNEL: &str = "general_channel";
pub const LADDER_ROLE: &str = "ladder_role";
pub const ADMIN_ROLE: &str = "admin_role";
pub const RANKING_MESSAGE: &str = "ranking_message";
pub const SIGNUP_ONLY: &str = "signup_only";
pub const NUM_CANCELS: &str = "num_cancels";
pub const CHALLENGE_TIMEOUT: &str = "challenge_timeout";
pub const OUTGOING_COOLDOWN: &str = "outgoing_cooldown";
pub const CHALLENGE_PROTECTION: &str = "challenge_protection";
pub const RANK_RANGE: &str = "rank_range";

/// Upper bound for the day-count settings (ten years)
pub const MAX_SETTING_DAYS: u32 = 3650;

const DAY_SETTINGS: &[&str] = &[CHALLENGE_TIMEOUT, OUTGOING_COOLDOWN, CHALLENGE_PROTECTION];

/// Global rows seeded into every new store. Only names listed here can be set.
pub const DEFAULT_CONFIG: &[(&str, &str)] = &[
    (CURRENT_LADDER, "default"),
    (RANKING_CHANNEL, ""),
    (GENERAL_CHANNEL, ""),
    (LADDER_ROLE, ""),
    (ADMIN_ROLE, ""),
    (RANKING_MESSAGE, ""),
    (SIGNUP_ONLY, "0"),
    (NUM_CANCELS, "3"),
    (CHALLENGE_TIMEOUT, "7"),
    (OUTGOING_COOLDOWN, "1"),
    (CHALLENGE_PROTECTION, "1"),
    (RANK_RANGE, "3"),
];

/// Read a setting. A ladder-scoped row wins over the global row.
pub fn get(tx: &dyn LadderTx, name: &str, ladder: Option<&str>) -> Result<String> {
    if let Some(ladder) = ladder.filter(|l| *l != GLOBAL_SCOPE) {
        if let Some(value) = tx.config_value(ladder, name)? {
            return Ok(value);
        }
    }
    tx.config_value(GLOBAL_SCOPE, name)?
        .ok_or_else(|| LadderError::ConfigNotFound(name.to_string()))
}

/// Write a setting.
///
/// Only names with a global row can be set. With `ladder` set the value is
/// stored as an override for that ladder, otherwise the global row changes.
pub fn set(tx: &mut dyn LadderTx, name: &str, value: &str, ladder: Option<&str>) -> Result<()> {
    if tx.config_value(GLOBAL_SCOPE, name)?.is_none() {
        return Err(LadderError::ConfigNotFound(name.to_string()));
    }
    validate(name, value)?;
    let scope = ladder.unwrap_or(GLOBAL_SCOPE);
    tx.put_config(scope, name, value)?;
    debug!("Config {} set to {:?} (scope {:?})", name, value, scope);
    Ok(())
}

fn invalid(name: &str, value: &str) -> LadderError {
    LadderError::InvalidConfig {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Parse a numeric setting, enforcing the bounds of its name
fn parse_value(name: &str, value: &str) -> Result<u32> {
    let parsed = value.trim().parse::<u32>().map_err(|_| invalid(name, value))?;
    let in_bounds = match name {
        SIGNUP_ONLY => parsed <= 1,
        n if DAY_SETTINGS.contains(&n) => parsed <= MAX_SETTING_DAYS,
        _ => true,
    };
    if in_bounds {
        Ok(parsed)
    } else {
        Err(invalid(name, value))
    }
}

/// Reject values the engine could not load back
fn validate(name: &str, value: &str) -> Result<()> {
    match name {
        SIGNUP_ONLY | NUM_CANCELS | RANK_RANGE | CHALLENGE_TIMEOUT | OUTGOING_COOLDOWN
        | CHALLENGE_PROTECTION => parse_value(name, value).map(|_| ()),
        _ => Ok(()),
    }
}

fn parse(tx: &dyn LadderTx, name: &str) -> Result<u32> {
    let value = get(tx, name, Some(tx.ladder()))?;
    parse_value(name, &value)
}

/// Typed view of the numeric settings that drive the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderSettings {
    /// Players may only sign up; challenges are disabled
    pub signup_only: bool,
    /// Strikes a player may hold before being kicked
    pub num_cancels: u32,
    /// Days a challenge stays open
    pub challenge_timeout_days: u32,
    /// Days a challenger can't issue challenges after a reported game
    pub outgoing_cooldown_days: u32,
    /// Days an opponent can't be challenged after a reported game
    pub challenge_protection_days: u32,
    /// Ranks a player may reach upward
    pub rank_range: u32,
}

impl Default for LadderSettings {
    fn default() -> Self {
        Self {
            signup_only: false,
            num_cancels: 3,
            challenge_timeout_days: 7,
            outgoing_cooldown_days: 1,
            challenge_protection_days: 1,
            rank_range: 3,
        }
    }
}

impl LadderSettings {
    /// Load the settings effective for the transaction's ladder
    pub fn load(tx: &dyn LadderTx) -> Result<Self> {
        Ok(Self {
            signup_only: parse(tx, SIGNUP_ONLY)? == 1,
            num_cancels: parse(tx, NUM_CANCELS)?,
            challenge_timeout_days: parse(tx, CHALLENGE_TIMEOUT)?,
            outgoing_cooldown_days: parse(tx, OUTGOING_COOLDOWN)?,
            challenge_protection_days: parse(tx, CHALLENGE_PROTECTION)?,
            rank_range: parse(tx, RANK_RANGE)?,
        })
    }
}

/// Process configuration for the `ladder` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Ladder used when no ladder is given (falls back to `current_ladder`)
    pub default_ladder: Option<String>,
    /// How often the sweep monitor resolves overdue challenges
    pub sweep_interval_secs: u64,
    /// Ladders swept by the monitor; empty means the current ladder
    pub sweep_ladders: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ladder.db"),
            default_ladder: None,
            sweep_interval_secs: 3600, // hourly
            sweep_ladders: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LadderStore, SqliteStore};

    #[test]
    fn test_defaults_load() {
        let store = SqliteStore::in_memory().unwrap();
        let settings = store.read("s1", |tx| LadderSettings::load(tx)).unwrap();
        assert_eq!(settings, LadderSettings::default());
    }

    #[test]
    fn test_unknown_name_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .read("s1", |tx| get(tx, "no_such_setting", Some("s1")))
            .unwrap_err();
        assert!(matches!(err, LadderError::ConfigNotFound(name) if name == "no_such_setting"));

        let err = store
            .write("s1", |tx| set(tx, "no_such_setting", "1", None))
            .unwrap_err();
        assert!(matches!(err, LadderError::ConfigNotFound(_)));
    }

    #[test]
    fn test_ladder_override_wins() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .write("s1", |tx| set(tx, RANK_RANGE, "5", Some("s1")))
            .unwrap();

        let s1 = store.read("s1", |tx| LadderSettings::load(tx)).unwrap();
        let s2 = store.read("s2", |tx| LadderSettings::load(tx)).unwrap();
        assert_eq!(s1.rank_range, 5);
        assert_eq!(s2.rank_range, 3);

        let global = store.read("s1", |tx| get(tx, RANK_RANGE, None)).unwrap();
        assert_eq!(global, "3");
    }

    #[test]
    fn test_global_set() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .write(GLOBAL_SCOPE, |tx| set(tx, SIGNUP_ONLY, "1", None))
            .unwrap();
        let settings = store.read("any", |tx| LadderSettings::load(tx)).unwrap();
        assert!(settings.signup_only);
    }

    #[test]
    fn test_invalid_values_rejected_on_set() {
        let store = SqliteStore::in_memory().unwrap();
        for (name, value) in [
            (NUM_CANCELS, "lots"),
            (SIGNUP_ONLY, "2"),
            (RANK_RANGE, "-1"),
            (CHALLENGE_TIMEOUT, "4000000000"),
            (OUTGOING_COOLDOWN, "3651"),
        ] {
            let err = store
                .write("s1", |tx| set(tx, name, value, Some("s1")))
                .unwrap_err();
            assert!(matches!(err, LadderError::InvalidConfig { name: n, .. } if n == name));
        }
        store
            .write("s1", |tx| set(tx, CHALLENGE_PROTECTION, "3650", Some("s1")))
            .unwrap();
        store
            .write("s1", |tx| set(tx, RANKING_CHANNEL, "#ladder", None))
            .unwrap();
    }

    #[test]
    fn test_invalid_stored_value_fails_load() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .write("s1", |tx| tx.put_config("s1", NUM_CANCELS, "lots"))
            .unwrap();
        let err = store.read("s1", |tx| LadderSettings::load(tx)).unwrap_err();
        assert!(matches!(err, LadderError::InvalidConfig { name, .. } if name == NUM_CANCELS));

        store
            .write("s2", |tx| tx.put_config("s2", CHALLENGE_TIMEOUT, "4000000000"))
            .unwrap();
        let err = store.read("s2", |tx| LadderSettings::load(tx)).unwrap_err();
        assert!(matches!(err, LadderError::InvalidConfig { name, .. } if name == CHALLENGE_TIMEOUT));
    }

    #[test]
    fn test_engine_config_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ladder.toml");
        std::fs::write(
            &path,
            "database_path = \"/var/lib/ladder/ladder.db\"\nsweep_interval_secs = 60\nsweep_ladders = [\"season-2\"]\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/ladder/ladder.db"));
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.sweep_ladders, vec!["season-2".to_string()]);
        assert!(config.default_ladder.is_none());
    }
}
