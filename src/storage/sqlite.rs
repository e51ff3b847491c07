//! SQLite ladder storage
//!
//! Stores players, challenges and config rows in a single SQLite database.
//! One connection is shared behind a mutex; writes additionally take the
//! per-ladder lock and run in an IMMEDIATE transaction.

use super::{LadderLocks, LadderStore, LadderTx, GLOBAL_SCOPE};
use crate::challenge::{Challenge, ChallengeId, ChallengeState};
use crate::config::DEFAULT_CONFIG;
use crate::error::{LadderError, Result};
use crate::player::{Player, PlayerId};
use crate::tier::tier_of;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ladder TEXT NOT NULL,
    external_id TEXT NOT NULL,
    rank INTEGER NOT NULL,
    tier INTEGER NOT NULL,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    titles INTEGER NOT NULL DEFAULT 0,
    strikes INTEGER NOT NULL DEFAULT 0,
    cooldown_until INTEGER,
    protection_until INTEGER,
    joined_at INTEGER NOT NULL,
    UNIQUE (ladder, external_id),
    UNIQUE (ladder, rank)
);

CREATE TABLE IF NOT EXISTS challenges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ladder TEXT NOT NULL,
    challenger_id INTEGER NOT NULL,
    opponent_id INTEGER NOT NULL,
    issued_at INTEGER NOT NULL,
    deadline INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    outcome INTEGER,
    resolved_at INTEGER,
    rank_swapped INTEGER NOT NULL DEFAULT 0,
    title_awarded INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_challenges_state ON challenges(ladder, state);
CREATE INDEX IF NOT EXISTS idx_challenges_challenger ON challenges(challenger_id);
CREATE INDEX IF NOT EXISTS idx_challenges_opponent ON challenges(opponent_id);

CREATE TABLE IF NOT EXISTS config (
    scope TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (scope, name)
);
"#;

const PLAYER_COLUMNS: &str = "id, ladder, external_id, rank, tier, wins, losses, titles, strikes,
     cooldown_until, protection_until, joined_at";

const CHALLENGE_COLUMNS: &str = "id, ladder, challenger_id, opponent_id, issued_at, deadline,
     state, outcome, resolved_at, rank_swapped, title_awarded";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    locks: LadderLocks,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LadderError::StorageUnavailable(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!("Ladder storage initialized at {:?}", path);
        Ok(store)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        for (name, value) in DEFAULT_CONFIG {
            conn.execute(
                "INSERT OR IGNORE INTO config (scope, name, value) VALUES (?1, ?2, ?3)",
                params![GLOBAL_SCOPE, name, value],
            )?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            locks: LadderLocks::new(),
        })
    }
}

impl LadderStore for SqliteStore {
    fn write<T, F>(&self, ladder: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LadderTx) -> Result<T>,
    {
        self.locks.with_lock(ladder, || {
            let mut conn = self.conn.lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = f(&mut SqliteTx { conn: &*tx, ladder });
            match outcome {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        warn!("Rollback failed for ladder {}: {}", ladder, rollback_err);
                    }
                    Err(err)
                }
            }
        })
    }

    fn read<T, F>(&self, ladder: &str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn LadderTx) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        f(&SqliteTx { conn: &*tx, ladder })
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
    ladder: &'a str,
}

fn to_ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn column_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn column_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => column_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        ladder: row.get(1)?,
        external_id: row.get(2)?,
        rank: row.get(3)?,
        tier: row.get(4)?,
        wins: row.get(5)?,
        losses: row.get(6)?,
        titles: row.get(7)?,
        strikes: row.get(8)?,
        cooldown_until: column_opt_ts(row, 9)?,
        protection_until: column_opt_ts(row, 10)?,
        joined_at: column_ts(row, 11)?,
    })
}

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<Challenge> {
    let state: String = row.get(6)?;
    let state = state.parse::<ChallengeState>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown challenge state {:?}", state).into(),
        )
    })?;
    Ok(Challenge {
        id: row.get(0)?,
        ladder: row.get(1)?,
        challenger_id: row.get(2)?,
        opponent_id: row.get(3)?,
        issued_at: column_ts(row, 4)?,
        deadline: column_ts(row, 5)?,
        state,
        outcome: row.get(7)?,
        resolved_at: column_opt_ts(row, 8)?,
        rank_swapped: row.get(9)?,
        title_awarded: row.get(10)?,
    })
}

impl SqliteTx<'_> {
    fn query_player(&self, filter: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Player>> {
        let sql = format!(
            "SELECT {} FROM players WHERE ladder = ?1 AND {} = ?2",
            PLAYER_COLUMNS, filter
        );
        let player = self
            .conn
            .query_row(&sql, params![self.ladder, value], player_from_row)
            .optional()?;
        Ok(player)
    }

    fn query_challenges(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Challenge>> {
        let sql = format!(
            "SELECT {} FROM challenges WHERE ladder = ?1 AND {}",
            CHALLENGE_COLUMNS, filter
        );
        let mut all: Vec<&dyn rusqlite::ToSql> = vec![&self.ladder];
        all.extend_from_slice(args);
        let mut stmt = self.conn.prepare(&sql)?;
        let challenges = stmt
            .query_map(all.as_slice(), challenge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(challenges)
    }
}

impl LadderTx for SqliteTx<'_> {
    fn ladder(&self) -> &str {
        self.ladder
    }

    // ========================================================================
    // PLAYERS
    // ========================================================================

    fn find_player(&self, external_id: &str) -> Result<Option<Player>> {
        self.query_player("external_id", &external_id)
    }

    fn player(&self, id: PlayerId) -> Result<Option<Player>> {
        self.query_player("id", &id)
    }

    fn player_at_rank(&self, rank: u32) -> Result<Option<Player>> {
        self.query_player("rank", &rank)
    }

    fn players(&self) -> Result<Vec<Player>> {
        let sql = format!(
            "SELECT {} FROM players WHERE ladder = ?1 ORDER BY rank ASC",
            PLAYER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let players = stmt
            .query_map(params![self.ladder], player_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(players)
    }

    fn max_rank(&self) -> Result<u32> {
        let max: Option<u32> = self.conn.query_row(
            "SELECT MAX(rank) FROM players WHERE ladder = ?1",
            params![self.ladder],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    fn insert_player(
        &mut self,
        external_id: &str,
        rank: u32,
        joined_at: DateTime<Utc>,
    ) -> Result<Player> {
        let joined = to_ts(joined_at);
        self.conn.execute(
            "INSERT INTO players (ladder, external_id, rank, tier, cooldown_until, protection_until, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
            params![self.ladder, external_id, rank, tier_of(rank), joined],
        )?;
        let id = self.conn.last_insert_rowid();
        self.player(id)?
            .ok_or_else(|| LadderError::StorageUnavailable(format!("player {} vanished", id)))
    }

    fn save_player_stats(&mut self, player: &Player) -> Result<()> {
        self.conn.execute(
            "UPDATE players SET wins = ?1, losses = ?2, titles = ?3, strikes = ?4,
                 cooldown_until = ?5, protection_until = ?6
             WHERE id = ?7 AND ladder = ?8",
            params![
                player.wins,
                player.losses,
                player.titles,
                player.strikes,
                player.cooldown_until.map(to_ts),
                player.protection_until.map(to_ts),
                player.id,
                self.ladder
            ],
        )?;
        Ok(())
    }

    fn assign_ranks(&mut self, ranks: &[(PlayerId, u32)]) -> Result<()> {
        // Park the moved rows on negative ranks first so the (ladder, rank)
        // uniqueness holds after every single statement.
        for (id, rank) in ranks {
            self.conn.execute(
                "UPDATE players SET rank = ?1, tier = ?2 WHERE id = ?3 AND ladder = ?4",
                params![-i64::from(*rank), tier_of(*rank), id, self.ladder],
            )?;
        }
        self.conn.execute(
            "UPDATE players SET rank = -rank WHERE ladder = ?1 AND rank < 0",
            params![self.ladder],
        )?;
        Ok(())
    }

    fn delete_player(&mut self, id: PlayerId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM players WHERE id = ?1 AND ladder = ?2",
            params![id, self.ladder],
        )?;
        Ok(())
    }

    // ========================================================================
    // CHALLENGES
    // ========================================================================

    fn insert_challenge(
        &mut self,
        challenger_id: PlayerId,
        opponent_id: PlayerId,
        issued_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Challenge> {
        self.conn.execute(
            "INSERT INTO challenges (ladder, challenger_id, opponent_id, issued_at, deadline, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.ladder,
                challenger_id,
                opponent_id,
                to_ts(issued_at),
                to_ts(deadline),
                ChallengeState::Pending.as_str()
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.challenge(id)?
            .ok_or_else(|| LadderError::StorageUnavailable(format!("challenge {} vanished", id)))
    }

    fn challenge(&self, id: ChallengeId) -> Result<Option<Challenge>> {
        Ok(self.query_challenges("id = ?2", &[&id])?.pop())
    }

    fn save_challenge(&mut self, challenge: &Challenge) -> Result<()> {
        self.conn.execute(
            "UPDATE challenges SET deadline = ?1, state = ?2, outcome = ?3, resolved_at = ?4,
                 rank_swapped = ?5, title_awarded = ?6
             WHERE id = ?7 AND ladder = ?8",
            params![
                to_ts(challenge.deadline),
                challenge.state.as_str(),
                challenge.outcome,
                challenge.resolved_at.map(to_ts),
                challenge.rank_swapped,
                challenge.title_awarded,
                challenge.id,
                self.ladder
            ],
        )?;
        Ok(())
    }

    fn pending_challenge(&self, player_id: PlayerId) -> Result<Option<Challenge>> {
        let mut pending = self.query_challenges(
            "state = 'pending' AND (challenger_id = ?2 OR opponent_id = ?2) ORDER BY id ASC LIMIT 1",
            &[&player_id],
        )?;
        Ok(pending.pop())
    }

    fn last_played_challenge(&self, player_id: PlayerId) -> Result<Option<Challenge>> {
        let mut played = self.query_challenges(
            "state = 'played' AND (challenger_id = ?2 OR opponent_id = ?2)
             ORDER BY resolved_at DESC, id DESC LIMIT 1",
            &[&player_id],
        )?;
        Ok(played.pop())
    }

    fn overdue_challenges(&self, now: DateTime<Utc>) -> Result<Vec<Challenge>> {
        self.query_challenges(
            "state = 'pending' AND deadline < ?2 ORDER BY id ASC",
            &[&to_ts(now)],
        )
    }

    // ========================================================================
    // CONFIG
    // ========================================================================

    fn config_value(&self, scope: &str, name: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE scope = ?1 AND name = ?2",
                params![scope, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_config(&mut self, scope: &str, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (scope, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, name) DO UPDATE SET value = excluded.value,
                 updated_at = strftime('%s', 'now')",
            params![scope, name, value],
        )?;
        Ok(())
    }
}
