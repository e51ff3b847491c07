//! Data persistence layer.
//!
//! The engine only needs a transactional row store. [`LadderStore::write`]
//! is the unit of work: every multi-row mutation runs inside one call, which
//! is serialized against other writers of the same ladder and either commits
//! completely or not at all.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::challenge::{Challenge, ChallengeId};
use crate::error::Result;
use crate::player::{Player, PlayerId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Scope used for global (not ladder specific) config rows
pub const GLOBAL_SCOPE: &str = "";

/// Row-level operations available inside a ladder transaction.
///
/// All player and challenge methods are scoped to [`LadderTx::ladder`].
/// Config methods take an explicit scope since global rows are shared by
/// every ladder.
pub trait LadderTx {
    fn ladder(&self) -> &str;

    // ==================== Players ====================

    fn find_player(&self, external_id: &str) -> Result<Option<Player>>;
    fn player(&self, id: PlayerId) -> Result<Option<Player>>;
    fn player_at_rank(&self, rank: u32) -> Result<Option<Player>>;
    /// All players ordered by rank
    fn players(&self) -> Result<Vec<Player>>;
    /// Highest rank in use, 0 for an empty ladder
    fn max_rank(&self) -> Result<u32>;
    fn insert_player(
        &mut self,
        external_id: &str,
        rank: u32,
        joined_at: DateTime<Utc>,
    ) -> Result<Player>;
    /// Persist everything except rank and tier
    fn save_player_stats(&mut self, player: &Player) -> Result<()>;
    /// Move players to new ranks and recompute their tiers. The assignment
    /// may permute ranks among the listed players.
    fn assign_ranks(&mut self, ranks: &[(PlayerId, u32)]) -> Result<()>;
    fn delete_player(&mut self, id: PlayerId) -> Result<()>;

    // ==================== Challenges ====================

    fn insert_challenge(
        &mut self,
        challenger_id: PlayerId,
        opponent_id: PlayerId,
        issued_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Challenge>;
    fn challenge(&self, id: ChallengeId) -> Result<Option<Challenge>>;
    fn save_challenge(&mut self, challenge: &Challenge) -> Result<()>;
    /// Pending challenge where the player is either party
    fn pending_challenge(&self, player_id: PlayerId) -> Result<Option<Challenge>>;
    /// Most recently resolved `played` challenge where the player is either party
    fn last_played_challenge(&self, player_id: PlayerId) -> Result<Option<Challenge>>;
    /// Pending challenges whose deadline is strictly before `now`
    fn overdue_challenges(&self, now: DateTime<Utc>) -> Result<Vec<Challenge>>;

    // ==================== Config ====================

    fn config_value(&self, scope: &str, name: &str) -> Result<Option<String>>;
    fn put_config(&mut self, scope: &str, name: &str, value: &str) -> Result<()>;
}

/// Transactional store holding every ladder's state
pub trait LadderStore: Send + Sync {
    /// Run `f` as one atomic, ladder-serialized unit of work. Commits when
    /// `f` returns `Ok`, rolls back otherwise.
    fn write<T, F>(&self, ladder: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn LadderTx) -> Result<T>;

    /// Run `f` against a consistent snapshot without taking the ladder lock
    fn read<T, F>(&self, ladder: &str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn LadderTx) -> Result<T>;
}

/// One exclusive section per ladder; different ladders never contend
#[derive(Default)]
pub struct LadderLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LadderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the exclusive section of `ladder`
    pub fn with_lock<T>(&self, ladder: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.entry(ladder.to_string()).or_default().clone();
        let _guard = lock.lock();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_ladder_lock_serializes_same_ladder() {
        let locks = Arc::new(LadderLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    locks.with_lock("season-1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ladder_lock_independent_ladders() {
        let locks = LadderLocks::new();
        let nested = locks.with_lock("a", || locks.with_lock("b", || 42));
        assert_eq!(nested, 42);
    }
}
