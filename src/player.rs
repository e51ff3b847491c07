//! Player registry
//!
//! Player lifecycle inside one ladder: signup at the bottom of the ladder,
//! removal with rank compaction, shuffling, cooldown/protection windows and
//! the strike counter. All functions run inside a ladder transaction.

use crate::challenge;
use crate::clock::days_after;
use crate::error::{LadderError, Result};
use crate::storage::LadderTx;
use crate::tier::compacted_rank;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

pub type PlayerId = i64;

/// A player's standing in one ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub ladder: String,
    /// Identity on the chat platform
    pub external_id: String,
    pub rank: u32,
    pub tier: u32,
    pub wins: u32,
    pub losses: u32,
    pub titles: u32,
    pub strikes: u32,
    /// Player can't issue challenges before this instant
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Player can't be challenged before this instant
    pub protection_until: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn has_outgoing_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn has_incoming_protection(&self, now: DateTime<Utc>) -> bool {
        self.protection_until.is_some_and(|until| until > now)
    }

    /// `days == 0` lifts the cooldown
    pub fn set_outgoing_cooldown(&mut self, days: u32, now: DateTime<Utc>) -> Result<()> {
        self.cooldown_until = Some(days_after(now, days)?);
        Ok(())
    }

    /// `days == 0` lifts the protection
    pub fn set_incoming_protection(&mut self, days: u32, now: DateTime<Utc>) -> Result<()> {
        self.protection_until = Some(days_after(now, days)?);
        Ok(())
    }

    /// Apply `delta` to the strike counter, clamped at zero. Returns the new count.
    pub fn update_strikes(&mut self, delta: i32) -> u32 {
        self.strikes = (i64::from(self.strikes) + i64::from(delta)).clamp(0, i64::from(u32::MAX)) as u32;
        self.strikes
    }
}

/// Look up a signed-up player or fail with `NotSignedUp`
pub fn require(tx: &dyn LadderTx, external_id: &str) -> Result<Player> {
    tx.find_player(external_id)?
        .ok_or_else(|| LadderError::NotSignedUp(external_id.to_string()))
}

/// Look up a player by rank when written as `#<rank>`, otherwise (or when
/// that rank is empty) by external id
pub fn resolve_target(tx: &dyn LadderTx, target: &str) -> Result<Player> {
    if let Some(Ok(rank)) = target.strip_prefix('#').map(str::parse::<u32>) {
        if let Some(player) = tx.player_at_rank(rank)? {
            return Ok(player);
        }
    }
    require(tx, target)
}

/// Add a player at the bottom of the ladder
pub fn signup(tx: &mut dyn LadderTx, external_id: &str, now: DateTime<Utc>) -> Result<Player> {
    if tx.find_player(external_id)?.is_some() {
        return Err(LadderError::AlreadySignedUp(external_id.to_string()));
    }
    let rank = tx.max_rank()? + 1;
    let player = tx.insert_player(external_id, rank, now)?;
    info!(
        "Player {} signed up to {} at rank {} (tier {})",
        external_id,
        tx.ladder(),
        player.rank,
        player.tier
    );
    Ok(player)
}

/// Remove a player: abandon their pending challenge, delete the row and
/// close the gap in the ranking.
pub fn remove(tx: &mut dyn LadderTx, external_id: &str, now: DateTime<Utc>) -> Result<Player> {
    let player = require(tx, external_id)?;
    challenge::abandon(tx, player.id, now)?;
    tx.delete_player(player.id)?;

    let moved: Vec<_> = tx
        .players()?
        .into_iter()
        .filter(|p| p.rank > player.rank)
        .map(|p| (p.id, compacted_rank(p.rank, player.rank)))
        .collect();
    tx.assign_ranks(&moved)?;

    info!(
        "Player {} removed from {} (was rank {}, {} players moved up)",
        external_id,
        tx.ladder(),
        player.rank,
        moved.len()
    );
    Ok(player)
}

/// Assign a uniformly random permutation of `1..=N` to the ladder.
/// Only allowed while the ladder is in signup-only mode.
pub fn shuffle(tx: &mut dyn LadderTx, signup_only: bool) -> Result<Vec<Player>> {
    if !signup_only {
        return Err(LadderError::ShuffleNotAllowed);
    }
    let players = tx.players()?;
    let mut ranks: Vec<u32> = (1..=players.len() as u32).collect();
    ranks.shuffle(&mut rand::thread_rng());

    let assignment: Vec<_> = players.iter().map(|p| p.id).zip(ranks).collect();
    tx.assign_ranks(&assignment)?;
    info!("Shuffled {} players in {}", assignment.len(), tx.ladder());
    tx.players()
}
