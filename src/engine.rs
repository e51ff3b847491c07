//! Ladder engine
//!
//! Caller-facing operations. Each mutating operation runs as one
//! ladder-serialized unit of work and checks, in order:
//! 1. caller permission (admin flag or ladder membership)
//! 2. ladder mode (`signup_only`)
//! 3. domain rules
//!
//! then mutates, commits and publishes a [`StandingsChanged`] event when the
//! ranking changed. Rendering the ranking is left to subscribers.

use crate::challenge::{self, CancelOutcome, Challenge, ReportOutcome, StrikeUpdate};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, LadderSettings, CURRENT_LADDER};
use crate::eligibility;
use crate::error::{LadderError, Result};
use crate::player::{self, Player};
use crate::storage::{LadderStore, LadderTx, GLOBAL_SCOPE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the standings notification channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Identity of whoever invokes an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn player(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    /// Internal caller used by schedulers
    pub fn system() -> Self {
        Self::admin("system")
    }

    fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(LadderError::PermissionDenied(format!(
                "{} requires admin rights",
                action
            )))
        }
    }

    /// Player an action applies to: the caller itself, or `target` when an
    /// admin acts on someone else's behalf.
    fn acting_for<'a>(&'a self, target: Option<&'a str>, action: &str) -> Result<&'a str> {
        match target {
            Some(target) if target != self.user_id => {
                self.require_admin(action)?;
                Ok(target)
            }
            _ => Ok(&self.user_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingsReason {
    Signup,
    Leave,
    Kick,
    StrikeLimit,
    Shuffle,
    Report,
    Dispute,
}

/// Emitted after every committed change of a ladder's ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsChanged {
    pub ladder: String,
    pub reason: StandingsReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReport {
    pub outcome: CancelOutcome,
    /// Players removed for exceeding `num_cancels`
    pub kicked: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub outcomes: Vec<CancelOutcome>,
    pub kicked: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikesReport {
    pub external_id: String,
    pub strikes: u32,
    pub max_strikes: u32,
    pub kicked: bool,
}

/// What a player sees about themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub player: Player,
    pub active_challenge: Option<Challenge>,
    pub opponent: Option<Player>,
    /// Set while the cooldown is still running
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Set while the protection is still running
    pub protection_until: Option<DateTime<Utc>>,
}

pub struct LadderEngine<S: LadderStore> {
    store: S,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<StandingsChanged>,
}

impl<S: LadderStore> LadderEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            events,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Receive a [`StandingsChanged`] event for every ranking change
    pub fn subscribe(&self) -> broadcast::Receiver<StandingsChanged> {
        self.events.subscribe()
    }

    fn notify(&self, ladder: &str, reason: StandingsReason) {
        let event = StandingsChanged {
            ladder: ladder.to_string(),
            reason,
        };
        if self.events.send(event).is_err() {
            debug!("No standings subscribers for {}", ladder);
        }
    }

    /// Kick every listed player whose strikes exceed the configured maximum
    fn kick_over_limit<'a>(
        tx: &mut dyn LadderTx,
        updates: impl IntoIterator<Item = &'a StrikeUpdate>,
        settings: &LadderSettings,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut kicked = Vec::new();
        for update in updates {
            if update.strikes <= settings.num_cancels || kicked.contains(&update.external_id) {
                continue;
            }
            if tx.find_player(&update.external_id)?.is_none() {
                continue;
            }
            player::remove(tx, &update.external_id, now)?;
            warn!(
                "Kicked {} from {}: {} strikes exceed the maximum of {}",
                update.external_id,
                tx.ladder(),
                update.strikes,
                settings.num_cancels
            );
            kicked.push(update.external_id.clone());
        }
        Ok(kicked)
    }

    // ========================================================================
    // MEMBERSHIP
    // ========================================================================

    pub fn signup(&self, caller: &Caller, ladder: &str) -> Result<Player> {
        let now = self.now();
        let player = self
            .store
            .write(ladder, |tx| player::signup(tx, &caller.user_id, now))?;
        self.notify(ladder, StandingsReason::Signup);
        Ok(player)
    }

    pub fn leave(&self, caller: &Caller, ladder: &str) -> Result<Player> {
        let now = self.now();
        let player = self
            .store
            .write(ladder, |tx| player::remove(tx, &caller.user_id, now))?;
        self.notify(ladder, StandingsReason::Leave);
        Ok(player)
    }

    /// Remove a player that left the chat platform
    pub fn remove_departed(&self, ladder: &str, external_id: &str) -> Result<Player> {
        let now = self.now();
        let player = self
            .store
            .write(ladder, |tx| player::remove(tx, external_id, now))?;
        self.notify(ladder, StandingsReason::Leave);
        Ok(player)
    }

    /// Remove a player named by external id or `#<rank>`
    pub fn kick(&self, caller: &Caller, ladder: &str, target: &str) -> Result<Player> {
        caller.require_admin("kick")?;
        let now = self.now();
        let player = self.store.write(ladder, |tx| {
            let player = player::resolve_target(tx, target)?;
            player::remove(tx, &player.external_id, now)
        })?;
        info!("{} kicked {} from {}", caller.user_id, target, ladder);
        self.notify(ladder, StandingsReason::Kick);
        Ok(player)
    }

    pub fn shuffle(&self, caller: &Caller, ladder: &str) -> Result<Vec<Player>> {
        caller.require_admin("shuffle")?;
        let players = self.store.write(ladder, |tx| {
            let settings = LadderSettings::load(tx)?;
            player::shuffle(tx, settings.signup_only)
        })?;
        self.notify(ladder, StandingsReason::Shuffle);
        Ok(players)
    }

    // ========================================================================
    // CHALLENGES
    // ========================================================================

    pub fn challenge(&self, caller: &Caller, ladder: &str, opponent: &str) -> Result<Challenge> {
        let now = self.now();
        self.store.write(ladder, |tx| {
            let challenger = player::require(tx, &caller.user_id)?;
            let settings = LadderSettings::load(tx)?;
            if settings.signup_only {
                return Err(LadderError::SignupOnly);
            }
            challenge::issue(tx, &challenger, opponent, &settings, now)
        })
    }

    /// Cancel the caller's challenge, or `target`'s when the caller is an admin
    pub fn cancel(
        &self,
        caller: &Caller,
        ladder: &str,
        target: Option<&str>,
    ) -> Result<CancelReport> {
        let acting = caller.acting_for(target, "cancelling another player's challenge")?;
        let now = self.now();
        let report = self.store.write(ladder, |tx| {
            let canceller = player::require(tx, acting)?;
            let settings = LadderSettings::load(tx)?;
            if settings.signup_only {
                return Err(LadderError::SignupOnly);
            }
            let outcome = challenge::cancel(tx, &canceller, now)?;
            let kicked = Self::kick_over_limit(tx, outcome.strike_updates(), &settings, now)?;
            Ok(CancelReport { outcome, kicked })
        })?;
        if !report.kicked.is_empty() {
            self.notify(ladder, StandingsReason::StrikeLimit);
        }
        Ok(report)
    }

    /// Report the caller's game, or `target`'s when the caller is an admin.
    /// `won` is from the acting player's point of view.
    pub fn report(
        &self,
        caller: &Caller,
        ladder: &str,
        won: bool,
        target: Option<&str>,
    ) -> Result<ReportOutcome> {
        let acting = caller.acting_for(target, "reporting another player's game")?;
        let now = self.now();
        let outcome = self.store.write(ladder, |tx| {
            let reporter = player::require(tx, acting)?;
            let settings = LadderSettings::load(tx)?;
            if settings.signup_only {
                return Err(LadderError::SignupOnly);
            }
            challenge::report(tx, &reporter, won, &settings, now)
        })?;
        self.notify(ladder, StandingsReason::Report);
        Ok(outcome)
    }

    pub fn dispute(&self, caller: &Caller, ladder: &str, target: &str) -> Result<Challenge> {
        caller.require_admin("dispute")?;
        let now = self.now();
        let challenge = self.store.write(ladder, |tx| {
            let target = player::require(tx, target)?;
            let settings = LadderSettings::load(tx)?;
            challenge::dispute(tx, &target, &settings, now)
        })?;
        self.notify(ladder, StandingsReason::Dispute);
        Ok(challenge)
    }

    /// Time out overdue challenges and kick players over the strike limit.
    /// Safe to call repeatedly.
    pub fn sweep(&self, caller: &Caller, ladder: &str, now: DateTime<Utc>) -> Result<SweepReport> {
        caller.require_admin("sweep")?;
        let report = self.store.write(ladder, |tx| {
            let outcomes = challenge::sweep(tx, now)?;
            if outcomes.is_empty() {
                return Ok(SweepReport::default());
            }
            let settings = LadderSettings::load(tx)?;
            let kicked = Self::kick_over_limit(
                tx,
                outcomes.iter().flat_map(|o| o.strike_updates()),
                &settings,
                now,
            )?;
            Ok(SweepReport { outcomes, kicked })
        })?;
        if !report.kicked.is_empty() {
            self.notify(ladder, StandingsReason::StrikeLimit);
        }
        Ok(report)
    }

    // ========================================================================
    // ADMINISTRATION
    // ========================================================================

    /// Adjust a player's strikes by `delta` (0 only reads them)
    pub fn strikes(
        &self,
        caller: &Caller,
        ladder: &str,
        target: &str,
        delta: i32,
    ) -> Result<StrikesReport> {
        caller.require_admin("strikes")?;
        let now = self.now();
        let report = self.store.write(ladder, |tx| {
            let mut player = player::require(tx, target)?;
            let settings = LadderSettings::load(tx)?;
            let strikes = player.update_strikes(delta);
            if delta != 0 {
                tx.save_player_stats(&player)?;
            }
            let update = StrikeUpdate {
                player_id: player.id,
                external_id: player.external_id.clone(),
                strikes,
            };
            let kicked = Self::kick_over_limit(tx, [&update], &settings, now)?;
            Ok(StrikesReport {
                external_id: player.external_id,
                strikes,
                max_strikes: settings.num_cancels,
                kicked: !kicked.is_empty(),
            })
        })?;
        if report.kicked {
            self.notify(ladder, StandingsReason::StrikeLimit);
        }
        Ok(report)
    }

    /// Block a player from challenging and being challenged for `days`.
    /// Zero lifts both restrictions.
    pub fn timeout(&self, caller: &Caller, ladder: &str, target: &str, days: u32) -> Result<Player> {
        caller.require_admin("timeout")?;
        let now = self.now();
        self.store.write(ladder, |tx| {
            let mut player = player::require(tx, target)?;
            player.set_outgoing_cooldown(days, now)?;
            player.set_incoming_protection(days, now)?;
            tx.save_player_stats(&player)?;
            info!("{} timed out {} in {} for {} days", caller.user_id, target, ladder, days);
            Ok(player)
        })
    }

    pub fn config_get(&self, caller: &Caller, ladder: Option<&str>, name: &str) -> Result<String> {
        caller.require_admin("config")?;
        self.store.read(ladder.unwrap_or(GLOBAL_SCOPE), |tx| {
            config::get(tx, name, ladder)
        })
    }

    pub fn config_set(
        &self,
        caller: &Caller,
        ladder: Option<&str>,
        name: &str,
        value: &str,
    ) -> Result<()> {
        caller.require_admin("config")?;
        self.store.write(ladder.unwrap_or(GLOBAL_SCOPE), |tx| {
            config::set(tx, name, value, ladder)
        })?;
        info!("{} set {} = {:?} (ladder {:?})", caller.user_id, name, value, ladder);
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Ladder named by the global `current_ladder` setting
    pub fn current_ladder(&self) -> Result<String> {
        self.store
            .read(GLOBAL_SCOPE, |tx| config::get(tx, CURRENT_LADDER, None))
    }

    pub fn ranking(&self, ladder: &str) -> Result<Vec<Player>> {
        self.store.read(ladder, |tx| tx.players())
    }

    pub fn player_by_rank(&self, ladder: &str, rank: u32) -> Result<Option<Player>> {
        self.store.read(ladder, |tx| tx.player_at_rank(rank))
    }

    /// Rank/tier reach check between two signed-up players
    pub fn can_challenge(&self, ladder: &str, challenger: &str, opponent: &str) -> Result<bool> {
        self.store.read(ladder, |tx| {
            let challenger = player::require(tx, challenger)?;
            let opponent = player::require(tx, opponent)?;
            let settings = LadderSettings::load(tx)?;
            Ok(eligibility::can_challenge(
                &challenger,
                &opponent,
                settings.rank_range,
            ))
        })
    }

    pub fn status(&self, caller: &Caller, ladder: &str) -> Result<PlayerStatus> {
        let now = self.now();
        self.store.read(ladder, |tx| {
            let player = player::require(tx, &caller.user_id)?;
            let active_challenge = tx.pending_challenge(player.id)?;
            let opponent = match &active_challenge {
                Some(c) => tx.player(c.other_party(player.id))?,
                None => None,
            };
            Ok(PlayerStatus {
                cooldown_until: player.cooldown_until.filter(|_| player.has_outgoing_cooldown(now)),
                protection_until: player
                    .protection_until
                    .filter(|_| player.has_incoming_protection(now)),
                player,
                active_challenge,
                opponent,
            })
        })
    }

    /// Every player the caller could challenge right now
    pub fn possible_challenges(&self, caller: &Caller, ladder: &str) -> Result<Vec<Player>> {
        let now = self.now();
        self.store.read(ladder, |tx| {
            let challenger = player::require(tx, &caller.user_id)?;
            let settings = LadderSettings::load(tx)?;
            let mut candidates = Vec::new();
            for opponent in tx.players()? {
                match challenge::ensure_can_issue(tx, &challenger, &opponent, &settings, now) {
                    Ok(()) => candidates.push(opponent),
                    Err(LadderError::IneligibleChallenge(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(candidates)
        })
    }
}
