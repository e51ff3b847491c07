//! Challenge ledger
//!
//! State machine of a challenge:
//!
//! ```text
//!             report            cancel (challenger)   cancel (opponent)   sweep
//! pending ───────────► played   pending ─► cancelled  pending ─► denied   pending ─► timeout
//!    ▲                   │
//!    └──── dispute ──────┘  (latest played challenge of a player only)
//! ```
//!
//! Result application swaps ranks when the winner was ranked below the loser
//! and records what it did on the challenge row, so a dispute can undo
//! exactly that.

use crate::clock::days_after;
use crate::config::LadderSettings;
use crate::eligibility::can_challenge;
use crate::error::{IneligibleReason, LadderError, Result};
use crate::player::{Player, PlayerId};
use crate::storage::LadderTx;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

pub type ChallengeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Pending,
    Played,
    /// Cancelled by the challenged player
    Denied,
    /// Cancelled by the challenger, an admin or a kick
    Cancelled,
    /// Deadline passed without a report
    Timeout,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeState::Pending => "pending",
            ChallengeState::Played => "played",
            ChallengeState::Denied => "denied",
            ChallengeState::Cancelled => "cancelled",
            ChallengeState::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChallengeState::Pending)
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChallengeState::Pending),
            "played" => Ok(ChallengeState::Played),
            "denied" => Ok(ChallengeState::Denied),
            "cancelled" => Ok(ChallengeState::Cancelled),
            "timeout" => Ok(ChallengeState::Timeout),
            other => Err(format!("unknown challenge state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub ladder: String,
    pub challenger_id: PlayerId,
    pub opponent_id: PlayerId,
    pub issued_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: ChallengeState,
    /// `true` when the challenger won; only set while `played`
    pub outcome: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Result application swapped the two players' ranks
    pub rank_swapped: bool,
    /// Result application gave the winner a title
    pub title_awarded: bool,
}

impl Challenge {
    pub fn involves(&self, player_id: PlayerId) -> bool {
        self.challenger_id == player_id || self.opponent_id == player_id
    }

    /// The participant that isn't `player_id`
    pub fn other_party(&self, player_id: PlayerId) -> PlayerId {
        if self.challenger_id == player_id {
            self.opponent_id
        } else {
            self.challenger_id
        }
    }

    fn resolve(&mut self, state: ChallengeState, now: DateTime<Utc>) {
        self.state = state;
        self.resolved_at = Some(now);
    }
}

/// New strike count of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeUpdate {
    pub player_id: PlayerId,
    pub external_id: String,
    pub strikes: u32,
}

/// Result of a cancellation or timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub challenge: Challenge,
    pub challenger: StrikeUpdate,
    pub opponent: StrikeUpdate,
}

impl CancelOutcome {
    pub fn strike_updates(&self) -> [&StrikeUpdate; 2] {
        [&self.challenger, &self.opponent]
    }
}

/// Result of a reported game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub challenge: Challenge,
    pub challenger: Player,
    pub opponent: Player,
}

impl ReportOutcome {
    pub fn challenger_won(&self) -> bool {
        self.challenge.outcome.unwrap_or(false)
    }

    pub fn winner(&self) -> &Player {
        if self.challenger_won() {
            &self.challenger
        } else {
            &self.opponent
        }
    }
}

/// What result application changed, as recorded on the challenge row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultEffects {
    pub rank_swapped: bool,
    pub title_awarded: bool,
}

/// Apply a game result to both players in memory
pub fn apply_result(
    challenger: &mut Player,
    opponent: &mut Player,
    challenger_won: bool,
) -> ResultEffects {
    let (winner, loser) = if challenger_won {
        (challenger, opponent)
    } else {
        (opponent, challenger)
    };

    winner.wins += 1;
    loser.losses += 1;

    let rank_swapped = winner.rank > loser.rank;
    if rank_swapped {
        std::mem::swap(&mut winner.rank, &mut loser.rank);
        std::mem::swap(&mut winner.tier, &mut loser.tier);
    }

    let title_awarded = winner.rank == 1;
    if title_awarded {
        winner.titles += 1;
    }

    ResultEffects {
        rank_swapped,
        title_awarded,
    }
}

/// Exact inverse of [`apply_result`] given the recorded effects
pub fn reverse_result(
    challenger: &mut Player,
    opponent: &mut Player,
    challenger_won: bool,
    effects: ResultEffects,
) {
    let (winner, loser) = if challenger_won {
        (challenger, opponent)
    } else {
        (opponent, challenger)
    };

    winner.wins = winner.wins.saturating_sub(1);
    loser.losses = loser.losses.saturating_sub(1);
    if effects.title_awarded {
        winner.titles = winner.titles.saturating_sub(1);
    }
    if effects.rank_swapped {
        std::mem::swap(&mut winner.rank, &mut loser.rank);
        std::mem::swap(&mut winner.tier, &mut loser.tier);
    }
}

fn load(tx: &dyn LadderTx, id: PlayerId) -> Result<Player> {
    tx.player(id)?
        .ok_or_else(|| LadderError::NotSignedUp(format!("#{}", id)))
}

fn add_strike(tx: &mut dyn LadderTx, id: PlayerId) -> Result<StrikeUpdate> {
    let mut player = load(tx, id)?;
    let strikes = player.update_strikes(1);
    tx.save_player_stats(&player)?;
    Ok(StrikeUpdate {
        player_id: player.id,
        external_id: player.external_id,
        strikes,
    })
}

fn strike_both(tx: &mut dyn LadderTx, challenge: Challenge) -> Result<CancelOutcome> {
    let challenger = add_strike(tx, challenge.challenger_id)?;
    let opponent = add_strike(tx, challenge.opponent_id)?;
    Ok(CancelOutcome {
        challenge,
        challenger,
        opponent,
    })
}

/// Check every precondition of issuing a challenge between two signed-up
/// players, in the order the first failing rule is reported.
pub fn ensure_can_issue(
    tx: &dyn LadderTx,
    challenger: &Player,
    opponent: &Player,
    settings: &LadderSettings,
    now: DateTime<Utc>,
) -> Result<()> {
    let ineligible = |reason| Err(LadderError::IneligibleChallenge(reason));

    if challenger.id == opponent.id {
        return ineligible(IneligibleReason::SelfChallenge);
    }
    if challenger.has_outgoing_cooldown(now) {
        return ineligible(IneligibleReason::OutgoingCooldown);
    }
    if !can_challenge(challenger, opponent, settings.rank_range) {
        return ineligible(IneligibleReason::OutOfRange);
    }
    if tx.pending_challenge(challenger.id)?.is_some() {
        return ineligible(IneligibleReason::ChallengerHasPending);
    }
    if opponent.has_incoming_protection(now) {
        return ineligible(IneligibleReason::IncomingProtection);
    }
    if tx.pending_challenge(opponent.id)?.is_some() {
        return ineligible(IneligibleReason::OpponentHasPending);
    }
    if let Some(last) = tx.last_played_challenge(challenger.id)? {
        if last.other_party(challenger.id) == opponent.id {
            return ineligible(IneligibleReason::Rematch);
        }
    }
    Ok(())
}

/// Issue a challenge from `challenger` to the player `opponent_external_id`
pub fn issue(
    tx: &mut dyn LadderTx,
    challenger: &Player,
    opponent_external_id: &str,
    settings: &LadderSettings,
    now: DateTime<Utc>,
) -> Result<Challenge> {
    if challenger.external_id == opponent_external_id {
        return Err(LadderError::IneligibleChallenge(IneligibleReason::SelfChallenge));
    }
    let opponent = tx.find_player(opponent_external_id)?.ok_or(
        LadderError::IneligibleChallenge(IneligibleReason::OpponentNotSignedUp),
    )?;
    ensure_can_issue(tx, challenger, &opponent, settings, now)?;

    let deadline = days_after(now, settings.challenge_timeout_days)?;
    let challenge = tx.insert_challenge(challenger.id, opponent.id, now, deadline)?;
    info!(
        "Challenge #{} issued in {}: {} (rank {}) vs {} (rank {}), deadline {}",
        challenge.id,
        tx.ladder(),
        challenger.external_id,
        challenger.rank,
        opponent.external_id,
        opponent.rank,
        deadline
    );
    Ok(challenge)
}

/// Cancel the pending challenge of `canceller`. The challenge becomes
/// `cancelled` when the canceller issued it and `denied` otherwise; both
/// participants receive a strike.
pub fn cancel(
    tx: &mut dyn LadderTx,
    canceller: &Player,
    now: DateTime<Utc>,
) -> Result<CancelOutcome> {
    let mut challenge = tx
        .pending_challenge(canceller.id)?
        .ok_or_else(|| LadderError::NoActiveChallenge(canceller.external_id.clone()))?;

    let state = if challenge.challenger_id == canceller.id {
        ChallengeState::Cancelled
    } else {
        ChallengeState::Denied
    };
    challenge.resolve(state, now);
    tx.save_challenge(&challenge)?;
    info!(
        "Challenge #{} {} by {}",
        challenge.id, state, canceller.external_id
    );
    strike_both(tx, challenge)
}

/// Cancel a player's pending challenge without strikes (used on removal)
pub fn abandon(
    tx: &mut dyn LadderTx,
    player_id: PlayerId,
    now: DateTime<Utc>,
) -> Result<Option<Challenge>> {
    let Some(mut challenge) = tx.pending_challenge(player_id)? else {
        return Ok(None);
    };
    challenge.resolve(ChallengeState::Cancelled, now);
    tx.save_challenge(&challenge)?;
    debug!("Challenge #{} abandoned", challenge.id);
    Ok(Some(challenge))
}

/// Report the result of `reporter`'s pending challenge. `won` is from the
/// reporter's point of view.
pub fn report(
    tx: &mut dyn LadderTx,
    reporter: &Player,
    won: bool,
    settings: &LadderSettings,
    now: DateTime<Utc>,
) -> Result<ReportOutcome> {
    let mut challenge = tx
        .pending_challenge(reporter.id)?
        .ok_or_else(|| LadderError::NoActiveChallenge(reporter.external_id.clone()))?;

    let challenger_won = if challenge.challenger_id == reporter.id {
        won
    } else {
        !won
    };

    let mut challenger = load(tx, challenge.challenger_id)?;
    let mut opponent = load(tx, challenge.opponent_id)?;
    let effects = apply_result(&mut challenger, &mut opponent, challenger_won);

    challenger.set_outgoing_cooldown(settings.outgoing_cooldown_days, now)?;
    challenger.set_incoming_protection(0, now)?;
    opponent.set_incoming_protection(settings.challenge_protection_days, now)?;
    opponent.set_outgoing_cooldown(0, now)?;

    tx.save_player_stats(&challenger)?;
    tx.save_player_stats(&opponent)?;
    if effects.rank_swapped {
        tx.assign_ranks(&[
            (challenger.id, challenger.rank),
            (opponent.id, opponent.rank),
        ])?;
    }

    challenge.resolve(ChallengeState::Played, now);
    challenge.outcome = Some(challenger_won);
    challenge.rank_swapped = effects.rank_swapped;
    challenge.title_awarded = effects.title_awarded;
    tx.save_challenge(&challenge)?;

    info!(
        "Challenge #{} played in {}: {} {} {} (swap: {}, title: {})",
        challenge.id,
        tx.ladder(),
        challenger.external_id,
        if challenger_won { "W-L" } else { "L-W" },
        opponent.external_id,
        effects.rank_swapped,
        effects.title_awarded
    );

    Ok(ReportOutcome {
        challenge,
        challenger,
        opponent,
    })
}

/// Reverse the most recent played challenge of `target` and reopen it.
///
/// Only a result that is still the latest game of both participants can be
/// reversed. Once either of them has played again, later swaps sit on top of
/// it and the dispute fails with `DisputeSuperseded`.
pub fn dispute(
    tx: &mut dyn LadderTx,
    target: &Player,
    settings: &LadderSettings,
    now: DateTime<Utc>,
) -> Result<Challenge> {
    let mut challenge = tx
        .last_played_challenge(target.id)?
        .ok_or_else(|| LadderError::NoPlayedChallenge(target.external_id.clone()))?;

    if tx.pending_challenge(target.id)?.is_some() {
        return Err(LadderError::ActiveChallengeExists(target.external_id.clone()));
    }
    let mut other = load(tx, challenge.other_party(target.id))?;
    if tx.pending_challenge(other.id)?.is_some() {
        return Err(LadderError::ActiveChallengeExists(other.external_id));
    }
    let other_latest = tx.last_played_challenge(other.id)?.map(|c| c.id);
    if other_latest != Some(challenge.id) {
        return Err(LadderError::DisputeSuperseded(other.external_id));
    }
    let deadline = days_after(now, settings.challenge_timeout_days)?;

    let mut target = target.clone();
    let challenger_won = challenge.outcome.unwrap_or(false);
    let effects = ResultEffects {
        rank_swapped: challenge.rank_swapped,
        title_awarded: challenge.title_awarded,
    };
    {
        let (challenger, opponent) = if challenge.challenger_id == target.id {
            (&mut target, &mut other)
        } else {
            (&mut other, &mut target)
        };
        reverse_result(challenger, opponent, challenger_won, effects);
    }

    tx.save_player_stats(&target)?;
    tx.save_player_stats(&other)?;
    if effects.rank_swapped {
        tx.assign_ranks(&[(target.id, target.rank), (other.id, other.rank)])?;
    }

    challenge.state = ChallengeState::Pending;
    challenge.outcome = None;
    challenge.resolved_at = None;
    challenge.rank_swapped = false;
    challenge.title_awarded = false;
    challenge.deadline = deadline;
    tx.save_challenge(&challenge)?;

    info!(
        "Challenge #{} disputed in {}, reopened until {}",
        challenge.id,
        tx.ladder(),
        challenge.deadline
    );
    Ok(challenge)
}

/// Time out every pending challenge whose deadline is before `now`
pub fn sweep(tx: &mut dyn LadderTx, now: DateTime<Utc>) -> Result<Vec<CancelOutcome>> {
    let overdue = tx.overdue_challenges(now)?;
    if overdue.is_empty() {
        debug!("No overdue challenges in {}", tx.ladder());
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(overdue.len());
    for mut challenge in overdue {
        challenge.resolve(ChallengeState::Timeout, now);
        tx.save_challenge(&challenge)?;
        outcomes.push(strike_both(tx, challenge)?);
    }
    info!(
        "Timed out {} overdue challenges in {}",
        outcomes.len(),
        tx.ladder()
    );
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player;
    use crate::storage::{LadderStore, SqliteStore};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn setup(names: &[&str]) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .write("s1", |tx| {
                for name in names {
                    player::signup(tx, name, t0())?;
                }
                Ok(())
            })
            .unwrap();
        store
    }

    fn get(store: &SqliteStore, name: &str) -> Player {
        store.read("s1", |tx| player::require(tx, name)).unwrap()
    }

    fn issue_as(store: &SqliteStore, from: &str, to: &str) -> Result<Challenge> {
        let settings = LadderSettings::default();
        store.write("s1", |tx| {
            let challenger = player::require(tx, from)?;
            issue(tx, &challenger, to, &settings, t0())
        })
    }

    fn report_as(store: &SqliteStore, who: &str, won: bool) -> ReportOutcome {
        let settings = LadderSettings::default();
        store
            .write("s1", |tx| {
                let reporter = player::require(tx, who)?;
                report(tx, &reporter, won, &settings, t0())
            })
            .unwrap()
    }

    fn ineligible(result: Result<Challenge>) -> IneligibleReason {
        match result {
            Err(LadderError::IneligibleChallenge(reason)) => reason,
            other => panic!("expected ineligible challenge, got {:?}", other),
        }
    }

    #[test]
    fn test_state_strings() {
        for state in [
            ChallengeState::Pending,
            ChallengeState::Played,
            ChallengeState::Denied,
            ChallengeState::Cancelled,
            ChallengeState::Timeout,
        ] {
            assert_eq!(state.as_str().parse::<ChallengeState>().unwrap(), state);
        }
        assert!("finished".parse::<ChallengeState>().is_err());
        assert!(!ChallengeState::Pending.is_terminal());
        assert!(ChallengeState::Timeout.is_terminal());
    }

    #[test]
    fn test_issue_rejections_in_order() {
        let store = setup(&["a", "b", "c", "d", "e", "f", "g"]);

        assert_eq!(
            ineligible(issue_as(&store, "b", "b")),
            IneligibleReason::SelfChallenge
        );
        assert_eq!(
            ineligible(issue_as(&store, "b", "nobody")),
            IneligibleReason::OpponentNotSignedUp
        );
        // g is rank 7 / tier 4, a is tier 1
        assert_eq!(
            ineligible(issue_as(&store, "g", "a")),
            IneligibleReason::OutOfRange
        );

        issue_as(&store, "c", "a").unwrap();
        assert_eq!(
            ineligible(issue_as(&store, "c", "b")),
            IneligibleReason::ChallengerHasPending
        );
        assert_eq!(
            ineligible(issue_as(&store, "b", "a")),
            IneligibleReason::OpponentHasPending
        );
        assert_eq!(
            ineligible(issue_as(&store, "a", "e")),
            IneligibleReason::OutOfRange
        );
    }

    #[test]
    fn test_cooldown_and_protection_block_issue() {
        let store = setup(&["a", "b", "c", "d"]);
        store
            .write("s1", |tx| {
                let mut b = player::require(tx, "b")?;
                b.set_outgoing_cooldown(2, t0())?;
                tx.save_player_stats(&b)?;
                let mut a = player::require(tx, "a")?;
                a.set_incoming_protection(2, t0())?;
                tx.save_player_stats(&a)
            })
            .unwrap();

        assert_eq!(
            ineligible(issue_as(&store, "b", "c")),
            IneligibleReason::OutgoingCooldown
        );
        assert_eq!(
            ineligible(issue_as(&store, "c", "a")),
            IneligibleReason::IncomingProtection
        );
    }

    #[test]
    fn test_report_swap_and_title() {
        let store = setup(&["x", "y"]);
        issue_as(&store, "y", "x").unwrap();
        let outcome = report_as(&store, "y", true);

        assert!(outcome.challenge.rank_swapped);
        assert!(outcome.challenge.title_awarded);
        assert_eq!(outcome.challenge.state, ChallengeState::Played);
        assert_eq!(outcome.winner().external_id, "y");

        let x = get(&store, "x");
        let y = get(&store, "y");
        assert_eq!((y.rank, y.tier, y.wins, y.titles), (1, 1, 1, 1));
        assert_eq!((x.rank, x.tier, x.losses, x.titles), (2, 2, 1, 0));

        // Challenger gets cooldown, opponent gets protection
        let settings = LadderSettings::default();
        assert!(y.has_outgoing_cooldown(t0()));
        assert!(!y.has_incoming_protection(t0()));
        assert!(x.has_incoming_protection(t0()));
        assert!(!x.has_outgoing_cooldown(t0()));
        assert_eq!(
            x.protection_until,
            Some(t0() + Duration::days(i64::from(settings.challenge_protection_days)))
        );
    }

    #[test]
    fn test_report_by_opponent_is_normalized() {
        let store = setup(&["x", "y", "z"]);
        issue_as(&store, "z", "y").unwrap();
        // y (opponent) reports a win, so the challenger lost
        let outcome = report_as(&store, "y", true);

        assert_eq!(outcome.challenge.outcome, Some(false));
        assert!(!outcome.challenge.rank_swapped);
        assert!(!outcome.challenge.title_awarded);
        assert_eq!(get(&store, "y").rank, 2);
        assert_eq!(get(&store, "y").wins, 1);
        assert_eq!(get(&store, "z").losses, 1);
    }

    #[test]
    fn test_defending_champion_keeps_title_count() {
        let store = setup(&["x", "y"]);
        issue_as(&store, "y", "x").unwrap();
        report_as(&store, "y", false);
        // Holding rank 1 after a win counts as a title, defences included
        let x = get(&store, "x");
        assert_eq!((x.rank, x.wins), (1, 1));
        assert_eq!(x.titles, 1);
    }

    #[test]
    fn test_rematch_blocked() {
        let store = setup(&["a", "b", "c"]);
        issue_as(&store, "c", "b").unwrap();
        report_as(&store, "c", false);

        // c is on cooldown after challenging; lift it to reach the rematch rule
        store
            .write("s1", |tx| {
                let mut c = player::require(tx, "c")?;
                c.set_outgoing_cooldown(0, t0())?;
                tx.save_player_stats(&c)?;
                let mut b = player::require(tx, "b")?;
                b.set_incoming_protection(0, t0())?;
                tx.save_player_stats(&b)
            })
            .unwrap();

        assert_eq!(
            ineligible(issue_as(&store, "c", "b")),
            IneligibleReason::Rematch
        );
        issue_as(&store, "c", "a").unwrap();
    }

    #[test]
    fn test_cancel_states_and_strikes() {
        let store = setup(&["a", "b", "c", "d"]);
        issue_as(&store, "b", "a").unwrap();
        let outcome = store
            .write("s1", |tx| {
                let b = player::require(tx, "b")?;
                cancel(tx, &b, t0())
            })
            .unwrap();
        assert_eq!(outcome.challenge.state, ChallengeState::Cancelled);
        assert_eq!(outcome.challenger.strikes, 1);
        assert_eq!(outcome.opponent.strikes, 1);

        issue_as(&store, "d", "c").unwrap();
        let outcome = store
            .write("s1", |tx| {
                let c = player::require(tx, "c")?;
                cancel(tx, &c, t0())
            })
            .unwrap();
        assert_eq!(outcome.challenge.state, ChallengeState::Denied);
        assert_eq!(outcome.challenger.external_id, "d");

        let err = store
            .write("s1", |tx| {
                let c = player::require(tx, "c")?;
                cancel(tx, &c, t0())
            })
            .unwrap_err();
        assert!(matches!(err, LadderError::NoActiveChallenge(_)));
    }

    #[test]
    fn test_dispute_requires_played_and_no_pending() {
        let store = setup(&["a", "b", "c"]);
        let err = store
            .write("s1", |tx| {
                let a = player::require(tx, "a")?;
                dispute(tx, &a, &LadderSettings::default(), t0())
            })
            .unwrap_err();
        assert!(matches!(err, LadderError::NoPlayedChallenge(_)));

        issue_as(&store, "b", "a").unwrap();
        report_as(&store, "b", true);
        // a (now rank 2) challenges c; b is free but a is busy
        store
            .write("s1", |tx| {
                let mut a = player::require(tx, "a")?;
                a.set_outgoing_cooldown(0, t0())?;
                tx.save_player_stats(&a)
            })
            .unwrap();
        issue_as(&store, "a", "c").unwrap();

        let err = store
            .write("s1", |tx| {
                let b = player::require(tx, "b")?;
                dispute(tx, &b, &LadderSettings::default(), t0())
            })
            .unwrap_err();
        assert!(matches!(err, LadderError::ActiveChallengeExists(id) if id == "a"));
    }

    #[test]
    fn test_dispute_rejected_after_newer_game_of_other_player() {
        let store = setup(&["b", "a", "c"]);
        issue_as(&store, "a", "b").unwrap();
        report_as(&store, "a", true);
        // b (now rank 2) plays c and loses its place as well
        issue_as(&store, "b", "c").unwrap();
        report_as(&store, "c", true);

        let ranks = |store: &SqliteStore| -> Vec<String> {
            store
                .read("s1", |tx| tx.players())
                .unwrap()
                .into_iter()
                .map(|p| p.external_id)
                .collect()
        };
        assert_eq!(ranks(&store), vec!["a", "c", "b"]);

        let err = store
            .write("s1", |tx| {
                let a = player::require(tx, "a")?;
                dispute(tx, &a, &LadderSettings::default(), t0())
            })
            .unwrap_err();
        assert!(matches!(err, LadderError::DisputeSuperseded(id) if id == "b"));
        assert_eq!(ranks(&store), vec!["a", "c", "b"]);
        assert_eq!(get(&store, "a").wins, 1);

        // b's own latest game is still reversible
        let reopened = store
            .write("s1", |tx| {
                let b = player::require(tx, "b")?;
                dispute(tx, &b, &LadderSettings::default(), t0())
            })
            .unwrap();
        assert_eq!(reopened.state, ChallengeState::Pending);
        assert_eq!(ranks(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_oversized_day_settings_fail_without_side_effects() {
        let store = setup(&["a", "b"]);
        let settings = LadderSettings {
            challenge_timeout_days: u32::MAX,
            ..LadderSettings::default()
        };
        let err = store
            .write("s1", |tx| {
                let b = player::require(tx, "b")?;
                issue(tx, &b, "a", &settings, t0())
            })
            .unwrap_err();
        assert!(matches!(err, LadderError::DaysOutOfRange(_)));

        issue_as(&store, "b", "a").unwrap();
        let settings = LadderSettings {
            outgoing_cooldown_days: u32::MAX,
            ..LadderSettings::default()
        };
        let err = store
            .write("s1", |tx| {
                let b = player::require(tx, "b")?;
                report(tx, &b, true, &settings, t0())
            })
            .unwrap_err();
        assert!(matches!(err, LadderError::DaysOutOfRange(_)));
        // rolled back: still pending, no ranks moved
        assert_eq!(get(&store, "a").rank, 1);
        let pending = store
            .read("s1", |tx| {
                let b = player::require(tx, "b")?;
                tx.pending_challenge(b.id)
            })
            .unwrap();
        assert!(pending.is_some());
    }

    #[test]
    fn test_sweep_times_out_and_is_idempotent() {
        let store = setup(&["a", "b", "c", "d"]);
        issue_as(&store, "b", "a").unwrap();
        issue_as(&store, "d", "c").unwrap();

        let before_deadline = t0() + Duration::days(7);
        let outcomes = store.write("s1", |tx| sweep(tx, before_deadline)).unwrap();
        assert!(outcomes.is_empty());

        let after_deadline = before_deadline + Duration::seconds(1);
        let outcomes = store.write("s1", |tx| sweep(tx, after_deadline)).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| o.challenge.state == ChallengeState::Timeout));
        assert!(outcomes
            .iter()
            .flat_map(|o| o.strike_updates())
            .all(|s| s.strikes == 1));

        let again = store.write("s1", |tx| sweep(tx, after_deadline)).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_apply_and_reverse_are_inverse() {
        let base = Player {
            id: 0,
            ladder: "s1".to_string(),
            external_id: String::new(),
            rank: 0,
            tier: 0,
            wins: 4,
            losses: 2,
            titles: 1,
            strikes: 0,
            cooldown_until: None,
            protection_until: None,
            joined_at: t0(),
        };
        for (challenger_rank, opponent_rank) in [(2, 1), (1, 2), (5, 3), (3, 5)] {
            for challenger_won in [true, false] {
                let mut challenger = Player {
                    id: 1,
                    rank: challenger_rank,
                    tier: crate::tier::tier_of(challenger_rank),
                    ..base.clone()
                };
                let mut opponent = Player {
                    id: 2,
                    rank: opponent_rank,
                    tier: crate::tier::tier_of(opponent_rank),
                    ..base.clone()
                };
                let (c0, o0) = (challenger.clone(), opponent.clone());

                let effects = apply_result(&mut challenger, &mut opponent, challenger_won);
                reverse_result(&mut challenger, &mut opponent, challenger_won, effects);
                assert_eq!(challenger, c0);
                assert_eq!(opponent, o0);
            }
        }
    }
}
