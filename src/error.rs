//! Ladder error types
//!
//! Every domain violation surfaces as a typed [`LadderError`]; the command
//! layer decides how to phrase it for users.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which challenge precondition rejected an `issue` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    /// Challenger and opponent are the same player
    SelfChallenge,
    /// Opponent has no row in this ladder
    OpponentNotSignedUp,
    /// Challenger is still on outgoing cooldown
    OutgoingCooldown,
    /// Opponent is protected from incoming challenges
    IncomingProtection,
    /// Opponent is out of tier or rank reach
    OutOfRange,
    /// Challenger's last played game was against this opponent
    Rematch,
    /// Challenger already has a pending challenge
    ChallengerHasPending,
    /// Opponent already has a pending challenge
    OpponentHasPending,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IneligibleReason::SelfChallenge => "cannot challenge yourself",
            IneligibleReason::OpponentNotSignedUp => "opponent is not signed up",
            IneligibleReason::OutgoingCooldown => "challenger is on cooldown",
            IneligibleReason::IncomingProtection => "opponent has challenge protection",
            IneligibleReason::OutOfRange => "opponent is out of tier or rank range",
            IneligibleReason::Rematch => "opponent was the challenger's last game",
            IneligibleReason::ChallengerHasPending => "challenger already has an active challenge",
            IneligibleReason::OpponentHasPending => "opponent already has an active challenge",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("player {0} is not signed up")]
    NotSignedUp(String),
    #[error("player {0} is already signed up")]
    AlreadySignedUp(String),
    #[error("config not found: {0}")]
    ConfigNotFound(String),
    #[error("invalid config value for {name}: {value:?}")]
    InvalidConfig { name: String, value: String },
    #[error("ladder can only be shuffled in signup-only mode")]
    ShuffleNotAllowed,
    #[error("ladder is in signup-only mode")]
    SignupOnly,
    #[error("no active challenge for {0}")]
    NoActiveChallenge(String),
    #[error("no played challenge for {0}")]
    NoPlayedChallenge(String),
    #[error("an active challenge already exists for {0}")]
    ActiveChallengeExists(String),
    #[error("{0} has played a newer challenge since")]
    DisputeSuperseded(String),
    #[error("challenge not allowed: {0}")]
    IneligibleChallenge(IneligibleReason),
    #[error("{0} days is out of range")]
    DaysOutOfRange(u32),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("storage conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for LadderError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                LadderError::Conflict(err.to_string())
            }
            _ => LadderError::StorageUnavailable(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LadderError>;
