//! Ladder Ranking & Challenge Engine
//!
//! Competitive ladders for chat communities: players sign up, challenge
//! nearby opponents, report results and climb ranks grouped into
//! triangular tiers.
//!
//! ## Module Structure
//!
//! - `tier`: rank to tier mapping
//! - `config`: named ladder settings and the process config file
//! - `storage`: transactional row store (SQLite)
//! - `player`: signup, removal, shuffle, cooldowns and strikes
//! - `eligibility`: who may challenge whom
//! - `challenge`: challenge state machine, results and disputes
//! - `engine`: caller-facing operations with permissions and notifications
//! - `sweep_monitor`: background timeout of overdue challenges

pub mod challenge;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod player;
pub mod storage;
pub mod sweep_monitor;
pub mod tier;

pub use challenge::{Challenge, ChallengeId, ChallengeState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, LadderSettings};
pub use engine::{Caller, LadderEngine, StandingsChanged, StandingsReason};
pub use error::{IneligibleReason, LadderError, Result};
pub use player::{Player, PlayerId};
pub use storage::{LadderStore, LadderTx, SqliteStore};
pub use sweep_monitor::{spawn_sweep_monitor, SweepMonitor, SweepMonitorConfig};
pub use tier::tier_of;
