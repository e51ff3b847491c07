//! Challenge eligibility
//!
//! Decides whether a challenger may reach an opponent based on rank and tier
//! alone. Players may always challenge down; challenging up is bounded to one
//! tier and `rank_range` ranks. The top player may only challenge into tier 2.

use crate::player::Player;

/// Rank/tier reach check. Not symmetric: `challenger` is the issuing player.
pub fn can_challenge(challenger: &Player, opponent: &Player, rank_range: u32) -> bool {
    reachable(
        (challenger.rank, challenger.tier),
        (opponent.rank, opponent.tier),
        rank_range,
    )
}

/// Same rule over bare `(rank, tier)` pairs
pub fn reachable(challenger: (u32, u32), opponent: (u32, u32), rank_range: u32) -> bool {
    let (challenger_rank, challenger_tier) = challenger;
    let (opponent_rank, opponent_tier) = opponent;

    if challenger_rank == 1 {
        return opponent_tier == 2;
    }
    if challenger_rank < opponent_rank {
        return true;
    }
    if challenger_tier > opponent_tier + 1 {
        return false;
    }
    challenger_rank <= opponent_rank.saturating_add(rank_range)
}
