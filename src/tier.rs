//! Rank and tier math
//!
//! Tiers follow the triangular numbers: tier `k` covers the ranks
//! `((k-1)k/2, k(k+1)/2]`, so tier 1 holds one player, tier 2 two players,
//! tier 3 three players and so on.

/// Tier of a rank. Rank 0 is treated as rank 1.
pub fn tier_of(rank: u32) -> u32 {
    let rank = rank.max(1) as f64;
    (2.0 * rank - 1.0).sqrt().round() as u32
}

/// Inclusive rank range covered by `tier`
pub fn tier_bounds(tier: u32) -> (u32, u32) {
    let tier = tier.max(1);
    ((tier - 1) * tier / 2 + 1, tier * (tier + 1) / 2)
}

/// Rank a player holds after the player at `removed_rank` leaves the ladder
pub fn compacted_rank(rank: u32, removed_rank: u32) -> u32 {
    if rank > removed_rank {
        rank - 1
    } else {
        rank
    }
}
