//! Deterministic seed partitioning.
//!
//! The run seed is split into independent per-(lane, index) streams with
//! splitmix64, so trial `i` of route `r` always sees the same random stream
//! regardless of what ran before it.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// splitmix64 finalizer; good avalanche, trivially stable.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Derive the seed for one (lane, index) cell of the run's seed tree.
///
/// Lanes separate routes (and, in stateful mode, sequences); indices
/// separate trials (steps) within a lane.
pub fn child_seed(run_seed: u64, lane: u64, index: u64) -> u64 {
    splitmix64(run_seed ^ splitmix64(lane.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ splitmix64(index)))
}

/// Build the RNG for a derived seed.
pub fn rng_for(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}
