//! Proof-of-work packaging and verification.
//!
//! The sealing kernel (the dataset search proper) lives behind the mining
//! farm collaborator; this module defines what a work package commits to and
//! how a returned solution is checked.
//!
//! The seal function is a keccak construction: the mix digest is
//! `keccak256(seal_hash ‖ nonce)` and the final value
//! `keccak256(seal_hash ‖ nonce ‖ mix_hash)` must fall below the difficulty
//! boundary.

use crate::{
    block::BlockInfo,
    constants::{DIFFICULTY_BOUND_DIVISOR, DURATION_LIMIT, EPOCH_LENGTH, MINIMUM_DIFFICULTY},
};
use alloy_primitives::{keccak256, B256, U256};
use serde::{Deserialize, Serialize};

/// Everything a proof-of-work worker needs to search for a seal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPackage {
    /// The header commitment the search is bound to.
    pub header_hash: B256,
    /// The dataset seed for the header's epoch.
    pub seed_hash: B256,
    /// Solutions must hash at or below this value.
    pub boundary: B256,
}

impl WorkPackage {
    /// Builds the package for a committed header.
    pub fn new(info: &BlockInfo) -> Self {
        WorkPackage {
            header_hash: info.seal_hash,
            seed_hash: seed_hash(info.number),
            boundary: difficulty_to_boundary(info.difficulty),
        }
    }

    /// Returns `true` if this is the empty package handed out when no work is
    /// available.
    pub fn is_empty(&self) -> bool {
        self.header_hash.is_zero()
    }
}

/// A seal found by a worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowSolution {
    /// The winning nonce.
    pub nonce: u64,
    /// The mix digest for the winning nonce.
    pub mix_hash: B256,
}

/// Converts a difficulty into the upper bound a seal hash must satisfy.
pub fn difficulty_to_boundary(difficulty: U256) -> B256 {
    if difficulty <= U256::from(1u64) {
        return B256::from(U256::MAX)
    }
    B256::from(U256::MAX / difficulty)
}

/// The dataset seed for the epoch containing `number`: the keccak chain of
/// length `number / EPOCH_LENGTH` starting at zero.
pub fn seed_hash(number: u64) -> B256 {
    let mut seed = B256::ZERO;
    for _ in 0..(number / EPOCH_LENGTH) {
        seed = keccak256(seed);
    }
    seed
}

/// The epoch containing `number`.
pub const fn epoch(number: u64) -> u64 {
    number / EPOCH_LENGTH
}

/// The mix digest for a given commitment and nonce.
pub fn mix_digest(seal_hash: B256, nonce: u64) -> B256 {
    let mut input = [0u8; 40];
    input[..32].copy_from_slice(seal_hash.as_slice());
    input[32..].copy_from_slice(&nonce.to_le_bytes());
    keccak256(input)
}

/// The final seal value for a given commitment and solution.
pub fn seal_value(seal_hash: B256, solution: &PowSolution) -> B256 {
    let mut input = [0u8; 72];
    input[..32].copy_from_slice(seal_hash.as_slice());
    input[32..40].copy_from_slice(&solution.nonce.to_le_bytes());
    input[40..].copy_from_slice(solution.mix_hash.as_slice());
    keccak256(input)
}

/// Checks a solution against a header commitment and difficulty.
pub fn verify_solution(seal_hash: B256, difficulty: U256, solution: &PowSolution) -> bool {
    if solution.mix_hash != mix_digest(seal_hash, solution.nonce) {
        return false
    }
    let value = U256::from_be_bytes(seal_value(seal_hash, solution).0);
    let boundary = U256::from_be_bytes(difficulty_to_boundary(difficulty).0);
    value <= boundary
}

/// Brute-force search for a valid solution, scanning `rounds` nonces from
/// `start_nonce`. Only practical at test difficulties.
pub fn solve(
    seal_hash: B256,
    difficulty: U256,
    start_nonce: u64,
    rounds: u64,
) -> Option<PowSolution> {
    for nonce in start_nonce..start_nonce.saturating_add(rounds) {
        let solution = PowSolution { nonce, mix_hash: mix_digest(seal_hash, nonce) };
        if verify_solution(seal_hash, difficulty, &solution) {
            return Some(solution)
        }
    }
    None
}

/// The difficulty of a child block sealed at `timestamp` on the given parent.
pub fn calculate_difficulty(
    parent_difficulty: U256,
    parent_timestamp: u64,
    timestamp: u64,
) -> U256 {
    let step = parent_difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
    let raised = timestamp.saturating_sub(parent_timestamp) < DURATION_LIMIT;
    let next = if raised {
        parent_difficulty.saturating_add(step)
    } else {
        parent_difficulty.saturating_sub(step)
    };
    next.max(U256::from(MINIMUM_DIFFICULTY))
}
