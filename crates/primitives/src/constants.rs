//! Protocol constants shared across the workspace.

use alloy_primitives::{b256, B256};

/// The version of the wire protocol this client speaks.
pub const PROTOCOL_VERSION: u64 = 62;

/// The minor protocol version.
///
/// A mismatch against the persisted database only forces re-verification of
/// stored blocks, not a wipe.
pub const MINOR_PROTOCOL_VERSION: u64 = 2;

/// The version of the database schema.
///
/// A mismatch against the persisted database forces a wipe.
pub const DATABASE_VERSION: u64 = 12;

/// Multiplier for converting gwei to wei.
pub const GWEI_TO_WEI: u128 = 1_000_000_000;

/// Number of blocks in a proof-of-work epoch; the dataset seed rotates once
/// per epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

/// The lowest difficulty the chain will ever assign to a block.
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Divisor bounding the per-block difficulty adjustment step.
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2_048;

/// Blocks arriving within this many seconds of their parent push difficulty
/// up; slower blocks pull it down.
pub const DURATION_LIMIT: u64 = 13;

/// Keccak-256 of the RLP encoding of an empty list.
///
/// This is the commitment for an empty transaction, receipt or ommer list.
pub const EMPTY_LIST_ROOT: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");
