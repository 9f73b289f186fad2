//! Commonly used types for the cinder client.
//!
//! This crate contains the chain data model (headers, blocks, transactions,
//! receipts, logs), the account/state overlay the coordinator mutates while
//! building a block, and the proof-of-work math used to hand out and verify
//! mining work.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod account;
mod block;
pub mod constants;
mod header;
mod log;
pub mod pow;
pub mod proofs;
mod receipt;
mod transaction;

pub use account::{Account, StateOverlay};
pub use block::{Block, BlockInfo, ChainInfo};
pub use header::{Header, SealedHeader};
pub use log::{logs_bloom, LocalizedLog, Log};
pub use pow::{PowSolution, WorkPackage};
pub use receipt::Receipt;
pub use transaction::{Signature, Transaction, TransactionKind, TransactionSigned};

// Re-export the base layer so downstream crates use a single source of truth
// for hashes, addresses and integers.
pub use alloy_primitives::{keccak256, Address, Bloom, BloomInput, Bytes, B256, U256};

/// A block number.
pub type BlockNumber = u64;

/// A transaction hash.
pub type TxHash = B256;
