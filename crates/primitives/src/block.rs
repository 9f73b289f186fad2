use crate::{header::Header, transaction::TransactionSigned};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A complete block: header, transactions and ommer headers.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, RlpDecodable, RlpEncodable, Serialize, Deserialize,
)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// Transactions in application order.
    pub body: Vec<TransactionSigned>,
    /// Headers of included ommers.
    pub ommers: Vec<Header>,
}

impl Block {
    /// The wire encoding of the block.
    pub fn rlp_bytes(&self) -> Bytes {
        alloy_rlp::encode(self).into()
    }

    /// The block hash.
    pub fn hash_slow(&self) -> B256 {
        self.header.hash_slow()
    }
}

/// The headline view of a block header used by the gas pricer, the mining
/// driver and the filter pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// The block hash.
    pub hash: B256,
    /// The hash a proof-of-work search commits to.
    pub seal_hash: B256,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The block number.
    pub number: u64,
    /// The beneficiary of the block reward.
    pub beneficiary: Address,
    /// The difficulty this block was (or is to be) sealed against.
    pub difficulty: U256,
    /// The block gas limit.
    pub gas_limit: u64,
    /// The gas consumed by the block.
    pub gas_used: u64,
    /// The block timestamp.
    pub timestamp: u64,
    /// The commitment to the block's transaction list.
    pub transactions_root: B256,
}

impl From<&Header> for BlockInfo {
    fn from(header: &Header) -> Self {
        BlockInfo {
            hash: header.hash_slow(),
            seal_hash: header.seal_hash(),
            parent_hash: header.parent_hash,
            number: header.number,
            beneficiary: header.beneficiary,
            difficulty: header.difficulty,
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
            timestamp: header.timestamp,
            transactions_root: header.transactions_root,
        }
    }
}

/// The current canonical chain head.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Hash of the best block.
    pub best_hash: B256,
    /// Number of the best block.
    pub best_number: u64,
}
