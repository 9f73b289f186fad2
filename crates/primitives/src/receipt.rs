use crate::log::{logs_bloom, Log};
use alloy_primitives::Bloom;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// The outcome of executing a single transaction.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Receipt {
    /// Whether the transaction executed successfully.
    pub success: bool,
    /// Gas consumed by this transaction alone.
    pub gas_used: u64,
    /// Gas consumed by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Logs emitted during execution, in emission order.
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Computes the bloom over this receipt's logs.
    pub fn bloom_slow(&self) -> Bloom {
        logs_bloom(&self.logs)
    }
}
