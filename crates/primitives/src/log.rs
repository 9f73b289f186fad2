use alloy_primitives::{Address, Bloom, BloomInput, Bytes, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A log emitted during transaction execution.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Log {
    /// The contract that emitted this log.
    pub address: Address,
    /// Indexed topics, at most four.
    pub topics: Vec<B256>,
    /// Arbitrary length data.
    pub data: Bytes,
}

impl Log {
    /// Folds this log's address and topics into the given bloom.
    pub fn accrue_to(&self, bloom: &mut Bloom) {
        bloom.accrue(BloomInput::Raw(self.address.as_slice()));
        for topic in &self.topics {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
}

/// Computes the bloom over a set of logs.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        log.accrue_to(&mut bloom);
    }
    bloom
}

/// A [`Log`] localised to the block and transaction it was emitted by.
///
/// Entries produced for the pending state carry a zero block hash and number;
/// only the transaction hash and index are meaningful until the transaction
/// lands in a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, derive_more::Deref, Serialize, Deserialize)]
pub struct LocalizedLog {
    /// The raw log.
    #[deref]
    pub log: Log,
    /// Hash of the block this log's transaction is in.
    pub block_hash: B256,
    /// Number of the block this log's transaction is in.
    pub block_number: u64,
    /// Hash of the transaction that emitted this log.
    pub transaction_hash: B256,
    /// Index of the transaction within its block (or the pending list).
    pub transaction_index: u64,
    /// Index of this log across all logs of its block.
    pub log_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_covers_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(0x11),
            topics: vec![B256::repeat_byte(0x22)],
            data: Bytes::new(),
        };
        let bloom = logs_bloom([&log]);
        assert!(bloom.contains_input(BloomInput::Raw(log.address.as_slice())));
        assert!(bloom.contains_input(BloomInput::Raw(log.topics[0].as_slice())));
        assert!(!bloom.contains_input(BloomInput::Raw(B256::repeat_byte(0x33).as_slice())));
    }
}
