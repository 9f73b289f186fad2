use crate::constants::EMPTY_LIST_ROOT;
use alloy_primitives::{keccak256, Address, Bloom, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header as RlpHeader, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A proof-of-work block header.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Header {
    /// The keccak hash of the parent block's header.
    pub parent_hash: B256,
    /// The commitment to this block's ommer list.
    pub ommers_hash: B256,
    /// The address that receives the block reward and all transaction fees.
    pub beneficiary: Address,
    /// The commitment to the state after executing this block.
    pub state_root: B256,
    /// The commitment to this block's transaction list.
    pub transactions_root: B256,
    /// The commitment to this block's receipt list.
    pub receipts_root: B256,
    /// The bloom over every log emitted by this block's transactions.
    pub logs_bloom: Bloom,
    /// The proof-of-work difficulty target this header was sealed against.
    pub difficulty: U256,
    /// The number of ancestor blocks.
    pub number: u64,
    /// The maximum gas this block's transactions may consume in total.
    pub gas_limit: u64,
    /// The gas actually consumed by this block's transactions.
    pub gas_used: u64,
    /// Seconds since the unix epoch at which this block was sealed.
    pub timestamp: u64,
    /// Arbitrary miner-supplied bytes, at most 32.
    pub extra_data: Bytes,
    /// The proof-of-work mix digest.
    pub mix_hash: B256,
    /// The proof-of-work nonce.
    pub nonce: u64,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            parent_hash: B256::ZERO,
            ommers_hash: EMPTY_LIST_ROOT,
            beneficiary: Address::ZERO,
            state_root: B256::ZERO,
            transactions_root: EMPTY_LIST_ROOT,
            receipts_root: EMPTY_LIST_ROOT,
            logs_bloom: Bloom::ZERO,
            difficulty: U256::ZERO,
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_hash: B256::ZERO,
            nonce: 0,
        }
    }
}

impl Header {
    /// The keccak of the full RLP encoding; this is the block hash.
    pub fn hash_slow(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// The hash a proof-of-work search commits to: the keccak of the RLP
    /// encoding *without* the `mix_hash` and `nonce` fields.
    pub fn seal_hash(&self) -> B256 {
        let payload_length = self.parent_hash.length() +
            self.ommers_hash.length() +
            self.beneficiary.length() +
            self.state_root.length() +
            self.transactions_root.length() +
            self.receipts_root.length() +
            self.logs_bloom.length() +
            self.difficulty.length() +
            self.number.length() +
            self.gas_limit.length() +
            self.gas_used.length() +
            self.timestamp.length() +
            self.extra_data.length();

        let mut buf = Vec::with_capacity(payload_length + 8);
        RlpHeader { list: true, payload_length }.encode(&mut buf);
        self.parent_hash.encode(&mut buf);
        self.ommers_hash.encode(&mut buf);
        self.beneficiary.encode(&mut buf);
        self.state_root.encode(&mut buf);
        self.transactions_root.encode(&mut buf);
        self.receipts_root.encode(&mut buf);
        self.logs_bloom.encode(&mut buf);
        self.difficulty.encode(&mut buf);
        self.number.encode(&mut buf);
        self.gas_limit.encode(&mut buf);
        self.gas_used.encode(&mut buf);
        self.timestamp.encode(&mut buf);
        self.extra_data.encode(&mut buf);
        keccak256(&buf)
    }

    /// Computes the hash and wraps the header so it is only computed once.
    pub fn seal_slow(self) -> SealedHeader {
        let hash = self.hash_slow();
        SealedHeader { header: self, hash }
    }
}

/// A [`Header`] with its hash cached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::Deref, Serialize, Deserialize)]
pub struct SealedHeader {
    /// The wrapped header.
    #[deref]
    header: Header,
    hash: B256,
}

impl SealedHeader {
    /// The cached block hash.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// Unwraps the header.
    pub fn into_inner(self) -> Header {
        self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_hash_ignores_seal_fields() {
        let mut header = Header { number: 7, gas_limit: 8_000_000, ..Default::default() };
        let commitment = header.seal_hash();

        header.mix_hash = B256::repeat_byte(0xab);
        header.nonce = 42;
        assert_eq!(header.seal_hash(), commitment);
        assert_ne!(header.hash_slow(), commitment);
    }

    #[test]
    fn sealed_header_caches_hash() {
        let header = Header { number: 1, ..Default::default() };
        let expected = header.hash_slow();
        let sealed = header.seal_slow();
        assert_eq!(sealed.hash(), expected);
        assert_eq!(sealed.number, 1);
    }
}
