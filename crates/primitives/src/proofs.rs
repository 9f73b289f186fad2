//! Commitments over ordered lists.
//!
//! The chain commits to transaction, receipt and ommer lists with the keccak
//! of their RLP encoding. An empty list therefore commits to
//! [`EMPTY_LIST_ROOT`](crate::constants::EMPTY_LIST_ROOT).

use alloy_primitives::{keccak256, B256};
use alloy_rlp::Encodable;

/// Computes the commitment to an ordered list of items.
pub fn ordered_root<T: Encodable>(items: &[T]) -> B256 {
    let mut buf = Vec::new();
    alloy_rlp::encode_list::<T, T>(items, &mut buf);
    keccak256(&buf)
}
