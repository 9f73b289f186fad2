use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Error as RlpError, Header as RlpHeader};
use serde::{Deserialize, Serialize};

/// The recipient of a transaction: a message call to an account, or the
/// creation of a new contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// A transaction that creates a contract.
    #[default]
    Create,
    /// A transaction that calls the contract or transfers to the account at
    /// the given address.
    Call(Address),
}

impl TransactionKind {
    /// Returns the call target, if any.
    pub const fn to(&self) -> Option<&Address> {
        match self {
            TransactionKind::Create => None,
            TransactionKind::Call(to) => Some(to),
        }
    }

    /// Returns `true` if the transaction is a contract creation.
    pub const fn is_create(&self) -> bool {
        matches!(self, TransactionKind::Create)
    }
}

impl Encodable for TransactionKind {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            // a create is encoded as the empty string
            TransactionKind::Create => out.put_u8(alloy_rlp::EMPTY_STRING_CODE),
            TransactionKind::Call(to) => to.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            TransactionKind::Create => 1,
            TransactionKind::Call(to) => to.length(),
        }
    }
}

impl Decodable for TransactionKind {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let bytes = Bytes::decode(buf)?;
        match bytes.len() {
            0 => Ok(TransactionKind::Create),
            20 => Ok(TransactionKind::Call(Address::from_slice(&bytes))),
            _ => Err(RlpError::UnexpectedLength),
        }
    }
}

/// An unsigned transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// A scalar value equal to the number of transactions sent by the sender.
    pub nonce: u64,
    /// Wei paid per unit of gas consumed executing this transaction.
    pub gas_price: u128,
    /// The maximum amount of gas the transaction may consume; paid up front.
    pub gas_limit: u64,
    /// The 160-bit address of the message call's recipient, or ∅ for a
    /// contract creation.
    pub to: TransactionKind,
    /// Wei transferred to the recipient, or endowed to the created contract.
    pub value: U256,
    /// Call data, or the initialisation code for a contract creation.
    pub input: Bytes,
}

impl Transaction {
    /// RLP payload length of the unsigned fields.
    fn fields_len(&self) -> usize {
        self.nonce.length() +
            self.gas_price.length() +
            self.gas_limit.length() +
            self.to.length() +
            self.value.length() +
            self.input.length()
    }

    /// Encodes the unsigned fields without a list header.
    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }

    /// The hash a signer commits to: the keccak of the RLP list of the six
    /// unsigned fields.
    pub fn signature_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(self.fields_len() + 8);
        RlpHeader { list: true, payload_length: self.fields_len() }.encode(&mut buf);
        self.encode_fields(&mut buf);
        keccak256(&buf)
    }

    /// Attaches a signature, computing the transaction hash.
    pub fn into_signed(self, signature: Signature) -> TransactionSigned {
        TransactionSigned::from_transaction_and_signature(self, signature)
    }
}

/// An ECDSA signature over a transaction's [`Transaction::signature_hash`].
///
/// Recovering the signer is the transaction queue's concern; the coordinator
/// only ever carries the values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Recovery id plus 27.
    pub v: u64,
    /// The R field of the signature.
    pub r: U256,
    /// The S field of the signature.
    pub s: U256,
}

impl Signature {
    /// Whether the recovered Y coordinate is odd.
    pub const fn odd_y_parity(&self) -> bool {
        self.v == 28
    }

    fn payload_len(&self) -> usize {
        self.v.length() + self.r.length() + self.s.length()
    }

    fn encode_fields(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }
}

/// A signed transaction, with its hash cached at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionSigned {
    hash: B256,
    /// The signature over [`Self::transaction`].
    pub signature: Signature,
    /// The raw transaction.
    pub transaction: Transaction,
}

impl TransactionSigned {
    /// Combines a transaction and a signature, computing the canonical hash.
    pub fn from_transaction_and_signature(
        transaction: Transaction,
        signature: Signature,
    ) -> Self {
        let mut tx = TransactionSigned { hash: B256::ZERO, signature, transaction };
        tx.hash = keccak256(alloy_rlp::encode(&tx));
        tx
    }

    /// The keccak of the signed RLP encoding; uniquely identifies the
    /// transaction.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    fn payload_len(&self) -> usize {
        self.transaction.fields_len() + self.signature.payload_len()
    }
}

impl std::ops::Deref for TransactionSigned {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl Encodable for TransactionSigned {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        RlpHeader { list: true, payload_length: self.payload_len() }.encode(out);
        self.transaction.encode_fields(out);
        self.signature.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload = self.payload_len();
        payload + alloy_rlp::length_of_length(payload)
    }
}

impl Decodable for TransactionSigned {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = RlpHeader::decode(buf)?;
        if !header.list {
            return Err(RlpError::UnexpectedString)
        }
        let remaining = buf.len();

        let transaction = Transaction {
            nonce: Decodable::decode(buf)?,
            gas_price: Decodable::decode(buf)?,
            gas_limit: Decodable::decode(buf)?,
            to: Decodable::decode(buf)?,
            value: Decodable::decode(buf)?,
            input: Decodable::decode(buf)?,
        };
        let signature = Signature {
            v: Decodable::decode(buf)?,
            r: Decodable::decode(buf)?,
            s: Decodable::decode(buf)?,
        };

        if remaining - buf.len() != header.payload_length {
            return Err(RlpError::ListLengthMismatch {
                expected: header.payload_length,
                got: remaining - buf.len(),
            })
        }

        Ok(Self::from_transaction_and_signature(transaction, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn sample_tx() -> TransactionSigned {
        Transaction {
            nonce: 3,
            gas_price: 20 * crate::constants::GWEI_TO_WEI,
            gas_limit: 21_000,
            to: TransactionKind::Call(address!("06012c8cf97bead5deae237070f9587f8e7a266d")),
            value: U256::from(1_000_000u64),
            input: Bytes::default(),
        }
        .into_signed(Signature { v: 27, r: U256::from(1u64), s: U256::from(2u64) })
    }

    #[test]
    fn encode_decode_round_trip() {
        let tx = sample_tx();
        let encoded = alloy_rlp::encode(&tx);
        let decoded = TransactionSigned::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn hash_covers_signature() {
        let tx = sample_tx();
        let other = tx
            .transaction
            .clone()
            .into_signed(Signature { v: 28, r: U256::from(1u64), s: U256::from(2u64) });
        assert_ne!(tx.hash(), other.hash());
        assert_eq!(tx.signature_hash(), other.signature_hash());
    }

    #[test]
    fn create_kind_encodes_as_empty_string() {
        let tx = Transaction { to: TransactionKind::Create, ..Default::default() }
            .into_signed(Signature::default());
        let encoded = alloy_rlp::encode(&tx);
        let decoded = TransactionSigned::decode(&mut encoded.as_slice()).unwrap();
        assert!(decoded.to.is_create());
    }
}
