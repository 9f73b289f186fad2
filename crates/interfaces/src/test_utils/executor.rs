use crate::executor::{
    CallRequest, EnvInfo, ExecutionError, ExecutionOutcome, TransactionExecutor,
};
use cinder_primitives::{
    keccak256, Address, Log, Signature, StateOverlay, Transaction, TransactionKind,
    TransactionSigned, U256,
};

/// Gas consumed by every mock transfer.
pub const GAS_PER_TRANSFER: u64 = 21_000;

/// The address a test signer seed maps to.
pub fn signer(seed: u8) -> Address {
    Address::repeat_byte(seed)
}

/// Builds a signed value transfer from the signer identified by `seed`.
///
/// The mock executor recovers the sender from the signature's `r` value, so
/// no real cryptography is involved.
pub fn transfer(seed: u8, to: Address, nonce: u64, value: u64, gas_price: u128) -> TransactionSigned {
    let sender = signer(seed);
    Transaction {
        nonce,
        gas_price,
        gas_limit: GAS_PER_TRANSFER,
        to: TransactionKind::Call(to),
        value: U256::from(value),
        input: Default::default(),
    }
    .into_signed(Signature {
        v: 27,
        r: U256::from_be_slice(sender.as_slice()),
        s: U256::from(1u64),
    })
}

fn sender_of(transaction: &TransactionSigned) -> Address {
    let r = transaction.signature.r.to_be_bytes::<32>();
    Address::from_slice(&r[12..])
}

fn scripted_log(address: Address, data: &cinder_primitives::Bytes) -> Option<Log> {
    if data.is_empty() {
        return None
    }
    Some(Log { address, topics: vec![keccak256(data)], data: data.clone() })
}

fn target_of(kind: &TransactionKind, sender: Address, nonce: u64) -> Address {
    match kind {
        TransactionKind::Call(to) => *to,
        TransactionKind::Create => {
            let mut buf = Vec::with_capacity(28);
            buf.extend_from_slice(sender.as_slice());
            buf.extend_from_slice(&nonce.to_be_bytes());
            Address::from_slice(&keccak256(&buf)[12..])
        }
    }
}

/// A mock executor with real nonce and balance semantics.
///
/// Every transaction is a plain transfer costing [`GAS_PER_TRANSFER`] gas;
/// the fee is credited to the block beneficiary. A transaction or call with
/// non-empty input additionally emits one log at the target address, topic'd
/// with the keccak of the input, which is enough to exercise the filter
/// pipeline end to end.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct TransferExecutor;

impl TransferExecutor {
    /// Creates the executor.
    pub fn new() -> Self {
        Self
    }
}

impl TransactionExecutor for TransferExecutor {
    fn execute(
        &self,
        env: &EnvInfo,
        state: &mut StateOverlay,
        transaction: &TransactionSigned,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        if env.gas_used + GAS_PER_TRANSFER > env.gas_limit {
            return Err(ExecutionError::BlockGasLimitReached)
        }

        let sender = sender_of(transaction);
        let expected = state.nonce(&sender);
        if transaction.nonce < expected {
            return Err(ExecutionError::NonceTooLow { expected, got: transaction.nonce })
        }
        if transaction.nonce > expected {
            return Err(ExecutionError::NonceTooHigh { expected, got: transaction.nonce })
        }

        let fee = U256::from(transaction.gas_price) * U256::from(GAS_PER_TRANSFER);
        let required = transaction.value + fee;
        let available = state.balance(&sender);
        if available < required {
            return Err(ExecutionError::InsufficientBalance { required, available })
        }

        let target = target_of(&transaction.to, sender, transaction.nonce);
        state.inc_nonce(sender);
        state.sub_balance(sender, required);
        state.add_balance(target, transaction.value);
        state.add_balance(env.beneficiary, fee);

        Ok(ExecutionOutcome {
            success: true,
            gas_used: GAS_PER_TRANSFER,
            logs: scripted_log(target, &transaction.input).into_iter().collect(),
            output: Default::default(),
        })
    }

    fn simulate(
        &self,
        env: &EnvInfo,
        state: &mut StateOverlay,
        request: &CallRequest,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        if request.gas < GAS_PER_TRANSFER {
            return Err(ExecutionError::Internal("out of gas".to_owned()))
        }

        let available = state.balance(&request.from);
        if available < request.value {
            return Err(ExecutionError::InsufficientBalance {
                required: request.value,
                available,
            })
        }

        let target = target_of(&request.to, request.from, state.nonce(&request.from));
        state.sub_balance(request.from, request.value);
        state.add_balance(target, request.value);
        state.add_balance(env.beneficiary, U256::from(request.gas_price) * U256::from(GAS_PER_TRANSFER));

        Ok(ExecutionOutcome {
            success: true,
            gas_used: GAS_PER_TRANSFER,
            logs: scripted_log(target, &request.data).into_iter().collect(),
            // echo the call data so tests can assert on the output path
            output: request.data.clone(),
        })
    }
}

/// An executor that applies nothing and always succeeds.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct NoopExecutor;

impl TransactionExecutor for NoopExecutor {
    fn execute(
        &self,
        _env: &EnvInfo,
        _state: &mut StateOverlay,
        _transaction: &TransactionSigned,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        Ok(ExecutionOutcome { success: true, gas_used: GAS_PER_TRANSFER, ..Default::default() })
    }

    fn simulate(
        &self,
        _env: &EnvInfo,
        _state: &mut StateOverlay,
        _request: &CallRequest,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        Ok(ExecutionOutcome { success: true, gas_used: GAS_PER_TRANSFER, ..Default::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_state(seed: u8, wei: u64) -> StateOverlay {
        let mut state = StateOverlay::new();
        state.add_balance(signer(seed), U256::from(wei));
        state
    }

    #[test]
    fn transfer_moves_value_and_pays_fees() {
        let executor = TransferExecutor::new();
        let beneficiary = Address::repeat_byte(0xbe);
        let env = EnvInfo { beneficiary, gas_limit: 1_000_000, ..Default::default() };
        let mut state = funded_state(1, 100_000_000);

        let tx = transfer(1, signer(2), 0, 500, 1);
        let outcome = executor.execute(&env, &mut state, &tx).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.gas_used, GAS_PER_TRANSFER);
        assert_eq!(state.balance(&signer(2)), U256::from(500u64));
        assert_eq!(state.balance(&beneficiary), U256::from(GAS_PER_TRANSFER));
        assert_eq!(state.nonce(&signer(1)), 1);
    }

    #[test]
    fn nonce_gap_is_retryable() {
        let executor = TransferExecutor::new();
        let env = EnvInfo { gas_limit: 1_000_000, ..Default::default() };
        let mut state = funded_state(1, 100_000_000);

        let err = executor.execute(&env, &mut state, &transfer(1, signer(2), 5, 1, 1)).unwrap_err();
        assert!(matches!(err, ExecutionError::NonceTooHigh { expected: 0, got: 5 }));
        assert!(err.is_retryable());

        let err = {
            state.inc_nonce(signer(1));
            executor.execute(&env, &mut state, &transfer(1, signer(2), 0, 1, 1)).unwrap_err()
        };
        assert!(matches!(err, ExecutionError::NonceTooLow { expected: 1, got: 0 }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn overdraft_leaves_state_untouched() {
        let executor = TransferExecutor::new();
        let env = EnvInfo { gas_limit: 1_000_000, ..Default::default() };
        let mut state = funded_state(1, 10);
        let before = state.clone();

        let err = executor.execute(&env, &mut state, &transfer(1, signer(2), 0, 5, 1)).unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientBalance { .. }));
        assert_eq!(state, before);
    }
}
