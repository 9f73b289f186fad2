use cinder_primitives::{
    Address, Bytes, Log, StateOverlay, TransactionKind, TransactionSigned, U256,
};

/// The block environment a transaction executes in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvInfo {
    /// The block's beneficiary; receives transaction fees.
    pub beneficiary: Address,
    /// The block number.
    pub number: u64,
    /// The block timestamp.
    pub timestamp: u64,
    /// The block gas limit.
    pub gas_limit: u64,
    /// Gas already consumed by earlier transactions in the block.
    pub gas_used: u64,
    /// The block difficulty.
    pub difficulty: U256,
}

/// The result of executing a transaction or simulated call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Whether execution completed without reverting.
    pub success: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Logs emitted, in emission order.
    pub logs: Vec<Log>,
    /// Return data.
    pub output: Bytes,
}

/// Why a transaction could not be applied at all.
///
/// Distinct from a failed execution: an outcome with `success == false` still
/// consumes gas and belongs in the block, while these errors leave the state
/// untouched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The sender's nonce is ahead of the transaction's.
    #[error("nonce too low: expected {expected}, got {got}")]
    NonceTooLow {
        /// The sender's next valid nonce.
        expected: u64,
        /// The transaction's nonce.
        got: u64,
    },
    /// The transaction's nonce is ahead of the sender's; it may become valid
    /// once the gap fills.
    #[error("nonce too high: expected {expected}, got {got}")]
    NonceTooHigh {
        /// The sender's next valid nonce.
        expected: u64,
        /// The transaction's nonce.
        got: u64,
    },
    /// The sender cannot cover value plus maximum gas cost.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Wei required up front.
        required: U256,
        /// Wei available.
        available: U256,
    },
    /// The transaction does not fit in the remaining block gas.
    #[error("block gas limit reached")]
    BlockGasLimitReached,
    /// The executor failed internally.
    #[error("execution failed: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Returns `true` if the transaction may succeed later and should stay
    /// queued rather than be dropped.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::NonceTooHigh { .. } | ExecutionError::BlockGasLimitReached
        )
    }
}

/// An ad-hoc message for simulation, without a signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallRequest {
    /// The simulated caller.
    pub from: Address,
    /// The call target.
    pub to: TransactionKind,
    /// The gas allowance.
    pub gas: u64,
    /// The gas price in wei.
    pub gas_price: u128,
    /// Wei transferred with the call.
    pub value: U256,
    /// Call data.
    pub data: Bytes,
}

/// Executes transactions against a state overlay.
///
/// The virtual machine behind this trait is a collaborator; the coordinator
/// only sequences applications and collects outcomes.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait TransactionExecutor: Send + Sync {
    /// Applies a signed transaction to `state`, returning its outcome.
    ///
    /// On error the state is left untouched.
    fn execute(
        &self,
        env: &EnvInfo,
        state: &mut StateOverlay,
        transaction: &TransactionSigned,
    ) -> Result<ExecutionOutcome, ExecutionError>;

    /// Runs an unsigned message against `state` without nonce checks.
    ///
    /// On error the state is left untouched.
    fn simulate(
        &self,
        env: &EnvInfo,
        state: &mut StateOverlay,
        request: &CallRequest,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}
