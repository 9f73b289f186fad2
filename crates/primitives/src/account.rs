use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An account: nonce, balance, code and storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Number of transactions sent from this account.
    pub nonce: u64,
    /// Balance in wei.
    pub balance: U256,
    /// Contract code; empty for externally owned accounts.
    pub code: Bytes,
    /// Contract storage.
    pub storage: BTreeMap<B256, B256>,
}

impl Account {
    /// Returns `true` if the account carries no state at all.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 &&
            self.balance.is_zero() &&
            self.code.is_empty() &&
            self.storage.is_empty()
    }

    /// The commitment to this account's storage.
    pub fn storage_root(&self) -> B256 {
        let mut buf = Vec::new();
        for (key, value) in &self.storage {
            key.encode(&mut buf);
            value.encode(&mut buf);
        }
        keccak256(&buf)
    }
}

/// The full account state at some point of the pipeline, as a sorted overlay.
///
/// The coordinator mutates an overlay while applying pending transactions and
/// publishes immutable copies of it as snapshots; the chain collaborator
/// materialises historical overlays on demand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateOverlay {
    accounts: BTreeMap<Address, Account>,
}

impl StateOverlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the account at `address`, if it exists.
    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Returns the account at `address`, creating an empty one if absent.
    pub fn account_mut(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }

    /// The balance of `address`, zero if the account does not exist.
    pub fn balance(&self, address: &Address) -> U256 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or_default()
    }

    /// The nonce of `address`, zero if the account does not exist.
    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or_default()
    }

    /// The storage slot `key` of `address`, zero if unset.
    pub fn storage(&self, address: &Address, key: &B256) -> B256 {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(key).copied())
            .unwrap_or_default()
    }

    /// Sets a storage slot, creating the account if needed.
    pub fn set_storage(&mut self, address: Address, key: B256, value: B256) {
        self.account_mut(address).storage.insert(key, value);
    }

    /// Credits `address` with `amount` wei.
    pub fn add_balance(&mut self, address: Address, amount: U256) {
        let account = self.account_mut(address);
        account.balance = account.balance.saturating_add(amount);
    }

    /// Debits `amount` wei from `address`. Returns `false` and leaves the
    /// account untouched if the balance is insufficient.
    pub fn sub_balance(&mut self, address: Address, amount: U256) -> bool {
        let account = self.account_mut(address);
        match account.balance.checked_sub(amount) {
            Some(rest) => {
                account.balance = rest;
                true
            }
            None => false,
        }
    }

    /// Increments the nonce of `address`.
    pub fn inc_nonce(&mut self, address: Address) {
        let account = self.account_mut(address);
        account.nonce += 1;
    }

    /// Iterates all accounts in address order.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// The number of accounts in the overlay.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if the overlay holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// The commitment to the entire account state.
    ///
    /// Defined as the keccak of the address-ordered account entries, each
    /// contributing `(address, nonce, balance, code_hash, storage_root)`.
    pub fn state_root(&self) -> B256 {
        let mut buf = Vec::new();
        for (address, account) in &self.accounts {
            if account.is_empty() {
                continue
            }
            address.encode(&mut buf);
            account.nonce.encode(&mut buf);
            account.balance.encode(&mut buf);
            keccak256(&account.code).encode(&mut buf);
            account.storage_root().encode(&mut buf);
        }
        keccak256(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_ignores_empty_accounts() {
        let mut state = StateOverlay::new();
        let empty = state.state_root();
        state.account_mut(Address::repeat_byte(1));
        assert_eq!(state.state_root(), empty);

        state.add_balance(Address::repeat_byte(1), U256::from(1u64));
        assert_ne!(state.state_root(), empty);
    }

    #[test]
    fn sub_balance_refuses_overdraft() {
        let mut state = StateOverlay::new();
        let addr = Address::repeat_byte(2);
        state.add_balance(addr, U256::from(10u64));
        assert!(!state.sub_balance(addr, U256::from(11u64)));
        assert_eq!(state.balance(&addr), U256::from(10u64));
        assert!(state.sub_balance(addr, U256::from(4u64)));
        assert_eq!(state.balance(&addr), U256::from(6u64));
    }

    #[test]
    fn storage_reads_default_to_zero() {
        let mut state = StateOverlay::new();
        let addr = Address::repeat_byte(3);
        assert_eq!(state.storage(&addr, &B256::ZERO), B256::ZERO);
        state.set_storage(addr, B256::ZERO, B256::repeat_byte(9));
        assert_eq!(state.storage(&addr, &B256::ZERO), B256::repeat_byte(9));
    }
}
