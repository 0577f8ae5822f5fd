use crate::hash::{Hash, EMPTY_CODE_HASH};
use crate::u256::U256;
use std::collections::HashMap;

/// On-chain account state.
///
/// `storage` holds the slots loaded from disk when the account was read; it
/// is a snapshot of the persisted rows, not the live execution view (the
/// state engine layers its own caches on top).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateAccount {
    /// Transaction count (nonce)
    pub nonce: u64,
    /// Balance
    pub balance: U256,
    /// Keccak-256 hash of contract code (`EMPTY_CODE_HASH` for EOAs)
    pub code_hash: Hash,
    /// Storage slots as loaded from the current-state store
    pub storage: HashMap<Hash, Hash>,
}

impl StateAccount {
    /// Create a new empty account
    pub fn new() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            code_hash: EMPTY_CODE_HASH,
            storage: HashMap::new(),
        }
    }

    /// An account is empty iff nonce, balance, code and storage are all
    /// unset. Empty accounts are deletable at transaction boundaries.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && self.code_hash == EMPTY_CODE_HASH
            && self.storage.is_empty()
    }

    /// Check if account has code deployed
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

impl Default for StateAccount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_empty() {
        let acct = StateAccount::new();
        assert!(acct.is_empty());
        assert!(!acct.has_code());
        assert_eq!(acct.code_hash, EMPTY_CODE_HASH);
    }

    #[test]
    fn test_nonzero_fields_break_emptiness() {
        let mut acct = StateAccount::new();
        acct.balance = U256::ONE;
        assert!(!acct.is_empty());

        let mut acct = StateAccount::new();
        acct.nonce = 1;
        assert!(!acct.is_empty());

        let mut acct = StateAccount::new();
        acct.code_hash = Hash::keccak(b"code");
        assert!(!acct.is_empty());
        assert!(acct.has_code());

        let mut acct = StateAccount::new();
        acct.storage.insert(Hash::ZERO, Hash::compute(b"v"));
        assert!(!acct.is_empty());
    }
}
