//! Virtual nonce tracker: the next expected nonce per account with all
//! pool-executable transactions applied on top of the live state.

use crate::chain::SharedState;
use axion_types::Address;
use std::collections::HashMap;

pub(crate) struct Noncer {
    fallback: SharedState,
    nonces: HashMap<Address, u64>,
}

impl Noncer {
    pub(crate) fn new(fallback: SharedState) -> Self {
        Self {
            fallback,
            nonces: HashMap::new(),
        }
    }

    /// The next expected nonce, consulting the state view on first touch.
    pub(crate) fn get(&mut self, addr: Address) -> u64 {
        *self
            .nonces
            .entry(addr)
            .or_insert_with(|| self.fallback.write().get_nonce(addr))
    }

    pub(crate) fn set(&mut self, addr: Address, nonce: u64) {
        self.nonces.insert(addr, nonce);
    }

    /// Lower the tracked nonce to `nonce` if it currently sits higher.
    pub(crate) fn set_if_lower(&mut self, addr: Address, nonce: u64) {
        let current = self.get(addr);
        if current <= nonce {
            return;
        }
        self.nonces.insert(addr, nonce);
    }

    /// Replace the whole tracked set.
    pub(crate) fn set_all(&mut self, all: HashMap<Address, u64>) {
        self.nonces = all;
    }
}
