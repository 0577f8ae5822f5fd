//! Stateless transaction checks shared by admission and replay paths.

use crate::error::PoolError;
use axion_types::SignedTransaction;

/// Unit of pool slot accounting, in bytes.
pub const TX_SLOT_SIZE: usize = 32 * 1024;

/// Maximum encoded transaction size accepted by the pool (4 slots). Bigger
/// payloads are a cheap denial-of-service vector.
pub const TX_MAX_SIZE: usize = 4 * TX_SLOT_SIZE;

const TX_GAS: u64 = 21_000;
const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Number of pool slots a transaction occupies: `⌈size / slot_size⌉`.
pub fn num_slots(tx: &SignedTransaction) -> u64 {
    ((tx.size() + TX_SLOT_SIZE - 1) / TX_SLOT_SIZE) as u64
}

/// Gas consumed before any execution happens: the base stipend plus the
/// per-byte cost of the payload.
pub fn intrinsic_gas(payload: &[u8], is_create: bool) -> Result<u64, PoolError> {
    let mut gas = if is_create {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    if !payload.is_empty() {
        let nonzero = payload.iter().filter(|b| **b != 0).count() as u64;
        let zero = payload.len() as u64 - nonzero;
        gas = nonzero
            .checked_mul(TX_DATA_NON_ZERO_GAS)
            .and_then(|g| g.checked_add(gas))
            .ok_or(PoolError::IntrinsicGas)?;
        gas = zero
            .checked_mul(TX_DATA_ZERO_GAS)
            .and_then(|g| g.checked_add(gas))
            .ok_or(PoolError::IntrinsicGas)?;
    }
    Ok(gas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axion_types::{Address, Ed25519PublicKey, Ed25519Signature, Transaction, U256};

    #[test]
    fn test_intrinsic_gas_plain_transfer() {
        assert_eq!(intrinsic_gas(&[], false).unwrap(), 21_000);
        assert_eq!(intrinsic_gas(&[], true).unwrap(), 53_000);
    }

    #[test]
    fn test_intrinsic_gas_counts_bytes() {
        // 2 nonzero + 3 zero bytes
        let payload = [1u8, 2, 0, 0, 0];
        assert_eq!(
            intrinsic_gas(&payload, false).unwrap(),
            21_000 + 2 * 16 + 3 * 4
        );
    }

    #[test]
    fn test_num_slots() {
        let tx = Transaction::new(
            0,
            Some(Address::ZERO),
            U256::from(1u64),
            21_000,
            U256::ONE,
            vec![0u8; TX_SLOT_SIZE],
        );
        let signed = SignedTransaction::new(
            tx,
            Ed25519Signature::from_bytes([1u8; 64]),
            Ed25519PublicKey::from_bytes([1u8; 32]),
        );
        // Payload fills one slot, envelope spills into a second
        assert_eq!(num_slots(&signed), 2);
    }
}
