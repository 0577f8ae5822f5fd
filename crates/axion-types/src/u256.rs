use crate::error::TypesError;
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

/// 256-bit unsigned integer for balances, costs and gas prices.
///
/// Stored as 4 x u64 in little-endian limb order. Arithmetic is checked or
/// saturating; there is no wrapping path, so a balance can never silently go
/// negative.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u64; 4]);

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        std::cmp::Ordering::Equal
    }
}

impl U256 {
    pub const ZERO: Self = Self([0, 0, 0, 0]);
    pub const ONE: Self = Self([1, 0, 0, 0]);
    pub const MAX: Self = Self([u64::MAX, u64::MAX, u64::MAX, u64::MAX]);

    pub const fn from_limbs(limbs: [u64; 4]) -> Self {
        Self(limbs)
    }

    pub const fn as_limbs(&self) -> &[u64; 4] {
        &self.0
    }

    /// Create from a u64 value
    pub const fn from_u64(val: u64) -> Self {
        Self([val, 0, 0, 0])
    }

    /// Create from a u128 value
    pub const fn from_u128(val: u128) -> Self {
        Self([val as u64, (val >> 64) as u64, 0, 0])
    }

    /// Truncate to u64 (callers must know the value fits)
    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Checked addition
    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        let mut result = [0u64; 4];
        let mut carry = 0u64;
        for i in 0..4 {
            let (sum1, overflow1) = self.0[i].overflowing_add(rhs.0[i]);
            let (sum2, overflow2) = sum1.overflowing_add(carry);
            result[i] = sum2;
            carry = (overflow1 as u64) + (overflow2 as u64);
        }
        if carry != 0 {
            None
        } else {
            Some(Self(result))
        }
    }

    /// Checked subtraction
    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        if self < rhs {
            return None;
        }
        let mut result = [0u64; 4];
        let mut borrow = 0u64;
        for i in 0..4 {
            let (diff1, underflow1) = self.0[i].overflowing_sub(rhs.0[i]);
            let (diff2, underflow2) = diff1.overflowing_sub(borrow);
            result[i] = diff2;
            borrow = (underflow1 as u64) | (underflow2 as u64);
        }
        Some(Self(result))
    }

    /// Checked multiplication
    pub fn checked_mul(&self, rhs: &Self) -> Option<Self> {
        if self.is_zero() || rhs.is_zero() {
            return Some(Self::ZERO);
        }
        let mut acc = [0u128; 5];
        for i in 0..4 {
            for j in 0..4 {
                if self.0[i] == 0 || rhs.0[j] == 0 {
                    continue;
                }
                if i + j >= 4 {
                    return None;
                }
                let product = (self.0[i] as u128) * (rhs.0[j] as u128);
                acc[i + j] += product & (u64::MAX as u128);
                acc[i + j + 1] += product >> 64;
            }
        }
        let mut result = [0u64; 4];
        let mut carry = 0u128;
        for i in 0..4 {
            let sum = acc[i] + carry;
            result[i] = sum as u64;
            carry = sum >> 64;
        }
        if carry != 0 || acc[4] != 0 {
            return None;
        }
        Some(Self(result))
    }

    /// Saturating addition
    pub fn saturating_add(&self, rhs: &Self) -> Self {
        self.checked_add(rhs).unwrap_or(Self::MAX)
    }

    /// Saturating subtraction
    pub fn saturating_sub(&self, rhs: &Self) -> Self {
        self.checked_sub(rhs).unwrap_or(Self::ZERO)
    }

    /// Saturating multiplication
    pub fn saturating_mul(&self, rhs: &Self) -> Self {
        self.checked_mul(rhs).unwrap_or(Self::MAX)
    }

    /// Division and remainder by a small divisor.
    /// Returns None when the divisor is zero.
    pub fn div_rem_u64(&self, divisor: u64) -> Option<(Self, u64)> {
        if divisor == 0 {
            return None;
        }
        let mut quotient = [0u64; 4];
        let mut rem = 0u128;
        for i in (0..4).rev() {
            let cur = (rem << 64) | self.0[i] as u128;
            quotient[i] = (cur / divisor as u128) as u64;
            rem = cur % divisor as u128;
        }
        Some((Self(quotient), rem as u64))
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&l| l == 0)
    }

    /// Convert to big-endian bytes
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for i in 0..4 {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&self.0[3 - i].to_be_bytes());
        }
        bytes
    }

    /// Convert from big-endian bytes
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for i in 0..4 {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            limbs[3 - i] = u64::from_be_bytes(limb);
        }
        Self(limbs)
    }

    /// Parse from decimal string
    pub fn from_decimal_str(s: &str) -> Result<Self, TypesError> {
        if s.is_empty() {
            return Err(TypesError::InvalidU256String(s.to_string()));
        }
        let mut result = Self::ZERO;
        for c in s.chars() {
            if !c.is_ascii_digit() {
                return Err(TypesError::InvalidU256String(s.to_string()));
            }
            let digit = c as u64 - '0' as u64;
            result = result
                .checked_mul(&Self::from_u64(10))
                .ok_or(TypesError::U256Overflow)?;
            result = result
                .checked_add(&Self::from_u64(digit))
                .ok_or(TypesError::U256Overflow)?;
        }
        Ok(result)
    }

    /// Render as decimal string
    pub fn to_decimal_string(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        let mut cur = *self;
        while !cur.is_zero() {
            // Divisor is non-zero, the division cannot fail.
            let (q, r) = match cur.div_rem_u64(10) {
                Some(pair) => pair,
                None => break,
            };
            digits.push(b'0' + r as u8);
            cur = q;
        }
        digits.reverse();
        String::from_utf8(digits).unwrap_or_default()
    }
}

impl From<u64> for U256 {
    fn from(val: u64) -> Self {
        Self::from_u64(val)
    }
}

impl From<u128> for U256 {
    fn from(val: u128) -> Self {
        Self::from_u128(val)
    }
}

impl Add for U256 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.checked_add(&rhs).expect("U256 addition overflow")
    }
}

impl Sub for U256 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.checked_sub(&rhs).expect("U256 subtraction underflow")
    }
}

impl Mul for U256 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.checked_mul(&rhs).expect("U256 multiplication overflow")
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({})", self)
    }
}

impl FromStr for U256 {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hexpart) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let padded = format!("{:0>64}", hexpart);
            let bytes = hex::decode(&padded)?;
            let mut raw = [0u8; 32];
            raw.copy_from_slice(&bytes);
            return Ok(Self::from_be_bytes(raw));
        }
        Self::from_decimal_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_overflow() {
        assert_eq!(U256::MAX.checked_add(&U256::ONE), None);
        assert_eq!(
            U256::from(1u64).checked_add(&U256::from(2u64)),
            Some(U256::from(3u64))
        );
    }

    #[test]
    fn test_checked_sub_underflow() {
        assert_eq!(U256::ZERO.checked_sub(&U256::ONE), None);
        assert_eq!(
            U256::from(5u64).checked_sub(&U256::from(3u64)),
            Some(U256::from(2u64))
        );
    }

    #[test]
    fn test_checked_mul() {
        assert_eq!(
            U256::from(1_000_000u64).checked_mul(&U256::from(1_000_000u64)),
            Some(U256::from(1_000_000_000_000u64))
        );
        assert_eq!(U256::MAX.checked_mul(&U256::from(2u64)), None);

        // Cross-limb carry
        let a = U256::from(u64::MAX);
        let b = U256::from(u64::MAX);
        let expected = U256::from_u128((u64::MAX as u128) * (u64::MAX as u128));
        assert_eq!(a.checked_mul(&b), Some(expected));
    }

    #[test]
    fn test_div_rem_u64() {
        let (q, r) = U256::from(1234u64).div_rem_u64(100).unwrap();
        assert_eq!(q, U256::from(12u64));
        assert_eq!(r, 34);
        assert_eq!(U256::ONE.div_rem_u64(0), None);
    }

    #[test]
    fn test_ordering() {
        assert!(U256::from(2u64) > U256::from(1u64));
        let big = U256::from_limbs([0, 0, 0, 1]);
        assert!(big > U256::from(u64::MAX));
    }

    #[test]
    fn test_be_bytes_round_trip() {
        let val = U256::from_u128(0xdeadbeef_cafebabe_0123_4567u128);
        assert_eq!(U256::from_be_bytes(val.to_be_bytes()), val);
    }

    #[test]
    fn test_decimal_round_trip() {
        let val = U256::from(123_456_789u64);
        assert_eq!(U256::from_decimal_str(&val.to_decimal_string()).unwrap(), val);
        assert_eq!(U256::ZERO.to_decimal_string(), "0");
    }

    #[test]
    fn test_from_str_hex_and_decimal() {
        assert_eq!("0xff".parse::<U256>().unwrap(), U256::from(255u64));
        assert_eq!("255".parse::<U256>().unwrap(), U256::from(255u64));
        assert!("abc".parse::<U256>().is_err());
    }
}
