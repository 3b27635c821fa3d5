//! Token amounts for the b402 protocol.
//!
//! Amounts travel over the wire as decimal strings of unsigned 256-bit
//! integers expressed in the token's smallest unit. JSON numbers are never
//! used: JavaScript peers lose precision above 2^53, and BEP-20 stablecoins on
//! BNB Chain use 18 decimals, so even a one-dollar payment overflows that range.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An unsigned 256-bit token amount that serializes as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

/// Errors produced when converting a human-readable price into a [`TokenAmount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input is not a decimal number.
    #[error("invalid decimal amount {0:?}")]
    Invalid(String),
    /// Negative amounts cannot be paid.
    #[error("amount must not be negative")]
    Negative,
    /// The input has more fractional digits than the token supports.
    #[error("amount has {scale} fractional digits, token supports {decimals}")]
    TooPrecise {
        /// Fractional digits in the input.
        scale: u32,
        /// Token decimals.
        decimals: u8,
    },
    /// The amount in base units does not fit in 256 bits.
    #[error("amount overflows 256 bits at {decimals} decimals")]
    Overflow {
        /// Token decimals.
        decimals: u8,
    },
}

impl TokenAmount {
    /// Returns the inner [`U256`] value.
    #[must_use]
    pub const fn inner(&self) -> U256 {
        self.0
    }

    /// Converts a human-readable price such as `"0.01"` into base units
    /// of a token with the given number of decimals.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if the input is not a non-negative decimal or
    /// carries more precision than the token can represent, or if the
    /// scaled amount does not fit in 256 bits.
    pub fn from_decimal_str(input: &str, decimals: u8) -> Result<Self, AmountError> {
        let value = Decimal::from_str(input.trim())
            .map_err(|_| AmountError::Invalid(input.to_owned()))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative);
        }
        let value = value.normalize();
        let scale = value.scale();
        if scale > u32::from(decimals) {
            return Err(AmountError::TooPrecise { scale, decimals });
        }
        let mantissa = U256::from(value.mantissa().unsigned_abs());
        let shift = U256::from(u32::from(decimals) - scale);
        U256::from(10u8)
            .checked_pow(shift)
            .and_then(|factor| mantissa.checked_mul(factor))
            .map(Self)
            .ok_or(AmountError::Overflow { decimals })
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl FromStr for TokenAmount {
    type Err = alloy_primitives::ruint::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s, 10).map(Self)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<Self>().map_err(|_| {
            serde::de::Error::custom("amount must be a non-negative decimal integer string")
        })
    }
}
