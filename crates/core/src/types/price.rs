//! Type-safe price representation using decimal arithmetic.
//!
//! The product store is inconsistent about how it encodes prices: Firestore
//! documents carry JSON numbers (`29.99`) while Baserow decimal columns come
//! back as strings (`"29.99"`). [`Price`] accepts both and always emits a JSON
//! number, which is the shape the assistant prompt templates embed.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A price in the store currency (USD), in whole units (dollars, not cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(Decimal);

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from an integer number of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the price is zero (treated as "missing" by admin validation).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0.to_f64().unwrap_or_default())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
    Null(()),
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = match RawPrice::deserialize(deserializer)? {
            RawPrice::Number(n) => Decimal::from_f64(n)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid price: {n}")))?,
            RawPrice::Null(()) => Decimal::ZERO,
            RawPrice::Text(s) if s.trim().is_empty() => Decimal::ZERO,
            RawPrice::Text(s) => s
                .trim()
                .parse::<Decimal>()
                .map_err(|e| serde::de::Error::custom(format!("invalid price {s:?}: {e}")))?,
        };
        // Float inputs like 29.99 can pick up representation noise.
        Ok(Self(amount.round_dp(2)))
    }
}
