use serde::{Deserialize, Serialize};

/// An amount of money in minor currency units (cents).
///
/// Stored as a signed integer so that balance arithmetic is exact; the
/// currency itself travels next to the amount as a separate field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates an amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the amount in minor units.
    pub fn as_cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
