//! Money in minor currency units.

use serde::{Deserialize, Serialize};

/// Money amount in minor units (paisa, cents) to avoid floating point issues.
///
/// The currency itself is a deployment setting and is carried next to the
/// amount where it matters (payment attempts), not inside every value.
///
/// Arithmetic saturates at the `i64` bounds instead of wrapping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates an amount from whole major units (100 minor units each).
    pub fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn major_part(&self) -> i64 {
        self.0 / 100
    }

    pub fn minor_part(&self) -> i64 {
        self.0.abs() % 100
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Applies a rate given in basis points (1/100 of a percent), rounding half up.
    pub fn apply_bps(&self, bps: u32) -> Money {
        let scaled = i128::from(self.0) * i128::from(bps);
        let rounded = (scaled + 5_000).div_euclid(10_000);
        Money(i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX }))
    }

    /// Formats the amount as a decimal string with two fraction digits (`"1234.50"`).
    pub fn to_decimal_string(&self) -> String {
        if self.0 < 0 {
            format!("-{}.{:02}", self.major_part().abs(), self.minor_part())
        } else {
            format!("{}.{:02}", self.major_part(), self.minor_part())
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
