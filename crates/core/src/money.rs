//! Money in the smallest currency unit.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// An amount of money in the smallest currency unit (e.g. rupiah, cents).
///
/// Single-currency per tenant; currency symbols are a presentation concern.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn amount(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Multiply by a quantity (e.g. unit price × qty).
    pub fn times(self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Sum that stops at the first overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(iter: I) -> Option<Money> {
        iter.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// [`Money::percent_bps`] for rates that may push the result out of range.
    pub fn checked_percent_bps(self, bps: u32) -> Option<Money> {
        let raw = self.0 as i128 * bps as i128;
        let rounded = if raw >= 0 {
            (raw + 5_000) / 10_000
        } else {
            (raw - 5_000) / 10_000
        };
        i64::try_from(rounded).ok().map(Money)
    }

    /// Basis-point share of this amount, rounded half away from zero.
    ///
    /// `Money::new(10_000).percent_bps(1_100)` is 11% = 1_100.
    pub fn percent_bps(self, bps: u32) -> Money {
        let raw = self.0 as i128 * bps as i128;
        let rounded = if raw >= 0 {
            (raw + 5_000) / 10_000
        } else {
            (raw - 5_000) / 10_000
        };
        Money(rounded as i64)
    }

    pub fn min(self, other: Money) -> Money {
        if self <= other { self } else { other }
    }

    pub fn max(self, other: Money) -> Money {
        if self >= other { self } else { other }
    }

    /// Clamp negatives to zero.
    pub fn non_negative(self) -> Money {
        self.max(Money::ZERO)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money(value)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::new(10_000).percent_bps(1_100), Money::new(1_100));
        // 15 * 11% = 1.65 -> 2
        assert_eq!(Money::new(15).percent_bps(1_100), Money::new(2));
        // 5 * 10% = 0.5 -> 1
        assert_eq!(Money::new(5).percent_bps(1_000), Money::new(1));
        assert_eq!(Money::new(-5).percent_bps(1_000), Money::new(-1));
    }

    #[test]
    fn serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::new(12_500)).unwrap();
        assert_eq!(json, "12500");
    }

    #[test]
    fn checked_helpers_refuse_overflow() {
        let big = Money::new(i64::MAX / 2 + 1);
        assert_eq!(Money::checked_sum([big, Money::new(1)]), Some(Money::new(i64::MAX / 2 + 2)));
        assert_eq!(Money::checked_sum([big, big]), None);
        assert_eq!(Money::checked_sum(std::iter::empty()), Some(Money::ZERO));
        assert_eq!(Money::new(i64::MAX).checked_percent_bps(20_000), None);
        assert_eq!(Money::new(10_000).checked_percent_bps(1_100), Some(Money::new(1_100)));
    }

    proptest! {
        #[test]
        fn full_percentage_is_identity(amount in -1_000_000_000i64..1_000_000_000i64) {
            prop_assert_eq!(Money::new(amount).percent_bps(10_000), Money::new(amount));
        }

        #[test]
        fn percent_never_exceeds_base(amount in 0i64..1_000_000_000i64, bps in 0u32..=10_000u32) {
            let part = Money::new(amount).percent_bps(bps);
            prop_assert!(part <= Money::new(amount));
            prop_assert!(!part.is_negative());
        }
    }
}
