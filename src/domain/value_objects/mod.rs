//! Value Objects for the storefront

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CommerceError, Result};

/// Money value object, held in integral minor currency units (paise/cents).
///
/// Arithmetic is checked; an overflow is an error, never a wrapped amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(minor_units: i64) -> Self { Self(minor_units) }
    pub const fn minor_units(self) -> i64 { self.0 }

    pub fn checked_times(self, quantity: i64) -> Result<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| CommerceError::AmountOverflow(format!("{self} x {quantity}")))
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money> {
        self.0.checked_add(rhs.0).map(Money).ok_or_else(|| CommerceError::AmountOverflow(format!("{self} + {rhs}")))
    }

    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Result<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// `percent`% of this amount, rounded half-up to whole minor units.
    pub fn percent_rounded(self, percent: i64) -> Result<Money> {
        self.0
            .checked_mul(percent)
            .and_then(|v| v.checked_mul(2))
            .and_then(|v| v.checked_add(100))
            .map(|v| Money(v.div_euclid(200)))
            .ok_or_else(|| CommerceError::AmountOverflow(format!("{percent}% of {self}")))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// A calendar-month window, first to last day inclusive.
///
/// Equality and ordering are structural over `(start, end)`, so ranges can key
/// maps and be sorted chronologically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl DateRange {
    /// The month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        let start_date = date - Days::new(u64::from(date.day0()));
        let end_date = start_date
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        Self { start_date, end_date }
    }

    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::month_of)
    }

    pub fn start(&self) -> NaiveDate { self.start_date }
    pub fn end(&self) -> NaiveDate { self.end_date }
    pub fn contains(&self, date: NaiveDate) -> bool { self.start_date <= date && date <= self.end_date }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start_date, self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    #[test]
    fn test_month_bounds() {
        let jan = DateRange::month_of(ymd(2024, 1, 15));
        assert_eq!(jan.start(), ymd(2024, 1, 1));
        assert_eq!(jan.end(), ymd(2024, 1, 31));
        let feb = DateRange::for_month(2024, 2).unwrap();
        assert_eq!(feb.end(), ymd(2024, 2, 29));
        let dec = DateRange::month_of(ymd(2023, 12, 31));
        assert_eq!(dec.end(), ymd(2023, 12, 31));
        assert!(DateRange::for_month(2024, 13).is_none());
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(DateRange::month_of(ymd(2024, 3, 2)), DateRange::month_of(ymd(2024, 3, 30)));
        assert!(DateRange::for_month(2023, 12).unwrap() < DateRange::for_month(2024, 1).unwrap());
    }

    #[test]
    fn test_percent_rounds_half_up() {
        assert_eq!(Money::new(2000).percent_rounded(18).unwrap(), Money::new(360));
        assert_eq!(Money::new(2775).percent_rounded(18).unwrap(), Money::new(500));
        assert_eq!(Money::new(2774).percent_rounded(18).unwrap(), Money::new(499));
    }

    #[test]
    fn test_money_sum() {
        let total = Money::checked_sum([Money::new(100), Money::new(150)]).unwrap();
        assert_eq!(total, Money::new(250));
        assert_eq!(Money::new(50).checked_times(3).unwrap(), Money::new(150));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let big = Money::new(100_000_000);
        assert!(matches!(big.checked_times(1_000_000_000_000), Err(CommerceError::AmountOverflow(_))));
        assert!(Money::new(i64::MAX).checked_add(Money::new(1)).is_err());
        assert!(Money::checked_sum([Money::new(i64::MAX), Money::new(1)]).is_err());
        assert!(Money::new(i64::MAX / 10).percent_rounded(18).is_err());
    }
}
