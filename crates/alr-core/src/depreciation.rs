//! Straight-line depreciation calculator.
//!
//! Pure and deterministic: the evaluation date is an explicit input, so the
//! same inputs always produce the same schedule. Every named step rounds to
//! 3 decimals half-up, not only the final value.

use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::LedgerAsset;
use crate::money::round3;

/// Errors raised by the depreciation calculator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepreciationError {
    /// An input failed validation. The ledger is untouched.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Inputs to one depreciation calculation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepreciationInput {
    /// Acquisition cost, must be positive.
    pub initial_cost: Decimal,
    /// Residual value at end of life, non-negative, at most the cost.
    pub salvage_value: Decimal,
    /// Depreciation horizon in months, must be positive.
    pub useful_life_months: u32,
    /// Date the asset entered service.
    pub date_of_service: NaiveDate,
    /// Physical installation date; service may not precede it.
    pub installation_date: Option<NaiveDate>,
    /// Manual adjustment folded into accumulated depreciation.
    pub adjustment: Decimal,
    /// Write-off date; caps utilisation at that month's end.
    pub write_off_date: Option<NaiveDate>,
}

impl DepreciationInput {
    /// Builds an input from a ledger row, overriding the adjustment.
    /// Fails when the row lacks a cost, a useful life, or a service date.
    pub fn from_asset(
        asset: &LedgerAsset,
        adjustment: Decimal,
    ) -> Result<Self, DepreciationError> {
        let initial_cost = asset
            .initial_cost
            .ok_or_else(|| DepreciationError::Validation("initial cost is not set".into()))?;
        let useful_life_months = asset
            .useful_life_months
            .ok_or_else(|| DepreciationError::Validation("useful life is not set".into()))?;
        let date_of_service = asset
            .date_of_service
            .ok_or_else(|| DepreciationError::Validation("date of service is not set".into()))?;
        Ok(Self {
            initial_cost,
            salvage_value: asset.salvage_value.unwrap_or(Decimal::ZERO),
            useful_life_months,
            date_of_service,
            installation_date: asset.installation_date,
            adjustment,
            write_off_date: asset.write_off_date,
        })
    }
}

/// The computed schedule for one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepreciationSchedule {
    /// Depreciation charged per utilised month.
    pub monthly: Decimal,
    /// Whole months utilised up to the evaluation cutoff.
    pub months_utilised: u32,
    /// Total depreciation accumulated so far, adjustment included.
    pub accumulated: Decimal,
    /// Remaining book value, never below salvage.
    pub net_cost: Decimal,
    /// Projected or write-off-driven retirement date.
    pub retirement_date: NaiveDate,
    /// Whether the asset has reached its depreciable floor.
    pub fully_depreciated: bool,
}

/// First day of the month after `date`'s month.
fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let first = date
        .with_day(1)
        .unwrap_or(date);
    first + Months::new(1)
}

/// Last day of `date`'s month.
fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_next_month(date) - Days::new(1)
}

/// Whole months elapsed from `start` to `end`; zero when `end` precedes
/// `start`.
fn whole_months_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    let mut months =
        (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32);
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0) as u32
}

fn validate(input: &DepreciationInput) -> Result<(), DepreciationError> {
    if input.initial_cost <= Decimal::ZERO {
        return Err(DepreciationError::Validation(
            "initial cost must be positive".into(),
        ));
    }
    if input.salvage_value < Decimal::ZERO {
        return Err(DepreciationError::Validation(
            "salvage value must not be negative".into(),
        ));
    }
    if input.salvage_value > input.initial_cost {
        return Err(DepreciationError::Validation(
            "salvage value must not exceed the initial cost".into(),
        ));
    }
    if input.useful_life_months == 0 {
        return Err(DepreciationError::Validation(
            "useful life must be positive".into(),
        ));
    }
    if let Some(installed) = input.installation_date {
        if input.date_of_service < installed {
            return Err(DepreciationError::Validation(
                "date of service must not precede the installation date".into(),
            ));
        }
    }
    if input.adjustment.abs() >= input.initial_cost {
        return Err(DepreciationError::Validation(
            "adjustment magnitude must be below the initial cost".into(),
        ));
    }
    Ok(())
}

/// Computes the schedule for `input` as of `as_of`.
pub fn calculate(
    input: &DepreciationInput,
    as_of: NaiveDate,
) -> Result<DepreciationSchedule, DepreciationError> {
    validate(input)?;

    let depreciable = round3(input.initial_cost - input.salvage_value);
    let monthly = round3(depreciable / Decimal::from(input.useful_life_months));

    // Depreciation starts the month after the asset enters service.
    let start = first_of_next_month(input.date_of_service);
    let cutoff = match input.write_off_date {
        Some(wo) => as_of.min(last_of_month(wo)),
        None => as_of,
    };
    let months_utilised = whole_months_between(start, cutoff);

    let raw = round3(monthly * Decimal::from(months_utilised) + input.adjustment);
    let mut accumulated = raw.min(depreciable).max(Decimal::ZERO);
    if accumulated + input.adjustment > input.initial_cost {
        return Err(DepreciationError::Validation(
            "accumulated depreciation plus adjustment exceeds the initial cost".into(),
        ));
    }

    let remaining = round3(input.initial_cost - accumulated);
    let mut fully_depreciated = false;
    let net_cost = if remaining <= input.salvage_value {
        // Floor reached: pin the book value to salvage.
        accumulated = depreciable;
        fully_depreciated = true;
        input.salvage_value
    } else {
        remaining
    };
    if accumulated == depreciable {
        fully_depreciated = true;
    }

    let retirement_date = match input.write_off_date {
        Some(wo) => last_of_month(wo),
        None => start + Months::new(input.useful_life_months) - Days::new(1),
    };

    Ok(DepreciationSchedule {
        monthly,
        months_utilised,
        accumulated: round3(accumulated),
        net_cost: round3(net_cost),
        retirement_date,
        fully_depreciated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_input() -> DepreciationInput {
        DepreciationInput {
            initial_cost: dec!(12000),
            salvage_value: Decimal::ZERO,
            useful_life_months: 24,
            date_of_service: ymd(2023, 1, 15),
            installation_date: None,
            adjustment: Decimal::ZERO,
            write_off_date: None,
        }
    }

    #[test]
    fn straight_line_schedule_mid_life() {
        let schedule = calculate(&base_input(), ymd(2023, 7, 1)).unwrap();
        assert_eq!(schedule.monthly, dec!(500.000));
        assert_eq!(schedule.months_utilised, 5);
        assert_eq!(schedule.accumulated, dec!(2500.000));
        assert_eq!(schedule.net_cost, dec!(9500.000));
        assert_eq!(schedule.retirement_date, ymd(2025, 1, 31));
        assert!(!schedule.fully_depreciated);
    }

    #[test]
    fn adjustment_adds_to_accumulated() {
        let mut input = base_input();
        input.adjustment = dec!(1000);
        let schedule = calculate(&input, ymd(2023, 7, 1)).unwrap();
        assert_eq!(schedule.accumulated, dec!(3500.000));
        assert_eq!(schedule.net_cost, dec!(8500.000));
    }

    #[test]
    fn evaluation_before_first_full_month_utilises_nothing() {
        let schedule = calculate(&base_input(), ymd(2023, 1, 31)).unwrap();
        assert_eq!(schedule.months_utilised, 0);
        assert_eq!(schedule.accumulated, dec!(0.000));
        assert_eq!(schedule.net_cost, dec!(12000.000));
    }

    #[test]
    fn write_off_caps_utilisation_and_retirement() {
        let mut input = base_input();
        input.write_off_date = Some(ymd(2023, 4, 10));
        let schedule = calculate(&input, ymd(2024, 1, 1)).unwrap();
        // Cutoff is April's month end: February and March fully elapsed.
        assert_eq!(schedule.months_utilised, 2);
        assert_eq!(schedule.retirement_date, ymd(2023, 4, 30));
    }

    #[test]
    fn fully_depreciated_pins_net_cost_to_salvage() {
        let mut input = base_input();
        input.salvage_value = dec!(500);
        let schedule = calculate(&input, ymd(2030, 1, 1)).unwrap();
        assert_eq!(schedule.net_cost, dec!(500.000));
        assert_eq!(schedule.accumulated, dec!(11500.000));
        assert!(schedule.fully_depreciated);
    }

    #[test]
    fn accumulated_never_exceeds_depreciable_base() {
        // Long past end of life.
        let input = base_input();
        let schedule = calculate(&input, ymd(2031, 6, 1)).unwrap();
        assert_eq!(schedule.accumulated, dec!(12000.000));
        assert_eq!(schedule.net_cost, dec!(0.000));
        assert!(schedule.fully_depreciated);
    }

    #[test]
    fn adjustment_on_top_of_a_full_write_down_is_rejected() {
        let mut input = base_input();
        input.adjustment = dec!(3000);
        let err = calculate(&input, ymd(2031, 6, 1)).unwrap_err();
        assert!(matches!(err, DepreciationError::Validation(_)));
    }

    #[test]
    fn negative_adjustment_never_drives_accumulated_below_zero() {
        let mut input = base_input();
        input.adjustment = dec!(-3000);
        let schedule = calculate(&input, ymd(2023, 3, 1)).unwrap();
        assert_eq!(schedule.accumulated, dec!(0.000));
        assert_eq!(schedule.net_cost, dec!(12000.000));
    }

    #[test]
    fn idempotent_for_identical_inputs() {
        let input = base_input();
        let first = calculate(&input, ymd(2023, 9, 15)).unwrap();
        let second = calculate(&input, ymd(2023, 9, 15)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn invariants_hold_across_evaluation_dates() {
        let mut input = base_input();
        input.salvage_value = dec!(750);
        let depreciable = input.initial_cost - input.salvage_value;
        let mut date = ymd(2023, 1, 1);
        while date < ymd(2026, 6, 1) {
            let schedule = calculate(&input, date).unwrap();
            assert!(schedule.accumulated <= depreciable);
            assert!(schedule.net_cost >= input.salvage_value);
            date = date + Months::new(1);
        }
    }

    #[test]
    fn rejects_invalid_inputs() {
        let mut input = base_input();
        input.initial_cost = Decimal::ZERO;
        assert!(matches!(
            calculate(&input, ymd(2023, 7, 1)),
            Err(DepreciationError::Validation(_))
        ));

        let mut input = base_input();
        input.salvage_value = dec!(13000);
        assert!(calculate(&input, ymd(2023, 7, 1)).is_err());

        let mut input = base_input();
        input.useful_life_months = 0;
        assert!(calculate(&input, ymd(2023, 7, 1)).is_err());

        let mut input = base_input();
        input.installation_date = Some(ymd(2023, 2, 1));
        assert!(calculate(&input, ymd(2023, 7, 1)).is_err());

        let mut input = base_input();
        input.adjustment = dec!(-12000);
        assert!(calculate(&input, ymd(2023, 7, 1)).is_err());
    }

    #[test]
    fn month_arithmetic_handles_year_boundaries() {
        assert_eq!(first_of_next_month(ymd(2023, 12, 20)), ymd(2024, 1, 1));
        assert_eq!(last_of_month(ymd(2024, 2, 10)), ymd(2024, 2, 29));
        assert_eq!(whole_months_between(ymd(2023, 2, 1), ymd(2023, 7, 1)), 5);
        assert_eq!(whole_months_between(ymd(2023, 7, 1), ymd(2023, 2, 1)), 0);
        assert_eq!(whole_months_between(ymd(2023, 2, 1), ymd(2024, 2, 1)), 12);
    }
}
