//! Buy-and-hold benchmark curves aligned to a strategy's date axis.
//!
//! Dates present in the target axis but absent from the benchmark data
//! contribute a zero return, so benchmark and strategy curves stay
//! plottable side by side even when their calendars differ.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::types::PriceMatrix;
use crate::EngineResult;

/// Cumulative growth of 1 unit held in a single benchmark asset.
pub fn single_asset_curve(
    prices: &PriceMatrix,
    ticker: &str,
    target_dates: &[NaiveDate],
) -> EngineResult<Vec<Decimal>> {
    let col = prices.ticker_index(ticker).ok_or_else(|| {
        EngineError::DataIntegrity(format!("benchmark ticker '{ticker}' not in price data"))
    })?;

    let by_date = returns_by_date(prices);
    Ok(accumulate(target_dates, |d| {
        by_date.get(d).map(|row| row[col]).unwrap_or(Decimal::ZERO)
    }))
}

/// Cumulative growth of a daily-rebalanced equal-weight basket of every
/// asset in `prices`.
pub fn equal_weight_curve(prices: &PriceMatrix, target_dates: &[NaiveDate]) -> Vec<Decimal> {
    let n = Decimal::from(prices.n_assets() as i64);
    let by_date = returns_by_date(prices);
    accumulate(target_dates, |d| {
        by_date
            .get(d)
            .map(|row| row.iter().copied().sum::<Decimal>() / n)
            .unwrap_or(Decimal::ZERO)
    })
}

fn returns_by_date(prices: &PriceMatrix) -> BTreeMap<NaiveDate, Vec<Decimal>> {
    let returns = prices.daily_returns();
    prices
        .dates()
        .iter()
        .skip(1)
        .copied()
        .zip(returns)
        .collect()
}

fn accumulate(
    target_dates: &[NaiveDate],
    ret_for: impl Fn(&NaiveDate) -> Decimal,
) -> Vec<Decimal> {
    let mut acc = Decimal::ONE;
    target_dates
        .iter()
        .map(|d| {
            acc *= Decimal::ONE + ret_for(d);
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn date(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(n)
    }

    fn prices() -> PriceMatrix {
        PriceMatrix::new(
            vec![date(0), date(1), date(2), date(3)],
            vec!["SPY".into(), "AGG".into()],
            vec![
                vec![dec!(100), dec!(50)],
                vec![dec!(110), dec!(50)],
                vec![dec!(99), dec!(51)],
                vec![dec!(99), dec!(51)],
            ],
        )
        .unwrap()
    }

    // -- 1. Single-asset curve follows the asset's price ratio --

    #[test]
    fn test_single_asset_curve() {
        let curve = single_asset_curve(&prices(), "SPY", &[date(1), date(2), date(3)]).unwrap();
        assert_eq!(curve, vec![dec!(1.1), dec!(0.99), dec!(0.99)]);
    }

    // -- 2. Dates missing from the benchmark data contribute zero return --

    #[test]
    fn test_missing_dates_zero_fill() {
        let curve = single_asset_curve(&prices(), "SPY", &[date(1), date(10)]).unwrap();
        assert_eq!(curve, vec![dec!(1.1), dec!(1.1)]);
    }

    // -- 3. Unknown ticker is a data error --

    #[test]
    fn test_unknown_ticker() {
        let err = single_asset_curve(&prices(), "QQQ", &[date(1)]);
        assert!(matches!(err, Err(EngineError::DataIntegrity(_))));
    }

    // -- 4. Equal-weight basket averages the per-asset returns --

    #[test]
    fn test_equal_weight_curve() {
        let curve = equal_weight_curve(&prices(), &[date(1)]);
        // Day 1: SPY +10%, AGG 0% -> basket +5%.
        assert_eq!(curve, vec![dec!(1.05)]);
    }
}
