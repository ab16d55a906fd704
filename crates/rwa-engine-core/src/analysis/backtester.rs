//! Walk-forward backtester with per-rebalance weight tracking.
//!
//! Rebalance boundaries advance by a fixed observation stride, not by
//! calendar arithmetic, so weekend and holiday gaps never desynchronise
//! the schedule from the data. Between boundaries the committed weights
//! are held; a strategy that fails to rebalance keeps its previous
//! weights and the failure is recorded as a warning.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analysis::strategies::Strategy;
use crate::error::EngineError;
use crate::types::{with_metadata, ComputationOutput, PriceMatrix, WeightMap, CASH_TICKER};
use crate::EngineResult;

/// Default observation stride between rebalances (roughly one month of
/// trading days).
pub const DEFAULT_REBALANCE_FREQ_DAYS: usize = 20;

/// Calendar depth of the lookback window handed to each strategy.
const LOOKBACK_DAYS: i64 = 365;

/// Rebalancing is skipped while the lookback window holds fewer
/// observations than this.
const MIN_LOOKBACK_OBS: usize = 100;

/// Committed weights at one rebalance boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub date: NaiveDate,
    pub weights: WeightMap,
}

/// Aligned result curves for every strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOutput {
    /// Shared date axis of the return curves.
    pub dates: Vec<NaiveDate>,
    /// Cumulative growth of 1 unit per strategy, aligned to `dates`.
    pub cumulative_returns: BTreeMap<String, Vec<Decimal>>,
    /// Weight snapshots recorded at each successful rebalance.
    pub weights_history: BTreeMap<String, Vec<WeightSnapshot>>,
}

pub struct WalkForwardBacktester {
    prices: PriceMatrix,
    strategies: Vec<Box<dyn Strategy>>,
}

impl WalkForwardBacktester {
    pub fn new(prices: PriceMatrix, strategies: Vec<Box<dyn Strategy>>) -> EngineResult<Self> {
        if strategies.is_empty() {
            return Err(EngineError::Configuration {
                field: "strategies".into(),
                reason: "at least one strategy is required".into(),
            });
        }
        Ok(Self { prices, strategies })
    }

    /// Run the walk-forward evaluation from the observation nearest to
    /// `start_date`, rebalancing every `rebalance_freq_days` observations.
    ///
    /// All strategies see the same windows and the same return stream;
    /// only their weights differ, so the output curves are directly
    /// comparable.
    pub fn run(
        &self,
        start_date: NaiveDate,
        rebalance_freq_days: usize,
    ) -> EngineResult<ComputationOutput<BacktestOutput>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        if rebalance_freq_days == 0 {
            return Err(EngineError::Configuration {
                field: "rebalance_freq_days".into(),
                reason: "must be at least 1".into(),
            });
        }

        let all_dates = self.prices.dates();
        let start_idx = self.prices.nearest_index(start_date);
        let boundaries: Vec<usize> =
            (start_idx..self.prices.n_obs()).step_by(rebalance_freq_days).collect();

        let mut current: BTreeMap<String, WeightMap> = self
            .strategies
            .iter()
            .map(|s| {
                let mut w = WeightMap::new();
                w.insert(CASH_TICKER.to_string(), Decimal::ONE);
                (s.name().to_string(), w)
            })
            .collect();

        let mut dates_axis: Vec<NaiveDate> = Vec::new();
        let mut daily: BTreeMap<String, Vec<Decimal>> = self
            .strategies
            .iter()
            .map(|s| (s.name().to_string(), Vec::new()))
            .collect();
        let mut history: BTreeMap<String, Vec<WeightSnapshot>> = self
            .strategies
            .iter()
            .map(|s| (s.name().to_string(), Vec::new()))
            .collect();

        if boundaries.len() < 2 {
            warnings.push(format!(
                "Not enough observations after {start_date} for a single rebalance period."
            ));
        }

        for pair in boundaries.windows(2) {
            let (idx, next_idx) = (pair[0], pair[1]);
            let date = all_dates[idx];

            let lookback = self
                .prices
                .slice_range(date - Duration::days(LOOKBACK_DAYS), date);
            if lookback.n_obs() > MIN_LOOKBACK_OBS {
                for strat in &self.strategies {
                    match strat.rebalance(&lookback) {
                        Ok(weights) if !weights.is_empty() => {
                            if let Some(snaps) = history.get_mut(strat.name()) {
                                snaps.push(WeightSnapshot {
                                    date,
                                    weights: weights.clone(),
                                });
                            }
                            current.insert(strat.name().to_string(), weights);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warnings.push(format!(
                                "Strategy '{}' failed at {date}: {e}. Holding previous weights.",
                                strat.name()
                            ));
                        }
                    }
                }
            }

            // Period returns between this boundary and the next; weights
            // stay committed for the whole stretch.
            for t in idx..next_idx {
                dates_axis.push(all_dates[t + 1]);
                let prev = self.prices.row(t);
                let cur = self.prices.row(t + 1);

                for strat in &self.strategies {
                    let weights = &current[strat.name()];
                    let mut ret = Decimal::ZERO;
                    for (ticker, weight) in weights {
                        if ticker == CASH_TICKER {
                            continue;
                        }
                        if let Some(col) = self.prices.ticker_index(ticker) {
                            ret += weight * (cur[col] / prev[col] - Decimal::ONE);
                        }
                    }
                    if let Some(series) = daily.get_mut(strat.name()) {
                        series.push(ret);
                    }
                }
            }
        }

        let cumulative_returns: BTreeMap<String, Vec<Decimal>> = daily
            .into_iter()
            .map(|(name, series)| {
                let mut acc = Decimal::ONE;
                let curve: Vec<Decimal> = series
                    .iter()
                    .map(|r| {
                        acc *= Decimal::ONE + r;
                        acc
                    })
                    .collect();
                (name, curve)
            })
            .collect();

        let output = BacktestOutput {
            dates: dates_axis,
            cumulative_returns,
            weights_history: history,
        };

        Ok(with_metadata(
            "Walk-Forward Backtest",
            &serde_json::json!({
                "start_date": start_date.to_string(),
                "rebalance_freq_days": rebalance_freq_days,
                "lookback_days": LOOKBACK_DAYS,
                "min_lookback_obs": MIN_LOOKBACK_OBS,
                "n_strategies": self.strategies.len(),
            }),
            warnings,
            start.elapsed().as_micros() as u64,
            output,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FixedStrategy {
        name: String,
        weights: WeightMap,
    }

    impl Strategy for FixedStrategy {
        fn name(&self) -> &str {
            &self.name
        }
        fn rebalance(&self, _history: &PriceMatrix) -> EngineResult<WeightMap> {
            Ok(self.weights.clone())
        }
    }

    struct FailingStrategy;

    impl Strategy for FailingStrategy {
        fn name(&self) -> &str {
            "Broken"
        }
        fn rebalance(&self, _history: &PriceMatrix) -> EngineResult<WeightMap> {
            Err(EngineError::InfeasibleOptimization("always fails".into()))
        }
    }

    fn date(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    /// 160 daily observations: A compounds 1% per day, B is flat.
    fn prices() -> PriceMatrix {
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        let mut a = dec!(100);
        for i in 0..160 {
            dates.push(date(i));
            rows.push(vec![a, dec!(50)]);
            a *= dec!(1.01);
        }
        PriceMatrix::new(dates, vec!["A".into(), "B".into()], rows).unwrap()
    }

    fn all_in_a() -> WeightMap {
        let mut w = WeightMap::new();
        w.insert("A".to_string(), Decimal::ONE);
        w
    }

    // -- 1. Single-asset strategy tracks the asset's growth --

    #[test]
    fn test_committed_weights_track_returns() {
        let bt = WalkForwardBacktester::new(
            prices(),
            vec![Box::new(FixedStrategy {
                name: "AllA".into(),
                weights: all_in_a(),
            })],
        )
        .unwrap();

        let out = bt.run(date(120), 20).unwrap();
        let curve = &out.result.cumulative_returns["AllA"];

        // One rebalance pair (indices 120 and 140) gives 20 return days.
        assert_eq!(curve.len(), 20);
        assert_eq!(out.result.dates.len(), 20);
        assert_eq!(out.result.dates[0], date(121));
        assert!((curve[0] - dec!(1.01)).abs() < dec!(0.0001));
        // 1.01^20 ≈ 1.2202
        assert!((curve[19] - dec!(1.2202)).abs() < dec!(0.001));
    }

    // -- 2. Weight snapshots are recorded at rebalance boundaries --

    #[test]
    fn test_weight_snapshots() {
        let bt = WalkForwardBacktester::new(
            prices(),
            vec![Box::new(FixedStrategy {
                name: "AllA".into(),
                weights: all_in_a(),
            })],
        )
        .unwrap();

        let out = bt.run(date(120), 20).unwrap();
        let snaps = &out.result.weights_history["AllA"];
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].date, date(120));
        assert_eq!(snaps[0].weights["A"], Decimal::ONE);
    }

    // -- 3. A failing strategy is isolated and stays in cash --

    #[test]
    fn test_failure_isolation() {
        let bt = WalkForwardBacktester::new(
            prices(),
            vec![
                Box::new(FixedStrategy {
                    name: "AllA".into(),
                    weights: all_in_a(),
                }),
                Box::new(FailingStrategy),
            ],
        )
        .unwrap();

        let out = bt.run(date(120), 20).unwrap();

        assert!(out.warnings.iter().any(|w| w.contains("Broken")));
        // The failing strategy never leaves its initial cash position.
        for v in &out.result.cumulative_returns["Broken"] {
            assert_eq!(*v, Decimal::ONE);
        }
        // The healthy strategy is unaffected.
        assert!(out.result.cumulative_returns["AllA"][19] > Decimal::ONE);
    }

    // -- 4. Shallow lookback suppresses rebalancing --

    #[test]
    fn test_shallow_lookback_keeps_cash() {
        // 90 observations total: every lookback stays below the
        // 100-observation floor, so no rebalance ever fires.
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        let mut a = dec!(100);
        for i in 0..90 {
            dates.push(date(i));
            rows.push(vec![a, dec!(50)]);
            a *= dec!(1.01);
        }
        let short = PriceMatrix::new(dates, vec!["A".into(), "B".into()], rows).unwrap();

        let bt = WalkForwardBacktester::new(
            short,
            vec![Box::new(FixedStrategy {
                name: "AllA".into(),
                weights: all_in_a(),
            })],
        )
        .unwrap();

        let out = bt.run(date(0), 30).unwrap();
        assert!(out.result.weights_history["AllA"].is_empty());
        for v in &out.result.cumulative_returns["AllA"] {
            assert_eq!(*v, Decimal::ONE);
        }
    }

    // -- 5. Zero-volatility prices keep the curve at exactly 1 --

    #[test]
    fn test_flat_prices_flat_curve() {
        // Fully invested in a risk asset whose price never moves: every
        // daily return is zero, so cumulative growth stays at exactly 1.
        let dates: Vec<NaiveDate> = (0..160).map(date).collect();
        let rows = vec![vec![dec!(100), dec!(50)]; 160];
        let flat = PriceMatrix::new(dates, vec!["A".into(), "B".into()], rows).unwrap();

        let bt = WalkForwardBacktester::new(
            flat,
            vec![Box::new(FixedStrategy {
                name: "AllA".into(),
                weights: all_in_a(),
            })],
        )
        .unwrap();

        let out = bt.run(date(120), 20).unwrap();
        // The lookback holds 121 observations, so the rebalance fires and
        // the strategy really is committed to the risk asset.
        assert_eq!(out.result.weights_history["AllA"].len(), 1);

        let curve = &out.result.cumulative_returns["AllA"];
        assert_eq!(curve.len(), 20);
        for v in curve {
            assert_eq!(*v, Decimal::ONE);
        }
    }

    // -- 6. Degenerate windows produce an empty, warned output --

    #[test]
    fn test_too_short_for_one_period() {
        let bt = WalkForwardBacktester::new(
            prices(),
            vec![Box::new(FixedStrategy {
                name: "AllA".into(),
                weights: all_in_a(),
            })],
        )
        .unwrap();

        let out = bt.run(date(159), 200).unwrap();
        assert!(out.result.dates.is_empty());
        assert!(out.warnings.iter().any(|w| w.contains("Not enough")));
    }

    // -- 7. Parameter validation --

    #[test]
    fn test_validation() {
        assert!(matches!(
            WalkForwardBacktester::new(prices(), Vec::new()),
            Err(EngineError::Configuration { .. })
        ));

        let bt = WalkForwardBacktester::new(
            prices(),
            vec![Box::new(FixedStrategy {
                name: "AllA".into(),
                weights: all_in_a(),
            })],
        )
        .unwrap();
        assert!(matches!(
            bt.run(date(120), 0),
            Err(EngineError::Configuration { .. })
        ));
    }
}
