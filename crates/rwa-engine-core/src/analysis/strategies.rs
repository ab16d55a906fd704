//! Rebalancing strategies evaluated by the walk-forward backtester.
//!
//! A strategy turns a window of price history into a target weight map.
//! Guardrails are optional per strategy so raw and guardrailed variants of
//! the same model can be compared side by side.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::covariance::{ledoit_wolf, mean_historical_return};
use crate::core::engine::BlackLittermanEngine;
use crate::core::optimizer::{max_sharpe, RISK_FREE_RATE};
use crate::execution::RiskGuardrailEngine;
use crate::strategy::ViewGenerator;
use crate::types::{OptimizationResult, PriceMatrix, StrategyConfig, WeightMap};
use crate::EngineResult;

/// Default market cap assigned to every ticker when no real caps are
/// available, giving an equal-weight market prior.
const MOCK_MARKET_CAP: Decimal = dec!(1000000000000);

pub trait Strategy {
    fn name(&self) -> &str;

    /// Produce target weights from the lookback window. Errors are
    /// isolated per strategy by the backtester; the previous weights stay
    /// committed.
    fn rebalance(&self, history: &PriceMatrix) -> EngineResult<WeightMap>;
}

fn apply_risk_or_pass(
    guardrails: Option<&RiskGuardrailEngine>,
    raw: &OptimizationResult,
) -> EngineResult<WeightMap> {
    match guardrails {
        Some(engine) => Ok(engine.apply_guardrails(raw)?.result.weight_map()),
        None => Ok(raw.weight_map()),
    }
}

/// Classical mean-variance tangency portfolio on historical returns.
pub struct MarkowitzStrategy {
    name: String,
    guardrails: Option<RiskGuardrailEngine>,
}

impl MarkowitzStrategy {
    pub fn new(name: impl Into<String>, guardrails: Option<RiskGuardrailEngine>) -> Self {
        Self {
            name: name.into(),
            guardrails,
        }
    }
}

impl Strategy for MarkowitzStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn rebalance(&self, history: &PriceMatrix) -> EngineResult<WeightMap> {
        let mu = mean_historical_return(history)?;
        let sigma = ledoit_wolf(history)?;
        let raw = max_sharpe(history.tickers(), &mu, &sigma, RISK_FREE_RATE)?;
        apply_risk_or_pass(self.guardrails.as_ref(), &raw)
    }
}

/// Black-Litterman strategy with a pluggable view source.
///
/// When no market caps are supplied every ticker gets [`MOCK_MARKET_CAP`],
/// which collapses the prior to equal market weights.
pub struct BlStrategy {
    name: String,
    guardrails: Option<RiskGuardrailEngine>,
    config: StrategyConfig,
    view_source: Box<dyn ViewGenerator + Send + Sync>,
    market_caps: Option<BTreeMap<String, Decimal>>,
}

impl BlStrategy {
    pub fn new(
        name: impl Into<String>,
        guardrails: Option<RiskGuardrailEngine>,
        config: StrategyConfig,
        view_source: Box<dyn ViewGenerator + Send + Sync>,
    ) -> Self {
        Self {
            name: name.into(),
            guardrails,
            config,
            view_source,
            market_caps: None,
        }
    }

    pub fn with_market_caps(mut self, caps: BTreeMap<String, Decimal>) -> Self {
        self.market_caps = Some(caps);
        self
    }

    fn resolve_caps(&self, history: &PriceMatrix) -> BTreeMap<String, Decimal> {
        match &self.market_caps {
            Some(caps) => caps.clone(),
            None => history
                .tickers()
                .iter()
                .map(|t| (t.clone(), MOCK_MARKET_CAP))
                .collect(),
        }
    }
}

impl Strategy for BlStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn rebalance(&self, history: &PriceMatrix) -> EngineResult<WeightMap> {
        let views = self.view_source.generate_views(&history.latest_prices()?)?;
        let engine = BlackLittermanEngine::new(history.clone(), self.config.clone())?;
        let caps = self.resolve_caps(history);
        let out = engine.run_optimization(&caps, &views)?;
        apply_risk_or_pass(self.guardrails.as_ref(), &out.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ManualViewGenerator;
    use crate::types::{InvestorView, CASH_TICKER};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn trending_prices(n_obs: u32) -> PriceMatrix {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        let (mut a, mut b) = (dec!(100), dec!(80));
        for i in 0..n_obs {
            dates.push(base + chrono::Duration::days(i as i64));
            rows.push(vec![a, b]);
            match i % 3 {
                0 => {
                    a *= dec!(1.02);
                    b *= dec!(1.002);
                }
                1 => {
                    a *= dec!(0.995);
                    b *= dec!(1.008);
                }
                _ => {
                    a *= dec!(1.004);
                    b *= dec!(0.999);
                }
            }
        }
        PriceMatrix::new(dates, vec!["A".into(), "B".into()], rows).unwrap()
    }

    // -- 1. Markowitz without guardrails: fully invested in risk assets --

    #[test]
    fn test_markowitz_raw_weights() {
        let strat = MarkowitzStrategy::new("MVO", None);
        let weights = strat.rebalance(&trending_prices(60)).unwrap();

        assert!(!weights.contains_key(CASH_TICKER));
        let total: Decimal = weights.values().copied().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));
    }

    // -- 2. Guardrailed variant carries an explicit cash position --

    #[test]
    fn test_markowitz_guardrailed_has_cash() {
        let guard = RiskGuardrailEngine::new(dec!(0.05), dec!(0.60)).unwrap();
        let strat = MarkowitzStrategy::new("MVO+Risk", Some(guard));
        let weights = strat.rebalance(&trending_prices(60)).unwrap();

        assert!(weights.contains_key(CASH_TICKER));
        assert!(weights[CASH_TICKER] >= dec!(0.05));
        let total: Decimal = weights.values().copied().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));
    }

    // -- 3. Black-Litterman strategy with manual views --

    #[test]
    fn test_bl_strategy_with_views() {
        let views = vec![InvestorView {
            assets: vec!["A".into()],
            weights: vec![dec!(1)],
            expected_return: dec!(0.25),
            confidence: dec!(0.8),
            description: Some("momentum".into()),
        }];
        let strat = BlStrategy::new(
            "BL",
            None,
            StrategyConfig::default(),
            Box::new(ManualViewGenerator::new(views)),
        );
        let weights = strat.rebalance(&trending_prices(60)).unwrap();
        let total: Decimal = weights.values().copied().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.000001));
    }

    // -- 4. Explicit market caps override the mock caps --

    #[test]
    fn test_bl_strategy_explicit_caps() {
        let caps: BTreeMap<String, Decimal> =
            [("A".to_string(), dec!(2000000000000)), ("B".to_string(), dec!(500000000000))]
                .into_iter()
                .collect();
        let strat = BlStrategy::new(
            "BL",
            None,
            StrategyConfig::default(),
            Box::new(ManualViewGenerator::new(Vec::new())),
        )
        .with_market_caps(caps);
        assert!(strat.rebalance(&trending_prices(60)).is_ok());
    }
}
