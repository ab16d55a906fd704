//! End-to-end Black-Litterman optimizer: prior → posterior → max-Sharpe
//! weights.
//!
//! If optimization fails (near-singular matrices or degenerate returns)
//! the engine falls back to a 100% cash allocation rather than producing
//! unreliable risk-asset weights: a failed optimization usually signals
//! degenerate upstream data, not a genuine all-in opportunity.

use std::collections::BTreeMap;
use std::time::Instant;

use rust_decimal::Decimal;

use crate::core::covariance::ledoit_wolf;
use crate::core::optimizer::{max_sharpe, RISK_FREE_RATE};
use crate::core::posterior::blend_views;
use crate::core::prior::market_implied_prior;
use crate::error::EngineError;
use crate::types::{
    with_metadata, ComputationOutput, InvestorView, OptimizationResult, PriceMatrix,
    StrategyConfig,
};
use crate::EngineResult;

/// Parsed view matrices in the canonical asset order.
#[derive(Debug)]
struct ParsedViews {
    p: Vec<Vec<Decimal>>,
    q: Vec<Decimal>,
    confidences: Vec<Decimal>,
}

/// Black-Litterman optimization engine.
///
/// The covariance matrix is estimated once at construction (Ledoit-Wolf)
/// and reused across every `run_optimization` call for the engine's
/// lifetime; each call produces a fresh, never-mutated result.
pub struct BlackLittermanEngine {
    prices: PriceMatrix,
    config: StrategyConfig,
    cov_matrix: Vec<Vec<Decimal>>,
}

impl BlackLittermanEngine {
    pub fn new(prices: PriceMatrix, config: StrategyConfig) -> EngineResult<Self> {
        // Reject invalid hyperparameters at construction, never mid-run.
        let config = StrategyConfig::new(config.risk_aversion, config.tau)?;
        let cov_matrix = ledoit_wolf(&prices)?;
        Ok(Self {
            prices,
            config,
            cov_matrix,
        })
    }

    pub fn tickers(&self) -> &[String] {
        self.prices.tickers()
    }

    pub fn covariance(&self) -> &[Vec<Decimal>] {
        &self.cov_matrix
    }

    /// Execute the full pipeline: market-implied prior, view blending,
    /// max-Sharpe optimization.
    ///
    /// Missing market caps are filled with the cross-sectional mean and
    /// logged as warnings. Invalid views are dropped per-view. Optimizer
    /// and blender failures trigger the flight-to-safety fallback; they
    /// never escape this boundary.
    pub fn run_optimization(
        &self,
        market_caps: &BTreeMap<String, Decimal>,
        views: &[InvestorView],
    ) -> EngineResult<ComputationOutput<OptimizationResult>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        let tickers = self.prices.tickers();
        let caps = self.align_market_caps(market_caps, &mut warnings)?;

        let prior = market_implied_prior(
            &self.cov_matrix,
            &caps,
            self.config.risk_aversion,
            RISK_FREE_RATE,
        )?;

        let parsed = self.parse_views(views, &mut warnings);

        let result = match self.optimize(&prior, &parsed, &mut warnings) {
            Ok(result) => result,
            Err(
                e @ (EngineError::SingularMatrix { .. }
                | EngineError::InfeasibleOptimization(_)),
            ) => {
                warnings.push(format!(
                    "Optimization failed: {e}. Flight-to-safety fallback (0% risk assets)."
                ));
                self.fallback_result()
            }
            Err(other) => return Err(other),
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Black-Litterman Portfolio Optimization",
            &serde_json::json!({
                "n_assets": tickers.len(),
                "n_views": views.len(),
                "risk_aversion": self.config.risk_aversion.to_string(),
                "tau": self.config.tau.to_string(),
                "risk_free_rate": RISK_FREE_RATE.to_string(),
            }),
            warnings,
            elapsed,
            result,
        ))
    }

    /// Align the raw cap map to the canonical ticker order, mean-filling
    /// missing entries rather than dropping them silently.
    fn align_market_caps(
        &self,
        market_caps: &BTreeMap<String, Decimal>,
        warnings: &mut Vec<String>,
    ) -> EngineResult<Vec<Decimal>> {
        let tickers = self.prices.tickers();

        let resolved: Vec<Option<Decimal>> = tickers
            .iter()
            .map(|t| market_caps.get(t).copied())
            .collect();

        let present: Vec<Decimal> = resolved.iter().filter_map(|c| *c).collect();
        if present.is_empty() {
            return Err(EngineError::DataIntegrity(
                "no market caps resolved for the current universe".into(),
            ));
        }

        let missing: Vec<&String> = tickers
            .iter()
            .zip(resolved.iter())
            .filter(|(_, c)| c.is_none())
            .map(|(t, _)| t)
            .collect();
        if !missing.is_empty() {
            warnings.push(format!(
                "Missing market caps for {:?}. Filling with cross-sectional mean.",
                missing
            ));
        }

        let mean: Decimal =
            present.iter().copied().sum::<Decimal>() / Decimal::from(present.len() as i64);

        Ok(resolved.into_iter().map(|c| c.unwrap_or(mean)).collect())
    }

    /// Convert views into P/Q/confidence matrices, dropping invalid views
    /// with a warning instead of aborting the run.
    fn parse_views(&self, views: &[InvestorView], warnings: &mut Vec<String>) -> ParsedViews {
        let tickers = self.prices.tickers();
        let n = tickers.len();

        let mut parsed = ParsedViews {
            p: Vec::new(),
            q: Vec::new(),
            confidences: Vec::new(),
        };

        for (i, view) in views.iter().enumerate() {
            if let Err(e) = view.validate(tickers) {
                warnings.push(format!("Dropping view {i}: {e}"));
                continue;
            }
            let mut row = vec![Decimal::ZERO; n];
            for (asset, weight) in view.assets.iter().zip(view.weights.iter()) {
                // validate() guarantees the position exists.
                if let Some(col) = self.prices.ticker_index(asset) {
                    row[col] = *weight;
                }
            }
            parsed.p.push(row);
            parsed.q.push(view.expected_return);
            parsed.confidences.push(view.confidence);
        }

        parsed
    }

    fn optimize(
        &self,
        prior: &[Decimal],
        parsed: &ParsedViews,
        warnings: &mut Vec<String>,
    ) -> EngineResult<OptimizationResult> {
        let posterior = if parsed.p.is_empty() {
            warnings.push("No views provided — using market prior only.".into());
            // Fast path: no blending computation runs.
            crate::core::posterior::PosteriorDistribution {
                mean: prior.to_vec(),
                covariance: self.cov_matrix.clone(),
            }
        } else {
            blend_views(
                &self.cov_matrix,
                prior,
                &parsed.p,
                &parsed.q,
                self.config.tau,
                Some(&parsed.confidences),
            )?
        };

        max_sharpe(
            self.prices.tickers(),
            &posterior.mean,
            &posterior.covariance,
            RISK_FREE_RATE,
        )
    }

    /// Flight-to-safety: every weight zero, metrics zero. Downstream
    /// guardrails turn this into a 100% cash allocation.
    fn fallback_result(&self) -> OptimizationResult {
        let tickers = self.prices.tickers().to_vec();
        let n = tickers.len();
        OptimizationResult {
            tickers,
            weights: vec![Decimal::ZERO; n],
            expected_return: Decimal::ZERO,
            volatility: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
        }
    }
}
