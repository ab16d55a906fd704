//! Deterministic risk guardrails applied after optimization.
//!
//! The waterfall runs in a fixed order: dust removal, renormalisation,
//! cash-buffer carve-out, per-asset cap truncation, cash residual. Cap
//! overflow is NOT redistributed to other assets; it flows into cash, so
//! the guardrailed portfolio can hold more cash than the configured buffer
//! but never less.

use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::types::{
    with_metadata, ComputationOutput, OptimizationResult, RiskAdjustedAllocation, CASH_TICKER,
};
use crate::EngineResult;

/// Positions below 1% are considered operational noise and removed.
const DUST_THRESHOLD: Decimal = dec!(0.01);

/// Post-optimization risk guardrails.
///
/// `cash_buffer_pct` is the minimum cash fraction carved out of every
/// allocation; `max_weight_pct` caps any single risk asset. The synthetic
/// [`CASH_TICKER`] position is exempt from both the dust filter and the
/// cap, which makes re-application with a zero buffer a fixed point.
#[derive(Debug, Clone)]
pub struct RiskGuardrailEngine {
    cash_buffer_pct: Decimal,
    max_weight_pct: Decimal,
}

impl RiskGuardrailEngine {
    pub fn new(cash_buffer_pct: Decimal, max_weight_pct: Decimal) -> EngineResult<Self> {
        if cash_buffer_pct < Decimal::ZERO || cash_buffer_pct > Decimal::ONE {
            return Err(EngineError::Configuration {
                field: "cash_buffer_pct".into(),
                reason: format!("must be in [0, 1], got {cash_buffer_pct}"),
            });
        }
        if max_weight_pct <= Decimal::ZERO || max_weight_pct > Decimal::ONE {
            return Err(EngineError::Configuration {
                field: "max_weight_pct".into(),
                reason: format!("must be in (0, 1], got {max_weight_pct}"),
            });
        }
        Ok(Self {
            cash_buffer_pct,
            max_weight_pct,
        })
    }

    /// Construct with a reachability check against a known universe size:
    /// the caps must leave enough room to invest `1 - cash_buffer_pct`
    /// across `n_assets` positions.
    pub fn with_universe(
        cash_buffer_pct: Decimal,
        max_weight_pct: Decimal,
        n_assets: usize,
    ) -> EngineResult<Self> {
        let engine = Self::new(cash_buffer_pct, max_weight_pct)?;
        let capacity = max_weight_pct * Decimal::from(n_assets as i64);
        if capacity < Decimal::ONE - cash_buffer_pct {
            return Err(EngineError::Configuration {
                field: "max_weight_pct".into(),
                reason: format!(
                    "cap capacity {capacity} cannot reach target equity {} across {n_assets} assets",
                    Decimal::ONE - cash_buffer_pct
                ),
            });
        }
        Ok(engine)
    }

    pub fn cash_buffer_pct(&self) -> Decimal {
        self.cash_buffer_pct
    }

    pub fn max_weight_pct(&self) -> Decimal {
        self.max_weight_pct
    }

    /// Run the guardrail waterfall over an optimizer result.
    ///
    /// The input may already carry a [`CASH_TICKER`] position (re-applied
    /// allocations do); it joins the renormalisation but is never dusted
    /// or capped. Expected return and volatility scale by the final equity
    /// fraction; the Sharpe ratio is carried through unchanged since
    /// shifting into cash scales excess return and risk together.
    pub fn apply_guardrails(
        &self,
        result: &OptimizationResult,
    ) -> EngineResult<ComputationOutput<RiskAdjustedAllocation>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        let mut risk_tickers: Vec<String> = Vec::new();
        let mut risk_weights: Vec<Decimal> = Vec::new();
        let mut cash_in = Decimal::ZERO;
        for (ticker, weight) in result.tickers.iter().zip(result.weights.iter()) {
            if ticker == CASH_TICKER {
                cash_in += *weight;
            } else {
                risk_tickers.push(ticker.clone());
                risk_weights.push(*weight);
            }
        }

        // 1. Dust removal.
        let mut dusted: Vec<&str> = Vec::new();
        for (ticker, weight) in risk_tickers.iter().zip(risk_weights.iter_mut()) {
            if *weight < DUST_THRESHOLD && !weight.is_zero() {
                *weight = Decimal::ZERO;
                dusted.push(ticker);
            }
        }
        if !dusted.is_empty() {
            warnings.push(format!("Removed dust positions below 1%: {:?}", dusted));
        }

        // 2. Renormalisation across every surviving position, cash included.
        let total: Decimal = risk_weights.iter().copied().sum::<Decimal>() + cash_in;
        if total <= Decimal::ZERO {
            // Nothing investable survived: hold 100% cash.
            warnings.push(
                "No investable positions after guardrails — allocating 100% to cash.".into(),
            );
            return Ok(self.wrap(
                self.all_cash(&risk_tickers, result),
                warnings,
                start.elapsed().as_micros() as u64,
            ));
        }
        for weight in risk_weights.iter_mut() {
            *weight /= total;
        }

        // 3. Cash-buffer carve-out on the risk sleeve.
        let target_equity = Decimal::ONE - self.cash_buffer_pct;
        for weight in risk_weights.iter_mut() {
            *weight *= target_equity;
        }

        // 4. Cap truncation. Overflow is not redistributed; it becomes cash.
        let mut capped: Vec<&str> = Vec::new();
        for (ticker, weight) in risk_tickers.iter().zip(risk_weights.iter_mut()) {
            if *weight > self.max_weight_pct {
                *weight = self.max_weight_pct;
                capped.push(ticker);
            }
        }
        if !capped.is_empty() {
            warnings.push(format!(
                "Capped positions at {}: {:?} (excess allocated to cash)",
                self.max_weight_pct, capped
            ));
        }

        // 5. Cash residual.
        let equity_sum: Decimal = risk_weights.iter().copied().sum();
        let mut cash = Decimal::ONE - equity_sum;
        if cash < Decimal::ZERO {
            cash = Decimal::ZERO;
        }

        let mut tickers = risk_tickers;
        tickers.push(CASH_TICKER.to_string());
        let mut weights = risk_weights;
        weights.push(cash);

        let allocation = RiskAdjustedAllocation {
            tickers,
            weights,
            expected_return: result.expected_return * equity_sum,
            volatility: result.volatility * equity_sum,
            sharpe_ratio: result.sharpe_ratio,
        };

        Ok(self.wrap(allocation, warnings, start.elapsed().as_micros() as u64))
    }

    fn all_cash(
        &self,
        risk_tickers: &[String],
        result: &OptimizationResult,
    ) -> RiskAdjustedAllocation {
        let mut tickers = risk_tickers.to_vec();
        tickers.push(CASH_TICKER.to_string());
        let mut weights = vec![Decimal::ZERO; risk_tickers.len()];
        weights.push(Decimal::ONE);
        RiskAdjustedAllocation {
            tickers,
            weights,
            expected_return: Decimal::ZERO,
            volatility: Decimal::ZERO,
            sharpe_ratio: result.sharpe_ratio,
        }
    }

    fn wrap(
        &self,
        allocation: RiskAdjustedAllocation,
        warnings: Vec<String>,
        elapsed_us: u64,
    ) -> ComputationOutput<RiskAdjustedAllocation> {
        with_metadata(
            "Risk Guardrail Waterfall",
            &serde_json::json!({
                "cash_buffer_pct": self.cash_buffer_pct.to_string(),
                "max_weight_pct": self.max_weight_pct.to_string(),
                "dust_threshold": DUST_THRESHOLD.to_string(),
                "cap_overflow": "allocated to cash, not redistributed",
            }),
            warnings,
            elapsed_us,
            allocation,
        )
    }
}
