//! Constrained maximum-Sharpe optimization on a posterior distribution.
//!
//! Long-only, fully invested. The unconstrained tangency portfolio
//! `w ∝ Sigma^-1 (mu - rf)` is computed in closed form; negative positions
//! are resolved by deterministic active-set elimination: assets whose
//! tangency weight is negative are dropped and the problem re-solved on the
//! remaining support until every weight is non-negative.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::matrix::{mat_inverse, mat_vec_multiply, portfolio_std, vec_dot};
use crate::types::{OptimizationResult, Rate};
use crate::EngineResult;

/// Annualised risk-free rate fixed by this design.
pub const RISK_FREE_RATE: Decimal = dec!(0.04);

/// Weights below this threshold are cleaned to zero.
const CLEAN_THRESHOLD: Decimal = dec!(0.0001);

/// Denominators below this are treated as degenerate.
const DENOM_TOLERANCE: Decimal = dec!(0.000000001);

/// Maximise `(w'mu - rf) / sqrt(w'Sigma w)` subject to `sum(w) = 1`,
/// `w >= 0`.
///
/// Weights below 1e-4 are zeroed and the survivors renormalised, so the
/// returned weights sum to 1. Fails with [`EngineError::SingularMatrix`]
/// or [`EngineError::InfeasibleOptimization`]; the engine converts both
/// into the flight-to-safety fallback.
pub fn max_sharpe(
    tickers: &[String],
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    risk_free_rate: Rate,
) -> EngineResult<OptimizationResult> {
    let n = tickers.len();
    if mu.len() != n || sigma.len() != n {
        return Err(EngineError::DataIntegrity(format!(
            "optimizer inputs misaligned: {} tickers, {} returns, {} covariance rows",
            n,
            mu.len(),
            sigma.len()
        )));
    }
    if n == 0 {
        return Err(EngineError::InfeasibleOptimization(
            "empty asset universe".into(),
        ));
    }

    let mut support: Vec<usize> = (0..n).collect();

    loop {
        let weights_on_support = solve_tangency(mu, sigma, risk_free_rate, &support)?;

        let negatives: Vec<usize> = support
            .iter()
            .zip(weights_on_support.iter())
            .filter(|(_, w)| **w < -DENOM_TOLERANCE)
            .map(|(idx, _)| *idx)
            .collect();

        if negatives.is_empty() {
            let mut full = vec![Decimal::ZERO; n];
            for (idx, w) in support.iter().zip(weights_on_support.iter()) {
                // Clamp the sub-tolerance negatives introduced by rounding.
                full[*idx] = if *w < Decimal::ZERO { Decimal::ZERO } else { *w };
            }
            let cleaned = clean_weights(full)?;
            return Ok(build_result(tickers, cleaned, mu, sigma, risk_free_rate));
        }

        support.retain(|idx| !negatives.contains(idx));
        if support.is_empty() {
            return Err(EngineError::InfeasibleOptimization(
                "no long-only support with positive excess return".into(),
            ));
        }
    }
}

/// Closed-form tangency weights restricted to `support`:
/// `w = Sigma_ss^-1 (mu_s - rf) / 1' Sigma_ss^-1 (mu_s - rf)`.
fn solve_tangency(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    risk_free_rate: Rate,
    support: &[usize],
) -> EngineResult<Vec<Decimal>> {
    let sub_sigma: Vec<Vec<Decimal>> = support
        .iter()
        .map(|&i| support.iter().map(|&j| sigma[i][j]).collect())
        .collect();
    let excess: Vec<Decimal> = support.iter().map(|&i| mu[i] - risk_free_rate).collect();

    let sigma_inv = mat_inverse(&sub_sigma, "posterior covariance")?;
    let raw = mat_vec_multiply(&sigma_inv, &excess);

    let denom: Decimal = raw.iter().copied().sum();
    if denom <= DENOM_TOLERANCE {
        // All excess returns non-positive or perfect cancellation: a fully
        // invested long-only tangency portfolio does not exist.
        return Err(EngineError::InfeasibleOptimization(
            "no asset offers positive risk-adjusted excess return".into(),
        ));
    }

    Ok(raw.iter().map(|w| w / denom).collect())
}

/// Zero out dust below the cleaning threshold and renormalise to sum 1.
fn clean_weights(mut weights: Vec<Decimal>) -> EngineResult<Vec<Decimal>> {
    for w in weights.iter_mut() {
        if *w < CLEAN_THRESHOLD {
            *w = Decimal::ZERO;
        }
    }
    let total: Decimal = weights.iter().copied().sum();
    if total.is_zero() {
        return Err(EngineError::InfeasibleOptimization(
            "all weights cleaned to zero".into(),
        ));
    }
    for w in weights.iter_mut() {
        *w /= total;
    }
    Ok(weights)
}

fn build_result(
    tickers: &[String],
    weights: Vec<Decimal>,
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    risk_free_rate: Rate,
) -> OptimizationResult {
    let expected_return = vec_dot(&weights, mu);
    let volatility = portfolio_std(&weights, sigma);
    let sharpe_ratio = if volatility.is_zero() {
        Decimal::ZERO
    } else {
        (expected_return - risk_free_rate) / volatility
    };
    OptimizationResult {
        tickers: tickers.to_vec(),
        weights,
        expected_return,
        volatility,
        sharpe_ratio,
    }
}
