//! Ledoit-Wolf shrinkage covariance estimation.
//!
//! The raw sample covariance of daily returns is usually too
//! ill-conditioned for reliable inversion at the sample sizes a 365-day
//! lookback provides, so the estimator shrinks it toward the
//! constant-variance (scaled identity) target following Ledoit & Wolf
//! (2004), "A well-conditioned estimator for large-dimensional covariance
//! matrices". The result is annualised with a 252 trading-day convention.

use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::types::PriceMatrix;
use crate::EngineResult;

/// Trading days per year used to annualise daily covariance.
const TRADING_DAYS_PER_YEAR: i64 = 252;

/// Minimum number of return observations required to estimate covariance.
const MIN_RETURN_OBS: usize = 2;

/// Annualised Ledoit-Wolf shrinkage covariance from a price history.
///
/// Returns an N x N symmetric positive semi-definite matrix ordered by the
/// price matrix's ticker columns.
pub fn ledoit_wolf(prices: &PriceMatrix) -> EngineResult<Vec<Vec<Decimal>>> {
    let returns = prices.daily_returns();
    if returns.len() < MIN_RETURN_OBS {
        return Err(EngineError::DataIntegrity(format!(
            "need at least {} return observations for covariance estimation, got {}",
            MIN_RETURN_OBS,
            returns.len()
        )));
    }

    let t = returns.len();
    let n = prices.n_assets();
    let t_dec = Decimal::from(t as i64);
    let n_dec = Decimal::from(n as i64);

    // Demean column-wise.
    let mut means = vec![Decimal::ZERO; n];
    for row in &returns {
        for (j, r) in row.iter().enumerate() {
            means[j] += *r;
        }
    }
    for m in means.iter_mut() {
        *m /= t_dec;
    }
    let x: Vec<Vec<Decimal>> = returns
        .iter()
        .map(|row| row.iter().zip(means.iter()).map(|(r, m)| r - m).collect())
        .collect();

    // Sample covariance S = X'X / T.
    let mut s = vec![vec![Decimal::ZERO; n]; n];
    for row in &x {
        for i in 0..n {
            for j in i..n {
                s[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..n {
        for j in i..n {
            s[i][j] /= t_dec;
            s[j][i] = s[i][j];
        }
    }

    // Shrinkage target: m * I, with m the mean sample variance.
    let m: Decimal = (0..n).map(|i| s[i][i]).sum::<Decimal>() / n_dec;

    // Dispersion of S around the target: d^2 = ||S - m*I||_F^2 / N.
    let mut d2 = Decimal::ZERO;
    for i in 0..n {
        for j in 0..n {
            let diff = if i == j { s[i][j] - m } else { s[i][j] };
            d2 += diff * diff;
        }
    }
    d2 /= n_dec;

    // Estimation error of S: b_bar^2 = (1/T^2) * sum_t ||x_t x_t' - S||_F^2 / N.
    let mut b_bar2 = Decimal::ZERO;
    for row in &x {
        let mut frob = Decimal::ZERO;
        for i in 0..n {
            for j in 0..n {
                let diff = row[i] * row[j] - s[i][j];
                frob += diff * diff;
            }
        }
        b_bar2 += frob / n_dec;
    }
    b_bar2 /= t_dec * t_dec;

    let b2 = if b_bar2 < d2 { b_bar2 } else { d2 };
    let intensity = if d2.is_zero() { Decimal::ONE } else { b2 / d2 };

    // Shrunk estimate, annualised.
    let annualiser = Decimal::from(TRADING_DAYS_PER_YEAR);
    let mut sigma = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        for j in 0..n {
            let target = if i == j { intensity * m } else { Decimal::ZERO };
            sigma[i][j] = (target + (Decimal::ONE - intensity) * s[i][j]) * annualiser;
        }
    }

    Ok(sigma)
}

/// Annualised mean historical return per asset (daily mean x 252).
pub fn mean_historical_return(prices: &PriceMatrix) -> EngineResult<Vec<Decimal>> {
    let returns = prices.daily_returns();
    if returns.is_empty() {
        return Err(EngineError::DataIntegrity(
            "need at least 2 observations to compute historical returns".into(),
        ));
    }
    let t_dec = Decimal::from(returns.len() as i64);
    let n = prices.n_assets();
    let mut mu = vec![Decimal::ZERO; n];
    for row in &returns {
        for (j, r) in row.iter().enumerate() {
            mu[j] += *r;
        }
    }
    let annualiser = Decimal::from(TRADING_DAYS_PER_YEAR);
    for m in mu.iter_mut() {
        *m = *m / t_dec * annualiser;
    }
    Ok(mu)
}
