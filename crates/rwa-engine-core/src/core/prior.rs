//! Market-implied equilibrium returns (the Black-Litterman prior).

use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::matrix::mat_vec_multiply;
use crate::types::Rate;
use crate::EngineResult;

/// Compute the market-implied prior: `Pi = delta * Sigma * w_mkt + r_f`.
///
/// `market_caps` must be aligned to the covariance matrix's asset order;
/// unresolvable tickers enter as zero capitalisation. Normalisation to
/// market weights happens here, so callers pass raw capitalisations.
pub fn market_implied_prior(
    cov_matrix: &[Vec<Decimal>],
    market_caps: &[Decimal],
    risk_aversion: Decimal,
    risk_free_rate: Rate,
) -> EngineResult<Vec<Decimal>> {
    if risk_aversion <= Decimal::ZERO {
        return Err(EngineError::Configuration {
            field: "risk_aversion".into(),
            reason: "must be positive".into(),
        });
    }
    if market_caps.len() != cov_matrix.len() {
        return Err(EngineError::DataIntegrity(format!(
            "market cap vector has {} entries for a {}-asset covariance matrix",
            market_caps.len(),
            cov_matrix.len()
        )));
    }

    let total: Decimal = market_caps.iter().copied().sum();
    if total <= Decimal::ZERO {
        return Err(EngineError::DataIntegrity(
            "total market capitalization is zero".into(),
        ));
    }

    let w_mkt: Vec<Decimal> = market_caps.iter().map(|c| c / total).collect();
    let sigma_w = mat_vec_multiply(cov_matrix, &w_mkt);

    Ok(sigma_w
        .iter()
        .map(|v| risk_aversion * v + risk_free_rate)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sigma() -> Vec<Vec<Decimal>> {
        vec![
            vec![dec!(0.04), dec!(0.006)],
            vec![dec!(0.006), dec!(0.09)],
        ]
    }

    // -- 1. Exact equilibrium returns --

    #[test]
    fn test_prior_formula() {
        // caps 60/40 split, delta 2.5, rf 0.
        let pi = market_implied_prior(&sigma(), &[dec!(60), dec!(40)], dec!(2.5), dec!(0)).unwrap();
        // Pi_A = 2.5 * (0.04*0.6 + 0.006*0.4) = 0.066
        // Pi_B = 2.5 * (0.006*0.6 + 0.09*0.4) = 0.099
        assert_eq!(pi[0], dec!(0.066));
        assert_eq!(pi[1], dec!(0.099));
    }

    // -- 2. Risk-free rate shifts the prior uniformly --

    #[test]
    fn test_risk_free_offset() {
        let base = market_implied_prior(&sigma(), &[dec!(1), dec!(1)], dec!(2.5), dec!(0)).unwrap();
        let shifted =
            market_implied_prior(&sigma(), &[dec!(1), dec!(1)], dec!(2.5), dec!(0.04)).unwrap();
        assert_eq!(shifted[0] - base[0], dec!(0.04));
        assert_eq!(shifted[1] - base[1], dec!(0.04));
    }

    // -- 3. Zero total capitalization is a data error --

    #[test]
    fn test_zero_caps_rejected() {
        let err = market_implied_prior(&sigma(), &[dec!(0), dec!(0)], dec!(2.5), dec!(0.04));
        assert!(matches!(err, Err(EngineError::DataIntegrity(_))));
    }

    // -- 4. Non-positive risk aversion is a configuration error --

    #[test]
    fn test_non_positive_risk_aversion() {
        let err = market_implied_prior(&sigma(), &[dec!(1), dec!(1)], dec!(0), dec!(0.04));
        assert!(matches!(err, Err(EngineError::Configuration { .. })));
    }

    // -- 5. Unresolved tickers carry zero weight --

    #[test]
    fn test_zero_cap_asset_contributes_nothing() {
        let pi = market_implied_prior(&sigma(), &[dec!(100), dec!(0)], dec!(2.5), dec!(0)).unwrap();
        // w = [1, 0]: Pi_A = 2.5 * 0.04, Pi_B = 2.5 * 0.006
        assert_eq!(pi[0], dec!(0.1));
        assert_eq!(pi[1], dec!(0.015));
    }
}
