//! Bayesian blending of the market prior with investor views — the
//! Black-Litterman master formula from He & Litterman (1999).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::matrix::{mat_add, mat_inverse, mat_multiply, mat_scale, mat_transpose, mat_vec_multiply};
use crate::EngineResult;

/// Omega inflation factor applied when a non-positive confidence slips past
/// validation: the view's uncertainty becomes effectively infinite, so the
/// view is ignored rather than crashing the blend.
const IGNORED_VIEW_FACTOR: Decimal = dec!(1000000);

/// Posterior return distribution after view blending. Ephemeral —
/// recomputed on every optimize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorDistribution {
    pub mean: Vec<Decimal>,
    pub covariance: Vec<Vec<Decimal>>,
}

/// Blend the prior with K investor views.
///
/// * `p` — K x N picking matrix, one row per view.
/// * `q` — K-element view return vector.
/// * `confidences` — optional K-element confidence vector in (0, 1];
///   when present, each view's variance in Omega is scaled by `1/c` so
///   higher confidence means tighter uncertainty.
///
/// With K = 0 the prior passes through untouched: no picking matrix is
/// built and no inversion runs.
///
/// Master formula:
/// ```text
/// M     = (tau*Sigma)^-1 + P' Omega^-1 P
/// E[R]  = M^-1 [(tau*Sigma)^-1 Pi + P' Omega^-1 Q]
/// Sigma_post = Sigma + M^-1
/// ```
pub fn blend_views(
    cov_matrix: &[Vec<Decimal>],
    prior_returns: &[Decimal],
    p: &[Vec<Decimal>],
    q: &[Decimal],
    tau: Decimal,
    confidences: Option<&[Decimal]>,
) -> EngineResult<PosteriorDistribution> {
    if tau <= Decimal::ZERO {
        return Err(EngineError::Configuration {
            field: "tau".into(),
            reason: "must be positive".into(),
        });
    }

    let k = p.len();
    if k == 0 {
        return Ok(PosteriorDistribution {
            mean: prior_returns.to_vec(),
            covariance: cov_matrix.to_vec(),
        });
    }
    if q.len() != k {
        return Err(EngineError::DataIntegrity(format!(
            "picking matrix has {} rows but Q has {} entries",
            k,
            q.len()
        )));
    }
    if let Some(c) = confidences {
        if c.len() != k {
            return Err(EngineError::DataIntegrity(format!(
                "picking matrix has {} rows but {} confidences supplied",
                k,
                c.len()
            )));
        }
    }

    let tau_sigma = mat_scale(cov_matrix, tau);

    // Per-view variance: diag(P tau*Sigma P').
    let p_t = mat_transpose(p);
    let p_tau_sigma_pt = mat_multiply(&mat_multiply(p, &tau_sigma), &p_t);

    // Omega: diagonal K x K view-uncertainty matrix.
    let mut omega = vec![vec![Decimal::ZERO; k]; k];
    for i in 0..k {
        let variance = p_tau_sigma_pt[i][i];
        omega[i][i] = match confidences {
            Some(c) if c[i] > Decimal::ZERO => variance / c[i],
            Some(_) => variance * IGNORED_VIEW_FACTOR,
            None => variance,
        };
    }

    let tau_sigma_inv = mat_inverse(&tau_sigma, "tau*Sigma")?;
    let omega_inv = mat_inverse(&omega, "Omega")?;

    // P' Omega^-1 is reused on both sides of the master formula.
    let pt_omega_inv = mat_multiply(&p_t, &omega_inv);
    let pt_omega_inv_p = mat_multiply(&pt_omega_inv, p);

    let m = mat_add(&tau_sigma_inv, &pt_omega_inv_p);
    let m_inv = mat_inverse(&m, "M")?;

    let tau_sigma_inv_pi = mat_vec_multiply(&tau_sigma_inv, prior_returns);
    let pt_omega_inv_q = mat_vec_multiply(&pt_omega_inv, q);
    let rhs: Vec<Decimal> = tau_sigma_inv_pi
        .iter()
        .zip(pt_omega_inv_q.iter())
        .map(|(a, b)| a + b)
        .collect();

    let mean = mat_vec_multiply(&m_inv, &rhs);

    // Posterior covariance carries both the original risk and the residual
    // estimation uncertainty.
    let covariance = mat_add(cov_matrix, &m_inv);

    Ok(PosteriorDistribution { mean, covariance })
}
