use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::EngineResult;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Ticker → weight mapping, including the synthetic cash position.
pub type WeightMap = BTreeMap<String, Decimal>;

/// Synthetic cash ticker appended by the risk guardrails.
pub const CASH_TICKER: &str = "USDC";

/// Wide-format matrix of adjusted-close prices: ordered date axis × asset
/// columns. Immutable per run; the column order defines the canonical asset
/// ordering used by every downstream matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMatrix {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    rows: Vec<Vec<Decimal>>,
}

impl PriceMatrix {
    /// Build and validate a price matrix. Rows are indexed by date, columns
    /// by ticker.
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<String>,
        rows: Vec<Vec<Decimal>>,
    ) -> EngineResult<Self> {
        if tickers.is_empty() {
            return Err(EngineError::DataIntegrity(
                "price matrix has no asset columns".into(),
            ));
        }
        if dates.is_empty() || rows.is_empty() {
            return Err(EngineError::DataIntegrity(
                "price matrix has no observations".into(),
            ));
        }
        if dates.len() != rows.len() {
            return Err(EngineError::DataIntegrity(format!(
                "date axis has {} entries but {} price rows supplied",
                dates.len(),
                rows.len()
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != tickers.len() {
                return Err(EngineError::DataIntegrity(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    tickers.len()
                )));
            }
            for (j, px) in row.iter().enumerate() {
                if *px <= Decimal::ZERO {
                    return Err(EngineError::DataIntegrity(format!(
                        "non-positive price for {} at {}",
                        tickers[j], dates[i]
                    )));
                }
            }
        }
        for w in dates.windows(2) {
            if w[1] <= w[0] {
                return Err(EngineError::DataIntegrity(format!(
                    "date axis not strictly increasing at {}",
                    w[1]
                )));
            }
        }
        Ok(Self {
            dates,
            tickers,
            rows,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn n_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn n_obs(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, i: usize) -> &[Decimal] {
        &self.rows[i]
    }

    pub fn ticker_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Index of the observation closest to `date` (ties resolve to the
    /// earlier row).
    pub fn nearest_index(&self, date: NaiveDate) -> usize {
        let mut best = 0usize;
        let mut best_gap = i64::MAX;
        for (i, d) in self.dates.iter().enumerate() {
            let gap = (*d - date).num_days().abs();
            if gap < best_gap {
                best_gap = gap;
                best = i;
            }
        }
        best
    }

    /// Owned sub-matrix covering `[start, end]` inclusive. May hold fewer
    /// observations than the caller hoped for; callers decide whether the
    /// slice is deep enough to act on.
    pub fn slice_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for (i, d) in self.dates.iter().enumerate() {
            if *d >= start && *d <= end {
                dates.push(*d);
                rows.push(self.rows[i].clone());
            }
        }
        Self {
            dates,
            tickers: self.tickers.clone(),
            rows,
        }
    }

    /// Daily simple returns, one row per observation after the first.
    pub fn daily_returns(&self) -> Vec<Vec<Decimal>> {
        let mut out = Vec::with_capacity(self.rows.len().saturating_sub(1));
        for w in self.rows.windows(2) {
            let ret: Vec<Decimal> = w[0]
                .iter()
                .zip(w[1].iter())
                .map(|(prev, cur)| cur / prev - Decimal::ONE)
                .collect();
            out.push(ret);
        }
        out
    }

    /// Latest price per ticker, used by view generators to validate asset
    /// coverage. `slice_range` can produce an empty sub-matrix, so an
    /// empty matrix is a data error here rather than a panic.
    pub fn latest_prices(&self) -> EngineResult<BTreeMap<String, Decimal>> {
        let last = self.rows.last().ok_or_else(|| {
            EngineError::DataIntegrity("price matrix has no observations".into())
        })?;
        Ok(self
            .tickers
            .iter()
            .cloned()
            .zip(last.iter().copied())
            .collect())
    }
}

fn default_confidence() -> Decimal {
    Decimal::ONE
}

/// A single investor view in the P/Q formulation.
///
/// Example: "AAPL will outperform GOOGL by 2% annually" translates to
/// `assets=["AAPL", "GOOGL"]`, `weights=[1.0, -1.0]`, `expected_return=0.02`.
/// One view occupies one row of the picking matrix P and one entry of Q.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestorView {
    /// Tickers involved in this view.
    pub assets: Vec<String>,
    /// Asset loadings (one row of the P matrix).
    pub weights: Vec<Decimal>,
    /// Expected return expressed by this view (one element of Q).
    pub expected_return: Decimal,
    /// Confidence in (0, 1]; higher confidence means tighter uncertainty.
    #[serde(default = "default_confidence")]
    pub confidence: Decimal,
    /// Human-readable rationale for the view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InvestorView {
    /// Check the view contract against the current asset universe.
    pub fn validate(&self, universe: &[String]) -> EngineResult<()> {
        if self.assets.is_empty() {
            return Err(EngineError::ViewValidation(
                "view references no assets".into(),
            ));
        }
        if self.assets.len() != self.weights.len() {
            return Err(EngineError::ViewValidation(format!(
                "weights length ({}) must match assets length ({})",
                self.weights.len(),
                self.assets.len()
            )));
        }
        if self.confidence <= Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(EngineError::ViewValidation(format!(
                "confidence must be in (0, 1], got {}",
                self.confidence
            )));
        }
        for asset in &self.assets {
            if !universe.contains(asset) {
                return Err(EngineError::ViewValidation(format!(
                    "asset '{}' not found in market data",
                    asset
                )));
            }
        }
        Ok(())
    }
}

/// Hyperparameters shared across Black-Litterman strategy runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Market risk-aversion coefficient (delta), typically around 2.5.
    pub risk_aversion: Decimal,
    /// Uncertainty scaling factor on the prior covariance, typically
    /// 0.025 – 0.05.
    pub tau: Decimal,
}

impl StrategyConfig {
    pub fn new(risk_aversion: Decimal, tau: Decimal) -> EngineResult<Self> {
        if risk_aversion <= Decimal::ZERO {
            return Err(EngineError::Configuration {
                field: "risk_aversion".into(),
                reason: "must be positive".into(),
            });
        }
        if tau <= Decimal::ZERO {
            return Err(EngineError::Configuration {
                field: "tau".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self { risk_aversion, tau })
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            risk_aversion: rust_decimal_macros::dec!(2.5),
            tau: rust_decimal_macros::dec!(0.05),
        }
    }
}

/// Raw output of a portfolio optimization run, before guardrails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub tickers: Vec<String>,
    pub weights: Vec<Decimal>,
    pub expected_return: Decimal,
    pub volatility: Decimal,
    pub sharpe_ratio: Decimal,
}

impl OptimizationResult {
    pub fn weight_map(&self) -> WeightMap {
        self.tickers
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect()
    }
}

/// Guardrailed allocation: the optimizer result extended with an explicit
/// cash position. Weights including cash sum to 1. The raw
/// `OptimizationResult` is preserved unchanged by the caller for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAdjustedAllocation {
    pub tickers: Vec<String>,
    pub weights: Vec<Decimal>,
    pub expected_return: Decimal,
    pub volatility: Decimal,
    pub sharpe_ratio: Decimal,
}

impl RiskAdjustedAllocation {
    pub fn cash_weight(&self) -> Decimal {
        self.tickers
            .iter()
            .position(|t| t == CASH_TICKER)
            .map(|i| self.weights[i])
            .unwrap_or(Decimal::ZERO)
    }

    pub fn weight_map(&self) -> WeightMap {
        self.tickers
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect()
    }
}

/// Standard computation output envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
