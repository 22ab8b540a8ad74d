//! 激勵因子計算
//!
//! 兩種互相獨立的策略把出口機率分布轉成資助權重：
//!
//! - **inverse_square**：`weighted = σ_all - weight_factor + p`，
//!   `factor = scale / |weighted|^2`，`weight_factor` 由 [`SpreadEstimator`] 估計
//! - **z_score**：`z = (p - mean) / σ_all`，`factor = k * b^(-z)`
//!
//! 兩個公式彼此並不一致，不應視為同一模型的變體。

use crate::core::stats::{self, SpreadEstimator};
use crate::domain::model::{CountryFactor, CountryProbability, FactorReport};
use crate::utils::error::{FactorError, Result};
use crate::utils::validation::{validate_country_code, validate_probability, validate_range, Validate};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const INVERSE_SQUARE_SCALE: f64 = 10.0;
pub const Z_SCORE_BASE: f64 = 1.3;
pub const Z_SCORE_K: f64 = 2.0;

/// 拒絕空樣本、格式錯誤的國碼、重複國碼與超出 [0, 1] 的機率
pub fn validate_sample(samples: &[CountryProbability]) -> Result<()> {
    if samples.is_empty() {
        return Err(FactorError::invalid_input(
            "at least one country probability is required",
        ));
    }

    let mut seen = HashSet::with_capacity(samples.len());
    for sample in samples {
        validate_country_code(&sample.country_code)?;
        validate_probability(&sample.country_code, sample.exit_probability)?;

        if !seen.insert(sample.country_code.to_ascii_lowercase()) {
            return Err(FactorError::invalid_input(format!(
                "duplicate country code '{}'",
                sample.country_code
            )));
        }
    }

    Ok(())
}

fn probabilities(samples: &[CountryProbability]) -> Vec<f64> {
    samples.iter().map(|s| s.exit_probability).collect()
}

/// 反平方策略，`weight_factor` 通常為縮尾或截尾標準差
pub fn inverse_square_factors(
    samples: &[CountryProbability],
    weight_factor: f64,
    scale: f64,
) -> Result<Vec<CountryFactor>> {
    validate_sample(samples)?;
    require_positive("strategy.scale", scale)?;
    if !weight_factor.is_finite() {
        return Err(FactorError::invalid_input(format!(
            "weight factor must be finite, got {}",
            weight_factor
        )));
    }

    let sigma_all = stats::population_std_dev(&probabilities(samples))?;

    samples
        .iter()
        .map(|sample| {
            let weighted = sigma_all - weight_factor + sample.exit_probability;
            if weighted == 0.0 {
                return Err(FactorError::degenerate_spread(format!(
                    "weighted value is exactly zero for '{}' (σ_all={}, weight_factor={}, p={})",
                    sample.country_code, sigma_all, weight_factor, sample.exit_probability
                )));
            }

            let factor = scale / weighted.abs().powi(2);
            if !factor.is_finite() {
                return Err(FactorError::degenerate_spread(format!(
                    "factor for '{}' overflows (weighted={})",
                    sample.country_code, weighted
                )));
            }

            Ok(CountryFactor {
                country_code: sample.country_code.to_ascii_lowercase(),
                factor,
            })
        })
        .collect()
}

/// 標準分數策略；整體標準差為零時回傳 DivisionByZero
pub fn z_score_factors(samples: &[CountryProbability], base: f64, k: f64) -> Result<Vec<CountryFactor>> {
    validate_sample(samples)?;
    require_positive("strategy.base", base)?;
    require_positive("strategy.k", k)?;

    let values = probabilities(samples);
    let mean = stats::mean(&values)?;
    let sigma_all = stats::population_std_dev(&values)?;
    if sigma_all == 0.0 {
        return Err(FactorError::division_by_zero(format!(
            "all {} countries share the same exit probability; z-scores are undefined",
            samples.len()
        )));
    }

    Ok(samples
        .iter()
        .map(|sample| {
            let z = (sample.exit_probability - mean) / sigma_all;
            CountryFactor {
                country_code: sample.country_code.to_ascii_lowercase(),
                factor: k * base.powf(-z),
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactorStrategy {
    InverseSquare {
        #[serde(default)]
        estimator: SpreadEstimator,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    ZScore {
        #[serde(default = "default_base")]
        base: f64,
        #[serde(default = "default_k")]
        k: f64,
    },
}

fn default_scale() -> f64 {
    INVERSE_SQUARE_SCALE
}

fn default_base() -> f64 {
    Z_SCORE_BASE
}

fn default_k() -> f64 {
    Z_SCORE_K
}

impl Default for FactorStrategy {
    fn default() -> Self {
        Self::inverse_square(SpreadEstimator::default())
    }
}

impl FactorStrategy {
    pub fn inverse_square(estimator: SpreadEstimator) -> Self {
        Self::InverseSquare {
            estimator,
            scale: INVERSE_SQUARE_SCALE,
        }
    }

    pub fn z_score() -> Self {
        Self::ZScore {
            base: Z_SCORE_BASE,
            k: Z_SCORE_K,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::InverseSquare { estimator, .. } => format!("inverse_square/{}", estimator.name()),
            Self::ZScore { .. } => "z_score".to_string(),
        }
    }

    /// 驗證樣本、計算因子並組成報表
    pub fn apply(&self, samples: &[CountryProbability]) -> Result<FactorReport> {
        self.validate()?;
        validate_sample(samples)?;

        let values = probabilities(samples);
        let mean = stats::mean(&values)?;
        let std_dev = stats::population_std_dev(&values)?;
        tracing::debug!(
            "Sample of {} countries: mean={:.6}, σ_all={:.6}",
            samples.len(),
            mean,
            std_dev
        );

        let (weight_factor, factors) = match *self {
            Self::InverseSquare { estimator, scale } => {
                let weight_factor = estimator.estimate(&values)?;
                tracing::info!(
                    "📐 {} standard deviation (weight factor): {:.6}",
                    estimator.name(),
                    weight_factor
                );
                (
                    Some(weight_factor),
                    inverse_square_factors(samples, weight_factor, scale)?,
                )
            }
            Self::ZScore { base, k } => (None, z_score_factors(samples, base, k)?),
        };

        Ok(FactorReport {
            strategy: self.name(),
            generated_at: Utc::now(),
            sample_size: samples.len(),
            mean,
            std_dev,
            weight_factor,
            factors,
            probabilities: samples
                .iter()
                .map(|s| CountryProbability::new(s.country_code.as_str(), s.exit_probability))
                .collect(),
        })
    }
}

impl Validate for FactorStrategy {
    fn validate(&self) -> Result<()> {
        match *self {
            Self::InverseSquare { estimator, scale } => {
                require_positive("strategy.scale", scale)?;
                match estimator {
                    SpreadEstimator::Winsorized { low, high } => {
                        validate_range("strategy.estimator.low", low, 0.0, 1.0)?;
                        validate_range("strategy.estimator.high", high, 0.0, 1.0)?;
                        if low > high {
                            return Err(invalid_parameter(
                                "strategy.estimator.low",
                                low,
                                "must not exceed the high percentile",
                            ));
                        }
                    }
                    SpreadEstimator::Trimmed { low, high, ddof } => {
                        if low.is_nan() {
                            return Err(invalid_parameter("strategy.estimator.low", low, "must be a number"));
                        }
                        if let Some(high) = high {
                            if high.is_nan() || high <= low {
                                return Err(invalid_parameter(
                                    "strategy.estimator.high",
                                    high,
                                    "must be greater than the low bound",
                                ));
                            }
                        }
                        validate_range("strategy.estimator.ddof", ddof, 0, 1)?;
                    }
                }
            }
            Self::ZScore { base, k } => {
                require_positive("strategy.base", base)?;
                require_positive("strategy.k", k)?;
            }
        }
        Ok(())
    }
}

fn invalid_parameter(field: &str, value: f64, reason: &str) -> FactorError {
    FactorError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid_parameter(field, value, "must be a positive number"))
    }
}
