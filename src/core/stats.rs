//! 機率樣本的離散度估計
//!
//! `population_std_dev` 為整體樣本的標準差 (除數 N)。兩種抗離群值的估計器：
//! - 百分位縮尾 (`winsorized_std_dev`)：依索引丟棄已排序樣本兩端的元素
//! - 數值截尾 (`trimmed_std_dev`)：只保留 `low <= x < high` 的元素

use crate::utils::error::{FactorError, Result};
use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(FactorError::invalid_input("cannot take the mean of an empty sample"));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// 標準差，除數為 `n - ddof`
pub fn std_dev(values: &[f64], ddof: usize) -> Result<f64> {
    if values.len() <= ddof {
        return Err(FactorError::degenerate_spread(format!(
            "standard deviation with ddof={} needs more than {} values, got {}",
            ddof,
            ddof,
            values.len()
        )));
    }

    let mean = mean(values)?;
    let squared: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Ok((squared / (values.len() - ddof) as f64).sqrt())
}

pub fn population_std_dev(values: &[f64]) -> Result<f64> {
    std_dev(values, 0)
}

/// 百分位縮尾標準差
///
/// 從低端丟棄 `round(p_low * N)` 個元素、從高端丟棄 `round((1 - p_high) * N)`
/// 個元素，再取剩餘切片的母體標準差。`sorted` 必須為遞增排序。
/// 四捨五入採用 round-half-to-even。
pub fn winsorized_std_dev(sorted: &[f64], p_low: f64, p_high: f64) -> Result<f64> {
    if sorted.is_empty() {
        return Err(FactorError::invalid_input("cannot winsorize an empty sample"));
    }
    if !(0.0..=1.0).contains(&p_low) || !(0.0..=1.0).contains(&p_high) || p_low > p_high {
        return Err(FactorError::invalid_input(format!(
            "percentile cutoffs must satisfy 0 <= low <= high <= 1, got ({}, {})",
            p_low, p_high
        )));
    }
    if sorted.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(FactorError::invalid_input(
            "winsorized standard deviation requires an ascending-sorted sample",
        ));
    }

    let n = sorted.len() as f64;
    let drop_low = (p_low * n).round_ties_even() as usize;
    let drop_high = ((1.0 - p_high) * n).round_ties_even() as usize;

    tracing::debug!(
        "Winsorization over {} values: discarding {} below percentile {} and {} above percentile {}",
        sorted.len(),
        drop_low,
        p_low,
        drop_high,
        p_high
    );

    if drop_low + drop_high >= sorted.len() {
        return Err(FactorError::degenerate_spread(format!(
            "winsorization with cutoffs ({}, {}) discards all {} values",
            p_low,
            p_high,
            sorted.len()
        )));
    }

    population_std_dev(&sorted[drop_low..sorted.len() - drop_high])
}

/// 數值截尾標準差，保留 `low <= x < high`；`high` 為 `None` 時不截上端
pub fn trimmed_std_dev(values: &[f64], low: f64, high: Option<f64>, ddof: usize) -> Result<f64> {
    if let Some(high) = high {
        if high <= low {
            return Err(FactorError::invalid_input(format!(
                "trim bounds must satisfy low < high, got [{}, {})",
                low, high
            )));
        }
    }

    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|&v| low <= v && high.map_or(true, |h| v < h))
        .collect();

    tracing::debug!(
        "Trimming kept {} of {} values within [{}, {})",
        kept.len(),
        values.len(),
        low,
        high.map_or_else(|| "inf".to_string(), |h| h.to_string())
    );

    std_dev(&kept, ddof)
}

/// 權重因子 (weight factor) 的估計器
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "estimator", rename_all = "snake_case")]
pub enum SpreadEstimator {
    Winsorized {
        #[serde(default = "default_percentile_low")]
        low: f64,
        #[serde(default = "default_percentile_high")]
        high: f64,
    },
    Trimmed {
        #[serde(default = "default_trim_low")]
        low: f64,
        #[serde(default)]
        high: Option<f64>,
        #[serde(default = "default_ddof")]
        ddof: usize,
    },
}

pub const DEFAULT_PERCENTILE_LOW: f64 = 0.10;
pub const DEFAULT_PERCENTILE_HIGH: f64 = 0.95;
pub const DEFAULT_TRIM_LOW: f64 = 0.02;
pub const DEFAULT_DDOF: usize = 1;

fn default_percentile_low() -> f64 {
    DEFAULT_PERCENTILE_LOW
}

fn default_percentile_high() -> f64 {
    DEFAULT_PERCENTILE_HIGH
}

fn default_trim_low() -> f64 {
    DEFAULT_TRIM_LOW
}

fn default_ddof() -> usize {
    DEFAULT_DDOF
}

impl SpreadEstimator {
    pub fn winsorized() -> Self {
        Self::Winsorized {
            low: default_percentile_low(),
            high: default_percentile_high(),
        }
    }

    pub fn trimmed() -> Self {
        Self::Trimmed {
            low: default_trim_low(),
            high: None,
            ddof: default_ddof(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Winsorized { .. } => "winsorized",
            Self::Trimmed { .. } => "trimmed",
        }
    }

    /// 對未排序樣本估計離散度
    pub fn estimate(&self, values: &[f64]) -> Result<f64> {
        match *self {
            Self::Winsorized { low, high } => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                winsorized_std_dev(&sorted, low, high)
            }
            Self::Trimmed { low, high, ddof } => trimmed_std_dev(values, low, high, ddof),
        }
    }
}

impl Default for SpreadEstimator {
    fn default() -> Self {
        Self::trimmed()
    }
}
