//! Compass `--json --by-country` 文件解析
//!
//! 文件形狀為 `{ "results": [ {"cc": "us", "p_exit": 12.34}, ... ] }`，
//! `p_exit` 為百分比，轉成 0..=1 的機率後回傳。

use crate::domain::model::CountryProbability;
use crate::utils::error::{FactorError, Result};
use crate::utils::validation::validate_country_code;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CompassDocument {
    results: Vec<CompassEntry>,
}

#[derive(Debug, Deserialize)]
struct CompassEntry {
    cc: Option<String>,
    p_exit: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// 略過非兩字母國碼的項目 (例如 Compass 的 "??")，否則視為錯誤
    pub skip_unknown_countries: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            skip_unknown_countries: true,
        }
    }
}

pub fn parse_document(bytes: &[u8], options: ParseOptions) -> Result<Vec<CountryProbability>> {
    let document: CompassDocument = serde_json::from_slice(bytes)?;
    from_entries(document.results, options)
}

pub fn parse_value(value: serde_json::Value, options: ParseOptions) -> Result<Vec<CountryProbability>> {
    let document: CompassDocument = serde_json::from_value(value)?;
    from_entries(document.results, options)
}

fn from_entries(entries: Vec<CompassEntry>, options: ParseOptions) -> Result<Vec<CountryProbability>> {
    let mut probabilities = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let code = entry.cc.unwrap_or_default().trim().to_ascii_lowercase();

        if let Err(e) = validate_country_code(&code) {
            if options.skip_unknown_countries {
                tracing::warn!("⚠️ Skipping result #{} with unknown country '{}'", index, code);
                continue;
            }
            return Err(e);
        }

        let percent = entry.p_exit.ok_or_else(|| {
            FactorError::invalid_input(format!("result #{} ('{}') has no p_exit", index, code))
        })?;
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(FactorError::invalid_input(format!(
                "p_exit for '{}' must be a percentage within [0, 100], got {}",
                code, percent
            )));
        }

        probabilities.push(CountryProbability::new(code, percent / 100.0));
    }

    tracing::debug!("Parsed {} country probabilities", probabilities.len());
    Ok(probabilities)
}
