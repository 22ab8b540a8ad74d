use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 單一國家的出口機率 (0..=1)，國碼以小寫儲存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryProbability {
    pub country_code: String,
    pub exit_probability: f64,
}

impl CountryProbability {
    pub fn new(country_code: impl Into<String>, exit_probability: f64) -> Self {
        Self {
            country_code: country_code.into().to_ascii_lowercase(),
            exit_probability,
        }
    }
}

/// 單一國家的資助權重因子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryFactor {
    pub country_code: String,
    pub factor: f64,
}

/// transform 階段的結果，交給 load 階段輸出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorReport {
    pub strategy: String,
    pub generated_at: DateTime<Utc>,
    pub sample_size: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub weight_factor: Option<f64>,
    pub factors: Vec<CountryFactor>,
    pub probabilities: Vec<CountryProbability>,
}

impl FactorReport {
    pub fn factor_for(&self, country_code: &str) -> Option<f64> {
        self.factors
            .iter()
            .find(|f| f.country_code.eq_ignore_ascii_case(country_code))
            .map(|f| f.factor)
    }
}

/// 出口機率資料來源，皆須產出 Compass JSON 文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSpec {
    Api {
        endpoint: String,
        #[serde(default)]
        timeout_seconds: Option<u64>,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
    },
    File {
        path: String,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl SourceSpec {
    pub fn describe(&self) -> String {
        match self {
            Self::Api { endpoint, .. } => format!("api {}", endpoint),
            Self::File { path } => format!("file {}", path),
            Self::Command { program, args } => format!("command {} {}", program, args.join(" ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Txt,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Txt => "factors.txt",
            Self::Csv => "factors.csv",
            Self::Json => "factors.json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unsupported output format '{}', expected one of: txt, csv, json",
                other
            )),
        }
    }
}
