use crate::core::compass::ParseOptions;
use crate::core::incentive::FactorStrategy;
use crate::core::ConfigProvider;
use crate::domain::model::{OutputFormat, SourceSpec};
use crate::utils::error::{FactorError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub job: JobConfig,
    pub source: SourceSpec,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub strategy: FactorStrategy,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_skip_unknown")]
    pub skip_unknown_countries: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            skip_unknown_countries: default_skip_unknown(),
        }
    }
}

fn default_skip_unknown() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<OutputFormat>,
    pub compression: Option<CompressionConfig>,
}

pub(crate) fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Txt, OutputFormat::Json]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl TomlConfig {
    /// 只有來源與輸出路徑、其餘為預設值的設定
    pub fn new(source: SourceSpec, output_path: impl Into<String>) -> Self {
        Self {
            job: JobConfig {
                name: "exit-factors".to_string(),
                description: None,
                version: None,
            },
            source,
            extract: ExtractConfig::default(),
            strategy: FactorStrategy::default(),
            load: LoadConfig {
                output_path: output_path.into(),
                output_formats: default_output_formats(),
                compression: None,
            },
            monitoring: None,
        }
    }

    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(FactorError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| FactorError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${COMPASS_DIR})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| FactorError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("job.name", &self.job.name)?;

        match &self.source {
            SourceSpec::Api { endpoint, .. } => validation::validate_url("source.endpoint", endpoint)?,
            SourceSpec::File { path } => validation::validate_path("source.path", path)?,
            SourceSpec::Command { program, .. } => {
                validation::validate_non_empty_string("source.program", program)?
            }
        }

        self.strategy.validate()?;

        validation::validate_path("load.output_path", &self.load.output_path)?;
        if self.load.output_formats.is_empty() {
            return Err(FactorError::InvalidConfigValueError {
                field: "load.output_formats".to_string(),
                value: "[]".to_string(),
                reason: "At least one output format is required".to_string(),
            });
        }

        if let Some(compression) = self.load.compression.as_ref().filter(|c| c.enabled) {
            validation::validate_path("load.compression.filename", &compression.filename)?;
            if !compression.filename.ends_with(".zip") {
                return Err(FactorError::InvalidConfigValueError {
                    field: "load.compression.filename".to_string(),
                    value: compression.filename.clone(),
                    reason: "Archive name must end with .zip".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn source(&self) -> &SourceSpec {
        &self.source
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            skip_unknown_countries: self.extract.skip_unknown_countries,
        }
    }

    fn strategy(&self) -> FactorStrategy {
        self.strategy
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn output_formats(&self) -> &[OutputFormat] {
        &self.load.output_formats
    }

    fn archive_name(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::SpreadEstimator;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[job]
name = "monthly-factors"
description = "Country factors for the exit funding round"
version = "1.0"

[source]
type = "api"
endpoint = "https://compass.example.org/result.json"
timeout_seconds = 30

[extract]
skip_unknown_countries = false

[strategy]
kind = "inverse_square"
scale = 10.0

[strategy.estimator]
estimator = "winsorized"
low = 0.10
high = 0.95

[load]
output_path = "./factors"
output_formats = ["txt", "csv", "json"]

[load.compression]
enabled = true
filename = "factors.zip"

[monitoring]
enabled = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.job.name, "monthly-factors");
        assert!(matches!(
            config.source,
            SourceSpec::Api { timeout_seconds: Some(30), .. }
        ));
        assert!(!config.parse_options().skip_unknown_countries);
        assert_eq!(
            config.strategy(),
            FactorStrategy::inverse_square(SpreadEstimator::winsorized())
        );
        assert_eq!(config.output_formats().len(), 3);
        assert_eq!(config.archive_name(), Some("factors.zip"));
        assert!(config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_optional_sections() {
        let toml_content = r#"
[job]
name = "minimal"

[source]
type = "file"
path = "compass.json"

[load]
output_path = "./output"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.strategy(), FactorStrategy::default());
        assert!(config.parse_options().skip_unknown_countries);
        assert_eq!(config.output_formats(), &[OutputFormat::Txt, OutputFormat::Json]);
        assert_eq!(config.archive_name(), None);
        assert!(!config.monitoring_enabled());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("EXIT_FACTORS_TEST_COMPASS_DIR", "/opt/compass");

        let toml_content = r#"
[job]
name = "env"

[source]
type = "command"
program = "${EXIT_FACTORS_TEST_COMPASS_DIR}/compass.py"
args = ["--json", "--top=-1", "--by-country"]

[load]
output_path = "./output"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        match &config.source {
            SourceSpec::Command { program, args } => {
                assert_eq!(program, "/opt/compass/compass.py");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected source {:?}", other),
        }

        std::env::remove_var("EXIT_FACTORS_TEST_COMPASS_DIR");
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = r#"
[job]
name = "test"

[source]
type = "api"
endpoint = "invalid-url"

[load]
output_path = "./output"
"#;
        let config = TomlConfig::from_toml_str(bad_endpoint).unwrap();
        assert!(config.validate().is_err());

        let bad_strategy = r#"
[job]
name = "test"

[source]
type = "file"
path = "compass.json"

[strategy]
kind = "z_score"
base = -1.0

[load]
output_path = "./output"
"#;
        let config = TomlConfig::from_toml_str(bad_strategy).unwrap();
        assert!(config.validate().is_err());

        let bad_archive = r#"
[job]
name = "test"

[source]
type = "file"
path = "compass.json"

[load]
output_path = "./output"
output_formats = ["csv"]

[load.compression]
enabled = true
filename = "factors.tar"
"#;
        let config = TomlConfig::from_toml_str(bad_archive).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_output_format_fails_to_parse() {
        let toml_content = r#"
[job]
name = "test"

[source]
type = "file"
path = "compass.json"

[load]
output_path = "./output"
output_formats = ["yaml"]
"#;
        assert!(TomlConfig::from_toml_str(toml_content).is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[job]
name = "file-test"

[source]
type = "file"
path = "compass.json"

[load]
output_path = "./output"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.job.name, "file-test");
    }
}
