pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::incentive::{FactorStrategy, INVERSE_SQUARE_SCALE, Z_SCORE_BASE, Z_SCORE_K};
#[cfg(feature = "cli")]
use crate::core::stats::{
    SpreadEstimator, DEFAULT_DDOF, DEFAULT_PERCENTILE_HIGH, DEFAULT_PERCENTILE_LOW, DEFAULT_TRIM_LOW,
};
#[cfg(feature = "cli")]
use crate::domain::model::{OutputFormat, SourceSpec};
#[cfg(feature = "cli")]
use crate::utils::error::{FactorError, Result};
#[cfg(feature = "cli")]
use clap::{Parser, ValueEnum};
#[cfg(feature = "cli")]
use self::toml_config::{CompressionConfig, TomlConfig};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    InverseSquare,
    ZScore,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EstimatorKind {
    Trimmed,
    Winsorized,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "exit-factors")]
#[command(about = "Compute per-country funding factors from Tor exit probabilities")]
pub struct CliConfig {
    /// TOML job configuration; flags below override its values
    #[arg(short, long)]
    pub config: Option<String>,

    /// Fetch the Compass JSON document from this URL
    #[arg(long, conflicts_with_all = ["input", "command"])]
    pub endpoint: Option<String>,

    /// Read the Compass JSON document from a local file
    #[arg(long, conflicts_with = "command")]
    pub input: Option<String>,

    /// Run this program and read the Compass JSON document from its stdout
    #[arg(long)]
    pub command: Option<String>,

    /// Arguments passed to --command
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, requires = "command")]
    pub command_args: Vec<String>,

    /// Reject entries with unknown country codes instead of skipping them
    #[arg(long)]
    pub strict_countries: bool,

    /// Factor strategy; inferred from the estimator or z-score flags when omitted
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Spread estimator of the inverse-square strategy [default: trimmed]
    #[arg(long, value_enum)]
    pub estimator: Option<EstimatorKind>,

    /// Lower cutoff: percentile for winsorized, value for trimmed
    #[arg(long, allow_hyphen_values = true)]
    pub low: Option<f64>,

    /// Upper cutoff: percentile for winsorized, value for trimmed
    #[arg(long)]
    pub high: Option<f64>,

    /// Delta degrees of freedom for the trimmed estimator [default: 1]
    #[arg(long)]
    pub ddof: Option<usize>,

    /// Numerator of the inverse-square strategy [default: 10]
    #[arg(long)]
    pub scale: Option<f64>,

    /// Exponential base of the z-score strategy [default: 1.3]
    #[arg(long)]
    pub base: Option<f64>,

    /// Factor assigned to a country at the sample mean, z-score strategy [default: 2]
    #[arg(long)]
    pub k: Option<f64>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Output formats (txt, csv, json)
    #[arg(long, value_delimiter = ',')]
    pub formats: Vec<OutputFormat>,

    /// Bundle all outputs into this ZIP archive
    #[arg(long)]
    pub archive: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log per-phase CPU and memory usage")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    /// Show the resolved job without running it
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    fn source_override(&self) -> Option<SourceSpec> {
        if let Some(endpoint) = &self.endpoint {
            return Some(SourceSpec::Api {
                endpoint: endpoint.clone(),
                timeout_seconds: None,
                headers: None,
            });
        }
        if let Some(path) = &self.input {
            return Some(SourceSpec::File { path: path.clone() });
        }
        self.command.as_ref().map(|program| SourceSpec::Command {
            program: program.clone(),
            args: self.command_args.clone(),
        })
    }

    fn inverse_square_flags(&self) -> Vec<&'static str> {
        [
            ("--estimator", self.estimator.is_some()),
            ("--low", self.low.is_some()),
            ("--high", self.high.is_some()),
            ("--ddof", self.ddof.is_some()),
            ("--scale", self.scale.is_some()),
        ]
        .into_iter()
        .filter_map(|(flag, given)| given.then_some(flag))
        .collect()
    }

    fn z_score_flags(&self) -> Vec<&'static str> {
        [("--base", self.base.is_some()), ("--k", self.k.is_some())]
            .into_iter()
            .filter_map(|(flag, given)| given.then_some(flag))
            .collect()
    }

    /// 未指定 --strategy 時，由估計量或 z-score 參數推斷策略
    fn strategy_override(&self) -> Result<Option<FactorStrategy>> {
        let inverse_square_flags = self.inverse_square_flags();
        let z_score_flags = self.z_score_flags();

        let kind = match self.strategy {
            Some(kind) => kind,
            None => match (inverse_square_flags.is_empty(), z_score_flags.is_empty()) {
                (true, true) => return Ok(None),
                (false, true) => StrategyKind::InverseSquare,
                (true, false) => StrategyKind::ZScore,
                (false, false) => {
                    return Err(FactorError::ConfigValidationError {
                        field: "strategy".to_string(),
                        message: format!(
                            "{} and {} belong to different strategies",
                            inverse_square_flags.join(", "),
                            z_score_flags.join(", ")
                        ),
                    })
                }
            },
        };

        let stray = match kind {
            StrategyKind::ZScore => &inverse_square_flags,
            StrategyKind::InverseSquare => &z_score_flags,
        };
        if !stray.is_empty() {
            return Err(FactorError::ConfigValidationError {
                field: "strategy".to_string(),
                message: format!("{} do not apply to the {:?} strategy", stray.join(", "), kind),
            });
        }

        Ok(Some(match kind {
            StrategyKind::ZScore => FactorStrategy::ZScore {
                base: self.base.unwrap_or(Z_SCORE_BASE),
                k: self.k.unwrap_or(Z_SCORE_K),
            },
            StrategyKind::InverseSquare => {
                let estimator = match self.estimator.unwrap_or(EstimatorKind::Trimmed) {
                    EstimatorKind::Winsorized => SpreadEstimator::Winsorized {
                        low: self.low.unwrap_or(DEFAULT_PERCENTILE_LOW),
                        high: self.high.unwrap_or(DEFAULT_PERCENTILE_HIGH),
                    },
                    EstimatorKind::Trimmed => SpreadEstimator::Trimmed {
                        low: self.low.unwrap_or(DEFAULT_TRIM_LOW),
                        high: self.high,
                        ddof: self.ddof.unwrap_or(DEFAULT_DDOF),
                    },
                };
                FactorStrategy::InverseSquare {
                    estimator,
                    scale: self.scale.unwrap_or(INVERSE_SQUARE_SCALE),
                }
            }
        }))
    }

    /// 合併 TOML 設定與命令列覆蓋，得到最終的工作設定
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => {
                let source = self
                    .source_override()
                    .ok_or_else(|| FactorError::MissingConfigError {
                        field: "source (--endpoint, --input, --command or --config)".to_string(),
                    })?;
                TomlConfig::new(source, "./output")
            }
        };

        if let Some(source) = self.source_override() {
            config.source = source;
        }
        if self.strict_countries {
            config.extract.skip_unknown_countries = false;
        }
        if let Some(strategy) = self.strategy_override()? {
            config.strategy = strategy;
        }
        if let Some(output_path) = &self.output_path {
            config.load.output_path = output_path.clone();
        }
        if !self.formats.is_empty() {
            config.load.output_formats = self.formats.clone();
        }
        if let Some(archive) = &self.archive {
            config.load.compression = Some(CompressionConfig {
                enabled: true,
                filename: archive.clone(),
            });
        }

        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;
    use crate::core::ConfigProvider;

    #[test]
    fn test_resolve_from_flags() {
        let cli = CliConfig::parse_from([
            "exit-factors",
            "--input",
            "compass.json",
            "--strategy",
            "inverse-square",
            "--estimator",
            "winsorized",
            "--low",
            "0.05",
            "--formats",
            "txt,csv",
            "--output-path",
            "/tmp/factors",
        ]);

        let config = cli.resolve().unwrap();
        assert_eq!(
            config.source(),
            &SourceSpec::File {
                path: "compass.json".to_string()
            }
        );
        assert_eq!(
            config.strategy(),
            FactorStrategy::InverseSquare {
                estimator: SpreadEstimator::Winsorized { low: 0.05, high: 0.95 },
                scale: INVERSE_SQUARE_SCALE,
            }
        );
        assert_eq!(config.output_formats(), &[OutputFormat::Txt, OutputFormat::Csv]);
        assert_eq!(config.output_path(), "/tmp/factors");
    }

    #[test]
    fn test_resolve_command_source_and_z_score() {
        let cli = CliConfig::parse_from([
            "exit-factors",
            "--command",
            "../compass/compass.py",
            "--command-args=--json,--top=-1,--by-country",
            "--strategy",
            "z-score",
            "--archive",
            "factors.zip",
        ]);

        let config = cli.resolve().unwrap();
        assert_eq!(
            config.source(),
            &SourceSpec::Command {
                program: "../compass/compass.py".to_string(),
                args: vec![
                    "--json".to_string(),
                    "--top=-1".to_string(),
                    "--by-country".to_string()
                ],
            }
        );
        assert_eq!(config.strategy(), FactorStrategy::z_score());
        assert_eq!(config.archive_name(), Some("factors.zip"));
    }

    #[test]
    fn test_resolve_without_source_fails() {
        let cli = CliConfig::parse_from(["exit-factors"]);
        assert!(matches!(
            cli.resolve(),
            Err(FactorError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_estimator_flags_imply_inverse_square() {
        let cli = CliConfig::parse_from([
            "exit-factors",
            "--input",
            "compass.json",
            "--estimator",
            "winsorized",
            "--low",
            "0.2",
        ]);

        let config = cli.resolve().unwrap();
        assert_eq!(
            config.strategy(),
            FactorStrategy::InverseSquare {
                estimator: SpreadEstimator::Winsorized { low: 0.2, high: DEFAULT_PERCENTILE_HIGH },
                scale: INVERSE_SQUARE_SCALE,
            }
        );
    }

    #[test]
    fn test_z_score_flags_imply_z_score() {
        let cli = CliConfig::parse_from(["exit-factors", "--input", "compass.json", "--k", "3"]);

        let config = cli.resolve().unwrap();
        assert_eq!(
            config.strategy(),
            FactorStrategy::ZScore {
                base: Z_SCORE_BASE,
                k: 3.0,
            }
        );
    }

    #[test]
    fn test_flags_of_the_other_strategy_are_rejected() {
        let mixed = CliConfig::parse_from([
            "exit-factors",
            "--input",
            "compass.json",
            "--scale",
            "5",
            "--base",
            "1.5",
        ]);
        assert!(matches!(
            mixed.resolve(),
            Err(FactorError::ConfigValidationError { .. })
        ));

        let stray = CliConfig::parse_from([
            "exit-factors",
            "--input",
            "compass.json",
            "--strategy",
            "z-score",
            "--estimator",
            "winsorized",
        ]);
        assert!(matches!(
            stray.resolve(),
            Err(FactorError::ConfigValidationError { .. })
        ));
    }
}
