pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};

pub use app::pipelines::FactorPipeline;
pub use crate::core::{
    etl::EtlEngine,
    funding::{allocate_support, FundingParams, FundingReport, Partner, Relay},
    incentive::FactorStrategy,
    stats::SpreadEstimator,
};
pub use domain::model::{CountryFactor, CountryProbability, FactorReport, OutputFormat, SourceSpec};
pub use utils::error::{FactorError, Result};
