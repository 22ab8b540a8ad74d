pub mod factor_pipeline;

pub use factor_pipeline::FactorPipeline;
