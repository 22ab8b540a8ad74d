pub mod compass;
pub mod etl;
pub mod funding;
pub mod incentive;
pub mod stats;

pub use crate::domain::model::{CountryFactor, CountryProbability, FactorReport};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
