use crate::core::compass::ParseOptions;
use crate::core::incentive::FactorStrategy;
use crate::domain::model::{CountryProbability, FactorReport, OutputFormat, SourceSpec};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn source(&self) -> &SourceSpec;
    fn parse_options(&self) -> ParseOptions;
    fn strategy(&self) -> FactorStrategy;
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[OutputFormat];
    /// 設定時將所有輸出另外打包成此名稱的 ZIP
    fn archive_name(&self) -> Option<&str>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<CountryProbability>>;
    async fn transform(&self, data: Vec<CountryProbability>) -> Result<FactorReport>;
    async fn load(&self, report: FactorReport) -> Result<String>;
}
