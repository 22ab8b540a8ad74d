use crate::core::compass;
use crate::core::{ConfigProvider, CountryProbability, FactorReport, Pipeline, Storage};
use crate::domain::model::{OutputFormat, SourceSpec};
use crate::utils::error::{FactorError, Result};
use reqwest::Client;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use zip::write::{FileOptions, ZipWriter};

pub struct FactorPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) config: C,
    pub(crate) client: Client,
}

impl<S: Storage, C: ConfigProvider> FactorPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self {
            storage,
            config,
            client: Client::new(),
        }
    }

    async fn fetch_document(&self) -> Result<Vec<u8>> {
        match self.config.source() {
            SourceSpec::Api {
                endpoint,
                timeout_seconds,
                headers,
            } => {
                let mut request = self.client.get(endpoint);

                if let Some(headers) = headers {
                    for (key, value) in headers {
                        request = request.header(key, value);
                    }
                }
                if let Some(timeout) = timeout_seconds {
                    request = request.timeout(Duration::from_secs(*timeout));
                }

                tracing::debug!("Making API request to: {}", endpoint);
                let response = request.send().await?;
                tracing::debug!("API response status: {}", response.status());

                if !response.status().is_success() {
                    return Err(FactorError::SourceError {
                        message: format!("{} returned HTTP {}", endpoint, response.status()),
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
            SourceSpec::File { path } => {
                tracing::debug!("Reading Compass document from {}", path);
                Ok(tokio::fs::read(path).await?)
            }
            SourceSpec::Command { program, args } => {
                tracing::debug!("Running {} {}", program, args.join(" "));
                let output = tokio::process::Command::new(program)
                    .args(args)
                    .output()
                    .await
                    .map_err(|e| FactorError::SourceError {
                        message: format!("failed to run {}: {}", program, e),
                    })?;

                if !output.status.success() {
                    return Err(FactorError::SourceError {
                        message: format!(
                            "{} exited with {}: {}",
                            program,
                            output.status,
                            String::from_utf8_lossy(&output.stderr).trim()
                        ),
                    });
                }
                Ok(output.stdout)
            }
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    country_code: &'a str,
    exit_probability: f64,
    factor: f64,
}

/// 每行 `<cc>: <factor>`，保留六位小數
pub fn render_text(report: &FactorReport) -> String {
    report
        .factors
        .iter()
        .map(|f| format!("{}: {:.6}\n", f.country_code, f.factor))
        .collect()
}

pub fn render_csv(report: &FactorReport) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for (factor, probability) in report.factors.iter().zip(&report.probabilities) {
        writer.serialize(CsvRow {
            country_code: &factor.country_code,
            exit_probability: probability.exit_probability,
            factor: factor.factor,
        })?;
    }

    writer
        .into_inner()
        .map_err(|e| FactorError::IoError(e.into_error()))
}

pub fn render(report: &FactorReport, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Txt => Ok(render_text(report).into_bytes()),
        OutputFormat::Csv => render_csv(report),
        OutputFormat::Json => Ok(serde_json::to_vec_pretty(report)?),
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for FactorPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<CountryProbability>> {
        tracing::info!("📡 Source: {}", self.config.source().describe());

        let document = self.fetch_document().await?;
        tracing::debug!("Received Compass document ({} bytes)", document.len());

        compass::parse_document(&document, self.config.parse_options())
    }

    async fn transform(&self, data: Vec<CountryProbability>) -> Result<FactorReport> {
        let strategy = self.config.strategy();
        tracing::debug!("Applying strategy {:?}", strategy);
        strategy.apply(&data)
    }

    async fn load(&self, report: FactorReport) -> Result<String> {
        let mut files = Vec::new();

        for format in self.config.output_formats() {
            let data = render(&report, *format)?;
            tracing::debug!("Writing {} ({} bytes)", format.file_name(), data.len());
            self.storage.write_file(format.file_name(), &data).await?;
            files.push((format.file_name(), data));
        }

        let Some(archive_name) = self.config.archive_name() else {
            return Ok(self.config.output_path().to_string());
        };

        tracing::debug!("Creating ZIP archive with {} files", files.len());
        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
            for (name, data) in &files {
                zip.start_file::<_, ()>(*name, FileOptions::default())?;
                zip.write_all(data)?;
            }
            zip.finish()?.into_inner()
        };

        self.storage.write_file(archive_name, &zip_data).await?;
        tracing::debug!("ZIP archive saved ({} bytes)", zip_data.len());

        Ok(format!("{}/{}", self.config.output_path(), archive_name))
    }
}
