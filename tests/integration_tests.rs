use anyhow::Result;
use exit_factors::core::ConfigProvider;
use exit_factors::{
    EtlEngine, FactorError, FactorPipeline, FactorReport, FactorStrategy, LocalStorage,
    OutputFormat, SourceSpec, SpreadEstimator, TomlConfig,
};
use httpmock::prelude::*;
use tempfile::TempDir;

fn compass_document() -> serde_json::Value {
    serde_json::json!({
        "results": [
            {"cc": "de", "p_exit": 24.1, "cw": 20.3, "adv_bw": 19.8},
            {"cc": "us", "p_exit": 18.7},
            {"cc": "nl", "p_exit": 14.2},
            {"cc": "fr", "p_exit": 11.9},
            {"cc": "se", "p_exit": 6.3},
            {"cc": "ro", "p_exit": 4.4},
            {"cc": "ch", "p_exit": 3.1},
            {"cc": "??", "p_exit": 0.8},
            {"cc": "is", "p_exit": 0.9},
            {"cc": "tt", "p_exit": 0.05}
        ]
    })
}

fn read_report(dir: &TempDir) -> Result<FactorReport> {
    let json = std::fs::read(dir.path().join("factors.json"))?;
    Ok(serde_json::from_slice(&json)?)
}

#[tokio::test]
async fn test_end_to_end_with_http_source() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/compass.json");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(compass_document());
    });

    let mut config = TomlConfig::new(
        SourceSpec::Api {
            endpoint: server.url("/compass.json"),
            timeout_seconds: Some(5),
            headers: None,
        },
        output_path.clone(),
    );
    config.load.output_formats = vec![OutputFormat::Txt, OutputFormat::Csv, OutputFormat::Json];

    let storage = LocalStorage::new(output_path.clone());
    let engine = EtlEngine::new_with_monitoring(FactorPipeline::new(storage, config), false);

    let result = engine.run().await?;
    api_mock.assert();
    assert_eq!(result, output_path);

    let text = std::fs::read_to_string(temp_dir.path().join("factors.txt"))?;
    let countries: Vec<&str> = text
        .lines()
        .map(|line| line.split(": ").next().unwrap())
        .collect();
    assert_eq!(
        countries,
        vec!["de", "us", "nl", "fr", "se", "ro", "ch", "is", "tt"]
    );

    let csv = std::fs::read_to_string(temp_dir.path().join("factors.csv"))?;
    assert_eq!(csv.lines().count(), 10);

    let report = read_report(&temp_dir)?;
    assert_eq!(report.strategy, "inverse_square/trimmed");
    assert_eq!(report.sample_size, 9);
    assert!(report.weight_factor.unwrap() > 0.0);
    assert!(report.factors.iter().all(|f| f.factor.is_finite() && f.factor > 0.0));
    assert!((report.probabilities[0].exit_probability - 0.241).abs() < 1e-12);

    Ok(())
}

#[tokio::test]
async fn test_z_score_favours_low_exit_countries() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input_path = temp_dir.path().join("compass.json");
    std::fs::write(&input_path, serde_json::to_vec(&compass_document())?)?;

    let output_dir = temp_dir.path().join("out");
    let mut config = TomlConfig::new(
        SourceSpec::File {
            path: input_path.to_str().unwrap().to_string(),
        },
        output_dir.to_str().unwrap(),
    );
    config.strategy = FactorStrategy::z_score();

    let storage = LocalStorage::new(config.output_path().to_string());
    EtlEngine::new(FactorPipeline::new(storage, config)).run().await?;

    let json = std::fs::read(output_dir.join("factors.json"))?;
    let report: FactorReport = serde_json::from_slice(&json)?;

    let de = report.factor_for("de").unwrap();
    let tt = report.factor_for("tt").unwrap();
    assert!(tt > de);
    assert!(report.factor_for("??").is_none());

    Ok(())
}

#[tokio::test]
async fn test_identical_probabilities_fail_z_score() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input_path = temp_dir.path().join("flat.json");
    std::fs::write(
        &input_path,
        r#"{"results": [{"cc": "us", "p_exit": 10.0}, {"cc": "de", "p_exit": 10.0}]}"#,
    )?;

    let mut config = TomlConfig::new(
        SourceSpec::File {
            path: input_path.to_str().unwrap().to_string(),
        },
        temp_dir.path().to_str().unwrap(),
    );
    config.strategy = FactorStrategy::z_score();

    let storage = LocalStorage::new(temp_dir.path());
    let result = EtlEngine::new(FactorPipeline::new(storage, config)).run().await;

    assert!(matches!(result, Err(FactorError::DivisionByZero { .. })));
    assert!(!temp_dir.path().join("factors.txt").exists());

    Ok(())
}

#[tokio::test]
async fn test_missing_input_file_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = TomlConfig::new(
        SourceSpec::File {
            path: temp_dir.path().join("missing.json").to_str().unwrap().to_string(),
        },
        temp_dir.path().to_str().unwrap(),
    );

    let storage = LocalStorage::new(temp_dir.path());
    let result = EtlEngine::new(FactorPipeline::new(storage, config)).run().await;
    assert!(matches!(result, Err(FactorError::IoError(_))));

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_source_reads_stdout() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input_path = temp_dir.path().join("compass.json");
    std::fs::write(&input_path, serde_json::to_vec(&compass_document())?)?;

    let mut config = TomlConfig::new(
        SourceSpec::Command {
            program: "cat".to_string(),
            args: vec![input_path.to_str().unwrap().to_string()],
        },
        temp_dir.path().to_str().unwrap(),
    );
    config.strategy = FactorStrategy::inverse_square(SpreadEstimator::winsorized());
    config.load.output_formats = vec![OutputFormat::Json];

    let storage = LocalStorage::new(temp_dir.path());
    EtlEngine::new(FactorPipeline::new(storage, config)).run().await?;

    let report = read_report(&temp_dir)?;
    assert_eq!(report.strategy, "inverse_square/winsorized");
    assert_eq!(report.factors.len(), 9);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_command_is_a_source_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = TomlConfig::new(
        SourceSpec::Command {
            program: "false".to_string(),
            args: vec![],
        },
        temp_dir.path().to_str().unwrap(),
    );

    let storage = LocalStorage::new(temp_dir.path());
    let result = EtlEngine::new(FactorPipeline::new(storage, config)).run().await;
    assert!(matches!(result, Err(FactorError::SourceError { .. })));

    Ok(())
}

#[tokio::test]
async fn test_toml_job_with_archive() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path().to_str().unwrap().replace('\\', "/");

    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/compass")
            .header("x-compass-token", "secret");
        then.status(200).json_body(compass_document());
    });

    let config_content = format!(
        r#"
[job]
name = "archive-test"

[source]
type = "api"
endpoint = "{}"

[source.headers]
x-compass-token = "secret"

[strategy]
kind = "inverse_square"

[strategy.estimator]
estimator = "trimmed"
low = 0.02
high = 0.2
ddof = 0

[load]
output_path = "{}"
output_formats = ["txt", "json"]

[load.compression]
enabled = true
filename = "factors.zip"
"#,
        server.url("/compass"),
        temp_path
    );

    let config_path = temp_dir.path().join("job.toml");
    tokio::fs::write(&config_path, config_content).await?;
    let config = TomlConfig::from_file(&config_path)?;

    let storage = LocalStorage::new(config.output_path().to_string());
    let output = EtlEngine::new(FactorPipeline::new(storage, config)).run().await?;

    api_mock.assert();
    assert!(output.ends_with("factors.zip"));

    let zip_data = std::fs::read(temp_dir.path().join("factors.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).map(|f| f.name().to_string()))
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(names, vec!["factors.txt", "factors.json"]);

    Ok(())
}
