use clap::Parser;
use exit_factors::core::ConfigProvider;
use exit_factors::utils::error::ErrorSeverity;
use exit_factors::utils::{logger, validation::Validate};
use exit_factors::{CliConfig, EtlEngine, FactorPipeline, LocalStorage, TomlConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting exit-factors");
    tracing::debug!("CLI config: {:?}", cli);

    // 合併設定並驗證
    let config = match cli.resolve().and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    tracing::info!("✅ Configuration loaded and validated successfully");

    if cli.dry_run {
        display_config_summary(&config);
        return Ok(());
    }

    let monitor_enabled = cli.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = FactorPipeline::new(storage, config);
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Exit factors computed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Factor computation failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            // 依錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig) {
    println!("📋 Job Summary:");
    println!("  Job: {}", config.job.name);
    println!("  Source: {}", config.source().describe());
    println!(
        "  Unknown countries: {}",
        if config.parse_options().skip_unknown_countries {
            "skipped"
        } else {
            "rejected"
        }
    );
    println!("  Strategy: {}", config.strategy().name());
    println!("  Parameters: {:?}", config.strategy());
    println!("  Output: {}", config.output_path());
    println!(
        "  Formats: {}",
        config
            .output_formats()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(archive) = config.archive_name() {
        println!("  Archive: {}", archive);
    }
    println!("  🔍 DRY RUN - nothing was fetched or written");
}
