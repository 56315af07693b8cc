use clap::Parser;
use ros2_bag_filter::core::BagReader;
use ros2_bag_filter::utils::validation::Validate;
use ros2_bag_filter::utils::{display, logger};
use ros2_bag_filter::{
    BagFilterError, BagFilterPipeline, CliConfig, FilterEngine, SqliteBagReader, SqliteBagWriter,
};

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting ros2-bag-filter");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = run(config).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Bag filter failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        // 輸出用戶友好的錯誤信息
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(config: CliConfig) -> Result<(), BagFilterError> {
    // 驗證配置
    config.validate()?;

    let reader = SqliteBagReader::open(&config.input).await?;

    if config.list {
        let summary = reader.summary().await?;
        print!("{}", display::render_bag_summary(&summary));
        reader.close().await;
        return Ok(());
    }

    // validate() 已確認非 --list 時一定有 output
    let Some(output) = config.output.clone() else {
        return Err(BagFilterError::MissingConfigError {
            field: "output".to_string(),
        });
    };
    let writer = SqliteBagWriter::new(output, config.writer_options())
        .with_protected_paths(reader.location().storage_files.clone());

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }
    let dry_run = config.dry_run;
    let json = config.json;

    let pipeline = BagFilterPipeline::new(reader, writer, config);
    let engine = FilterEngine::new_with_monitoring(pipeline, monitor_enabled);

    if dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        let plan = engine.preview().await?;
        print!("{}", display::render_plan(&plan));
        engine.pipeline().reader().close().await;
        return Ok(());
    }

    let report = engine.run().await?;
    engine.pipeline().reader().close().await;

    tracing::info!("✅ Bag processed successfully!");
    tracing::info!("📁 Output saved to: {}", report.output_path.display());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", display::render_report(&report));
    }

    Ok(())
}
