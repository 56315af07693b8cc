use anyhow::Context;
use clap::Parser;
use ros2_bag_filter::core::FilterSettings;
use ros2_bag_filter::utils::validation::Validate;
use ros2_bag_filter::utils::{display, logger};
use ros2_bag_filter::{
    BagFilterError, BagFilterPipeline, FilterEngine, SqliteBagReader, SqliteBagWriter, TomlConfig,
};

#[derive(Parser)]
#[command(name = "toml-bag-filter")]
#[command(about = "Filter a ROS 2 bag as described by a TOML job file")]
struct Args {
    /// Path to TOML job file
    #[arg(short, long, default_value = "bag-filter.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show what would be written without writing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 載入 TOML 配置
    let config = TomlConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load job file '{}'", args.config))?;

    // 初始化日誌
    logger::init_cli_logger(args.verbose || config.verbose());

    tracing::info!("🚀 Starting TOML-based bag filter");
    tracing::info!("📁 Loaded job from: {}", args.config);

    display_config_summary(&config, &args);

    if let Err(e) = run(config, &args).await {
        tracing::error!(
            "❌ Bag filter failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(config: TomlConfig, args: &Args) -> Result<(), BagFilterError> {
    // 驗證配置
    config.validate()?;
    tracing::info!("✅ Configuration loaded and validated successfully");

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let reader = SqliteBagReader::open(config.input_path()).await?;
    let writer = SqliteBagWriter::new(config.output_path(), config.writer_options())
        .with_protected_paths(reader.location().storage_files.clone());
    let pipeline = BagFilterPipeline::new(reader, writer, config);
    let engine = FilterEngine::new_with_monitoring(pipeline, monitor_enabled);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be written");
        let plan = engine.preview().await?;
        print!("{}", display::render_plan(&plan));
        engine.pipeline().reader().close().await;
        return Ok(());
    }

    let report = engine.run().await?;
    engine.pipeline().reader().close().await;
    print!("{}", display::render_report(&report));

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Job Summary:");
    println!("  Job: {}", config.job.name);
    if let Some(description) = &config.job.description {
        println!("  Description: {}", description);
    }
    println!("  Input: {}", config.input_path().display());
    println!("  Output: {}", config.output_path().display());

    match config.filter.all_topics {
        Some(true) => println!("  Topics: all"),
        _ => println!(
            "  Topics: {}",
            config.filter.topics.clone().unwrap_or_default().join(", ")
        ),
    }

    let window = config.time_window();
    println!(
        "  Window: {}s .. {}",
        window.start_offset,
        window
            .end_offset
            .map(|e| format!("{}s", e))
            .unwrap_or_else(|| "end of bag".to_string())
    );
    println!("  Batch Size: {}", config.batch_size());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}
