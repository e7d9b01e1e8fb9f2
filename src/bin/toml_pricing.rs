use clap::Parser;
use media_pricing_etl::core::ConfigProvider;
use media_pricing_etl::domain::services::ServiceCatalog;
use media_pricing_etl::utils::{logger, validation::Validate};
use media_pricing_etl::{EtlEngine, LocalStorage, PricingPipeline, SourceAdapter, TomlConfig};

#[derive(Parser)]
#[command(name = "toml-pricing")]
#[command(about = "Media pricing ETL driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "pricing.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override the sampling seed from config
    #[arg(long)]
    seed: Option<u64>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 載入 TOML 配置 (日誌層級可能來自配置，因此先讀檔)
    let loaded = TomlConfig::from_file(&args.config);
    let level = loaded.as_ref().ok().and_then(|c| c.log_level().map(String::from));
    logger::init_logger_with_level(args.verbose, args.json_logs, level.as_deref());

    tracing::info!("🚀 Starting TOML-based pricing ETL");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    if let Some(seed) = args.seed {
        config.pricing.seed = Some(seed);
        tracing::info!("🔧 Sampling seed overridden to: {}", seed);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config)?;
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let source = SourceAdapter::from_config(&config.source)?;
    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = PricingPipeline::new(storage, source, config);

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Pricing run completed successfully!");
            tracing::info!("📁 Output saved to: {}", output_path);
            println!("✅ Pricing run completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Pricing run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.severity().exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name, config.pipeline.version
    );
    if let Some(description) = &config.pipeline.description {
        println!("  Description: {}", description);
    }
    println!("  Source: {}", config.source.r#type);
    println!("  Output: {}", config.output_path());
    println!(
        "  Layout: {}",
        if config.split_by_region() {
            "one document per region"
        } else {
            "single national document"
        }
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Data Source Analysis:");
    match config.source.r#type.as_str() {
        "api" => {
            println!(
                "  Endpoint: {}",
                config.source.endpoint.as_deref().unwrap_or("-")
            );
            if let Some(url) = &config.source.municipalities_endpoint {
                println!("  Municipality list: {}", url);
            }
            if let Some(headers) = &config.source.headers {
                println!("  Headers: {} custom headers", headers.len());
            }
        }
        _ => {
            println!(
                "  Observations: {}",
                config.source.observations.as_deref().unwrap_or("-")
            );
            if let Some(path) = &config.source.municipalities {
                println!("  Municipality list: {}", path);
            }
        }
    }

    let catalog = if config.services().is_empty() {
        ServiceCatalog::reference()
    } else {
        ServiceCatalog::new(config.services().iter().cloned())?
    };

    println!();
    println!("⚙️ Pricing:");
    println!("  Services ({}): {}", catalog.len(), catalog.names().join(", "));
    println!("  Nearest K: {}", config.nearest_k());
    println!(
        "  Regional adjustment: x{}",
        config.regional_adjustment_factor()
    );
    match config.seed() {
        Some(seed) => println!("  Seed: {} (reproducible)", seed),
        None => println!("  Seed: none (fresh sample every run)"),
    }

    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    if let Some(country) = config.country_label() {
        println!("  Country key: {}", country);
    }
    if config.split_by_region() {
        println!("  File template: {}", config.regional_filename());
    } else {
        println!("  File: {}", config.national_filename());
    }
    if let Some(bundle) = config.bundle_filename() {
        println!("  Compression: {} (ZIP)", bundle);
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");

    Ok(())
}
