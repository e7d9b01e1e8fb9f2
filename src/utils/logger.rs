use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the filter from `RUST_LOG`, falling back to the crate's own level.
pub fn env_filter(verbose: bool, level_override: Option<&str>) -> EnvFilter {
    let default_directive = match level_override {
        Some(level) => format!("media_pricing_etl={}", level),
        None if verbose => "media_pricing_etl=debug,info".to_string(),
        None => "media_pricing_etl=info".to_string(),
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

pub fn init_cli_logger(verbose: bool, json: bool) {
    init_logger(env_filter(verbose, None), json);
}

/// `[monitoring] log_level` 優先於 verbose 旗標
pub fn init_logger_with_level(verbose: bool, json: bool, level: Option<&str>) {
    init_logger(env_filter(verbose, level), json);
}

fn init_logger(filter: EnvFilter, json: bool) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    // JSON 格式方便日誌收集系統解析
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.compact())
            .init();
    }
}
