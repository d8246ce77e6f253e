use std::io;

use crate::util::config::LoggingConfig;
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

/// 按配置初始化日志系统：stdout 必开，文件层可选（按天滚动）。
/// 返回的 guard 必须持有到进程结束，否则落盘日志会丢尾部。
pub fn log_init_with_config(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = normalize_level(&config.level);

    // RUST_LOG 优先于配置文件的级别
    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = layer().with_writer(io::stdout).with_filter(stdout_filter);

    if config.file.enabled {
        std::fs::create_dir_all(&config.file.directory)?;

        let file_appender = daily(&config.file.directory, &config.file.prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new(level));

        Registry::default()
            .with(stdout_layer)
            .with(file_layer)
            .init();

        Ok(Some(guard))
    } else {
        Registry::default().with(stdout_layer).init();
        Ok(None)
    }
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}
