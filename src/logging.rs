//! 日志 - 控制台与输出目录中 output.log / error.log 的 tracing 订阅者

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

pub const OUTPUT_LOG_FILE: &str = "output.log";
pub const ERROR_LOG_FILE: &str = "error.log";

/// output.log 记录本crate DEBUG 及以上的事件
const OUTPUT_LOG_DIRECTIVE: &str = "cellmaps_hierarchyeval=debug";

/// `-v` 次数对应的控制台日志级别
pub fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// 控制台过滤器：`logconf` 指令优先，否则按 `-v` 次数
pub fn console_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match config.logconf.as_deref() {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log configuration: {}", directives)),
        None => Ok(EnvFilter::new(verbosity_level(config.verbosity).to_string())),
    }
}

fn log_file(outdir: &Path, name: &str) -> Result<Mutex<File>> {
    let path = outdir.join(name);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;
    Ok(Mutex::new(file))
}

/// 构建本次运行的 tracing 分发器
///
/// 未设置 `skip_logging` 时在 `outdir` 中创建（或截断）output.log 与 error.log。
/// 返回的分发器由调用方以 `WithSubscriber` 绑定到运行的 future 上，不设置全局订阅者。
pub fn build_dispatch(config: &LoggingConfig, outdir: &Path) -> Result<Dispatch> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter(config)?)
            .boxed(),
    );

    if !config.skip_logging {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file(outdir, OUTPUT_LOG_FILE)?)
                .with_ansi(false)
                .with_filter(EnvFilter::new(OUTPUT_LOG_DIRECTIVE))
                .boxed(),
        );
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file(outdir, ERROR_LOG_FILE)?)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR)
                .boxed(),
        );
    }

    Ok(Dispatch::new(Registry::default().with(layers)))
}
