use std::str::FromStr;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// 日志文件名前缀，按天分割后形如 `larder_log.2024-01-01`
const LOG_PREFIX: &str = "larder_log";

/// 出站连接的日志太多，默认只保留警告
const QUIET_TARGETS: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// 初始化 Logger
///
/// 控制台总是输出日志。`log_folder` 为空时不写文件，
/// 否则日志写入该文件夹并按天分割。
///
/// 返回的 guard 需要一直持有，drop 之后文件日志不再刷新。
pub fn init_logger(log_level: &str, log_folder: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = if log_folder.is_empty() {
        (None, None)
    } else {
        let file_appender = tracing_appender::rolling::daily(log_folder, LOG_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(non_blocking);
        (Some(layer), Some(guard))
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout);

    let collector = tracing_subscriber::registry()
        .with(build_filter(log_level))
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(collector)
        .with_context(|| "to set a global collector")?;
    Ok(guard)
}

/// 解析日志级别，无效时回退到 info
///
/// 用户没有单独指定的依赖库会被压到 warn。
fn build_filter(log_level: &str) -> EnvFilter {
    let mut filter = EnvFilter::from_str(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in QUIET_TARGETS {
        let target = directive.split('=').next().unwrap_or_default();
        if log_level.contains(target) {
            continue;
        }
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}
