use tracing_appender::non_blocking::WorkerGuard;

/// # Phile Runner 日志系统使用说明
///
/// 1. 库代码只使用 `tracing` 宏，`main.rs` 负责调用 `setup_logging()`
/// 2. `-v, --verbose` 启用 DEBUG 级别；`RUST_LOG` 优先于 `-v`
/// 3. `PHILE_LOG_DIR` 设置后日志按天滚动写入该目录下的 `phile-runner.log.YYYY-MM-DD`
///
/// ```bash
/// # 守护进程，日志写入 /var/log/phile
/// PHILE_LOG_DIR=/var/log/phile phile-runner daemon
///
/// # 只看保留策略模块的调试日志
/// RUST_LOG=phile_core::retention=debug phile-runner retention 3 --dry-run
/// ```
///
/// 守护进程模式下终端输出带时间戳，其他命令使用不带时间的紧凑格式。
/// 返回的 guard 必须在 main 中持有到进程结束，否则文件日志可能丢失。
pub fn setup_logging(verbose: bool, daemon: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(log_dir) = std::env::var_os(LOG_DIR_ENV) {
        // 输出到文件 - 使用详细格式便于排查
        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(file_appender);

        fmt()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .init();
        return Some(guard);
    }

    if daemon {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(false)
            .compact()
            .init();
    } else {
        // 一次性命令 - 简洁格式，用户友好
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false)
            .without_time()
            .compact()
            .init();
    }
    None
}

/// 日志目录环境变量
pub const LOG_DIR_ENV: &str = "PHILE_LOG_DIR";

const LOG_FILE_PREFIX: &str = "phile-runner.log";
