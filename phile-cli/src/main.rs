use anyhow::Context;
use clap::Parser;
use phile_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use phile_core::scheduler::shutdown::spawn_signal_listener;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // 解析命令行参数
    let cli = Cli::parse();
    let command = cli.command_or_default();

    // 设置日志记录，guard 持有到 main 返回，保证文件日志写完
    let _log_guard = setup_logging(cli.verbose, command.is_daemon());

    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = command {
        if let Err(e) = run_init(&cli.config, force).await {
            error!("❌ 初始化失败: {}", e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    match run(&cli, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ 操作失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, command: Commands) -> anyhow::Result<()> {
    // 对于其他所有命令，我们需要加载配置并初始化App
    let app = CliApp::new_with_config(&cli.config)
        .await
        .with_context(|| {
            format!(
                "应用初始化失败，请检查配置文件 '{}' 或运行 'phile-runner init --force'",
                cli.config.display()
            )
        })?;

    // SIGTERM / Ctrl+C 只取消令牌，正在执行的脚本会跑完
    let cancel = CancellationToken::new();
    let signal_listener = spawn_signal_listener(cancel.clone());

    let result = app.run_command(command, cancel.clone()).await;
    cancel.cancel();
    signal_listener.await.context("信号监听任务异常退出")?;

    Ok(result?)
}
