use crate::app::CliApp;
use crate::project_info::get_version_string;
use phile_core::scheduler::status::{HealthState, RunnerHealth};
use phile_core::{Result, RunMode, Scheduler, SchedulerOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 运行调度器，直到模式结束或收到停止信号
pub async fn run_daemon(app: &CliApp, mode: RunMode, cancel: CancellationToken) -> Result<()> {
    let options = SchedulerOptions::from_config(&app.config);

    if mode == RunMode::Continuous {
        let health = RunnerHealth::inspect(&options.data_dir, app.config.heartbeat_stale_after());
        if health.state != HealthState::Stopped {
            warn!(
                "⚠️  数据目录中已有调度器在运行 (PID {})，同一任务不会被并发执行",
                health.pid.unwrap_or_default()
            );
        }
    }

    info!("🚀 {} 调度器启动 (模式: {})", get_version_string(), mode);
    info!(
        "   轮询间隔: {}s, 数据库重试间隔: {}s",
        options.poll_interval.as_secs(),
        options.db_retry_backoff.as_secs()
    );

    let scheduler = Scheduler::new(app.orchestrator.clone(), options);
    let report = scheduler.run(mode, cancel).await?;

    info!(
        "⏹️  调度器已退出: {} 轮, 执行 {} 个任务 (失败 {} 个, 跳过 {} 个)",
        report.iterations, report.jobs_run, report.jobs_failed, report.jobs_skipped
    );
    Ok(())
}
