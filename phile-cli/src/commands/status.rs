use crate::app::CliApp;
use crate::project_info::get_version_string;
use chrono::Local;
use phile_core::Result;
use phile_core::format::format_bytes;
use phile_core::scheduler::status::{HealthState, LivenessFiles, RunnerHealth};
use tracing::{info, warn};

/// 显示客户端版本信息（标题和基本信息）
pub fn show_client_version() {
    info!("🗄️  {} 状态", get_version_string());
    info!("==========================");
}

/// 显示调度器健康状态和存储统计
pub async fn run_status(app: &CliApp) -> Result<()> {
    show_client_version();
    info!("📋 基本信息:");
    info!("   配置文件: {}", app.config_path.display());
    info!("   数据库: {}", app.config.database.path);
    info!("   数据目录: {}", app.config.runner.data_dir);

    let health = RunnerHealth::inspect(
        &app.config.get_data_dir(),
        app.config.heartbeat_stale_after(),
    );
    let heartbeat = health
        .last_heartbeat
        .map(|at| {
            at.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "无".to_string());

    info!("🔄 调度器:");
    match health.state {
        HealthState::Running => info!(
            "   ✅ 运行中 (PID {})",
            health.pid.unwrap_or_default()
        ),
        HealthState::Stale => warn!(
            "   ⚠️  进程存在但心跳超时 (PID {})，可能卡在长时间运行的脚本中",
            health.pid.unwrap_or_default()
        ),
        HealthState::Stopped => info!("   ⏹️  未运行"),
    }
    info!("   最近心跳: {}", heartbeat);

    let totals = app.database.storage_totals().await?;
    info!("📦 存储统计:");
    info!("   备份任务: {} 个", totals.jobs);
    info!("   活跃文件: {} 个", totals.active_files);
    info!("   占用空间: {}", format_bytes(totals.active_bytes));

    Ok(())
}

/// 停止正在运行的调度器
pub async fn run_stop(app: &CliApp) -> Result<()> {
    let data_dir = app.config.get_data_dir();
    let health = RunnerHealth::inspect(&data_dir, app.config.heartbeat_stale_after());
    if health.state == HealthState::Stopped {
        // 清理进程已退出但残留的 PID 文件
        LivenessFiles::new(&data_dir).remove_pid()?;
        info!("⏹️  调度器未运行");
        return Ok(());
    }

    match RunnerHealth::request_stop(&data_dir)? {
        Some(pid) => info!("✅ 已向调度器发送停止信号 (PID {})", pid),
        None => info!("💡 没有找到 PID 文件"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::test_app;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_status_without_daemon() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;

        run_status(&app).await.unwrap();
        run_stop(&app).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_removes_stale_pid_file() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;
        let files = LivenessFiles::new(&app.config.get_data_dir());
        // 不存在的进程号
        files.write_pid(u32::MAX / 2).unwrap();

        run_stop(&app).await.unwrap();
        assert!(!files.pid_path().exists());
    }
}
