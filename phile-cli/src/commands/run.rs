use crate::app::CliApp;
use phile_core::constants::trigger;
use phile_core::db::{BackupRun, RunStatus};
use phile_core::reconcile::ReconcileSummary;
use phile_core::{PhileError, Result};
use tracing::{info, warn};

/// 输出日志最多展示的行数
const OUTPUT_TAIL_LINES: usize = 20;

/// 手动执行一次备份任务
pub async fn run_job(app: &CliApp, job_id: i64, with_retention: bool) -> Result<()> {
    let job = app.orchestrator.load_job(job_id).await?;
    info!("▶️  执行备份任务 #{}: {}", job.id, job.name);

    let run_id = if with_retention {
        let report = app
            .orchestrator
            .run_job_with_retention(&job, trigger::MANUAL)
            .await?;
        show_scan(&report.scan);
        match &report.retention {
            Some(plan) => info!(
                "🧹 保留策略: 保留 {} 个, 删除 {} 个",
                plan.kept.len(),
                plan.deleted.len()
            ),
            None => info!("🧹 任务没有配置保留策略"),
        }
        report.run_id
    } else {
        app.orchestrator.run_job(&job, trigger::MANUAL).await?
    };

    show_run(app, run_id).await
}

/// 执行任务的恢复脚本
pub async fn run_restore(app: &CliApp, job_id: i64) -> Result<()> {
    let job = app.orchestrator.load_job(job_id).await?;
    info!("⏪ 执行恢复脚本 #{}: {}", job.id, job.name);

    let run_id = app.orchestrator.run_restore(&job).await?;
    show_run(app, run_id).await
}

/// 同步任务的文件清单
pub async fn run_scan(app: &CliApp, job_id: i64) -> Result<()> {
    let job = app.orchestrator.load_job(job_id).await?;
    info!("🔍 扫描输出目录: {}", job.output_directory);

    let scan = app.orchestrator.scan(&job).await?;
    show_scan(&scan);
    info!(
        "📦 当前活跃文件: {} 个",
        app.database.count_active_files(job.id).await?
    );
    Ok(())
}

pub(super) fn show_scan(scan: &ReconcileSummary) {
    if !scan.has_changes() {
        info!("📁 文件清单无变化 ({} 个文件)", scan.unchanged);
        return;
    }
    info!(
        "📁 文件清单: 新增 {}, 更新 {}, 恢复 {}, 消失 {}, 未变 {}",
        scan.discovered, scan.refreshed, scan.resurrected, scan.vanished, scan.unchanged
    );
}

async fn show_run(app: &CliApp, run_id: i64) -> Result<()> {
    let run = app
        .database
        .get_run(run_id)
        .await?
        .ok_or_else(|| PhileError::invalid_record(format!("执行记录 {run_id} 不存在")))?;

    show_output_tail(&run);
    match run.status {
        RunStatus::Success => info!("✅ 执行成功 (记录 #{})", run.id),
        _ => warn!(
            "❌ 执行失败 (记录 #{}, 退出码 {})",
            run.id,
            run.exit_code.unwrap_or_default()
        ),
    }
    Ok(())
}

fn show_output_tail(run: &BackupRun) {
    let lines: Vec<&str> = run.output_log.lines().collect();
    if lines.is_empty() {
        return;
    }
    let skipped = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    info!("📋 脚本输出:");
    if skipped > 0 {
        info!("   ... (省略 {} 行)", skipped);
    }
    for line in &lines[skipped..] {
        info!("   {}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::commands::test_support::{create_job, test_app};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_manual_run_records_run_and_scans() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;
        let out = temp_dir.path().join("out");
        let job_id = create_job(
            &app,
            temp_dir.path(),
            &format!("touch '{}/a.tar'\necho done", out.display()),
        )
        .await;

        run_job(&app, job_id, false).await.unwrap();

        let runs = app.database.list_runs(job_id, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].triggered_by, trigger::MANUAL);
        assert_eq!(app.database.count_active_files(job_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_without_script_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;
        let job_id = create_job(&app, temp_dir.path(), "true").await;

        let err = run_restore(&app, job_id).await.unwrap_err();
        assert!(matches!(err, PhileError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_unknown_job_is_reported() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;

        let err = run_scan(&app, 404).await.unwrap_err();
        assert!(matches!(err, PhileError::JobNotFound(404)));
    }
}
