use crate::app::CliApp;
use crate::commands::run::show_scan;
use phile_core::format::format_bytes;
use phile_core::{Result, RetentionOutcome};
use tracing::info;

/// 立即执行保留策略
pub async fn run_retention(app: &CliApp, job_id: i64, dry_run: bool) -> Result<()> {
    let job = app.orchestrator.load_job(job_id).await?;
    info!("🧹 执行保留策略 #{}: {}", job.id, job.name);

    for tier in app.database.list_tiers(job.id).await? {
        let label = tier.keep_granularity.label();
        match tier.max_age_days {
            Some(days) => info!("   层级 {}: {} 天内 {}", tier.sort_order, days, label),
            None => info!("   层级 {}: 其余 {}", tier.sort_order, label),
        }
    }
    if job.retention_max_count > 0 {
        info!("   数量上限: {}", job.retention_max_count);
    }

    let outcome = app.orchestrator.enforce_retention(&job, dry_run).await?;
    let (active_before, scan, plan) = match outcome {
        RetentionOutcome::NothingToDo => {
            info!("💡 任务没有配置保留层级或数量上限，无需处理");
            return Ok(());
        }
        RetentionOutcome::Applied {
            active_before,
            scan,
            plan,
        } => (active_before, scan, plan),
    };

    show_scan(&scan);
    let verb = if dry_run { "将删除" } else { "已删除" };
    for file in &plan.deleted {
        info!("   🗑️  {} {} ({})", verb, file.filename, format_bytes(file.filesize));
    }
    let freed: i64 = plan.deleted.iter().map(|f| f.filesize).sum();

    if dry_run {
        info!(
            "🔎 预览: {} 个活跃文件中保留 {} 个，将删除 {} 个 (释放 {})",
            active_before,
            plan.kept.len(),
            plan.deleted.len(),
            format_bytes(freed)
        );
    } else {
        info!(
            "✅ 完成: {} 个活跃文件中保留 {} 个，删除 {} 个 (释放 {})",
            active_before,
            plan.kept.len(),
            plan.deleted.len(),
            format_bytes(freed)
        );
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::commands::test_support::{create_job, test_app};
    use phile_core::db::{Granularity, NewRetentionTier};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_dry_run_keeps_files_on_disk() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;
        let job_id = create_job(&app, temp_dir.path(), "true").await;
        app.database
            .replace_tiers(job_id, &[NewRetentionTier::catch_all(Granularity::Yearly)])
            .await
            .unwrap();

        // 同一年的三个文件，每年只保留最新的一个
        let out = temp_dir.path().join("out");
        for name in ["a.tar", "b.tar", "c.tar"] {
            std::fs::write(out.join(name), b"x").unwrap();
        }

        run_retention(&app, job_id, true).await.unwrap();
        for name in ["a.tar", "b.tar", "c.tar"] {
            assert!(out.join(name).exists());
        }
        assert_eq!(app.database.count_active_files(job_id).await.unwrap(), 3);

        run_retention(&app, job_id, false).await.unwrap();
        assert_eq!(app.database.count_active_files(job_id).await.unwrap(), 1);
        let remaining = ["a.tar", "b.tar", "c.tar"]
            .iter()
            .filter(|name| out.join(name).exists())
            .count();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_job_without_rules_is_left_alone() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;
        let job_id = create_job(&app, temp_dir.path(), "true").await;
        std::fs::write(temp_dir.path().join("out").join("a.tar"), b"x").unwrap();

        run_retention(&app, job_id, false).await.unwrap();
        assert!(temp_dir.path().join("out").join("a.tar").exists());
    }
}
