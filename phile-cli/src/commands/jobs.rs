use crate::app::CliApp;
use chrono::{DateTime, Local, Utc};
use phile_core::Result;
use phile_core::db::{FileStatus, RunStatus};
use phile_core::format::{format_bytes, format_interval};
use tracing::info;

fn local_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| {
        at.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    })
    .unwrap_or_else(|| "-".to_string())
}

/// 列出所有备份任务
pub async fn run_list_jobs(app: &CliApp) -> Result<()> {
    let jobs = app.database.list_jobs().await?;
    if jobs.is_empty() {
        info!("📭 还没有配置任何备份任务");
        return Ok(());
    }

    info!("📋 备份任务 ({} 个):", jobs.len());
    for job in &jobs {
        let schedule = if job.schedule_enabled {
            format_interval(job.schedule_interval)
        } else {
            format_interval(0)
        };
        let state = if job.is_active { "✅" } else { "⏸️ " };
        info!("{} #{} {} [{}]", state, job.id, job.name, schedule);
        info!(
            "     输出目录: {} (匹配 {})",
            job.output_directory, job.file_pattern
        );
        info!(
            "     下次执行: {}  上次执行: {}",
            local_time(job.next_run_at),
            local_time(job.last_run_at)
        );
        let active = app.database.count_active_files(job.id).await?;
        if job.retention_max_count > 0 {
            info!(
                "     活跃文件: {} 个 (上限 {})",
                active, job.retention_max_count
            );
        } else {
            info!("     活跃文件: {} 个", active);
        }
    }
    Ok(())
}

/// 显示任务最近的执行记录
pub async fn run_list_runs(app: &CliApp, job_id: i64, limit: usize) -> Result<()> {
    let job = app.orchestrator.load_job(job_id).await?;
    let runs = app.database.list_runs(job.id, limit).await?;
    if runs.is_empty() {
        info!("📭 任务 #{} 还没有执行记录", job.id);
        return Ok(());
    }

    info!("🕘 任务 #{} {} 最近 {} 次执行:", job.id, job.name, runs.len());
    for run in &runs {
        let icon = match run.status {
            RunStatus::Success => "✅",
            RunStatus::Failure => "❌",
            RunStatus::Running => "⏳",
        };
        let exit_code = run
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "{} #{} {} -> {} [{}] 退出码 {}",
            icon,
            run.id,
            local_time(Some(run.started_at)),
            local_time(run.finished_at),
            run.triggered_by,
            exit_code
        );
    }
    Ok(())
}

/// 显示任务的备份文件清单
pub async fn run_list_files(app: &CliApp, job_id: i64, include_deleted: bool) -> Result<()> {
    let job = app.orchestrator.load_job(job_id).await?;
    let files = if include_deleted {
        app.database.list_files(job.id).await?
    } else {
        app.database.list_active_files(job.id).await?
    };
    if files.is_empty() {
        info!("📭 任务 #{} 没有备份文件记录", job.id);
        return Ok(());
    }

    let mut total = 0;
    info!("📦 任务 #{} {} 的备份文件:", job.id, job.name);
    for file in &files {
        let mtime = local_time(DateTime::from_timestamp(file.file_mtime, 0));
        match file.status {
            FileStatus::Active => {
                total += file.filesize;
                info!(
                    "   {}  {:>10}  {}",
                    mtime,
                    format_bytes(file.filesize),
                    file.filename
                );
            }
            FileStatus::Deleted => info!(
                "   {}  {:>10}  {} (已删除于 {})",
                mtime,
                format_bytes(file.filesize),
                file.filename,
                local_time(file.deleted_at)
            ),
        }
    }
    info!("   合计: {}", format_bytes(total));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{create_job, test_app};
    use phile_core::db::ScannedFile;
    use tempfile::tempdir;

    #[test]
    fn test_local_time_placeholder() {
        assert_eq!(local_time(None), "-");
        assert_eq!(local_time(DateTime::from_timestamp(0, 0)).len(), 19);
    }

    #[tokio::test]
    async fn test_listings_handle_empty_and_populated_jobs() {
        let temp_dir = tempdir().unwrap();
        let app = test_app(temp_dir.path()).await;
        run_list_jobs(&app).await.unwrap();

        let job_id = create_job(&app, temp_dir.path(), "true").await;
        let file = ScannedFile {
            filename: "a.tar".to_string(),
            filepath: "/backups/a.tar".to_string(),
            filesize: 2048,
            file_mtime: 1_700_000_000,
        };
        let file_id = app
            .database
            .insert_file(job_id, &file, Utc::now())
            .await
            .unwrap();
        app.database
            .mark_file_deleted(file_id, Utc::now())
            .await
            .unwrap();

        run_list_jobs(&app).await.unwrap();
        run_list_runs(&app, job_id, 5).await.unwrap();
        run_list_files(&app, job_id, false).await.unwrap();
        run_list_files(&app, job_id, true).await.unwrap();
        assert!(run_list_files(&app, 999, true).await.is_err());
    }
}
