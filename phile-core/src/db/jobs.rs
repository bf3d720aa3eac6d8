use super::models::{BackupJob, NewBackupJob, NewRetentionTier, RetentionTier};
use super::models::{Granularity, ScriptType};
use super::{Database, from_opt_ts, from_ts, to_ts};
use crate::constants::retention::MIN_MAX_AGE_DAYS;
use crate::constants::schedule;
use crate::{PhileError, Result};
use chrono::{DateTime, Utc};
use duckdb::{Row, params};
use tracing::warn;

const JOB_COLUMNS: &str = "id, name, description, script_type, script_content, \
     restore_script_type, restore_script_content, output_directory, file_pattern, \
     retention_max_count, schedule_enabled, schedule_interval, next_run_at, last_run_at, \
     is_active, created_at";

fn job_from_row(row: &Row<'_>) -> duckdb::Result<BackupJob> {
    let script_type: String = row.get(3)?;
    let restore_script_type: String = row.get(5)?;
    let max_count: i64 = row.get(9)?;
    let schedule_enabled: bool = row.get(10)?;
    let mut schedule_interval: i64 = row.get(11)?;
    if schedule_enabled && schedule_interval < schedule::MIN_INTERVAL_SECS {
        let id: i64 = row.get(0)?;
        warn!(
            job_id = id,
            "调度间隔 {} 秒小于最小值，按 {} 秒处理",
            schedule_interval,
            schedule::MIN_INTERVAL_SECS
        );
        schedule_interval = schedule::MIN_INTERVAL_SECS;
    }
    Ok(BackupJob {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        script_type: ScriptType::parse(&script_type),
        script_content: row.get(4)?,
        restore_script_type: ScriptType::parse(&restore_script_type),
        restore_script_content: row.get(6)?,
        output_directory: row.get(7)?,
        file_pattern: row.get(8)?,
        retention_max_count: u32::try_from(max_count.max(0)).unwrap_or(u32::MAX),
        schedule_enabled,
        schedule_interval,
        next_run_at: from_opt_ts(row.get(12)?),
        last_run_at: from_opt_ts(row.get(13)?),
        is_active: row.get(14)?,
        created_at: from_ts(row.get(15)?),
    })
}

fn tier_from_row(row: &Row<'_>) -> duckdb::Result<RetentionTier> {
    let granularity: String = row.get(4)?;
    Ok(RetentionTier {
        id: row.get(0)?,
        backup_id: row.get(1)?,
        sort_order: row.get(2)?,
        max_age_days: row.get(3)?,
        keep_granularity: Granularity::parse(&granularity),
    })
}

impl Database {
    /// 创建备份任务（配置界面使用），返回任务ID
    pub async fn create_job(&self, job: NewBackupJob) -> Result<i64> {
        let job = job.normalized();
        if job.name.is_empty() {
            return Err(PhileError::invalid_record("任务名称不能为空"));
        }
        if job.output_directory.is_empty() {
            return Err(PhileError::invalid_record("输出目录不能为空"));
        }

        let created_at = to_ts(Utc::now());
        let next_run_at = job.next_run_at.map(to_ts);

        self.manager()
            .write_with_retry(|conn| {
                conn.query_row(
                    "INSERT INTO backup_jobs (name, description, script_type, script_content,
                        restore_script_type, restore_script_content, output_directory, file_pattern,
                        retention_max_count, schedule_enabled, schedule_interval, next_run_at,
                        is_active, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     RETURNING id",
                    params![
                        job.name,
                        job.description,
                        job.script_type.as_str(),
                        job.script_content,
                        job.restore_script_type.as_str(),
                        job.restore_script_content,
                        job.output_directory,
                        job.file_pattern,
                        job.retention_max_count,
                        job.schedule_enabled,
                        job.schedule_interval,
                        next_run_at,
                        job.is_active,
                        created_at
                    ],
                    |row| row.get(0),
                )
            })
            .await
    }

    /// 根据ID获取任务
    pub async fn get_job(&self, id: i64) -> Result<Option<BackupJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM backup_jobs WHERE id = ?");
        self.manager()
            .read_with_retry(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(job_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// 获取所有任务
    pub async fn list_jobs(&self) -> Result<Vec<BackupJob>> {
        self.query_jobs("1 = 1", None).await
    }

    /// 启用调度且处于激活状态的任务（不考虑到期时间）
    pub async fn list_scheduled_jobs(&self) -> Result<Vec<BackupJob>> {
        self.query_jobs("schedule_enabled AND is_active", None).await
    }

    /// 到期任务：启用调度、处于激活状态，且 next_run_at 为空或不晚于 now
    pub async fn list_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<BackupJob>> {
        self.query_jobs(
            "schedule_enabled AND is_active AND (next_run_at IS NULL OR next_run_at <= ?)",
            Some(to_ts(now)),
        )
        .await
    }

    async fn query_jobs(&self, predicate: &str, at: Option<i64>) -> Result<Vec<BackupJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM backup_jobs WHERE {predicate} ORDER BY id");
        self.manager()
            .read_with_retry(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let job_iter = match at {
                    Some(at) => stmt.query_map(params![at], job_from_row)?,
                    None => stmt.query_map([], job_from_row)?,
                };

                let mut jobs = Vec::new();
                for job in job_iter {
                    jobs.push(job?);
                }
                Ok(jobs)
            })
            .await
    }

    /// 更新下次执行时间
    pub async fn set_next_run_at(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let at = to_ts(at);
        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "UPDATE backup_jobs SET next_run_at = ? WHERE id = ?",
                    params![at, id],
                )?;
                Ok(())
            })
            .await
    }

    /// 更新最近一次执行时间
    pub async fn set_last_run_at(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let at = to_ts(at);
        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "UPDATE backup_jobs SET last_run_at = ? WHERE id = ?",
                    params![at, id],
                )?;
                Ok(())
            })
            .await
    }

    /// 启用或停用任务（配置界面使用）
    pub async fn set_job_active(&self, id: i64, active: bool) -> Result<()> {
        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "UPDATE backup_jobs SET is_active = ? WHERE id = ?",
                    params![active, id],
                )?;
                Ok(())
            })
            .await
    }

    /// 整体替换任务的保留层级，排序号按提交顺序重新编号为 1..n
    pub async fn replace_tiers(&self, job_id: i64, tiers: &[NewRetentionTier]) -> Result<()> {
        let tiers: Vec<NewRetentionTier> = tiers
            .iter()
            .map(|tier| NewRetentionTier {
                max_age_days: tier.max_age_days.map(|days| days.max(MIN_MAX_AGE_DAYS)),
                keep_granularity: tier.keep_granularity,
            })
            .collect();

        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "DELETE FROM retention_tiers WHERE backup_id = ?",
                    params![job_id],
                )?;
                for (order, tier) in tiers.iter().enumerate() {
                    conn.execute(
                        "INSERT INTO retention_tiers (backup_id, sort_order, max_age_days, keep_granularity)
                         VALUES (?, ?, ?, ?)",
                        params![
                            job_id,
                            order as i32 + 1,
                            tier.max_age_days,
                            tier.keep_granularity.as_str()
                        ],
                    )?;
                }
                Ok(())
            })
            .await
    }

    /// 获取任务的保留层级（按 sort_order 升序）
    pub async fn list_tiers(&self, job_id: i64) -> Result<Vec<RetentionTier>> {
        self.manager()
            .read_with_retry(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, backup_id, sort_order, max_age_days, keep_granularity
                     FROM retention_tiers WHERE backup_id = ? ORDER BY sort_order ASC, id ASC",
                )?;
                let tier_iter = stmt.query_map(params![job_id], tier_from_row)?;

                let mut tiers = Vec::new();
                for tier in tier_iter {
                    tiers.push(tier?);
                }
                Ok(tiers)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn scheduled_job(db: &Database, name: &str, next_run_at: Option<DateTime<Utc>>) -> i64 {
        let mut job = NewBackupJob::new(name, "/tmp/phile-test");
        job.schedule_enabled = true;
        job.schedule_interval = 3600;
        job.next_run_at = next_run_at;
        db.create_job(job).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let db = Database::connect_memory().await.unwrap();

        let mut new_job = NewBackupJob::new("nightly", "/var/backups");
        new_job.script_type = ScriptType::PowerShell;
        new_job.script_content = "Write-Host hi".to_string();
        new_job.retention_max_count = 7;
        let id = db.create_job(new_job).await.unwrap();

        let job = db.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.name, "nightly");
        assert_eq!(job.script_type, ScriptType::PowerShell);
        assert_eq!(job.retention_max_count, 7);
        assert_eq!(job.file_pattern, "*");
        assert!(job.is_active);
        assert!(job.next_run_at.is_none());
        assert!(db.get_job(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_job_rejects_blank_name() {
        let db = Database::connect_memory().await.unwrap();
        let result = db.create_job(NewBackupJob::new("  ", "/var/backups")).await;
        assert!(matches!(result, Err(PhileError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_due_job_selection() {
        let db = Database::connect_memory().await.unwrap();
        let now = Utc::now();

        let never_run = scheduled_job(&db, "never-run", None).await;
        let overdue = scheduled_job(&db, "overdue", Some(now - Duration::minutes(5))).await;
        let future = scheduled_job(&db, "future", Some(now + Duration::hours(1))).await;

        // 未启用调度：即使已到期也不会被选中
        let mut unscheduled = NewBackupJob::new("unscheduled", "/tmp/phile-test");
        unscheduled.next_run_at = Some(now - Duration::hours(1));
        let unscheduled = db.create_job(unscheduled).await.unwrap();

        // 已停用：即使已到期也不会被选中
        let inactive = scheduled_job(&db, "inactive", Some(now - Duration::hours(1))).await;
        db.set_job_active(inactive, false).await.unwrap();

        let due: Vec<i64> = db
            .list_due_jobs(now)
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.id)
            .collect();
        assert_eq!(due, vec![never_run, overdue]);

        let scheduled: Vec<i64> = db
            .list_scheduled_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.id)
            .collect();
        assert_eq!(scheduled, vec![never_run, overdue, future]);
        assert!(!scheduled.contains(&unscheduled));
    }

    #[tokio::test]
    async fn test_run_timestamps_are_written_back() {
        let db = Database::connect_memory().await.unwrap();
        let id = scheduled_job(&db, "job", None).await;
        let at = from_ts(1_700_000_000);

        db.set_next_run_at(id, at).await.unwrap();
        db.set_last_run_at(id, at).await.unwrap();

        let job = db.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.next_run_at, Some(at));
        assert_eq!(job.last_run_at, Some(at));
    }

    #[tokio::test]
    async fn test_stored_interval_below_minimum_is_clamped_on_read() {
        let db = Database::connect_memory().await.unwrap();
        let scheduled = scheduled_job(&db, "scheduled", None).await;
        let manual = db
            .create_job(NewBackupJob::new("manual", "/tmp/phile-test"))
            .await
            .unwrap();
        db.manager()
            .write_with_retry(|conn| conn.execute("UPDATE backup_jobs SET schedule_interval = 0", []))
            .await
            .unwrap();

        let job = db.get_job(scheduled).await.unwrap().unwrap();
        assert_eq!(job.schedule_interval, schedule::MIN_INTERVAL_SECS);
        // 未启用调度的任务原样读出
        assert_eq!(db.get_job(manual).await.unwrap().unwrap().schedule_interval, 0);
    }

    #[tokio::test]
    async fn test_replace_tiers_renumbers_and_clamps() {
        let db = Database::connect_memory().await.unwrap();
        let id = scheduled_job(&db, "job", None).await;

        db.replace_tiers(id, &[NewRetentionTier::bounded(0, Granularity::All)])
            .await
            .unwrap();
        db.replace_tiers(
            id,
            &[
                NewRetentionTier::bounded(7, Granularity::Daily),
                NewRetentionTier::bounded(0, Granularity::Weekly),
                NewRetentionTier::catch_all(Granularity::Monthly),
            ],
        )
        .await
        .unwrap();

        let tiers = db.list_tiers(id).await.unwrap();
        assert_eq!(tiers.len(), 3);
        assert_eq!(
            tiers.iter().map(|t| t.sort_order).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(tiers[1].max_age_days, Some(1));
        assert_eq!(tiers[2].max_age_days, None);
        assert_eq!(tiers[2].keep_granularity, Granularity::Monthly);
    }
}
