use crate::constants::trigger;
use crate::db::{BackupJob, Database};
use crate::lock::{JobLockGuard, JobLocks};
use crate::reconcile::{ReconcileSummary, reconcile};
use crate::retention::{RetentionPlan, apply_retention};
use crate::script::ScriptRunner;
use crate::{PhileError, Result};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

/// 一次备份执行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: i64,
    pub exit_code: i32,
    pub scan: ReconcileSummary,
    /// 未执行保留策略时为 None
    pub retention: Option<RetentionPlan>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// 手动执行保留策略的结果
#[derive(Debug, Clone)]
pub enum RetentionOutcome {
    /// 没有层级也没有数量上限
    NothingToDo,
    Applied {
        active_before: usize,
        scan: ReconcileSummary,
        plan: RetentionPlan,
    },
}

/// 执行编排：脚本、执行记录、清单同步与保留策略
#[derive(Clone)]
pub struct RunOrchestrator {
    db: Database,
    runner: ScriptRunner,
    locks: JobLocks,
}

impl RunOrchestrator {
    pub fn new(db: Database, runner: ScriptRunner, locks: JobLocks) -> Self {
        Self { db, runner, locks }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// 按ID加载任务，不存在时返回 [`PhileError::JobNotFound`]
    pub async fn load_job(&self, job_id: i64) -> Result<BackupJob> {
        self.db
            .get_job(job_id)
            .await?
            .ok_or(PhileError::JobNotFound(job_id))
    }

    /// 任务是否配置了保留策略（层级或数量上限）
    pub async fn has_retention_rules(&self, job: &BackupJob) -> Result<bool> {
        if job.retention_max_count > 0 {
            return Ok(true);
        }
        Ok(!self.db.list_tiers(job.id).await?.is_empty())
    }

    /// 执行备份脚本并同步清单，返回执行记录ID
    ///
    /// 脚本失败不会返回错误，只体现在执行记录的状态上。
    pub async fn run_job(&self, job: &BackupJob, triggered_by: &str) -> Result<i64> {
        let report = self.execute(job, triggered_by, false).await?;
        Ok(report.run_id)
    }

    /// 执行备份脚本、同步清单，并在配置了保留策略时执行保留策略
    pub async fn run_job_with_retention(
        &self,
        job: &BackupJob,
        triggered_by: &str,
    ) -> Result<RunReport> {
        self.execute(job, triggered_by, true).await
    }

    #[instrument(skip(self, job), fields(job_id = job.id, job = %job.name))]
    async fn execute(
        &self,
        job: &BackupJob,
        triggered_by: &str,
        with_retention: bool,
    ) -> Result<RunReport> {
        if !job.is_active {
            return Err(PhileError::JobInactive(job.id));
        }
        let _guard = self.lock(job)?;

        let started_at = Utc::now();
        let run_id = self.db.create_run(job.id, triggered_by, started_at).await?;
        info!(run_id, triggered_by, "开始执行备份");

        let outcome = self
            .runner
            .run(job.id, job.script_type, &job.script_content)
            .await;
        // 写回结果失败时先记下错误，清单照常同步
        let finished = self
            .db
            .finish_run(run_id, outcome.exit_code, &outcome.output, Utc::now())
            .await;
        if let Err(e) = &finished {
            error!(run_id, "写入执行结果失败: {}", e);
        }
        let stamped = self.db.set_last_run_at(job.id, started_at).await;
        if let Err(e) = &stamped {
            error!(run_id, "更新上次执行时间失败: {}", e);
        }

        if outcome.exit_code == 0 {
            info!(run_id, "备份执行成功");
        } else {
            warn!(run_id, exit_code = outcome.exit_code, "备份执行失败");
        }

        // 无论脚本成败都同步清单
        let scan = reconcile(&self.db, job).await;
        finished?;
        stamped?;
        let scan = scan?;

        let retention = if with_retention && self.has_retention_rules(job).await? {
            Some(apply_retention(&self.db, job, false).await?)
        } else {
            None
        };

        Ok(RunReport {
            run_id,
            exit_code: outcome.exit_code,
            scan,
            retention,
        })
    }

    /// 执行还原脚本，返回执行记录ID
    ///
    /// 不同步清单，也不执行保留策略。
    #[instrument(skip(self, job), fields(job_id = job.id, job = %job.name))]
    pub async fn run_restore(&self, job: &BackupJob) -> Result<i64> {
        if !job.has_restore_script() {
            return Err(PhileError::invalid_record(format!(
                "任务 {} 没有配置还原脚本",
                job.id
            )));
        }
        let _guard = self.lock(job)?;

        let run_id = self
            .db
            .create_run(job.id, trigger::RESTORE, Utc::now())
            .await?;
        info!(run_id, "开始执行还原");

        let outcome = self
            .runner
            .run(job.id, job.restore_script_type, &job.restore_script_content)
            .await;
        self.db
            .finish_run(run_id, outcome.exit_code, &outcome.output, Utc::now())
            .await?;

        if outcome.exit_code == 0 {
            info!(run_id, "还原执行成功");
        } else {
            warn!(run_id, exit_code = outcome.exit_code, "还原执行失败");
        }
        Ok(run_id)
    }

    /// 重新扫描输出目录后执行保留策略
    #[instrument(skip(self, job), fields(job_id = job.id, job = %job.name))]
    pub async fn enforce_retention(&self, job: &BackupJob, dry_run: bool) -> Result<RetentionOutcome> {
        if !self.has_retention_rules(job).await? {
            info!("没有配置保留策略，无需处理");
            return Ok(RetentionOutcome::NothingToDo);
        }
        let _guard = self.lock(job)?;

        let scan = reconcile(&self.db, job).await?;
        let active_before = self.db.count_active_files(job.id).await?;
        let plan = apply_retention(&self.db, job, dry_run).await?;

        Ok(RetentionOutcome::Applied {
            active_before,
            scan,
            plan,
        })
    }

    /// 同步清单（持有任务锁）
    pub async fn scan(&self, job: &BackupJob) -> Result<ReconcileSummary> {
        let _guard = self.lock(job)?;
        reconcile(&self.db, job).await
    }

    fn lock(&self, job: &BackupJob) -> Result<JobLockGuard> {
        self.locks.try_acquire(job.id)
    }
}
