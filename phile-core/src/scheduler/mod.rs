// 调度守护进程
//
// 状态机：starting → looping → stopping → stopped
//
// 每轮循环：
// 1. 发布心跳
// 2. 校验存储连接，失败时记录日志并退避后重试
// 3. 选出到期任务，逐个执行（执行 + 同步清单 + 保留策略），之后把 next_run_at 推进到
//    本轮检查时间 + 调度间隔
// 4. 休眠一个轮询间隔，期间随时响应停止信号
//
// 同一进程内的任务严格串行。单个任务失败只记录日志，不影响本轮其他任务。

pub mod shutdown;
pub mod status;

pub use shutdown::spawn_signal_listener;
pub use status::{DaemonState, DaemonStatus, HealthState, LivenessFiles, RunMode, RunnerHealth};

use crate::config::AppConfig;
use crate::constants::{schedule, trigger};
use crate::db::BackupJob;
use crate::orchestrator::RunOrchestrator;
use crate::{PhileError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
    pub db_retry_backoff: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            data_dir: config.get_data_dir(),
            poll_interval: config.poll_interval(),
            db_retry_backoff: config.db_retry_backoff(),
        }
    }
}

/// 守护进程退出时的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DaemonReport {
    pub iterations: u64,
    pub jobs_run: u64,
    pub jobs_failed: u64,
    pub jobs_skipped: u64,
}

pub struct Scheduler {
    orchestrator: RunOrchestrator,
    options: SchedulerOptions,
    liveness: LivenessFiles,
    status: watch::Sender<DaemonStatus>,
}

impl Scheduler {
    pub fn new(orchestrator: RunOrchestrator, options: SchedulerOptions) -> Self {
        let liveness = LivenessFiles::new(&options.data_dir);
        let (status, _) = watch::channel(DaemonStatus::starting(RunMode::Continuous));
        Self {
            orchestrator,
            options,
            liveness,
            status,
        }
    }

    /// 订阅状态变化（只读）
    pub fn subscribe(&self) -> watch::Receiver<DaemonStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> DaemonStatus {
        self.status.borrow().clone()
    }

    /// 运行调度循环，直到模式结束或令牌被取消
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, mode: RunMode, cancel: CancellationToken) -> Result<DaemonReport> {
        let initial = DaemonStatus::starting(mode);
        self.liveness.write_pid(initial.pid)?;
        info!(pid = initial.pid, mode = %mode, "调度器已启动");
        self.status.send_replace(initial);

        let result = self.run_loop(mode, &cancel).await;

        self.set_state(DaemonState::Stopping);
        if let Err(e) = self.liveness.remove_pid() {
            warn!("删除 PID 文件失败: {}", e);
        }
        self.set_state(DaemonState::Stopped);

        match &result {
            Ok(report) => info!(
                iterations = report.iterations,
                jobs_run = report.jobs_run,
                jobs_failed = report.jobs_failed,
                "调度器已停止"
            ),
            Err(e) => error!("调度器异常退出: {}", e),
        }
        result
    }

    async fn run_loop(&self, mode: RunMode, cancel: &CancellationToken) -> Result<DaemonReport> {
        let mut report = DaemonReport::default();
        self.set_state(DaemonState::Looping);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            report.iterations += 1;
            self.heartbeat();

            // 长时间休眠后重新校验存储
            if let Err(e) = self.orchestrator.database().ping().await {
                error!("数据库不可用: {}", e);
                if !sleep_or_cancel(self.options.db_retry_backoff, cancel).await {
                    break;
                }
                continue;
            }

            let now = Utc::now();
            let jobs = match self.select_jobs(mode, now).await {
                Ok(jobs) => jobs,
                Err(e) if e.is_transient() => {
                    error!("查询到期任务失败: {}", e);
                    if !sleep_or_cancel(self.options.db_retry_backoff, cancel).await {
                        break;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!(count = jobs.len(), "本轮待执行任务");

            for job in &jobs {
                if cancel.is_cancelled() {
                    break;
                }
                self.run_scheduled(job, now, &mut report).await;
            }

            if mode.is_one_shot() {
                break;
            }

            info!("休眠 {}s", self.options.poll_interval.as_secs());
            if !sleep_or_cancel(self.options.poll_interval, cancel).await {
                break;
            }
        }

        Ok(report)
    }

    async fn select_jobs(&self, mode: RunMode, now: DateTime<Utc>) -> Result<Vec<BackupJob>> {
        let db = self.orchestrator.database();
        match mode {
            RunMode::Continuous => db.list_due_jobs(now).await,
            RunMode::Once => db.list_scheduled_jobs().await,
            RunMode::SingleJob(job_id) => {
                let job = self.orchestrator.load_job(job_id).await?;
                if !job.is_active {
                    return Err(PhileError::JobInactive(job_id));
                }
                Ok(vec![job])
            }
        }
    }

    /// 执行一个任务；错误只记录，不向上传播
    async fn run_scheduled(&self, job: &BackupJob, checked_at: DateTime<Utc>, report: &mut DaemonReport) {
        info!(job_id = job.id, "执行任务 #{}: {}", job.id, job.name);

        let run = match self
            .orchestrator
            .run_job_with_retention(job, trigger::SCHEDULER)
            .await
        {
            Ok(run) => run,
            Err(PhileError::JobBusy(job_id)) => {
                warn!(job_id, "任务正在其他进程中执行，下次轮询重试");
                report.jobs_skipped += 1;
                return;
            }
            Err(e) => {
                error!(job_id = job.id, "执行任务 #{} 出错: {}", job.id, e);
                report.jobs_failed += 1;
                return;
            }
        };

        report.jobs_run += 1;
        if !run.succeeded() {
            report.jobs_failed += 1;
        }
        info!(
            job_id = job.id,
            run_id = run.run_id,
            exit_code = run.exit_code,
            "任务 #{} 完成",
            job.id
        );
        if let Some(plan) = &run.retention {
            info!(
                job_id = job.id,
                kept = plan.kept.len(),
                deleted = plan.deleted.len(),
                "保留策略: 保留 {}，删除 {}",
                plan.kept.len(),
                plan.deleted.len()
            );
        }

        let next_run_at = match next_run_after(checked_at, job.schedule_interval) {
            Some(at) => at,
            None => {
                warn!(
                    job_id = job.id,
                    interval = job.schedule_interval,
                    "调度间隔超出可表示的时间范围，不再自动执行"
                );
                DateTime::<Utc>::MAX_UTC
            }
        };
        match self
            .orchestrator
            .database()
            .set_next_run_at(job.id, next_run_at)
            .await
        {
            Ok(()) => info!(
                job_id = job.id,
                "下次执行时间: {}",
                next_run_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            ),
            Err(e) => error!(job_id = job.id, "更新下次执行时间失败: {}", e),
        }
    }

    fn heartbeat(&self) {
        let now = Utc::now();
        if let Err(e) = self.liveness.write_heartbeat(now) {
            warn!("写入心跳失败: {}", e);
        }
        self.status.send_modify(|status| {
            status.last_heartbeat = Some(now);
            status.iterations += 1;
        });
    }

    fn set_state(&self, state: DaemonState) {
        self.status.send_modify(|status| status.state = state);
    }
}

/// 休眠指定时长；被取消时提前返回 false
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// 检查时间加上调度间隔（不小于最小间隔），超出时间范围时返回 None
fn next_run_after(checked_at: DateTime<Utc>, interval_secs: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_seconds(interval_secs.max(schedule::MIN_INTERVAL_SECS))
        .and_then(|interval| checked_at.checked_add_signed(interval))
}
