//! 分层保留策略
//!
//! [`plan_retention`] 是纯函数：输入活跃文件、保留层级、数量上限和当前时间，
//! 输出保留与删除两组文件。[`apply_retention`] 读取数据库、执行计划，
//! 并在非演练模式下删除磁盘文件、把清单记录标记为已删除。
//!
//! 匹配规则：
//! 1. 文件按修改时间降序遍历，年龄为 `(now - mtime) / 86400` 天（小数）
//! 2. 第一个 `max_age_days` 为空或不小于年龄的层级即为匹配层级，匹配不到的文件删除
//! 3. 粒度为 `all` 时总是保留；否则每个（层级, 日历桶）只保留遇到的第一个文件
//! 4. 数量上限大于 0 且保留集合超限时，按同样顺序只保留前 N 个

use crate::constants::retention::SECONDS_PER_DAY;
use crate::db::{BackupFile, BackupJob, Database, Granularity, RetentionTier};
use crate::Result;
use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use tracing::{debug, info, instrument, warn};

/// 保留计划，两组文件都保持修改时间降序
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetentionPlan {
    pub kept: Vec<BackupFile>,
    pub deleted: Vec<BackupFile>,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty() && self.deleted.is_empty()
    }
}

/// 日历桶
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Day(i32, u32),
    /// ISO 周：ISO 年 + 周序号
    Week(i32, u32),
    Month(i32, u32),
    Year(i32),
}

impl Bucket {
    /// `all` 粒度没有桶
    pub fn of<Tz: TimeZone>(at: &DateTime<Tz>, granularity: Granularity) -> Option<Self> {
        match granularity {
            Granularity::All => None,
            Granularity::Daily => Some(Bucket::Day(at.year(), at.ordinal())),
            Granularity::Weekly => {
                let week = at.iso_week();
                Some(Bucket::Week(week.year(), week.week()))
            }
            Granularity::Monthly => Some(Bucket::Month(at.year(), at.month())),
            Granularity::Yearly => Some(Bucket::Year(at.year())),
        }
    }
}

/// 计算保留计划
///
/// 没有任何层级时返回空计划（不做任何保留或删除决定），即使设置了数量上限。
/// 日历桶按 `now` 所在时区划分。
pub fn plan_retention<Tz: TimeZone>(
    files: &[BackupFile],
    tiers: &[RetentionTier],
    max_count: u32,
    now: &DateTime<Tz>,
) -> RetentionPlan {
    if tiers.is_empty() {
        return RetentionPlan::default();
    }

    let mut files: Vec<&BackupFile> = files.iter().collect();
    files.sort_by(|a, b| b.file_mtime.cmp(&a.file_mtime));
    let mut tiers: Vec<&RetentionTier> = tiers.iter().collect();
    tiers.sort_by_key(|tier| (tier.sort_order, tier.id));

    let tz = now.timezone();
    let now_ts = now.timestamp();
    let mut keep: HashSet<i64> = HashSet::new();
    let mut buckets: HashSet<(usize, Bucket)> = HashSet::new();

    for file in &files {
        let age_days = (now_ts - file.file_mtime) as f64 / SECONDS_PER_DAY;
        let Some((tier_idx, tier)) = tiers.iter().enumerate().find(|(_, tier)| {
            tier.max_age_days
                .is_none_or(|max_age| age_days <= max_age as f64)
        }) else {
            continue;
        };

        let modified = tz.timestamp_opt(file.file_mtime, 0).earliest();
        let bucket = modified
            .as_ref()
            .and_then(|at| Bucket::of(at, tier.keep_granularity));
        match bucket {
            Some(bucket) => {
                if buckets.insert((tier_idx, bucket)) {
                    keep.insert(file.id);
                }
            }
            None => {
                keep.insert(file.id);
            }
        }
    }

    if max_count > 0 && keep.len() > max_count as usize {
        let trimmed: HashSet<i64> = files
            .iter()
            .filter(|file| keep.contains(&file.id))
            .take(max_count as usize)
            .map(|file| file.id)
            .collect();
        keep = trimmed;
    }

    let (kept, deleted): (Vec<&BackupFile>, Vec<&BackupFile>) =
        files.into_iter().partition(|file| keep.contains(&file.id));
    RetentionPlan {
        kept: kept.into_iter().cloned().collect(),
        deleted: deleted.into_iter().cloned().collect(),
    }
}

/// 对任务执行保留策略，日历桶按本地时区划分
pub async fn apply_retention(db: &Database, job: &BackupJob, dry_run: bool) -> Result<RetentionPlan> {
    apply_retention_at(db, job, dry_run, &Local::now()).await
}

/// 以指定时间执行保留策略
#[instrument(skip(db, job, now), fields(job_id = job.id))]
pub async fn apply_retention_at<Tz: TimeZone>(
    db: &Database,
    job: &BackupJob,
    dry_run: bool,
    now: &DateTime<Tz>,
) -> Result<RetentionPlan> {
    let tiers = db.list_tiers(job.id).await?;
    if tiers.is_empty() {
        debug!("任务没有保留层级，跳过");
        return Ok(RetentionPlan::default());
    }

    let files = db.list_active_files(job.id).await?;
    let plan = plan_retention(&files, &tiers, job.retention_max_count, now);

    if !dry_run {
        let deleted_at = Utc::now();
        for file in &plan.deleted {
            remove_backup_file(&file.filepath).await;
            db.mark_file_deleted(file.id, deleted_at).await?;
        }
    }

    info!(
        kept = plan.kept.len(),
        deleted = plan.deleted.len(),
        dry_run,
        "保留策略执行完成"
    );
    Ok(plan)
}

/// 尽力删除磁盘文件，文件已不存在不算错误
async fn remove_backup_file(path: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("已删除备份文件: {}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("备份文件已不存在: {}", path);
        }
        Err(e) => warn!("删除备份文件失败 {}: {}", path, e),
    }
}
