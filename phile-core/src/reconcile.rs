//! 文件清单与磁盘同步
//!
//! 扫描任务输出目录，把磁盘上的真实情况写回 `backup_files`：
//! 新文件登记为活跃，消失的文件标记为已删除，重新出现的文件恢复为活跃。
//! 本模块只反映现状，从不删除磁盘上的文件，可以重复调用。

use crate::db::{BackupFile, BackupJob, Database, FileStatus, ScannedFile};
use crate::glob::FilePattern;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// 一次同步的变更统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub discovered: usize,
    pub refreshed: usize,
    pub resurrected: usize,
    pub vanished: usize,
    pub unchanged: usize,
}

impl ReconcileSummary {
    pub fn has_changes(&self) -> bool {
        self.discovered + self.refreshed + self.resurrected + self.vanished > 0
    }
}

/// 同步任务的文件清单
///
/// 输出目录不存在时什么也不做。
#[instrument(skip(db, job), fields(job_id = job.id))]
pub async fn reconcile(db: &Database, job: &BackupJob) -> Result<ReconcileSummary> {
    let dir = PathBuf::from(job.output_directory.trim());
    if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
        debug!("输出目录不存在，跳过扫描: {}", dir.display());
        return Ok(ReconcileSummary::default());
    }

    let pattern = job.file_pattern.clone();
    let on_disk = tokio::task::spawn_blocking(move || scan_directory(&dir, &pattern)).await?;

    let existing: HashMap<String, BackupFile> = db
        .list_files(job.id)
        .await?
        .into_iter()
        .map(|file| (file.filepath.clone(), file))
        .collect();

    let now = Utc::now();
    let mut summary = ReconcileSummary::default();
    let mut seen = HashSet::new();

    for scanned in &on_disk {
        seen.insert(scanned.filepath.as_str());
        match existing.get(&scanned.filepath) {
            None => {
                db.insert_file(job.id, scanned, now).await?;
                debug!(file = %scanned.filepath, "登记新文件");
                summary.discovered += 1;
            }
            Some(row) if row.status == FileStatus::Deleted => {
                db.refresh_file(row.id, scanned.filesize, scanned.file_mtime)
                    .await?;
                debug!(file = %scanned.filepath, "文件重新出现，恢复为活跃");
                summary.resurrected += 1;
            }
            Some(row) if row.filesize != scanned.filesize || row.file_mtime != scanned.file_mtime => {
                db.refresh_file(row.id, scanned.filesize, scanned.file_mtime)
                    .await?;
                summary.refreshed += 1;
            }
            Some(_) => summary.unchanged += 1,
        }
    }

    for (path, row) in &existing {
        if row.status != FileStatus::Deleted && !seen.contains(path.as_str()) {
            mark_vanished(db, row, now).await?;
            summary.vanished += 1;
        }
    }

    if summary.has_changes() {
        info!(
            discovered = summary.discovered,
            refreshed = summary.refreshed,
            resurrected = summary.resurrected,
            vanished = summary.vanished,
            "文件清单已更新"
        );
    }
    Ok(summary)
}

async fn mark_vanished(db: &Database, row: &BackupFile, now: DateTime<Utc>) -> Result<()> {
    debug!(file = %row.filepath, "文件已不在磁盘上，标记为已删除");
    db.mark_file_deleted(row.id, now).await
}

/// 展开匹配模式并读取每个文件的大小与修改时间
///
/// 路径统一解析为规范绝对路径并去重，同一个物理文件只出现一次。
/// 模式无效时视为没有文件。
fn scan_directory(dir: &Path, pattern: &str) -> Vec<ScannedFile> {
    let pattern = match FilePattern::parse(pattern) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!("{}，按没有匹配文件处理", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for path in pattern.find_files(dir) {
        let canonical = std::fs::canonicalize(&path).unwrap_or(path);
        if !seen.insert(canonical.clone()) {
            continue;
        }

        let metadata = match std::fs::metadata(&canonical) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("读取文件信息失败，跳过 {}: {}", canonical.display(), e);
                continue;
            }
        };
        let file_mtime = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp())
            .unwrap_or_default();

        files.push(ScannedFile {
            filename: canonical
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            filepath: canonical.to_string_lossy().into_owned(),
            filesize: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            file_mtime,
        });
    }
    files
}
