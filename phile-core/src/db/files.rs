use super::models::{BackupFile, FileStatus, ScannedFile};
use super::{Database, from_opt_ts, from_ts, to_ts};
use crate::Result;
use chrono::{DateTime, Utc};
use duckdb::{Row, params};

const FILE_COLUMNS: &str = "id, backup_id, filename, filepath, filesize, file_mtime, status, \
     discovered_at, deleted_at";

fn file_from_row(row: &Row<'_>) -> duckdb::Result<BackupFile> {
    let status: String = row.get(6)?;
    Ok(BackupFile {
        id: row.get(0)?,
        backup_id: row.get(1)?,
        filename: row.get(2)?,
        filepath: row.get(3)?,
        filesize: row.get(4)?,
        file_mtime: row.get(5)?,
        status: FileStatus::parse(&status),
        discovered_at: from_ts(row.get(7)?),
        deleted_at: from_opt_ts(row.get(8)?),
    })
}

/// 全局统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StorageTotals {
    pub jobs: usize,
    pub active_files: usize,
    pub active_bytes: i64,
}

impl Database {
    /// 任务的全部文件记录（含已删除），最新的在前
    pub async fn list_files(&self, job_id: i64) -> Result<Vec<BackupFile>> {
        self.query_files(job_id, false).await
    }

    /// 任务的活跃文件，按修改时间降序，修改时间相同按ID升序
    pub async fn list_active_files(&self, job_id: i64) -> Result<Vec<BackupFile>> {
        self.query_files(job_id, true).await
    }

    async fn query_files(&self, job_id: i64, active_only: bool) -> Result<Vec<BackupFile>> {
        let filter = if active_only { "AND status = 'active'" } else { "" };
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM backup_files WHERE backup_id = ? {filter}
             ORDER BY file_mtime DESC, id ASC"
        );
        self.manager()
            .read_with_retry(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let file_iter = stmt.query_map(params![job_id], file_from_row)?;

                let mut files = Vec::new();
                for file in file_iter {
                    files.push(file?);
                }
                Ok(files)
            })
            .await
    }

    pub async fn count_active_files(&self, job_id: i64) -> Result<usize> {
        let count: i64 = self
            .manager()
            .read_with_retry(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM backup_files WHERE backup_id = ? AND status = 'active'",
                    params![job_id],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count.max(0) as usize)
    }

    /// 任务总数、活跃文件数与活跃文件总大小
    pub async fn storage_totals(&self) -> Result<StorageTotals> {
        self.manager()
            .read_with_retry(|conn| {
                conn.query_row(
                    "SELECT
                        (SELECT COUNT(*) FROM backup_jobs),
                        (SELECT COUNT(*) FROM backup_files WHERE status = 'active'),
                        (SELECT CAST(COALESCE(SUM(filesize), 0) AS BIGINT) FROM backup_files WHERE status = 'active')",
                    [],
                    |row| {
                        let jobs: i64 = row.get(0)?;
                        let active_files: i64 = row.get(1)?;
                        Ok(StorageTotals {
                            jobs: jobs.max(0) as usize,
                            active_files: active_files.max(0) as usize,
                            active_bytes: row.get(2)?,
                        })
                    },
                )
            })
            .await
    }

    /// 登记新发现的文件，返回记录ID
    pub async fn insert_file(
        &self,
        job_id: i64,
        file: &ScannedFile,
        discovered_at: DateTime<Utc>,
    ) -> Result<i64> {
        let discovered_at = to_ts(discovered_at);
        self.manager()
            .write_with_retry(|conn| {
                conn.query_row(
                    "INSERT INTO backup_files (backup_id, filename, filepath, filesize, file_mtime, status, discovered_at)
                     VALUES (?, ?, ?, ?, ?, 'active', ?)
                     RETURNING id",
                    params![
                        job_id,
                        file.filename,
                        file.filepath,
                        file.filesize,
                        file.file_mtime,
                        discovered_at
                    ],
                    |row| row.get(0),
                )
            })
            .await
    }

    /// 刷新已登记文件的大小和修改时间，并恢复为活跃状态
    pub async fn refresh_file(&self, id: i64, filesize: i64, file_mtime: i64) -> Result<()> {
        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "UPDATE backup_files
                     SET filesize = ?, file_mtime = ?, status = 'active', deleted_at = NULL
                     WHERE id = ?",
                    params![filesize, file_mtime, id],
                )?;
                Ok(())
            })
            .await
    }

    /// 标记文件为已删除（行本身保留）
    pub async fn mark_file_deleted(&self, id: i64, deleted_at: DateTime<Utc>) -> Result<()> {
        let deleted_at = to_ts(deleted_at);
        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "UPDATE backup_files SET status = 'deleted', deleted_at = ? WHERE id = ?",
                    params![deleted_at, id],
                )?;
                Ok(())
            })
            .await
    }
}
