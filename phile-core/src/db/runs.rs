use super::models::{BackupRun, RunStatus};
use super::{Database, from_opt_ts, from_ts, to_ts};
use crate::Result;
use chrono::{DateTime, Utc};
use duckdb::{Row, params};

const RUN_COLUMNS: &str =
    "id, backup_id, started_at, finished_at, exit_code, output_log, status, triggered_by";

fn run_from_row(row: &Row<'_>) -> duckdb::Result<BackupRun> {
    let status: String = row.get(6)?;
    Ok(BackupRun {
        id: row.get(0)?,
        backup_id: row.get(1)?,
        started_at: from_ts(row.get(2)?),
        finished_at: from_opt_ts(row.get(3)?),
        exit_code: row.get(4)?,
        output_log: row.get(5)?,
        status: RunStatus::parse(&status),
        triggered_by: row.get(7)?,
    })
}

impl Database {
    /// 新建一条 running 状态的执行记录，返回记录ID
    pub async fn create_run(
        &self,
        job_id: i64,
        triggered_by: &str,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let started_at = to_ts(started_at);
        self.manager()
            .write_with_retry(|conn| {
                conn.query_row(
                    "INSERT INTO backup_runs (backup_id, started_at, status, triggered_by)
                     VALUES (?, ?, 'running', ?)
                     RETURNING id",
                    params![job_id, started_at, triggered_by],
                    |row| row.get(0),
                )
            })
            .await
    }

    /// 写入执行结果：结束时间、退出码、输出以及由退出码推导的状态
    pub async fn finish_run(
        &self,
        run_id: i64,
        exit_code: i32,
        output_log: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let finished_at = to_ts(finished_at);
        let status = RunStatus::from_exit_code(exit_code);
        self.manager()
            .write_with_retry(|conn| {
                conn.execute(
                    "UPDATE backup_runs
                     SET finished_at = ?, exit_code = ?, output_log = ?, status = ?
                     WHERE id = ?",
                    params![finished_at, exit_code, output_log, status.as_str(), run_id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_run(&self, run_id: i64) -> Result<Option<BackupRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM backup_runs WHERE id = ?");
        self.manager()
            .read_with_retry(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![run_id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(run_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// 最近的执行记录，新的在前
    pub async fn list_runs(&self, job_id: i64, limit: usize) -> Result<Vec<BackupRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM backup_runs WHERE backup_id = ?
             ORDER BY started_at DESC, id DESC LIMIT ?"
        );
        let limit = limit as i64;
        self.manager()
            .read_with_retry(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let run_iter = stmt.query_map(params![job_id, limit], run_from_row)?;

                let mut runs = Vec::new();
                for run in run_iter {
                    runs.push(run?);
                }
                Ok(runs)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::trigger;
    use crate::db::NewBackupJob;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let db = Database::connect_memory().await.unwrap();
        let job_id = db
            .create_job(NewBackupJob::new("runs", "/backups"))
            .await
            .unwrap();
        let started = from_ts(1_700_000_000);

        let run_id = db.create_run(job_id, trigger::MANUAL, started).await.unwrap();
        let run = db.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.exit_code, None);
        assert_eq!(run.triggered_by, "manual");

        db.finish_run(run_id, 1, "boom\n", from_ts(1_700_000_010))
            .await
            .unwrap();
        let run = db.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failure);
        assert_eq!(run.exit_code, Some(1));
        assert_eq!(run.output_log, "boom\n");
        assert_eq!(run.finished_at, Some(from_ts(1_700_000_010)));
    }

    #[tokio::test]
    async fn test_list_runs_newest_first_with_limit() {
        let db = Database::connect_memory().await.unwrap();
        let job_id = db
            .create_job(NewBackupJob::new("runs", "/backups"))
            .await
            .unwrap();

        for offset in 0..5 {
            db.create_run(job_id, trigger::SCHEDULER, from_ts(1_700_000_000 + offset))
                .await
                .unwrap();
        }

        let runs = db.list_runs(job_id, 3).await.unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].started_at, from_ts(1_700_000_004));
        assert_eq!(runs[2].started_at, from_ts(1_700_000_002));
    }
}
