// 存储层
//
// Database 是调度核心访问持久化数据的唯一入口，按实体拆分为：
// - jobs:  备份任务与保留层级（核心只读，只回写 next_run_at / last_run_at）
// - files: 备份文件清单（只切换状态，从不物理删除行）
// - runs:  执行记录
//
// 所有时间字段以 Unix 秒存储，在这里与 chrono 类型互相转换。

mod files;
mod jobs;
mod models;
mod runs;

pub use files::StorageTotals;
pub use models::{
    BackupFile, BackupJob, BackupRun, FileStatus, Granularity, NewBackupJob, NewRetentionTier,
    RetentionTier, RunStatus, ScannedFile, ScriptType,
};

use crate::Result;
use crate::database_manager::DatabaseManager;
use chrono::{DateTime, Utc};
use std::path::Path;

/// 数据库访问入口
#[derive(Clone)]
pub struct Database {
    manager: DatabaseManager,
}

impl Database {
    /// 连接到数据库文件
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DatabaseManager::new(db_path).await?;
        Ok(Database { manager })
    }

    /// 连接到内存数据库（主要用于测试）
    pub async fn connect_memory() -> Result<Self> {
        let manager = DatabaseManager::new_memory().await?;
        Ok(Database { manager })
    }

    /// 校验存储是否可用
    pub async fn ping(&self) -> Result<()> {
        self.manager.ping().await
    }

    pub(crate) fn manager(&self) -> &DatabaseManager {
        &self.manager
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("kind", &self.manager.kind())
            .finish()
    }
}

pub(crate) fn to_ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub(crate) fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub(crate) fn from_opt_ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.map(from_ts)
}
