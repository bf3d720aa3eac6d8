use crate::constants::schedule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 脚本类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Shell,
    Batch,
    PowerShell,
    Interpreted,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::Shell => "shell",
            ScriptType::Batch => "batch",
            ScriptType::PowerShell => "powershell",
            ScriptType::Interpreted => "interpreted",
        }
    }

    /// 未知类型回落为 shell，避免错误配置卡住调度器
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "shell" | "bash" | "sh" => ScriptType::Shell,
            "batch" | "bat" | "cmd" => ScriptType::Batch,
            "powershell" | "ps1" => ScriptType::PowerShell,
            "interpreted" | "php" => ScriptType::Interpreted,
            other => {
                tracing::warn!("未知的脚本类型 '{}'，按 shell 处理", other);
                ScriptType::Shell
            }
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 保留粒度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    All,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::All => "all",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Yearly => "yearly",
        }
    }

    /// 未知粒度回落为 all（全部保留，不会误删文件）
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Granularity::All,
            "daily" => Granularity::Daily,
            "weekly" => Granularity::Weekly,
            "monthly" => Granularity::Monthly,
            "yearly" => Granularity::Yearly,
            other => {
                tracing::warn!("未知的保留粒度 '{}'，按 all 处理", other);
                Granularity::All
            }
        }
    }

    /// 展示用标签
    pub fn label(&self) -> &'static str {
        match self {
            Granularity::All => "Keep all",
            Granularity::Daily => "1 per day",
            Granularity::Weekly => "1 per week",
            Granularity::Monthly => "1 per month",
            Granularity::Yearly => "1 per year",
        }
    }
}

/// 备份文件状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "deleted" => FileStatus::Deleted,
            _ => FileStatus::Active,
        }
    }
}

/// 执行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "success" => RunStatus::Success,
            "failure" => RunStatus::Failure,
            _ => RunStatus::Running,
        }
    }

    /// 退出码 0 视为成功
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }
}

/// 备份任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupJob {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub script_type: ScriptType,
    pub script_content: String,
    pub restore_script_type: ScriptType,
    pub restore_script_content: String,
    pub output_directory: String,
    pub file_pattern: String,
    /// 0 表示不限制
    pub retention_max_count: u32,
    pub schedule_enabled: bool,
    /// 秒
    pub schedule_interval: i64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl BackupJob {
    /// 是否配置了还原脚本
    pub fn has_restore_script(&self) -> bool {
        !self.restore_script_content.trim().is_empty()
    }
}

/// 新建备份任务（由外部配置界面提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBackupJob {
    pub name: String,
    pub description: String,
    pub script_type: ScriptType,
    pub script_content: String,
    pub restore_script_type: ScriptType,
    pub restore_script_content: String,
    pub output_directory: String,
    pub file_pattern: String,
    pub retention_max_count: i64,
    pub schedule_enabled: bool,
    pub schedule_interval: i64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl NewBackupJob {
    pub fn new(name: impl Into<String>, output_directory: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            script_type: ScriptType::Shell,
            script_content: String::new(),
            restore_script_type: ScriptType::Shell,
            restore_script_content: String::new(),
            output_directory: output_directory.into(),
            file_pattern: schedule::DEFAULT_FILE_PATTERN.to_string(),
            retention_max_count: 0,
            schedule_enabled: false,
            schedule_interval: schedule::DEFAULT_INTERVAL_SECS,
            next_run_at: None,
            is_active: true,
        }
    }

    /// 规范化输入：空模式回落为 `*`，保留上限不为负，启用调度时间隔至少 60 秒
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.output_directory = self.output_directory.trim().to_string();
        if self.file_pattern.trim().is_empty() {
            self.file_pattern = schedule::DEFAULT_FILE_PATTERN.to_string();
        } else {
            self.file_pattern = self.file_pattern.trim().to_string();
        }
        self.retention_max_count = self.retention_max_count.clamp(0, u32::MAX as i64);
        if self.schedule_enabled {
            self.schedule_interval = self.schedule_interval.max(schedule::MIN_INTERVAL_SECS);
        }
        self
    }
}

/// 保留层级
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionTier {
    pub id: i64,
    pub backup_id: i64,
    pub sort_order: i32,
    /// None 表示匹配所有剩余文件
    pub max_age_days: Option<i64>,
    pub keep_granularity: Granularity,
}

/// 新建保留层级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NewRetentionTier {
    pub max_age_days: Option<i64>,
    pub keep_granularity: Granularity,
}

impl NewRetentionTier {
    pub fn bounded(max_age_days: i64, keep_granularity: Granularity) -> Self {
        Self {
            max_age_days: Some(max_age_days),
            keep_granularity,
        }
    }

    pub fn catch_all(keep_granularity: Granularity) -> Self {
        Self {
            max_age_days: None,
            keep_granularity,
        }
    }
}

/// 备份文件清单条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupFile {
    pub id: i64,
    pub backup_id: i64,
    pub filename: String,
    pub filepath: String,
    pub filesize: i64,
    /// Unix 秒
    pub file_mtime: i64,
    pub status: FileStatus,
    pub discovered_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 扫描输出目录时发现的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub filename: String,
    /// 规范化后的绝对路径
    pub filepath: String,
    pub filesize: i64,
    pub file_mtime: i64,
}

/// 执行记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRun {
    pub id: i64,
    pub backup_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub output_log: String,
    pub status: RunStatus,
    pub triggered_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_type_aliases_and_fallback() {
        assert_eq!(ScriptType::parse("bash"), ScriptType::Shell);
        assert_eq!(ScriptType::parse("php"), ScriptType::Interpreted);
        assert_eq!(ScriptType::parse("PowerShell"), ScriptType::PowerShell);
        assert_eq!(ScriptType::parse("cobol"), ScriptType::Shell);
    }

    #[test]
    fn test_unknown_granularity_keeps_everything() {
        assert_eq!(Granularity::parse("weekly"), Granularity::Weekly);
        assert_eq!(Granularity::parse("hourly"), Granularity::All);
    }

    #[test]
    fn test_new_job_normalization() {
        let mut job = NewBackupJob::new("  nightly ", "/backups");
        job.file_pattern = "   ".to_string();
        job.retention_max_count = -5;
        job.schedule_enabled = true;
        job.schedule_interval = 10;

        let job = job.normalized();
        assert_eq!(job.name, "nightly");
        assert_eq!(job.file_pattern, "*");
        assert_eq!(job.retention_max_count, 0);
        assert_eq!(job.schedule_interval, 60);
    }

    #[test]
    fn test_run_status_from_exit_code() {
        assert_eq!(RunStatus::from_exit_code(0), RunStatus::Success);
        assert_eq!(RunStatus::from_exit_code(1), RunStatus::Failure);
        assert_eq!(RunStatus::from_exit_code(-1), RunStatus::Failure);
    }
}
