use thiserror::Error;

pub type Result<T> = std::result::Result<T, PhileError>;

#[derive(Error, Debug)]
pub enum PhileError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("备份任务不存在: {0}")]
    JobNotFound(i64),

    #[error("备份任务已停用: {0}")]
    JobInactive(i64),

    #[error("备份任务正在执行中: {0}")]
    JobBusy(i64),

    #[error("记录无效: {0}")]
    InvalidRecord(String),

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for PhileError {
    fn from(err: duckdb::Error) -> Self {
        PhileError::DuckDb(err.to_string())
    }
}

impl PhileError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// 是否属于存储层的瞬时故障（调度循环遇到时只中止本轮，不退出）
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DuckDb(_) | Self::Io(_))
    }
}
