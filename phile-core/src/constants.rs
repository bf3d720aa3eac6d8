/// 调度器相关常量
pub mod runner {
    /// 默认轮询间隔（秒）
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

    /// 数据库连接失败后的默认退避时间（秒）
    pub const DEFAULT_DB_RETRY_BACKOFF_SECS: u64 = 30;

    /// PID 标记文件名
    pub const PID_FILE_NAME: &str = "runner.pid";

    /// 心跳文件名
    pub const HEARTBEAT_FILE_NAME: &str = "runner.heartbeat";

    /// 任务锁目录名
    pub const LOCK_DIR_NAME: &str = "locks";

    /// 默认数据目录
    pub const DEFAULT_DATA_DIR: &str = "data";
}

/// 任务与调度相关常量
pub mod schedule {
    /// 启用调度时允许的最小间隔（秒）
    pub const MIN_INTERVAL_SECS: i64 = 60;

    /// 新任务的默认调度间隔（秒）
    pub const DEFAULT_INTERVAL_SECS: i64 = 86_400;

    /// 默认文件匹配模式
    pub const DEFAULT_FILE_PATTERN: &str = "*";
}

/// 保留策略常量
pub mod retention {
    /// 一天的秒数
    pub const SECONDS_PER_DAY: f64 = 86_400.0;

    /// 层级允许的最小保留天数
    pub const MIN_MAX_AGE_DAYS: i64 = 1;
}

/// 运行触发来源
pub mod trigger {
    pub const MANUAL: &str = "manual";
    pub const SCHEDULER: &str = "scheduler";
    pub const RESTORE: &str = "restore";
}

/// 脚本执行相关常量
pub mod script {
    /// 临时脚本文件名前缀
    pub const TEMP_FILE_PREFIX: &str = "pb_";

    /// 进程启动失败时记录的退出码
    pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

    /// 默认 shell 解释器
    pub const DEFAULT_SHELL: &str = "bash";

    /// 默认脚本解释器
    pub const DEFAULT_INTERPRETER: &str = "php";
}

/// 配置与数据库文件
pub mod config {
    use std::path::PathBuf;

    /// 默认配置文件名
    pub const CONFIG_FILE_NAME: &str = "phile.toml";

    /// 默认数据库文件名
    pub const DATABASE_FILE_NAME: &str = "phile-backups.duckdb";

    /// 获取默认数据库路径
    pub fn get_database_path() -> PathBuf {
        PathBuf::from(super::runner::DEFAULT_DATA_DIR).join(DATABASE_FILE_NAME)
    }
}
