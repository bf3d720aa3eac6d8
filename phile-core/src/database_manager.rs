use crate::Result;
use duckdb::{Connection, Result as DuckResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

const SCHEMA_SQL: &str = include_str!("../migrations/init_duckdb.sql");

/// 锁冲突最多重试次数
const MAX_RETRIES: u32 = 3;

/// DuckDB 连接管理
///
/// 守护进程和命令行进程会同时打开同一个数据库文件，所以文件库每次操作都重新打开连接，
/// 用完即关，不长期占用文件锁。内存库（测试用）只有一个共享连接，由互斥锁串行化。
/// 遇到锁冲突时按退避间隔重试，其余错误直接返回。
#[derive(Clone)]
pub struct DatabaseManager {
    store: Arc<Store>,
}

enum Store {
    File(PathBuf),
    Memory(Mutex<Connection>),
}

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Memory,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    /// 读操作线性退避，写操作指数退避
    fn backoff(self, attempt: u32) -> Duration {
        match self {
            Access::Read => Duration::from_millis(100 * u64::from(attempt)),
            Access::Write => Duration::from_millis(100 << attempt),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Access::Read => "读操作",
            Access::Write => "写操作",
        }
    }
}

impl DatabaseManager {
    /// 打开（或创建）数据库文件并应用表结构
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        Connection::open(&db_path)?;
        debug!("已打开数据库文件: {}", db_path.display());

        let manager = Self {
            store: Arc::new(Store::File(db_path)),
        };
        manager.initialize_schema().await?;
        Ok(manager)
    }

    /// 内存数据库（测试用）
    pub async fn new_memory() -> Result<Self> {
        let manager = Self {
            store: Arc::new(Store::Memory(Mutex::new(Connection::open_in_memory()?))),
        };
        manager.initialize_schema().await?;
        Ok(manager)
    }

    pub fn kind(&self) -> StoreKind {
        match *self.store {
            Store::File(_) => StoreKind::File,
            Store::Memory(_) => StoreKind::Memory,
        }
    }

    pub async fn read_with_retry<F, R>(&self, operation: F) -> Result<R>
    where
        F: Fn(&Connection) -> DuckResult<R> + Send + Sync,
        R: Send,
    {
        self.with_retry(Access::Read, operation).await
    }

    /// 内存库写入期间一直持有共享连接的锁
    pub async fn write_with_retry<F, R>(&self, operation: F) -> Result<R>
    where
        F: Fn(&Connection) -> DuckResult<R> + Send + Sync,
        R: Send,
    {
        self.with_retry(Access::Write, operation).await
    }

    async fn with_retry<F, R>(&self, access: Access, operation: F) -> Result<R>
    where
        F: Fn(&Connection) -> DuckResult<R> + Send + Sync,
        R: Send,
    {
        let mut attempt = 0;
        loop {
            let result = self.execute_once(access, &operation).await;
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let message = err.to_string();
            if !is_lock_conflict(&message) || attempt >= MAX_RETRIES {
                error!("{}失败: {}", access.label(), message);
                return Err(err.into());
            }

            attempt += 1;
            let delay = access.backoff(attempt);
            warn!(
                "{}遇到锁冲突，{}ms后重试 ({}/{}): {}",
                access.label(),
                delay.as_millis(),
                attempt,
                MAX_RETRIES,
                message
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn execute_once<F, R>(&self, access: Access, operation: &F) -> DuckResult<R>
    where
        F: Fn(&Connection) -> DuckResult<R>,
    {
        match (&*self.store, access) {
            (Store::File(path), _) => operation(&Connection::open(path)?),
            (Store::Memory(conn), Access::Write) => operation(&*conn.lock().await),
            (Store::Memory(conn), Access::Read) => {
                let conn = conn.lock().await.try_clone()?;
                operation(&conn)
            }
        }
    }

    /// 应用表结构（全部为 IF NOT EXISTS，可重复执行）
    pub async fn initialize_schema(&self) -> Result<()> {
        self.write_with_retry(|conn| conn.execute_batch(SCHEMA_SQL))
            .await?;
        debug!("数据库表结构已就绪");
        Ok(())
    }

    /// 重新获取连接并执行一次探测查询
    pub async fn ping(&self) -> Result<()> {
        self.read_with_retry(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0)))
            .await?;
        Ok(())
    }
}

/// 其他进程持有写锁或并发写入冲突
fn is_lock_conflict(message: &str) -> bool {
    [
        "write-write conflict",
        "Could not set lock",
        "database is locked",
        "database is busy",
    ]
    .iter()
    .any(|pattern| message.contains(pattern))
}
