use phile_core::lock::JobLocks;
use phile_core::{AppConfig, Database, Result, RunOrchestrator, ScriptRunner, ScriptSettings};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub database: Database,
    pub orchestrator: RunOrchestrator,
}

impl CliApp {
    /// 加载（或创建）配置文件并初始化CLI应用
    pub async fn new_with_config(config_path: &Path) -> Result<Self> {
        let config = AppConfig::find_and_load_config(config_path)?;

        // 确保数据目录存在（PID、心跳和任务锁文件）
        config.ensure_data_dir()?;

        let database = Database::connect(config.get_database_path()).await?;

        let runner = ScriptRunner::new(ScriptSettings::from_config(&config));
        let locks = JobLocks::new(&config.get_data_dir());
        let orchestrator = RunOrchestrator::new(database.clone(), runner, locks);

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            database,
            orchestrator,
        })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands, cancel: CancellationToken) -> Result<()> {
        match command {
            Commands::Daemon { once, job } => {
                commands::run_daemon(self, Commands::run_mode(once, job), cancel).await
            }
            Commands::Run { id, retention } => commands::run_job(self, id, retention).await,
            Commands::Restore { id } => commands::run_restore(self, id).await,
            Commands::Scan { id } => commands::run_scan(self, id).await,
            Commands::Retention { id, dry_run } => {
                commands::run_retention(self, id, dry_run).await
            }
            Commands::Status => commands::run_status(self).await,
            Commands::Stop => commands::run_stop(self).await,
            Commands::Jobs => commands::run_list_jobs(self).await,
            Commands::Runs { id, limit } => commands::run_list_runs(self, id, limit).await,
            Commands::Files { id, all } => commands::run_list_files(self, id, all).await,
            // main.rs 会在加载配置前处理 init，这里只在作为库调用时走到
            Commands::Init { force } => crate::init::run_init(&self.config_path, force).await,
        }
    }
}
