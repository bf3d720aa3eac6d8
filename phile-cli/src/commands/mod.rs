mod daemon;
mod jobs;
mod retention;
mod run;
mod status;

// Daemon commands
pub use daemon::run_daemon;

// Manual run commands
pub use run::{run_job, run_restore, run_scan};

// Retention commands
pub use retention::run_retention;

// Status commands
pub use status::{run_status, run_stop, show_client_version};

// Listing commands
pub use jobs::{run_list_files, run_list_jobs, run_list_runs};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::app::CliApp;
    use phile_core::AppConfig;
    use phile_core::db::NewBackupJob;
    use std::path::Path;

    /// 在临时目录中创建使用绝对路径的配置并初始化应用
    pub async fn test_app(dir: &Path) -> CliApp {
        let mut config = AppConfig::default();
        config.runner.data_dir = dir.join("data").to_string_lossy().to_string();
        config.database.path = dir
            .join("data")
            .join("phile.duckdb")
            .to_string_lossy()
            .to_string();
        config.scripts.temp_dir = dir.to_string_lossy().to_string();

        let config_path = dir.join("phile.toml");
        config.save_to_file(&config_path).unwrap();
        CliApp::new_with_config(&config_path).await.unwrap()
    }

    /// 创建一个输出目录在临时目录下的 shell 任务
    pub async fn create_job(app: &CliApp, dir: &Path, script: &str) -> i64 {
        let output = dir.join("out");
        std::fs::create_dir_all(&output).unwrap();

        let mut job = NewBackupJob::new("nightly", output.to_string_lossy());
        job.script_content = script.to_string();
        job.file_pattern = "*.tar".to_string();
        app.database.create_job(job).await.unwrap()
    }
}
