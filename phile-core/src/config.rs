use crate::constants::{config, runner, script};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub runner: RunnerConfig,
    pub scripts: ScriptsConfig,
}

/// 数据库相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
}

/// 调度器相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub data_dir: String,
    pub poll_interval_secs: u64,
    pub db_retry_backoff_secs: u64,
    /// 0 表示使用轮询间隔的 2 倍
    pub heartbeat_stale_secs: u64,
}

/// 脚本执行相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScriptsConfig {
    pub shell: String,
    pub interpreter: String,
    /// 空字符串表示系统临时目录
    pub temp_dir: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_dir: runner::DEFAULT_DATA_DIR.to_string(),
            poll_interval_secs: runner::DEFAULT_POLL_INTERVAL_SECS,
            db_retry_backoff_secs: runner::DEFAULT_DB_RETRY_BACKOFF_SECS,
            heartbeat_stale_secs: 0,
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            shell: script::DEFAULT_SHELL.to_string(),
            interpreter: script::DEFAULT_INTERPRETER.to_string(),
            temp_dir: String::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: config::get_database_path().to_string_lossy().to_string(),
            },
            runner: RunnerConfig::default(),
            scripts: ScriptsConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置文件，不存在时写入默认配置
    pub fn find_and_load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("找到配置文件: {}", path.display());
            return Self::load_from_file(path);
        }

        tracing::warn!("未找到配置文件，创建默认配置: {}", path.display());
        let default_config = Self::default();
        default_config.save_to_file(path)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{database_path}", &toml_escape(&self.database.path))
            .replace("{data_dir}", &toml_escape(&self.runner.data_dir))
            .replace(
                "{poll_interval_secs}",
                &self.runner.poll_interval_secs.to_string(),
            )
            .replace(
                "{db_retry_backoff_secs}",
                &self.runner.db_retry_backoff_secs.to_string(),
            )
            .replace(
                "{heartbeat_stale_secs}",
                &self.runner.heartbeat_stale_secs.to_string(),
            )
            .replace("{shell}", &toml_escape(&self.scripts.shell))
            .replace("{interpreter}", &toml_escape(&self.scripts.interpreter))
            .replace("{temp_dir}", &toml_escape(&self.scripts.temp_dir))
    }

    /// 确保数据目录存在
    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.runner.data_dir)?;
        Ok(())
    }

    /// 获取数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.runner.data_dir)
    }

    /// 获取数据库文件路径
    pub fn get_database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.runner.poll_interval_secs.max(1))
    }

    pub fn db_retry_backoff(&self) -> Duration {
        Duration::from_secs(self.runner.db_retry_backoff_secs.max(1))
    }

    /// 心跳新鲜度窗口，未配置时为轮询间隔的 2 倍
    pub fn heartbeat_stale_after(&self) -> Duration {
        if self.runner.heartbeat_stale_secs > 0 {
            Duration::from_secs(self.runner.heartbeat_stale_secs)
        } else {
            self.poll_interval() * 2
        }
    }

    /// 临时脚本目录
    pub fn get_script_temp_dir(&self) -> PathBuf {
        if self.scripts.temp_dir.trim().is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.scripts.temp_dir)
        }
    }
}

fn toml_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_round_trips_through_template() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("phile.toml");

        let config = AppConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_find_and_load_creates_missing_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("phile.toml");

        let config = AppConfig::find_and_load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.runner.poll_interval_secs, 30);
    }

    #[test]
    fn test_partial_sections_fall_back_to_defaults() {
        let content = r#"
[database]
path = "/var/lib/phile/db.duckdb"

[runner]
poll_interval_secs = 10

[scripts]
"#;
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.runner.data_dir, "data");
        assert_eq!(config.scripts.shell, "bash");
        assert_eq!(config.heartbeat_stale_after(), Duration::from_secs(20));
    }

    #[test]
    fn test_windows_paths_are_escaped() {
        let mut config = AppConfig::default();
        config.database.path = r"C:\phile\db.duckdb".to_string();

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("phile.toml");
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.database.path, r"C:\phile\db.duckdb");
    }
}
