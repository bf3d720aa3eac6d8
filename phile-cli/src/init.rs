use phile_core::{AppConfig, Database, Result};
use std::path::Path;
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(config_path: &Path, force: bool) -> Result<()> {
    info!("🗄️  Phile Backups 初始化");
    info!("========================");

    let config = AppConfig::default();
    if !initialize(config_path, &config, force).await? {
        warn!("⚠️  检测到已存在的配置文件或数据库文件");
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: phile-runner init --force");
        return Ok(());
    }

    info!("🎉 初始化完成！");
    info!("");
    info!("📝 接下来的步骤:");
    info!("   1️⃣  在数据库的 backup_jobs 表中配置备份任务和保留层级");
    info!("   2️⃣  运行 'phile-runner run <ID>' 手动验证备份脚本");
    info!("   3️⃣  运行 'phile-runner daemon' 启动调度器");
    info!("");
    info!("💡 提示:");
    info!("   - 配置文件: {} (可手动编辑修改配置)", config_path.display());
    info!("   - 使用 'phile-runner status' 查看调度器状态");
    info!("   - 使用 'phile-runner --help' 查看所有可用命令");

    Ok(())
}

/// 写入配置、创建数据目录并初始化数据库；已存在且未指定 force 时返回 false
async fn initialize(config_path: &Path, config: &AppConfig, force: bool) -> Result<bool> {
    let db_path = config.get_database_path();
    if !force && (config_path.exists() || db_path.exists()) {
        return Ok(false);
    }

    info!("📋 步骤 1: 创建配置文件和数据目录");
    config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    config.ensure_data_dir()?;
    info!(
        "   ✅ 创建数据目录: {} (PID、心跳与任务锁文件)",
        config.runner.data_dir
    );

    info!("📋 步骤 2: 初始化数据库");
    Database::connect(&db_path).await?;
    info!("   ✅ 创建DuckDB数据库: {}", db_path.display());

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.runner.data_dir = dir.join("data").to_string_lossy().to_string();
        config.database.path = dir
            .join("data")
            .join("phile.duckdb")
            .to_string_lossy()
            .to_string();
        config
    }

    #[tokio::test]
    async fn test_initialize_writes_config_and_database() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("phile.toml");
        let config = config_in(temp_dir.path());

        assert!(initialize(&config_path, &config, false).await.unwrap());

        assert_eq!(AppConfig::load_from_file(&config_path).unwrap(), config);
        assert!(config.get_data_dir().is_dir());
        assert!(config.get_database_path().exists());
    }

    #[tokio::test]
    async fn test_initialize_refuses_to_overwrite_without_force() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("phile.toml");
        std::fs::write(&config_path, "# custom").unwrap();
        let config = config_in(temp_dir.path());

        assert!(!initialize(&config_path, &config, false).await.unwrap());
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "# custom");

        assert!(initialize(&config_path, &config, true).await.unwrap());
        assert_eq!(AppConfig::load_from_file(&config_path).unwrap(), config);
    }
}
