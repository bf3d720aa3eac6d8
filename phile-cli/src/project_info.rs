/// Phile Runner 项目信息模块
///
/// 项目元数据统一在这里定义，phile-core 作为内部库只提供技术性常量

/// 项目元数据（自动从 phile-cli 的 Cargo.toml 同步）
pub mod metadata {
    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称（手动维护，用于日志标题）
    pub mod display {
        pub const FRIENDLY_NAME: &str = "Phile Backups";

        /// 项目详细描述（比 Cargo.toml 中的描述更详细）
        pub const DESCRIPTION_LONG: &str = "定时执行备份任务脚本，同步输出目录中的备份文件清单，并按分层保留策略（每天/每周/每月/每年保留一份）自动清理旧备份";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本（自动从 Cargo.toml 同步）
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// 获取版本信息字符串
pub fn get_version_string() -> String {
    format!(
        "{} v{}",
        metadata::display::FRIENDLY_NAME,
        version_info::CLI_VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_contains_cargo_version() {
        let version = get_version_string();
        assert!(version.starts_with("Phile Backups v"));
        assert!(version.ends_with(version_info::CLI_VERSION));
    }
}
