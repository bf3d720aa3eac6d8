use crate::project_info::{metadata, version_info};
use clap::{Parser, Subcommand};
use phile_core::RunMode;
use phile_core::constants::config::CONFIG_FILE_NAME;
use std::path::PathBuf;

/// Phile Runner - 备份调度与保留策略执行器
#[derive(Parser)]
#[command(name = "phile-runner")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    /// 不指定子命令时以守护进程方式持续运行
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// 没有子命令时等同于 `daemon`
    pub fn command_or_default(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Daemon {
            once: false,
            job: None,
        })
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// 运行调度器（默认持续轮询）
    Daemon {
        /// 执行所有启用调度的任务一次后退出
        #[arg(long, conflicts_with = "job")]
        once: bool,
        /// 只执行指定任务一次后退出
        #[arg(long, value_name = "ID")]
        job: Option<i64>,
    },
    /// 手动执行一次备份任务
    Run {
        /// 任务ID
        id: i64,
        /// 执行完成后应用保留策略
        #[arg(long)]
        retention: bool,
    },
    /// 执行任务的恢复脚本
    Restore {
        /// 任务ID
        id: i64,
    },
    /// 重新扫描输出目录，同步文件清单
    Scan {
        /// 任务ID
        id: i64,
    },
    /// 立即执行保留策略（会先扫描输出目录）
    Retention {
        /// 任务ID
        id: i64,
        /// 只显示将被删除的文件，不实际删除
        #[arg(long)]
        dry_run: bool,
    },
    /// 显示守护进程状态和存储统计
    Status,
    /// 停止正在运行的守护进程
    Stop,
    /// 列出所有备份任务
    Jobs,
    /// 显示任务最近的执行记录
    Runs {
        /// 任务ID
        id: i64,
        /// 显示条数
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// 显示任务的备份文件清单
    Files {
        /// 任务ID
        id: i64,
        /// 包含已删除的文件
        #[arg(long)]
        all: bool,
    },
    /// 初始化配置文件和数据库
    Init {
        /// 覆盖已存在的配置
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// `daemon` 子命令对应的运行模式
    pub fn run_mode(once: bool, job: Option<i64>) -> RunMode {
        match (job, once) {
            (Some(id), _) => RunMode::SingleJob(id),
            (None, true) => RunMode::Once,
            (None, false) => RunMode::Continuous,
        }
    }

    /// 是否为长时间运行的守护进程（决定日志格式）
    pub fn is_daemon(&self) -> bool {
        matches!(self, Commands::Daemon { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_continuous_daemon() {
        let cli = Cli::try_parse_from(["phile-runner"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE_NAME));
        assert_eq!(
            cli.command_or_default(),
            Commands::Daemon {
                once: false,
                job: None
            }
        );
    }

    #[test]
    fn test_daemon_flags_select_run_mode() {
        assert_eq!(Commands::run_mode(false, None), RunMode::Continuous);
        assert_eq!(Commands::run_mode(true, None), RunMode::Once);
        assert_eq!(Commands::run_mode(false, Some(7)), RunMode::SingleJob(7));

        let cli = Cli::try_parse_from(["phile-runner", "daemon", "--job", "7"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Daemon {
                once: false,
                job: Some(7)
            })
        );
    }

    #[test]
    fn test_once_conflicts_with_job() {
        assert!(Cli::try_parse_from(["phile-runner", "daemon", "--once", "--job", "1"]).is_err());
    }

    #[test]
    fn test_global_flags_and_subcommand_args() {
        let cli = Cli::try_parse_from([
            "phile-runner",
            "-v",
            "-c",
            "/etc/phile.toml",
            "retention",
            "3",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/phile.toml"));
        assert_eq!(
            cli.command,
            Some(Commands::Retention {
                id: 3,
                dry_run: true
            })
        );
        assert!(!cli.command_or_default().is_daemon());
    }
}
