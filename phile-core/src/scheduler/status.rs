//! 守护进程状态与存活检测
//!
//! [`DaemonStatus`] 由调度器持有，通过 watch 通道只读发布，同时镜像到数据目录下的
//! `runner.pid`（进程号）和 `runner.heartbeat`（Unix 秒）。外部监控只需读取这两个文件：
//! 没有 PID 文件表示未运行，心跳超过新鲜度窗口表示进程还在但已不再循环。

use crate::constants::runner::{HEARTBEAT_FILE_NAME, PID_FILE_NAME};
use crate::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 持续轮询，直到收到停止信号
    Continuous,
    /// 执行所有启用调度的任务（不论是否到期）后退出
    Once,
    /// 执行指定任务后退出
    SingleJob(i64),
}

impl RunMode {
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, RunMode::Continuous)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Continuous => write!(f, "continuous"),
            RunMode::Once => write!(f, "once"),
            RunMode::SingleJob(id) => write!(f, "single job {id}"),
        }
    }
}

/// 守护进程生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Looping,
    Stopping,
    Stopped,
}

/// 守护进程状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonStatus {
    pub pid: u32,
    pub state: DaemonState,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub iterations: u64,
}

impl DaemonStatus {
    pub fn starting(mode: RunMode) -> Self {
        Self {
            pid: std::process::id(),
            state: DaemonState::Starting,
            mode,
            started_at: Utc::now(),
            last_heartbeat: None,
            iterations: 0,
        }
    }
}

/// PID 与心跳文件
#[derive(Debug, Clone)]
pub struct LivenessFiles {
    dir: PathBuf,
}

impl LivenessFiles {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.to_path_buf(),
        }
    }

    pub fn pid_path(&self) -> PathBuf {
        self.dir.join(PID_FILE_NAME)
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.dir.join(HEARTBEAT_FILE_NAME)
    }

    pub fn write_pid(&self, pid: u32) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.pid_path(), pid.to_string())?;
        Ok(())
    }

    pub fn write_heartbeat(&self, at: DateTime<Utc>) -> Result<()> {
        std::fs::write(self.heartbeat_path(), at.timestamp().to_string())?;
        Ok(())
    }

    /// 删除 PID 文件，文件不存在不算错误
    pub fn remove_pid(&self) -> Result<()> {
        match std::fs::remove_file(self.pid_path()) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn read_pid(&self) -> Option<u32> {
        read_number(&self.pid_path())
            .and_then(|pid| u32::try_from(pid).ok())
            .filter(|pid| *pid > 0)
    }

    pub fn read_heartbeat(&self) -> Option<DateTime<Utc>> {
        read_number(&self.heartbeat_path()).and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

fn read_number(path: &Path) -> Option<i64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// 外部观察到的守护进程健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Running,
    /// 进程存在，但心跳已超出新鲜度窗口
    Stale,
    Stopped,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Running => write!(f, "running"),
            HealthState::Stale => write!(f, "stale"),
            HealthState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerHealth {
    pub state: HealthState,
    pub pid: Option<u32>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl RunnerHealth {
    /// 根据数据目录中的存活文件判断守护进程状态
    pub fn inspect(data_dir: &Path, stale_after: Duration) -> Self {
        Self::inspect_at(data_dir, stale_after, Utc::now())
    }

    pub fn inspect_at(data_dir: &Path, stale_after: Duration, now: DateTime<Utc>) -> Self {
        let files = LivenessFiles::new(data_dir);
        let last_heartbeat = files.read_heartbeat();

        let Some(pid) = files.read_pid() else {
            return Self {
                state: HealthState::Stopped,
                pid: None,
                last_heartbeat,
            };
        };
        if !is_process_alive(pid) {
            debug!(pid, "PID 文件存在但进程已退出");
            return Self {
                state: HealthState::Stopped,
                pid: None,
                last_heartbeat,
            };
        }

        let stale = last_heartbeat.is_some_and(|beat| {
            (now - beat)
                .to_std()
                .is_ok_and(|age| age > stale_after)
        });
        Self {
            state: if stale {
                HealthState::Stale
            } else {
                HealthState::Running
            },
            pid: Some(pid),
            last_heartbeat,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Running
    }

    /// 向守护进程发送 SIGTERM 并删除 PID 文件，返回被通知的进程号
    pub fn request_stop(data_dir: &Path) -> Result<Option<u32>> {
        let files = LivenessFiles::new(data_dir);
        let pid = files.read_pid();
        if let Some(pid) = pid {
            send_terminate(pid);
        }
        files.remove_pid()?;
        Ok(pid)
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(unix)]
fn send_terminate(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        warn!(pid, "发送停止信号失败: {}", e);
    }
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) {
    warn!(pid, "当前平台不支持发送停止信号，仅删除 PID 文件");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_pid_file_is_stopped() {
        let dir = tempdir().unwrap();
        let health = RunnerHealth::inspect(dir.path(), Duration::from_secs(60));
        assert_eq!(health.state, HealthState::Stopped);
        assert_eq!(health.pid, None);
    }

    #[test]
    fn test_liveness_files_round_trip() {
        let dir = tempdir().unwrap();
        let files = LivenessFiles::new(&dir.path().join("data"));
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        files.write_pid(4242).unwrap();
        files.write_heartbeat(at).unwrap();
        assert_eq!(files.read_pid(), Some(4242));
        assert_eq!(files.read_heartbeat(), Some(at));

        files.remove_pid().unwrap();
        files.remove_pid().unwrap();
        assert_eq!(files.read_pid(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_fresh_and_stale_heartbeat() {
        let dir = tempdir().unwrap();
        let files = LivenessFiles::new(dir.path());
        let now = Utc::now();
        files.write_pid(std::process::id()).unwrap();

        files.write_heartbeat(now - chrono::Duration::seconds(10)).unwrap();
        let health = RunnerHealth::inspect_at(dir.path(), Duration::from_secs(60), now);
        assert_eq!(health.state, HealthState::Running);
        assert_eq!(health.pid, Some(std::process::id()));
        assert!(health.is_healthy());

        files.write_heartbeat(now - chrono::Duration::seconds(120)).unwrap();
        let health = RunnerHealth::inspect_at(dir.path(), Duration::from_secs(60), now);
        assert_eq!(health.state, HealthState::Stale);
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_pid_is_stopped() {
        let dir = tempdir().unwrap();
        LivenessFiles::new(dir.path())
            .write_pid(i32::MAX as u32)
            .unwrap();
        let health = RunnerHealth::inspect(dir.path(), Duration::from_secs(60));
        assert_eq!(health.state, HealthState::Stopped);
    }

    #[cfg(unix)]
    #[test]
    fn test_request_stop_removes_pid_file() {
        let dir = tempdir().unwrap();
        let files = LivenessFiles::new(dir.path());
        files.write_pid(i32::MAX as u32).unwrap();

        let pid = RunnerHealth::request_stop(dir.path()).unwrap();
        assert_eq!(pid, Some(i32::MAX as u32));
        assert!(!files.pid_path().exists());
        assert_eq!(RunnerHealth::request_stop(dir.path()).unwrap(), None);
    }
}
