//! 任务级互斥锁
//!
//! 每个任务对应 `<data_dir>/locks/job-<id>.lock`，通过 `flock` 加非阻塞排他锁。
//! 守护进程与手动执行的命令行进程共享同一组锁文件，同一任务不会同时执行两次。
//! 非 unix 平台上不加锁。

use crate::constants::runner::LOCK_DIR_NAME;
use crate::{PhileError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

/// 任务锁目录
#[derive(Debug, Clone)]
pub struct JobLocks {
    dir: PathBuf,
}

impl JobLocks {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(LOCK_DIR_NAME),
        }
    }

    /// 尝试获取任务锁，已被占用时返回 [`PhileError::JobBusy`]
    pub fn try_acquire(&self, job_id: i64) -> Result<JobLockGuard> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("job-{job_id}.lock"));
        acquire(&path, job_id)
    }
}

/// 持有期间任务处于锁定状态，释放时自动解锁
#[derive(Debug)]
pub struct JobLockGuard {
    job_id: i64,
    #[cfg(unix)]
    _lock: Flock<std::fs::File>,
}

impl JobLockGuard {
    pub fn job_id(&self) -> i64 {
        self.job_id
    }
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        debug!(job_id = self.job_id, "释放任务锁");
    }
}

#[cfg(unix)]
fn acquire(path: &Path, job_id: i64) -> Result<JobLockGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => {
            debug!(job_id, "获取任务锁: {}", path.display());
            Ok(JobLockGuard {
                job_id,
                _lock: lock,
            })
        }
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => Err(PhileError::JobBusy(job_id)),
        Err((_, errno)) => Err(PhileError::Io(std::io::Error::from(errno))),
    }
}

#[cfg(not(unix))]
fn acquire(_path: &Path, job_id: i64) -> Result<JobLockGuard> {
    Ok(JobLockGuard { job_id })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_is_busy_until_release() {
        let dir = tempdir().unwrap();
        let locks = JobLocks::new(dir.path());

        let guard = locks.try_acquire(1).unwrap();
        assert!(matches!(locks.try_acquire(1), Err(PhileError::JobBusy(1))));

        // 不同任务互不影响
        let other = locks.try_acquire(2).unwrap();
        assert_eq!(other.job_id(), 2);

        drop(guard);
        assert!(locks.try_acquire(1).is_ok());
        assert!(dir.path().join("locks").join("job-1.lock").exists());
    }
}
