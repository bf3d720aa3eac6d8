// 脚本执行
//
// 把任务中保存的脚本正文写入唯一命名的临时文件，按脚本类型选择启动器执行，
// 捕获合并输出与退出码，最后删除临时文件。本模块不访问数据库，可并发调用。

pub mod launcher;
pub mod subprocess;

use crate::config::AppConfig;
use crate::constants::script::{LAUNCH_FAILURE_EXIT_CODE, TEMP_FILE_PREFIX};
use crate::db::{RunStatus, ScriptType};
use launcher::{Launcher, launcher_for};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};
use uuid::Uuid;

/// 脚本执行环境
#[derive(Debug, Clone)]
pub struct ScriptSettings {
    pub shell: String,
    pub interpreter: String,
    pub temp_dir: PathBuf,
}

impl ScriptSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            shell: config.scripts.shell.clone(),
            interpreter: config.scripts.interpreter.clone(),
            temp_dir: config.get_script_temp_dir(),
        }
    }
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 一次脚本执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub exit_code: i32,
    /// stdout 与 stderr 的合并输出
    pub output: String,
}

impl ScriptOutcome {
    fn launch_failure(message: String) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            output: message,
        }
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_exit_code(self.exit_code)
    }
}

/// 脚本执行器
#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    settings: ScriptSettings,
}

impl ScriptRunner {
    pub fn new(settings: ScriptSettings) -> Self {
        Self { settings }
    }

    /// 执行脚本正文
    ///
    /// 启动失败不会返回错误，而是以退出码 -1 和说明文字作为结果。
    pub async fn run(&self, job_id: i64, script_type: ScriptType, body: &str) -> ScriptOutcome {
        let launcher = launcher_for(script_type, &self.settings.shell, &self.settings.interpreter);

        let script = match materialize(&self.settings.temp_dir, job_id, launcher.as_ref(), body) {
            Ok(script) => script,
            Err(e) => {
                warn!(job_id, "写入临时脚本失败: {}", e);
                return ScriptOutcome::launch_failure(format!("无法写入临时脚本: {e}"));
            }
        };
        debug!(job_id, script = %script.display(), "执行 {} 脚本", script_type);

        let outcome = match subprocess::run_captured(launcher.command(&script)).await {
            Ok(captured) => ScriptOutcome {
                exit_code: captured.exit_code,
                output: captured.output,
            },
            Err(e) => {
                warn!(job_id, program = launcher.program(), "进程启动失败: {}", e);
                ScriptOutcome::launch_failure(describe_launch_failure(launcher.program(), &e))
            }
        };

        if let Err(e) = script.close() {
            warn!(job_id, "删除临时脚本失败: {}", e);
        }

        outcome
    }
}

/// 写入临时脚本，文件名形如 `pb_<job>_<uuid>.<ext>`
///
/// 返回的 [`TempPath`] 在释放时删除文件。
fn materialize(dir: &Path, job_id: i64, launcher: &dyn Launcher, body: &str) -> io::Result<TempPath> {
    std::fs::create_dir_all(dir)?;

    let prefix = format!("{TEMP_FILE_PREFIX}{job_id}_{}", Uuid::new_v4().simple());
    let suffix = format!(".{}", launcher.extension());
    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .rand_bytes(0)
        .tempfile_in(dir)?;

    if launcher.normalizes_line_endings() {
        file.write_all(body.replace('\r', "").as_bytes())?;
    } else {
        file.write_all(body.as_bytes())?;
    }
    file.flush()?;

    #[cfg(unix)]
    if launcher.normalizes_line_endings() {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))?;
    }

    // 关闭句柄，只保留路径
    Ok(file.into_temp_path())
}

fn describe_launch_failure(program: &str, err: &io::Error) -> String {
    match which::which(program) {
        Ok(path) => format!("进程启动失败: {} ({}): {}", program, path.display(), err),
        Err(_) => format!("进程启动失败: 在 PATH 中找不到 '{program}': {err}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn runner_in(dir: &Path) -> ScriptRunner {
        ScriptRunner::new(ScriptSettings {
            shell: "bash".to_string(),
            interpreter: "/nonexistent/phile-interpreter".to_string(),
            temp_dir: dir.to_path_buf(),
        })
    }

    fn leftover_scripts(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_shell_script_output_and_exit_code() {
        let dir = tempdir().unwrap();
        let runner = runner_in(dir.path());

        let outcome = runner
            .run(1, ScriptType::Shell, "echo hello\necho oops 1>&2\nexit 0\n")
            .await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.status(), RunStatus::Success);
        assert!(outcome.output.contains("hello"));
        assert!(outcome.output.contains("oops"));
        assert_eq!(leftover_scripts(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_exit_one_is_failure_with_empty_output() {
        let dir = tempdir().unwrap();
        let outcome = runner_in(dir.path()).run(2, ScriptType::Shell, "exit 1").await;
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.status(), RunStatus::Failure);
        assert!(outcome.output.is_empty());
    }

    #[tokio::test]
    async fn test_carriage_returns_are_stripped() {
        let dir = tempdir().unwrap();
        let outcome = runner_in(dir.path())
            .run(3, ScriptType::Shell, "X=abc\r\necho \"[$X]\"\r\n")
            .await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.output, "[abc]\n");
    }

    #[tokio::test]
    async fn test_script_sees_its_own_temp_file() {
        let dir = tempdir().unwrap();
        let outcome = runner_in(dir.path())
            .run(42, ScriptType::Shell, "basename \"$0\"")
            .await;
        let name = outcome.output.trim();
        assert!(name.starts_with("pb_42_"), "unexpected name {name}");
        assert!(name.ends_with(".sh"));
        assert_eq!(leftover_scripts(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let outcome = runner_in(dir.path())
            .run(4, ScriptType::Interpreted, "<?php echo 1;")
            .await;
        assert_eq!(outcome.exit_code, -1);
        assert_eq!(outcome.status(), RunStatus::Failure);
        assert!(outcome.output.contains("/nonexistent/phile-interpreter"));
        assert_eq!(leftover_scripts(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_collide() {
        let dir = tempdir().unwrap();
        let runner = runner_in(dir.path());

        let (a, b) = tokio::join!(
            runner.run(7, ScriptType::Shell, "sleep 0.2; echo a"),
            runner.run(7, ScriptType::Shell, "sleep 0.2; echo b"),
        );
        assert_eq!(a.output, "a\n");
        assert_eq!(b.output, "b\n");
        assert_eq!(leftover_scripts(dir.path()), 0);
    }
}
