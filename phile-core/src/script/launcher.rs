//! 脚本类型到启动命令的映射
//!
//! 每种脚本类型对应一个 [`Launcher`]：决定临时文件扩展名、是否规范化换行，
//! 以及用什么程序执行脚本文件。映射在运行前通过 [`launcher_for`] 一次性选定。

use crate::db::ScriptType;
use std::path::Path;
use tokio::process::Command;

/// 脚本启动器
pub trait Launcher: Send + Sync {
    /// 临时脚本文件扩展名（不含点）
    fn extension(&self) -> &'static str;

    /// 写入前是否去掉回车符并赋予可执行权限
    fn normalizes_line_endings(&self) -> bool {
        false
    }

    /// 实际被启动的程序名，用于诊断
    fn program(&self) -> &str;

    /// 构造执行指定脚本文件的命令
    fn command(&self, script: &Path) -> Command;
}

/// `bash <file>`
pub struct ShellLauncher {
    shell: String,
}

impl Launcher for ShellLauncher {
    fn extension(&self) -> &'static str {
        "sh"
    }

    fn normalizes_line_endings(&self) -> bool {
        true
    }

    fn program(&self) -> &str {
        &self.shell
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(script);
        cmd
    }
}

/// `cmd /c <file>`
pub struct BatchLauncher;

impl Launcher for BatchLauncher {
    fn extension(&self) -> &'static str {
        "bat"
    }

    fn program(&self) -> &str {
        "cmd"
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/c").arg(script);
        cmd
    }
}

/// `powershell -ExecutionPolicy Bypass -File <file>`
pub struct PowerShellLauncher;

impl Launcher for PowerShellLauncher {
    fn extension(&self) -> &'static str {
        "ps1"
    }

    fn program(&self) -> &str {
        "powershell"
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new("powershell");
        cmd.args(["-ExecutionPolicy", "Bypass", "-File"]).arg(script);
        cmd
    }
}

/// 由配置的解释器执行（默认 php）
pub struct InterpreterLauncher {
    interpreter: String,
}

impl Launcher for InterpreterLauncher {
    fn extension(&self) -> &'static str {
        "php"
    }

    fn normalizes_line_endings(&self) -> bool {
        true
    }

    fn program(&self) -> &str {
        &self.interpreter
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script);
        cmd
    }
}

/// 根据脚本类型选择启动器
pub fn launcher_for(script_type: ScriptType, shell: &str, interpreter: &str) -> Box<dyn Launcher> {
    match script_type {
        ScriptType::Shell => Box::new(ShellLauncher {
            shell: shell.to_string(),
        }),
        ScriptType::Batch => Box::new(BatchLauncher),
        ScriptType::PowerShell => Box::new(PowerShellLauncher),
        ScriptType::Interpreted => Box::new(InterpreterLauncher {
            interpreter: interpreter.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        let ext = |t| launcher_for(t, "bash", "php").extension();
        assert_eq!(ext(ScriptType::Shell), "sh");
        assert_eq!(ext(ScriptType::Batch), "bat");
        assert_eq!(ext(ScriptType::PowerShell), "ps1");
        assert_eq!(ext(ScriptType::Interpreted), "php");
    }

    #[test]
    fn test_only_text_interpreters_normalize() {
        assert!(launcher_for(ScriptType::Shell, "bash", "php").normalizes_line_endings());
        assert!(launcher_for(ScriptType::Interpreted, "bash", "php").normalizes_line_endings());
        assert!(!launcher_for(ScriptType::Batch, "bash", "php").normalizes_line_endings());
        assert!(!launcher_for(ScriptType::PowerShell, "bash", "php").normalizes_line_endings());
    }

    #[test]
    fn test_configured_programs() {
        assert_eq!(launcher_for(ScriptType::Shell, "zsh", "php").program(), "zsh");
        assert_eq!(
            launcher_for(ScriptType::Interpreted, "bash", "/usr/bin/php8").program(),
            "/usr/bin/php8"
        );

        let cmd = launcher_for(ScriptType::PowerShell, "bash", "php").command(Path::new("x.ps1"));
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["-ExecutionPolicy", "Bypass", "-File", "x.ps1"]);
    }
}
