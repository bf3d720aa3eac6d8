//! 子进程执行与输出捕获
//!
//! stdout 和 stderr 分别由独立任务读取，读到的数据块经同一个通道汇总，
//! 按到达顺序拼接成一份合并输出。

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// 已结束进程的结果
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub output: String,
}

/// 启动命令并等待其退出
///
/// 只有进程无法启动时才返回错误；非零退出码属于正常结果。
pub async fn run_captured(mut cmd: Command) -> io::Result<CapturedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // 独立进程组：终端的 Ctrl-C 只让守护进程退出，不会打断正在执行的备份脚本
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let stdout_task = forward_stream(child.stdout.take(), tx.clone());
    let stderr_task = forward_stream(child.stderr.take(), tx);

    let mut combined = Vec::new();
    while let Some(chunk) = rx.recv().await {
        combined.extend_from_slice(&chunk);
    }
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let status = child.wait().await?;
    let mut output = String::from_utf8_lossy(&combined).into_owned();
    let exit_code = exit_code_of(status, &mut output);

    Ok(CapturedOutput { exit_code, output })
}

fn forward_stream<R>(handle: Option<R>, tx: mpsc::UnboundedSender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = handle else {
            return;
        };
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// 被信号终止的进程没有退出码，记为 -1 并在输出末尾附注
fn exit_code_of(status: ExitStatus, output: &mut String) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("[进程被信号 {signal} 终止]\n"));
        }
    }

    -1
}
