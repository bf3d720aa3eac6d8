//! 停止信号
//!
//! 收到 SIGTERM / SIGINT（Windows 上为 Ctrl+C）时取消令牌。
//! 调度循环在每轮开始、每个任务之前以及休眠期间检查令牌；
//! 正在执行的脚本进程不会被中断。

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 在后台监听停止信号
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                info!("收到停止信号，当前任务结束后退出");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("无法注册 SIGTERM 处理器: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("收到 SIGTERM"),
        _ = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("收到 Ctrl+C"),
        Err(e) => {
            error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_exits_when_token_is_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let handle = spawn_signal_listener(cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
