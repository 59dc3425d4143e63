//! Dispatcher - ready queue を監視してタスクを起動するループ
//!
//! 起床条件は 3 つ:
//! - queue への arm / 環境変化による gate 解除 (`Notify`)
//! - 次のタイマー期限
//! - shutdown 要求

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::scheduler::Scheduler;

/// Dispatch loop handle.
/// - `request_shutdown()` で新規起動を止める（実行中のタスクは止めない）
/// - `shutdown()` でループの終了まで待つ
pub struct Dispatcher {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Dispatcher {
    pub(crate) fn spawn(scheduler: Scheduler) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(dispatch_loop(scheduler, shutdown_rx));
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub async fn shutdown(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            error!(error = %e, "dispatcher task ended abnormally");
        }
    }
}

async fn dispatch_loop(scheduler: Scheduler, mut shutdown_rx: watch::Receiver<bool>) {
    info!("dispatcher started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match scheduler.dispatch_ready().await {
            Ok(0) => {}
            Ok(started) => debug!(started, "dispatched"),
            // 失敗したタスクは dispatch_ready 側で再 arm 済み
            Err(e) => error!(error = %e, "dispatch round failed"),
        }

        let queue = scheduler.ready_queue();
        let wake = queue.next_wake();
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = queue.notified() => {}
            _ = sleep_until(wake) => {}
        }
    }
    info!("dispatcher stopped");
}

async fn sleep_until(at: Option<tokio::time::Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
