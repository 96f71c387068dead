//! # 管道上下文
//!
//! 托管排空循环任务，统一分发关闭信号，并在循环退出后关闭消费者。

use crate::{
    domain::{Handle, Poll},
    drain::{DrainConfig, DrainLoop, LoopStats},
    errors::TransitError,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{Mutex, watch},
    task::JoinSet,
};
use tracing::{error, info, warn};

/// 管道上下文结构
pub struct App {
    initiated: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<JoinSet<(String, LoopStats)>>,
    consumers: Mutex<Vec<(String, Arc<dyn Poll>)>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// 构造函数
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            initiated: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(JoinSet::new()),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// 关闭信号接收端
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 是否已开始关闭
    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// 启动排空循环任务
    ///
    /// 关闭开始后拒绝启动，并立即关闭传入的消费者。
    pub async fn launch<P, H>(
        &self,
        name: &str,
        consumer: Arc<P>,
        handler: H,
        cfg: DrainConfig,
    ) -> Result<(), TransitError>
    where
        P: Poll + 'static,
        H: Handle + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if self.is_shutting_down() {
            consumer.close();
            warn!(name, "已开始关闭，拒绝启动消费任务");
            return Err(TransitError::Closed);
        }
        let rx = self.subscribe();
        let lp = DrainLoop::new(name, Arc::clone(&consumer), handler, cfg);
        let owned = name.to_string();
        tasks.spawn(async move { (owned, lp.run(rx).await) });
        self.consumers
            .lock()
            .await
            .push((name.to_string(), consumer as Arc<dyn Poll>));
        info!(name, "启动消费任务");
        Ok(())
    }

    /// 优雅关闭，返回各循环的统计
    ///
    /// 仅首次调用生效，之后的调用返回空集合。
    pub async fn shutdown(&self) -> Vec<(String, LoopStats)> {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return Vec::new();
        }
        info!("开始优雅退出");
        self.shutdown_tx.send_replace(true);
        let mut stats = Vec::new();
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(s) => stats.push(s),
                Err(e) => error!("消费任务发生错误：{e}"),
            }
        }
        for (name, consumer) in self.consumers.lock().await.drain(..) {
            consumer.close();
            info!(name, "关闭消费者");
        }
        info!("优雅退出所有消费任务");
        stats
    }
}

/// 等待 Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("监听 Ctrl-C 信号失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("监听 SIGTERM 信号失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl-C 信号"),
        _ = terminate => info!("收到 SIGTERM 信号"),
    }
}
