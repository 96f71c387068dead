//! # 轮询排空循环
//!
//! 两个状态：`Draining` 反复轮询直到无消息可取，`Idle` 协作式休眠后回到 `Draining`。
//! 仅当上一轮排空未投递任何消息时才进入 `Idle`。

use crate::{
    domain::{Handle, Poll},
    record::PollOutcome,
};
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{Span, debug, error, info, instrument, warn};

/// 循环参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    /// 单次轮询超时
    pub poll_timeout: Duration,
    /// 空闲休眠时长
    pub sleep: Duration,
    /// 连续轮询到多少条消息或错误后让出调度，`None` 表示排空期间从不让出
    pub yield_every: Option<NonZeroUsize>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            sleep: Duration::from_secs(1),
            yield_every: None,
        }
    }
}

/// 循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// 排空中
    Draining,
    /// 空闲中
    Idle,
}

/// 循环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// 已投递给处理器的消息数
    pub delivered: u64,
    /// 轮询错误数
    pub errors: u64,
    /// 处理器返回错误数
    pub handler_errors: u64,
    /// 完成的排空轮次
    pub cycles: u64,
    /// 进入空闲的次数
    pub idles: u64,
}

/// 轮询排空循环
pub struct DrainLoop<P, H>
where
    P: Poll,
    H: Handle,
{
    name: String,
    consumer: Arc<P>,
    handler: H,
    cfg: DrainConfig,
    stats: LoopStats,
}

impl<P, H> DrainLoop<P, H>
where
    P: Poll,
    H: Handle,
{
    /// 构造函数
    pub fn new(name: impl Into<String>, consumer: Arc<P>, handler: H, cfg: DrainConfig) -> Self {
        Self {
            name: name.into(),
            consumer,
            handler,
            cfg,
            stats: LoopStats::default(),
        }
    }

    /// 当前统计
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// 取回处理器
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// 完成一轮排空，返回本轮投递数
    ///
    /// 轮询错误记录后继续轮询，处理器错误不影响计数。每次轮询前检查关闭信号，
    /// 收到信号即结束本轮。投递与轮询错误都计入 `yield_every` 的让出额度。
    pub async fn drain(&mut self, shutdown: &watch::Receiver<bool>) -> usize {
        let mut delivered = 0;
        let mut since_yield = 0;
        loop {
            if *shutdown.borrow() {
                debug!(delivered, "排空中收到关闭信号");
                break;
            }
            match self.consumer.poll(self.cfg.poll_timeout) {
                PollOutcome::Delivered(record) => {
                    let (topic, partition, offset) =
                        (record.topic.clone(), record.partition, record.offset);
                    if let Err(e) = self.handler.handle(record) {
                        self.stats.handler_errors += 1;
                        error!(%topic, partition, offset, "处理消息失败：{e}");
                    }
                    delivered += 1;
                    self.stats.delivered += 1;
                }
                PollOutcome::Error(e) => {
                    self.stats.errors += 1;
                    warn!("收到消息错误：{e}");
                }
                PollOutcome::Empty => break,
            }
            since_yield += 1;
            if let Some(n) = self.cfg.yield_every {
                if since_yield >= n.get() {
                    since_yield = 0;
                    tokio::task::yield_now().await;
                }
            }
        }
        self.stats.cycles += 1;
        debug!(delivered, "结束本轮排空");
        delivered
    }

    /// 执行一次状态转换，收到关闭信号时返回 `None`
    pub async fn step(
        &mut self,
        state: LoopState,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<LoopState> {
        if *shutdown.borrow() {
            return None;
        }
        match state {
            LoopState::Draining => match self.drain(shutdown).await {
                0 => Some(LoopState::Idle),
                _ => Some(LoopState::Draining),
            },
            LoopState::Idle => {
                self.stats.idles += 1;
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => match changed {
                        Ok(()) => Some(LoopState::Idle),
                        Err(_) => None,
                    },
                    _ = tokio::time::sleep(self.cfg.sleep) => Some(LoopState::Draining),
                }
            }
        }
    }

    /// 运行直至收到关闭信号
    ///
    /// 关闭信号只终止循环，消费者需由持有者另行关闭。
    #[instrument(name = "drain_loop", skip_all, fields(name))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        Span::current().record("name", self.name.as_str());
        info!("启动轮询排空循环");
        let mut state = LoopState::Draining;
        while let Some(next) = self.step(state, &mut shutdown).await {
            state = next;
        }
        info!(
            delivered = self.stats.delivered,
            errors = self.stats.errors,
            "收到关闭信号，退出轮询排空循环"
        );
        self.stats
    }
}
