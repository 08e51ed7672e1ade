mod inbound;
mod outbound;

pub use inbound::{run_inbound, LocalAcceptor};
pub use outbound::{run_outbound, LocalDialer};

use crate::backoff::Backoff;
use crate::config::TunnelTimings;
use crate::error::Result;
use crate::pump::pipe;
use crate::stats::{run_stats_reporter, TrafficCounters};
use crate::transport::{RemoteConnector, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// 关闭连接时等待 shutdown 完成的上限
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// 远端连接失败后的等待方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRetry {
    /// 固定等待 `error_sleep`
    ErrorSleep,
    /// 按退避策略等待
    Backoff,
}

/// 获取本地连接的策略
///
/// 出站模式主动拨号，入站模式从监听器接受连接
#[async_trait]
pub trait LocalSource: Send {
    type Stream: Transport;

    /// 获取一个本地连接
    ///
    /// `Ok(None)` 表示本轮没有连接（例如 accept 超时），直接进入下一轮
    async fn obtain(&mut self) -> Result<Option<(Self::Stream, String)>>;

    /// 远端连接失败后的等待方式
    fn remote_retry(&self) -> RemoteRetry;
}

/// 会话驱动器：获取本地连接 -> 连接远端 -> 双向搬运 -> 拆除 -> 退避
pub struct SessionDriver<S> {
    proto: String,
    source: S,
    connector: Arc<dyn RemoteConnector>,
    counters: TrafficCounters,
    timings: TunnelTimings,
    backoff: Backoff,
}

impl<S: LocalSource> SessionDriver<S> {
    pub fn new(
        proto: impl Into<String>,
        source: S,
        connector: Arc<dyn RemoteConnector>,
        counters: TrafficCounters,
        timings: TunnelTimings,
    ) -> Self {
        Self {
            proto: proto.into(),
            source,
            connector,
            counters,
            timings,
            backoff: Backoff::new()
                .with_cap(timings.backoff_cap)
                .with_reset_after(timings.backoff_reset_after),
        }
    }

    /// 循环建立会话，直到 `cancel` 触发
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                debug!("stopping");
                return;
            }

            let obtained = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("stopping");
                    return;
                }
                obtained = self.source.obtain() => obtained,
            };

            let (local, peer) = match obtained {
                Ok(Some(conn)) => conn,
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        "tunnel terminated, could not obtain the local connection: {}",
                        e
                    );
                    if sleep_or_cancel(self.timings.error_sleep, &cancel).await {
                        return;
                    }
                    continue;
                }
            };

            info!(peer = %peer, "initiating tunnel connection to plane.watch");

            let connected = tokio::select! {
                _ = cancel.cancelled() => {
                    close_quietly("local", local).await;
                    debug!("stopping");
                    return;
                }
                connected = self.connector.connect() => connected,
            };

            let remote = match connected {
                Ok(remote) => remote,
                Err(e) => {
                    error!(
                        "tunnel terminated, could not connect to the plane.watch feed-in server {}: {}",
                        self.connector.endpoint(),
                        e
                    );
                    close_quietly("local", local).await;
                    let delay = match self.source.remote_retry() {
                        RemoteRetry::ErrorSleep => self.timings.error_sleep,
                        RemoteRetry::Backoff => self.backoff.next(),
                    };
                    if sleep_or_cancel(delay, &cancel).await {
                        return;
                    }
                    continue;
                }
            };

            info!(peer = %peer, "feeding {} data to plane.watch", self.proto);

            let session = cancel.child_token();
            match pipe(
                local,
                remote,
                &self.counters,
                self.timings.read_deadline,
                session,
            )
            .await
            {
                Ok((local, remote)) => {
                    close_quietly("local", local).await;
                    close_quietly("remote", remote).await;
                }
                Err(e) => warn!("session ended abnormally: {}", e),
            }

            if cancel.is_cancelled() {
                debug!("stopping");
                return;
            }
            warn!(peer = %peer, "tunnel to plane.watch has been terminated");

            let delay = self.backoff.next();
            if !delay.is_zero() {
                debug!("waiting {:?} before the next session", delay);
            }
            if sleep_or_cancel(delay, &cancel).await {
                return;
            }
        }
    }
}

/// 运行一个控制器：统计输出任务 + 会话驱动器，直到 `cancel` 触发
///
/// 调用方负责在外层附加控制器的 span
async fn drive<S: LocalSource>(
    proto: &str,
    source: S,
    connector: Arc<dyn RemoteConnector>,
    timings: TunnelTimings,
    cancel: CancellationToken,
) {
    let counters = TrafficCounters::new();
    let reporter = tokio::spawn(
        run_stats_reporter(
            counters.clone(),
            proto.to_string(),
            timings.stats_interval,
            cancel.clone(),
        )
        .in_current_span(),
    );

    SessionDriver::new(proto, source, connector, counters, timings)
        .run(cancel)
        .await;

    if let Err(e) = reporter.await {
        warn!("stats reporter failed: {}", e);
    }
}

/// 等待 `duration`，期间被取消则返回 `true`
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// 关闭连接，错误只记录日志
async fn close_quietly<T: AsyncWrite + Unpin>(side: &str, mut conn: T) {
    match tokio::time::timeout(CLOSE_TIMEOUT, conn.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(side, "error closing connection: {}", e),
        Err(_) => debug!(side, "timed out closing connection"),
    }
}
