use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 隧道流量快照（四个方向的累计字节数）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSnapshot {
    /// 从本地端接收的字节数
    pub bytes_rx_local: u64,
    /// 发送到本地端的字节数
    pub bytes_tx_local: u64,
    /// 从远端接收的字节数
    pub bytes_rx_remote: u64,
    /// 发送到远端的字节数
    pub bytes_tx_remote: u64,
}

/// 单个隧道的流量计数器
///
/// 只增不减，没有重置操作；由字节泵写入，由统计输出任务读取
#[derive(Debug, Clone, Default)]
pub struct TrafficCounters {
    inner: Arc<RwLock<TrafficSnapshot>>,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在一次加锁内累加四个计数器
    pub fn increment(&self, rx_local: u64, tx_local: u64, rx_remote: u64, tx_remote: u64) {
        let mut counters = self.inner.write();
        counters.bytes_rx_local = counters.bytes_rx_local.saturating_add(rx_local);
        counters.bytes_tx_local = counters.bytes_tx_local.saturating_add(tx_local);
        counters.bytes_rx_remote = counters.bytes_rx_remote.saturating_add(rx_remote);
        counters.bytes_tx_remote = counters.bytes_tx_remote.saturating_add(tx_remote);
    }

    /// 读取一致的快照
    pub fn snapshot(&self) -> TrafficSnapshot {
        *self.inner.read()
    }
}

/// 周期性输出流量统计，直到取消
pub async fn run_stats_reporter(
    counters: TrafficCounters,
    proto: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(proto = %proto, "stats reporter stopped");
                return;
            }
            _ = ticker.tick() => {
                let snapshot = counters.snapshot();
                info!(
                    proto = %proto,
                    bytes_rx_local = snapshot.bytes_rx_local,
                    bytes_tx_local = snapshot.bytes_tx_local,
                    bytes_rx_remote = snapshot.bytes_rx_remote,
                    bytes_tx_remote = snapshot.bytes_tx_remote,
                    "connection statistics"
                );
            }
        }
    }
}
