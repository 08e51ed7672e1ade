use crate::error::{FeederError, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// HTTP 请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// 随机偏移的范围（秒），实际偏移为 `[-60, +60)`
const JITTER_RANGE_SECS: u64 = 120;

/// ATC 返回的 feeder 状态
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AtcStatus {
    pub status: StatusEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusEntry {
    #[serde(default)]
    pub adsb: ProtocolStatus,
    #[serde(default)]
    pub mlat: ProtocolStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
}

impl ProtocolStatus {
    pub fn health(&self) -> &'static str {
        if self.connected {
            "healthy"
        } else {
            "unhealthy"
        }
    }
}

impl AtcStatus {
    /// ADSB 与 MLAT 均已连接
    pub fn all_connected(&self) -> bool {
        self.status.adsb.connected && self.status.mlat.connected
    }
}

/// 构造状态查询地址：`{atc}/api/v1/feeders/{key}/status.json`
pub fn status_url(atc_url: &str, api_key: &str) -> Result<Url> {
    let raw = format!(
        "{}/api/v1/feeders/{}/status.json",
        atc_url.trim_end_matches('/'),
        api_key
    );
    Url::parse(&raw).map_err(|e| FeederError::config_error(format!("invalid ATC URL {}: {}", raw, e)))
}

/// 轮询周期：`interval - 60s + [0, 120)s`，启动时确定一次
pub fn jittered_period(interval: Duration, jitter_secs: u64) -> Duration {
    (interval + Duration::from_secs(jitter_secs)).saturating_sub(Duration::from_secs(60))
}

/// 周期性查询 ATC 上报的 feeder 连接状态并写入日志
pub struct StatusPoller {
    client: reqwest::Client,
    url: Url,
    period: Duration,
}

impl StatusPoller {
    pub fn new(atc_url: &str, api_key: &str, interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeederError::StatusApi(format!("failed to build HTTP client: {}", e)))?;

        let jitter = rand::random_range(0..JITTER_RANGE_SECS);
        Ok(Self {
            client,
            url: status_url(atc_url, api_key)?,
            period: jittered_period(interval, jitter),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 查询一次状态
    pub async fn fetch(&self) -> Result<AtcStatus> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FeederError::StatusApi(format!("error making http request: {}", e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(FeederError::StatusApi(format!(
                "bad response: {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeederError::StatusApi(format!("error reading http response body: {}", e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| FeederError::StatusApi(format!("error unmarshalling json: {}", e)))
    }

    /// 循环查询，直到取消；任何错误都只记录日志
    pub async fn run(self, cancel: CancellationToken) {
        debug!(url = %self.url, period = ?self.period, "status poller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("status poller stopped");
                    return;
                }
                _ = tokio::time::sleep(self.period) => {}
            }

            match self.fetch().await {
                Ok(status) => log_status(&status),
                Err(e) => error!(url = %self.url, "could not get feeder status: {}", e),
            }
        }
    }
}

fn log_status(status: &AtcStatus) {
    let adsb = status.status.adsb.health();
    let mlat = status.status.mlat.health();
    if status.all_connected() {
        info!(ADSB = adsb, MLAT = mlat, "atc.plane.watch reported connection status");
    } else {
        warn!(ADSB = adsb, MLAT = mlat, "atc.plane.watch reported connection status");
    }
}
