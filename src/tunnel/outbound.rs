use super::{drive, LocalSource, RemoteRetry};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::transport::{connect_local, RemoteConnector};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

/// 出站模式的本地连接：每个会话重新拨号本地数据源
pub struct LocalDialer {
    name: String,
    addr: String,
    connect_timeout: Duration,
}

impl LocalDialer {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl LocalSource for LocalDialer {
    type Stream = TcpStream;

    async fn obtain(&mut self) -> Result<Option<(TcpStream, String)>> {
        info!("initiating connection to {} provider", self.name);
        let stream = connect_local(&self.name, &self.addr, self.connect_timeout).await?;
        Ok(Some((stream, self.addr.clone())))
    }

    fn remote_retry(&self) -> RemoteRetry {
        RemoteRetry::ErrorSleep
    }
}

/// 出站控制器（BEAST）：主动连接本地数据源，再连接远端，持续搬运直到取消
pub async fn run_outbound(
    config: ControllerConfig,
    connector: Arc<dyn RemoteConnector>,
    cancel: CancellationToken,
) {
    let span = info_span!(
        "tunnel",
        proto = %config.proto,
        src = %config.local_addr,
        dst = %config.remote_endpoint
    );

    async move {
        let dialer = LocalDialer::new(
            config.proto.clone(),
            config.local_addr.clone(),
            config.timings.connect_timeout,
        );
        drive(&config.proto, dialer, connector, config.timings, cancel).await;
        info!("controller stopped");
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dialer_reports_peer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut dialer = LocalDialer::new("BEAST", addr.clone(), Duration::from_secs(2));
        let (stream, peer) = dialer.obtain().await.unwrap().unwrap();
        assert_eq!(peer, addr);
        assert_eq!(stream.peer_addr().unwrap().to_string(), addr);
        assert_eq!(dialer.remote_retry(), RemoteRetry::ErrorSleep);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_dialer_error_when_source_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut dialer = LocalDialer::new("BEAST", addr, Duration::from_secs(2));
        assert!(dialer.obtain().await.is_err());
    }
}
