use super::{drive, LocalSource, RemoteRetry};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::transport::{apply_keepalive, RemoteConnector};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

/// 入站模式的本地连接：从常驻监听器接受客户端
///
/// 监听器在控制器整个生命周期内保持不变；同一时间只服务一个客户端，
/// 上一个会话结束前不会再调用 accept。
pub struct LocalAcceptor {
    listener: TcpListener,
    accept_deadline: Duration,
}

impl LocalAcceptor {
    pub fn new(listener: TcpListener, accept_deadline: Duration) -> Self {
        Self {
            listener,
            accept_deadline,
        }
    }

    pub fn listen_addr(&self) -> String {
        self.listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into())
    }
}

#[async_trait]
impl LocalSource for LocalAcceptor {
    type Stream = TcpStream;

    async fn obtain(&mut self) -> Result<Option<(TcpStream, String)>> {
        let (stream, peer) =
            match tokio::time::timeout(self.accept_deadline, self.listener.accept()).await {
                Err(_) => return Ok(None),
                Ok(accepted) => accepted?,
            };

        apply_keepalive(&stream);
        info!(src = %peer, "connection established from mlat-client");
        Ok(Some((stream, peer.to_string())))
    }

    fn remote_retry(&self) -> RemoteRetry {
        RemoteRetry::Backoff
    }
}

/// 入站控制器（MLAT）：在本地监听器上等待客户端，接入后连接远端并搬运
pub async fn run_inbound(
    config: ControllerConfig,
    listener: TcpListener,
    connector: Arc<dyn RemoteConnector>,
    cancel: CancellationToken,
) {
    let acceptor = LocalAcceptor::new(listener, config.timings.accept_deadline);
    let span = info_span!(
        "tunnel",
        proto = %config.proto,
        listen = %acceptor.listen_addr(),
        dst = %config.remote_endpoint
    );

    async move {
        info!("listening for connections from mlat-client");
        drive(&config.proto, acceptor, connector, config.timings, cancel).await;
        info!("controller stopped");
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_deadline_yields_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut acceptor = LocalAcceptor::new(listener, Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert!(acceptor.obtain().await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(acceptor.remote_retry(), RemoteRetry::Backoff);
    }

    #[tokio::test]
    async fn test_accepts_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut acceptor = LocalAcceptor::new(listener, Duration::from_secs(2));
        assert_eq!(acceptor.listen_addr(), addr.to_string());

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_stream, peer) = acceptor.obtain().await.unwrap().unwrap();
        let client = client.await.unwrap();
        assert_eq!(peer, client.local_addr().unwrap().to_string());
    }
}
