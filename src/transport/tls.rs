use super::{dial_tcp, split_host_port, RemoteConnector, Transport};
use crate::config::{ControllerConfig, TlsOptions};
use crate::error::{FeederError, Result};
use crate::tls::{build_client_config, TrustStore};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error};

/// TLS 远端连接器
///
/// SNI 携带 feeder API Key，证书按远端主机名校验
pub struct TlsRemoteConnector {
    name: String,
    endpoint: String,
    sni: String,
    options: TlsOptions,
    connect_timeout: Duration,
}

impl TlsRemoteConnector {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        sni: impl Into<String>,
        options: TlsOptions,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            sni: sni.into(),
            options,
            connect_timeout,
        }
    }

    /// 按控制器配置构造：SNI 使用 API Key
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.proto.clone(),
            config.remote_endpoint.clone(),
            config.api_key.clone(),
            config.tls,
            config.timings.connect_timeout,
        )
    }

    /// 拨号并完成 TLS 握手
    pub async fn connect_tls(&self) -> Result<TlsStream<TcpStream>> {
        let name = self.name.as_str();
        let addr = self.endpoint.as_str();

        let (remote_host, _) = split_host_port(addr).ok_or_else(|| {
            FeederError::config_error(format!("'{}' is not in host:port form", addr))
        })?;

        // 每次连接都重新构建信任库，不跨连接缓存
        let trust = TrustStore::build().inspect_err(|e| {
            error!(name, addr, "could not build trust store: {}", e);
        })?;
        let tls_config = build_client_config(remote_host, self.options, &trust)?;
        let connector = TlsConnector::from(tls_config);

        let server_name = ServerName::try_from(self.sni.clone())
            .map_err(|_| FeederError::InvalidServerName(self.sni.clone()))?;

        let tcp_stream = dial_tcp(addr, self.connect_timeout)
            .await
            .inspect_err(|e| {
                error!(name, addr, "could not connect: {}", e);
            })?;

        let tls_stream =
            match tokio::time::timeout(self.connect_timeout, connector.connect(server_name, tcp_stream))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    error!(name, addr, "handshake error: {}", e);
                    return Err(FeederError::tls_handshake(addr, e));
                }
                Err(_) => {
                    error!(name, addr, "handshake timed out");
                    return Err(FeederError::timeout(self.connect_timeout));
                }
            };

        debug!(name, addr, "endpoint connected");
        Ok(tls_stream)
    }
}

#[async_trait]
impl RemoteConnector for TlsRemoteConnector {
    async fn connect(&self) -> Result<Pin<Box<dyn Transport>>> {
        let stream = self.connect_tls().await?;
        Ok(Box::pin(stream))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_endpoint_is_config_error() {
        let connector = TlsRemoteConnector::new(
            "BEAST",
            "feed.push.plane.watch",
            "2a6e5b1c-9a0f-4e0b-8d7a-1f1c2b3d4e5f",
            TlsOptions::default(),
            Duration::from_secs(1),
        );
        let err = connector.connect_tls().await.err().unwrap();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = TlsRemoteConnector::new(
            "BEAST",
            addr.clone(),
            "2a6e5b1c-9a0f-4e0b-8d7a-1f1c2b3d4e5f",
            TlsOptions::default(),
            Duration::from_secs(2),
        );
        assert_eq!(connector.endpoint(), addr);
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, FeederError::ConnectionFailed { .. }));
    }
}
