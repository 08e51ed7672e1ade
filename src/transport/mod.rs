mod local;
mod tls;

pub use local::connect_local;
pub use tls::TlsRemoteConnector;

use crate::error::{FeederError, Result};
use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::warn;

/// TCP keepalive 首次探测时间
const KEEPALIVE_TIME: Duration = Duration::from_secs(30);
/// TCP keepalive 探测间隔
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// 传输层连接抽象
///
/// 引擎只把两端当作不透明的双工字节流
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

// 为所有满足条件的类型自动实现 Transport
impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// 远端连接器接口
///
/// 生产环境由 [`TlsRemoteConnector`] 实现，测试中可替换为明文 TCP 连接器
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// 连接到远端并返回已完成握手的连接
    async fn connect(&self) -> Result<Pin<Box<dyn Transport>>>;

    /// 远端 host:port（用于日志）
    fn endpoint(&self) -> &str;
}

/// 拆分 `host:port`，支持 `[v6]:port` 形式
pub fn split_host_port(endpoint: &str) -> Option<(&str, u16)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || (host.contains(':') && !endpoint.starts_with('[')) {
        return None;
    }
    Some((host, port))
}

/// 带超时的 TCP 拨号，并启用 keepalive
pub(crate) async fn dial_tcp(addr: &str, connect_timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| FeederError::timeout(connect_timeout))?
        .map_err(|e| FeederError::connection_failed(addr, e))?;

    apply_keepalive(&stream);
    Ok(stream)
}

pub(crate) fn apply_keepalive(stream: &TcpStream) {
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);

    let sock_ref = SockRef::from(stream);
    if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
        warn!(
            "Failed to set TCP keepalive on {}: {}",
            stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".into()),
            e
        );
    }
}
