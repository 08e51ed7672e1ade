/// 自定义错误类型
///
/// 使用 thiserror 定义精确的错误类型，控制器据此区分可重试的网络错误与致命的配置错误
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Feeder 的主要错误类型
#[derive(Error, Debug)]
pub enum FeederError {
    /// 连接失败（DNS 解析或 TCP 拨号）
    #[error("Failed to connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 超时错误
    #[error("Operation timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// TLS 握手失败（包括证书校验失败）
    #[error("TLS handshake with {addr} failed: {source}")]
    TlsHandshake {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 本地监听失败
    #[error("Failed to listen on {addr}: {source}")]
    ListenFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 无效的服务器名称 / SNI
    #[error("Invalid server name '{0}'")]
    InvalidServerName(String),

    /// 信任库构建失败
    #[error("Trust store error: {0}")]
    TrustStore(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 状态 API 错误
    #[error("Status API error: {0}")]
    StatusApi(String),

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 其他错误（保留与 anyhow 的兼容性）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, FeederError>;

impl FeederError {
    /// 创建连接失败错误
    pub fn connection_failed(addr: impl Into<String>, source: io::Error) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            source,
        }
    }

    /// 创建 TLS 握手错误
    pub fn tls_handshake(addr: impl Into<String>, source: io::Error) -> Self {
        Self::TlsHandshake {
            addr: addr.into(),
            source,
        }
    }

    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 创建超时错误
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// 检查是否为超时错误
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::InvalidServerName(_))
    }

    /// 是否为启动期致命错误（配置错误或监听失败）
    pub fn is_fatal(&self) -> bool {
        self.is_config_error() || matches!(self, Self::ListenFailed { .. })
    }

    /// 检查是否为 TLS 握手错误
    pub fn is_tls_handshake(&self) -> bool {
        matches!(self, Self::TlsHandshake { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let err = FeederError::timeout(Duration::from_secs(10));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_connection_failed() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = FeederError::connection_failed("127.0.0.1:30005", io_err);
        assert!(err.to_string().contains("Failed to connect"));
        assert!(err.to_string().contains("127.0.0.1:30005"));
    }

    #[test]
    fn test_error_is_checks() {
        let config_err = FeederError::config_error("bad key");
        let tls_err = FeederError::tls_handshake(
            "feed.push.plane.watch:12345",
            io::Error::new(io::ErrorKind::InvalidData, "expired"),
        );
        let timeout_err = FeederError::timeout(Duration::from_secs(1));

        assert!(config_err.is_config_error());
        assert!(!config_err.is_timeout());

        assert!(tls_err.is_tls_handshake());
        assert!(!tls_err.is_config_error());

        assert!(timeout_err.is_timeout());
        assert!(!timeout_err.is_tls_handshake());
    }

    #[test]
    fn test_invalid_server_name_is_config_error() {
        let err = FeederError::InvalidServerName("not a name!".to_string());
        assert!(err.is_config_error());
        assert_eq!(err.to_string(), "Invalid server name 'not a name!'");
    }

    #[test]
    fn test_listen_failed_is_fatal() {
        let err = FeederError::ListenFailed {
            addr: "127.0.0.1:12346".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("127.0.0.1:12346"));
        assert!(!FeederError::timeout(Duration::from_secs(1)).is_fatal());
    }
}
