use super::dial_tcp;
use crate::error::Result;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, error};

/// 连接本地数据源（明文 TCP）
///
/// 无内部重试，重试由控制器负责
pub async fn connect_local(name: &str, addr: &str, connect_timeout: Duration) -> Result<TcpStream> {
    match dial_tcp(addr, connect_timeout).await {
        Ok(stream) => {
            debug!(name, addr, "endpoint connected");
            Ok(stream)
        }
        Err(e) => {
            error!(name, addr, "error establishing connection: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_local_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"beast").await.unwrap();
        });

        let mut stream = connect_local("BEAST", &addr, Duration::from_secs(2))
            .await
            .unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"beast");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_local_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(connect_local("BEAST", &addr, Duration::from_secs(2))
            .await
            .is_err());
    }
}
