#![allow(dead_code)]
//! Common utilities for integration tests

use async_trait::async_trait;
use pw_feeder::config::TunnelTimings;
use pw_feeder::error::FeederError;
use pw_feeder::{RemoteConnector, Transport};
use rcgen::{date_time_ymd, CertificateParams, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// A syntactically valid feeder API key
pub const API_KEY: &str = "2a6e5b1c-9a0f-4e0b-8d7a-1f1c2b3d4e5f";

/// 28-byte ASCII payload used for round trips
pub const PAYLOAD: &[u8] = b"The quick brown fox jumps...";

/// Find an available port
pub fn get_available_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// An address nobody listens on
pub fn closed_addr() -> String {
    format!("127.0.0.1:{}", get_available_port())
}

/// Engine timings shortened for tests
pub fn fast_timings() -> TunnelTimings {
    TunnelTimings {
        connect_timeout: Duration::from_secs(2),
        read_deadline: Duration::from_millis(200),
        accept_deadline: Duration::from_millis(200),
        error_sleep: Duration::from_millis(100),
        ..TunnelTimings::default()
    }
}

/// Plain TCP stand-in for the TLS connector
pub struct PlainTcpConnector {
    endpoint: String,
    attempts: AtomicUsize,
}

impl PlainTcpConnector {
    pub fn new(endpoint: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.into(),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for PlainTcpConnector {
    async fn connect(&self) -> pw_feeder::Result<Pin<Box<dyn Transport>>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| FeederError::connection_failed(&self.endpoint, e))?;
        Ok(Box::pin(stream))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Copy everything read back to the writer until EOF
pub async fn echo<S: AsyncRead + AsyncWrite + Unpin>(mut socket: S) {
    let mut buf = vec![0u8; 8192];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Create a simple echo server for testing
pub async fn start_echo_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind echo server");
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(echo(socket));
        }
    });

    (addr, handle)
}

/// Server that hands every accepted connection to the test
pub async fn start_capture_server() -> (SocketAddr, mpsc::UnboundedReceiver<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind capture server");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            if tx.send(socket).is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

/// Write `data` and read the same number of bytes back
pub async fn round_trip<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) -> Vec<u8> {
    stream.write_all(data).await.unwrap();
    let mut response = vec![0u8; data.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut response))
        .await
        .expect("Timeout waiting for response")
        .unwrap();
    response
}

/// Generated server certificate and key
pub struct TestCert {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

/// Self-signed certificate for the given names, optionally with a fixed validity window
pub fn generate_cert(names: &[&str], validity: Option<((i32, u8, u8), (i32, u8, u8))>) -> TestCert {
    let mut params =
        CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .expect("Failed to build certificate params");
    if let Some(((y1, m1, d1), (y2, m2, d2))) = validity {
        params.not_before = date_time_ymd(y1, m1, d1);
        params.not_after = date_time_ymd(y2, m2, d2);
    }

    let key_pair = KeyPair::generate().expect("Failed to generate key");
    let cert = params
        .self_signed(&key_pair)
        .expect("Failed to self-sign certificate");

    TestCert {
        cert: cert.der().clone(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    }
}

/// TLS echo server; reports the SNI of every completed handshake
pub async fn start_tls_echo_server(
    cert: TestCert,
) -> (SocketAddr, mpsc::UnboundedReceiver<Option<String>>) {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.cert], cert.key)
        .expect("Failed to build server config");
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind TLS server");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(socket).await {
                    let sni = stream.get_ref().1.server_name().map(str::to_string);
                    let _ = tx.send(sni);
                    echo(stream).await;
                }
            });
        }
    });

    (addr, rx)
}
