/// Integration tests for the SNI-authenticated TLS connector and its certificate policy
mod common;

use common::*;
use pw_feeder::config::{ChainTrust, TlsOptions};
use pw_feeder::{RemoteConnector, TlsRemoteConnector};
use std::time::Duration;
use tokio::time::timeout;

fn connector(port: u16, options: TlsOptions) -> TlsRemoteConnector {
    TlsRemoteConnector::new(
        "BEAST",
        format!("localhost:{}", port),
        API_KEY,
        options,
        Duration::from_secs(5),
    )
}

fn lenient() -> TlsOptions {
    TlsOptions::default()
}

#[tokio::test]
async fn test_sni_carries_api_key() {
    let (addr, mut snis) = start_tls_echo_server(generate_cert(&["localhost"], None)).await;

    let mut stream = connector(addr.port(), lenient()).connect().await.unwrap();

    let sni = timeout(Duration::from_secs(5), snis.recv())
        .await
        .expect("server never completed the handshake")
        .unwrap();
    assert_eq!(sni.as_deref(), Some(API_KEY));

    // 握手后的连接是透明字节流
    assert_eq!(round_trip(&mut stream, PAYLOAD).await, PAYLOAD);
}

#[tokio::test]
async fn test_wrong_hostname_fails() {
    let (addr, _snis) = start_tls_echo_server(generate_cert(&["evil.example.com"], None)).await;

    let err = connector(addr.port(), lenient())
        .connect()
        .await
        .err()
        .expect("certificate for another host must be rejected");
    assert!(err.is_tls_handshake());
}

#[tokio::test]
async fn test_expired_certificate_fails() {
    let (addr, _snis) = start_tls_echo_server(generate_cert(
        &["localhost"],
        Some(((2000, 1, 1), (2001, 1, 1))),
    ))
    .await;

    let err = connector(addr.port(), lenient())
        .connect()
        .await
        .err()
        .expect("expired certificate must be rejected");
    assert!(err.is_tls_handshake());
}

#[tokio::test]
async fn test_not_yet_valid_certificate_fails() {
    let (addr, _snis) = start_tls_echo_server(generate_cert(
        &["localhost"],
        Some(((2999, 1, 1), (3000, 1, 1))),
    ))
    .await;

    assert!(connector(addr.port(), lenient()).connect().await.is_err());
}

#[tokio::test]
async fn test_strict_chain_rejects_untrusted_issuer() {
    let (addr, _snis) = start_tls_echo_server(generate_cert(&["localhost"], None)).await;
    let options = TlsOptions {
        insecure: false,
        chain_trust: ChainTrust::Strict,
    };

    let err = connector(addr.port(), options)
        .connect()
        .await
        .err()
        .expect("self-signed certificate must fail strict chain verification");
    assert!(err.is_tls_handshake());
}

#[tokio::test]
async fn test_insecure_skips_certificate_checks() {
    let (addr, mut snis) = start_tls_echo_server(generate_cert(
        &["evil.example.com"],
        Some(((2000, 1, 1), (2001, 1, 1))),
    ))
    .await;
    let options = TlsOptions {
        insecure: true,
        chain_trust: ChainTrust::Strict,
    };

    let mut stream = connector(addr.port(), options).connect().await.unwrap();
    assert_eq!(snis.recv().await.unwrap().as_deref(), Some(API_KEY));
    assert_eq!(round_trip(&mut stream, b"insecure").await, b"insecure");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() {
    let connector = TlsRemoteConnector::new(
        "MLAT",
        closed_addr(),
        API_KEY,
        lenient(),
        Duration::from_secs(2),
    );

    let err = connector.connect().await.err().unwrap();
    assert!(!err.is_tls_handshake());
    assert!(!err.is_fatal());
}
