//! 远端 TLS 配置：信任库构建与自定义证书校验
//!
//! SNI 字段携带 feeder 的 API Key，因此 rustls 收到的 `server_name`
//! 不能用于证书校验；校验改由 [`FeederCertVerifier`] 针对远端主机名完成。

use crate::config::{ChainTrust, TlsOptions};
use crate::error::{FeederError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};
use x509_parser::prelude::*;

/// 随程序发布的 CA 证书（Let's Encrypt 根证书）
///
/// 旧系统的信任库可能缺少新轮换的证书，这些证书会并入系统信任库
pub const EMBEDDED_CA_CERTS: &[(&str, &[u8])] = &[
    ("isrgrootx1.pem", include_bytes!("../certs/isrgrootx1.pem")),
    ("isrg-root-x2.pem", include_bytes!("../certs/isrg-root-x2.pem")),
];

/// 校验远端证书所用的信任库（系统根证书 + 内置证书）
///
/// 构建后不可变，每次连接尝试都重新构建
#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: Arc<RootCertStore>,
}

impl TrustStore {
    /// 系统根证书并入内置证书
    pub fn build() -> Result<Self> {
        let mut roots = RootCertStore::empty();

        let native = load_native_certs(&mut roots);
        let embedded = load_embedded_certs(&mut roots)?;
        debug!(native, embedded, "trust store built");

        Ok(Self {
            roots: Arc::new(roots),
        })
    }

    /// 信任锚数量
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }
}

fn load_native_certs(roots: &mut RootCertStore) -> usize {
    let result = rustls_native_certs::load_native_certs();
    for e in &result.errors {
        debug!("could not load system certificate: {}", e);
    }
    let (added, ignored) = roots.add_parsable_certificates(result.certs);
    if ignored > 0 {
        debug!(ignored, "ignored unparsable system certificates");
    }
    added
}

/// 解析内置证书表，每个条目可包含多个 PEM 块
fn load_embedded_certs(roots: &mut RootCertStore) -> Result<usize> {
    let mut count = 0;
    for (name, pem) in EMBEDDED_CA_CERTS {
        let mut reader: &[u8] = pem;
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| {
                FeederError::TrustStore(format!("Failed to parse embedded certificate {}: {}", name, e))
            })?;
            roots.add(cert).map_err(|e| {
                FeederError::TrustStore(format!("Failed to add embedded certificate {}: {}", name, e))
            })?;
            count += 1;
        }
    }
    Ok(count)
}

/// 构建远端连接使用的 rustls 客户端配置
pub fn build_client_config(
    remote_host: &str,
    options: TlsOptions,
    trust: &TrustStore,
) -> Result<Arc<rustls::ClientConfig>> {
    let verifier = FeederCertVerifier::new(remote_host, options, trust)?;

    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// 自定义证书校验器
///
/// 对服务器发送的每个非 CA 证书：
/// 1. 主机名必须匹配远端主机（强制）
/// 2. 使用信任库做完整链校验（按 [`ChainTrust`] 决定失败是否致命）
/// 3. 有效期必须覆盖当前时间（强制）
#[derive(Debug)]
pub struct FeederCertVerifier {
    remote_host: String,
    remote_name: ServerName<'static>,
    chain: Arc<WebPkiServerVerifier>,
    chain_trust: ChainTrust,
    insecure: bool,
}

impl FeederCertVerifier {
    pub fn new(remote_host: &str, options: TlsOptions, trust: &TrustStore) -> Result<Self> {
        let remote_name = ServerName::try_from(remote_host.to_string())
            .map_err(|_| FeederError::InvalidServerName(remote_host.to_string()))?;

        let chain = WebPkiServerVerifier::builder(trust.roots())
            .build()
            .map_err(|e| FeederError::TrustStore(format!("Failed to build chain verifier: {}", e)))?;

        Ok(Self {
            remote_host: remote_host.to_string(),
            remote_name,
            chain,
            chain_trust: options.chain_trust,
            insecure: options.insecure,
        })
    }

    fn check_chain(
        &self,
        cert: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<(), rustls::Error> {
        match self
            .chain
            .verify_server_cert(cert, intermediates, &self.remote_name, ocsp_response, now)
        {
            Ok(_) => Ok(()),
            Err(e) => match self.chain_trust {
                ChainTrust::Lenient => {
                    warn!(host = %self.remote_host, "could not verify server cert chain: {}", e);
                    Ok(())
                }
                ChainTrust::Strict => {
                    error!(host = %self.remote_host, "could not verify server cert chain: {}", e);
                    Err(e)
                }
            },
        }
    }
}

impl ServerCertVerifier for FeederCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.insecure {
            warn!(host = %self.remote_host, "insecure mode, skipping server certificate verification");
            return Ok(ServerCertVerified::assertion());
        }

        for der in std::iter::once(end_entity).chain(intermediates.iter()) {
            let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|e| {
                error!("could not parse server cert: {}", e);
                rustls::Error::InvalidCertificate(CertificateError::BadEncoding)
            })?;

            if cert.is_ca() {
                continue;
            }

            if !matches_hostname(&cert, &self.remote_host) {
                error!(host = %self.remote_host, "could not verify server cert hostname");
                return Err(rustls::Error::InvalidCertificate(
                    CertificateError::NotValidForName,
                ));
            }

            self.check_chain(der, intermediates, ocsp_response, now)?;

            check_validity(&cert, now)?;
        }

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.chain.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.chain.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.chain.supported_verify_schemes()
    }
}

/// 证书有效期检查
fn check_validity(
    cert: &X509Certificate<'_>,
    now: UnixTime,
) -> std::result::Result<(), rustls::Error> {
    let now = now.as_secs() as i64;
    let validity = cert.validity();

    if now < validity.not_before.timestamp() {
        error!(not_before = %validity.not_before, "current time is before cert notbefore");
        return Err(rustls::Error::InvalidCertificate(CertificateError::NotValidYet));
    }
    if now > validity.not_after.timestamp() {
        error!(not_after = %validity.not_after, "current time is after cert notafter");
        return Err(rustls::Error::InvalidCertificate(CertificateError::Expired));
    }
    Ok(())
}

/// 证书 SAN 是否覆盖主机名（IP 地址匹配 IP SAN，域名支持最左侧通配符）
pub fn matches_hostname(cert: &X509Certificate<'_>, host: &str) -> bool {
    let san = cert
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => Some(san),
            _ => None,
        });

    let Some(san) = san else {
        return false;
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        return san.general_names.iter().any(|name| match name {
            GeneralName::IPAddress(bytes) => match ip {
                IpAddr::V4(v4) => *bytes == v4.octets().as_slice(),
                IpAddr::V6(v6) => *bytes == v6.octets().as_slice(),
            },
            _ => false,
        });
    }

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    san.general_names.iter().any(|name| match name {
        GeneralName::DNSName(pattern) => dns_name_matches(pattern, &host),
        _ => false,
    })
}

fn dns_name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix("*.") {
        // 通配符只匹配一个标签
        return match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        };
    }

    pattern == host
}
