// feeder 配置：命令行、环境变量与 TOML 文件共用的配置模型

mod validator;

pub use validator::ConfigValidator;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认 BEAST 数据源地址
pub const DEFAULT_BEAST_HOST: &str = "127.0.0.1";
/// 默认 BEAST 数据源端口
pub const DEFAULT_BEAST_PORT: u16 = 30005;
/// 默认 MLAT 监听地址
pub const DEFAULT_MLAT_SERVER_HOST: &str = "127.0.0.1";
/// 默认 MLAT 监听端口
pub const DEFAULT_MLAT_SERVER_PORT: u16 = 12346;
/// plane.watch BEAST 接入端点
pub const DEFAULT_BEAST_ENDPOINT: &str = "feed.push.plane.watch:12345";
/// plane.watch MLAT 接入端点
pub const DEFAULT_MLAT_ENDPOINT: &str = "feed.push.plane.watch:12346";
/// atc.plane.watch API 基础地址
pub const DEFAULT_ATC_URL: &str = "http://atc.plane.watch";
/// 状态轮询间隔（秒）
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 300;

/// 证书链校验策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChainTrust {
    /// 链校验失败只记录警告，主机名与有效期仍强制校验
    #[default]
    Lenient,
    /// 链校验失败即拒绝连接
    Strict,
}

impl std::fmt::Display for ChainTrust {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainTrust::Lenient => write!(f, "lenient"),
            ChainTrust::Strict => write!(f, "strict"),
        }
    }
}

/// 远端 TLS 连接选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsOptions {
    /// 跳过证书校验（仍然完成 TLS 握手）
    pub insecure: bool,
    /// 证书链校验策略
    pub chain_trust: ChainTrust,
}

/// 隧道引擎的时间参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelTimings {
    /// 本地/远端拨号超时
    pub connect_timeout: Duration,
    /// 单次读取的期限，超时后检查取消信号
    pub read_deadline: Duration,
    /// 监听器 accept 的期限
    pub accept_deadline: Duration,
    /// 连接失败后的等待时间
    pub error_sleep: Duration,
    /// 流量统计输出间隔
    pub stats_interval: Duration,
    /// 退避计数的重置窗口
    pub backoff_reset_after: Duration,
    /// 退避上限
    pub backoff_cap: Duration,
}

impl Default for TunnelTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_deadline: Duration::from_secs(1),
            accept_deadline: Duration::from_secs(1),
            error_sleep: Duration::from_secs(10),
            stats_interval: Duration::from_secs(300),
            backoff_reset_after: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// 单个隧道控制器的不可变配置
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// 协议名称（仅用于日志）
    pub proto: String,
    /// 本地地址：BEAST 模式下为数据源，MLAT 模式下为监听地址
    pub local_addr: String,
    /// 远端 host:port
    pub remote_endpoint: String,
    /// Feeder API Key，作为 SNI 发送
    pub api_key: String,
    /// TLS 选项
    pub tls: TlsOptions,
    /// 时间参数
    pub timings: TunnelTimings,
}

/// Feeder 完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederConfig {
    /// plane.watch 用户 API Key（UUID）
    #[serde(default)]
    pub api_key: String,
    /// BEAST 数据源主机
    #[serde(default = "default_beast_host")]
    pub beast_host: String,
    /// BEAST 数据源端口
    #[serde(default = "default_beast_port")]
    pub beast_port: u16,
    /// MLAT 监听主机
    #[serde(default = "default_mlat_server_host")]
    pub mlat_server_host: String,
    /// MLAT 监听端口
    #[serde(default = "default_mlat_server_port")]
    pub mlat_server_port: u16,
    /// BEAST 远端端点
    #[serde(default = "default_beast_endpoint")]
    pub beast_endpoint: String,
    /// MLAT 远端端点
    #[serde(default = "default_mlat_endpoint")]
    pub mlat_endpoint: String,
    /// atc.plane.watch 基础地址
    #[serde(default = "default_atc_url")]
    pub atc_url: String,
    /// 状态轮询间隔（秒）
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    /// 禁用 MLAT 隧道
    #[serde(default)]
    pub disable_mlat: bool,
    /// 禁用状态轮询
    #[serde(default)]
    pub disable_status: bool,
    /// 跳过证书校验（仅用于测试）
    #[serde(default)]
    pub insecure: bool,
    /// 证书链校验策略
    #[serde(default)]
    pub chain_trust: ChainTrust,
    /// 调试日志
    #[serde(default)]
    pub debug: bool,
    /// 引擎时间参数（不从文件读取）
    #[serde(skip)]
    pub timings: TunnelTimings,
}

fn default_beast_host() -> String {
    DEFAULT_BEAST_HOST.to_string()
}

fn default_beast_port() -> u16 {
    DEFAULT_BEAST_PORT
}

fn default_mlat_server_host() -> String {
    DEFAULT_MLAT_SERVER_HOST.to_string()
}

fn default_mlat_server_port() -> u16 {
    DEFAULT_MLAT_SERVER_PORT
}

fn default_beast_endpoint() -> String {
    DEFAULT_BEAST_ENDPOINT.to_string()
}

fn default_mlat_endpoint() -> String {
    DEFAULT_MLAT_ENDPOINT.to_string()
}

fn default_atc_url() -> String {
    DEFAULT_ATC_URL.to_string()
}

fn default_status_interval_secs() -> u64 {
    DEFAULT_STATUS_INTERVAL_SECS
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            beast_host: default_beast_host(),
            beast_port: DEFAULT_BEAST_PORT,
            mlat_server_host: default_mlat_server_host(),
            mlat_server_port: DEFAULT_MLAT_SERVER_PORT,
            beast_endpoint: default_beast_endpoint(),
            mlat_endpoint: default_mlat_endpoint(),
            atc_url: default_atc_url(),
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
            disable_mlat: false,
            disable_status: false,
            insecure: false,
            chain_trust: ChainTrust::default(),
            debug: false,
            timings: TunnelTimings::default(),
        }
    }
}

impl FeederConfig {
    /// 从 TOML 文件加载配置（支持 `~` 展开）
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::tilde(path);
        let content = std::fs::read_to_string(expanded.as_ref())
            .with_context(|| format!("Failed to read configuration file: {}", expanded))?;
        let config: FeederConfig =
            toml::from_str(&content).context("Failed to parse feeder configuration")?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_feeder_config(self)
    }

    /// BEAST 数据源地址
    pub fn beast_source_addr(&self) -> String {
        format!("{}:{}", self.beast_host, self.beast_port)
    }

    /// MLAT 监听地址
    pub fn mlat_listen_addr(&self) -> String {
        format!("{}:{}", self.mlat_server_host, self.mlat_server_port)
    }

    /// 远端 TLS 选项
    pub fn tls_options(&self) -> TlsOptions {
        TlsOptions {
            insecure: self.insecure,
            chain_trust: self.chain_trust,
        }
    }

    /// BEAST 出站控制器配置
    pub fn beast_controller(&self) -> ControllerConfig {
        ControllerConfig {
            proto: "BEAST".to_string(),
            local_addr: self.beast_source_addr(),
            remote_endpoint: self.beast_endpoint.clone(),
            api_key: self.api_key.clone(),
            tls: self.tls_options(),
            timings: self.timings,
        }
    }

    /// MLAT 入站控制器配置
    pub fn mlat_controller(&self) -> ControllerConfig {
        ControllerConfig {
            proto: "MLAT".to_string(),
            local_addr: self.mlat_listen_addr(),
            remote_endpoint: self.mlat_endpoint.clone(),
            api_key: self.api_key.clone(),
            tls: self.tls_options(),
            timings: self.timings,
        }
    }

    /// 状态轮询间隔
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}
