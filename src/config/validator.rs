use anyhow::{bail, Context, Result};
use uuid::Uuid;

use super::FeederConfig;
use crate::transport::split_host_port;

/// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
const HYPHENATED_UUID_LEN: usize = 36;

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证 API Key：必须是连字符格式的 UUID，且不能是文档中的占位值
    ///
    /// API Key 原样作为 SNI 发送，带花括号、`urn:uuid:` 前缀或空白的写法都会被拒绝。
    pub fn validate_api_key(api_key: &str) -> Result<Uuid> {
        if api_key.len() != HYPHENATED_UUID_LEN {
            bail!(
                "The API Key provided isn't a valid UUID in the form xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx, please check the arguments or environment file and try again"
            );
        }

        let key = Uuid::parse_str(api_key).map_err(|_| {
            anyhow::anyhow!(
                "The API Key provided isn't a valid UUID, please check the arguments or environment file and try again"
            )
        })?;

        if key.is_nil() {
            bail!(
                "The API Key provided is the default API key in the documentation, please update the arguments or environment file and try again"
            );
        }

        Ok(key)
    }

    /// 验证地址不为空
    pub fn validate_address(addr: &str, context: &str) -> Result<()> {
        if addr.trim().is_empty() {
            bail!("{}: address cannot be empty", context);
        }
        Ok(())
    }

    /// 验证端口号
    pub fn validate_port(port: u16, context: &str) -> Result<()> {
        if port == 0 {
            bail!("{}: port cannot be 0", context);
        }
        Ok(())
    }

    /// 验证 host:port 形式的端点
    pub fn validate_endpoint(endpoint: &str, context: &str) -> Result<()> {
        let (host, port) = split_host_port(endpoint)
            .with_context(|| format!("{}: '{}' is not in host:port form", context, endpoint))?;
        Self::validate_address(host, context)?;
        Self::validate_port(port, context)
    }

    /// 验证状态 API 地址
    pub fn validate_atc_url(atc_url: &str) -> Result<()> {
        let url = url::Url::parse(atc_url)
            .with_context(|| format!("atc url '{}' is not a valid URL", atc_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            bail!("atc url '{}' must use http or https", atc_url);
        }
        Ok(())
    }

    /// 验证 feeder 配置
    pub fn validate_feeder_config(config: &FeederConfig) -> Result<()> {
        Self::validate_api_key(&config.api_key)?;

        Self::validate_address(&config.beast_host, "beasthost")?;
        Self::validate_port(config.beast_port, "beastport")?;
        Self::validate_endpoint(&config.beast_endpoint, "beastout")?;

        if !config.disable_mlat {
            Self::validate_address(&config.mlat_server_host, "mlatserverhost")?;
            Self::validate_endpoint(&config.mlat_endpoint, "mlatout")?;
        }

        if !config.disable_status {
            Self::validate_atc_url(&config.atc_url)?;
            // 轮询间隔会叠加 -60..+60 秒的随机偏移
            if config.status_interval_secs < 60 {
                bail!(
                    "status interval must be at least 60 seconds (current: {})",
                    config.status_interval_secs
                );
            }
        }

        Ok(())
    }
}
