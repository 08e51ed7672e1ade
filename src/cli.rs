use crate::config::{ChainTrust, FeederConfig};
use anyhow::{bail, Result};
use clap::Parser;

/// 命令行参数
///
/// 每个参数都可以由环境变量提供；显式给出的值覆盖配置文件中的值
#[derive(Parser, Debug, Default)]
#[command(name = "pw-feeder")]
#[command(
    author,
    version,
    about = "plane.watch feeder: relays BEAST and MLAT data to plane.watch over TLS",
    long_about = None
)]
pub struct Cli {
    /// plane.watch feeder API key (UUID)
    #[arg(long, env = "API_KEY")]
    pub apikey: Option<String>,

    /// BEAST provider host [default: 127.0.0.1]
    #[arg(long, env = "BEASTHOST")]
    pub beasthost: Option<String>,

    /// BEAST provider port [default: 30005]
    #[arg(long, env = "BEASTPORT")]
    pub beastport: Option<u16>,

    /// Listen host for MLAT server connection [default: 127.0.0.1]
    #[arg(long, env = "MLATSERVERHOST")]
    pub mlatserverhost: Option<String>,

    /// Listen port for MLAT server connection [default: 12346]
    #[arg(long, env = "MLATSERVERPORT")]
    pub mlatserverport: Option<u16>,

    /// plane.watch BEAST endpoint [default: feed.push.plane.watch:12345]
    #[arg(long, env = "PW_BEAST_ENDPOINT")]
    pub beastout: Option<String>,

    /// plane.watch MLAT endpoint [default: feed.push.plane.watch:12346]
    #[arg(long, env = "PW_MLAT_ENDPOINT")]
    pub mlatout: Option<String>,

    /// plane.watch ATC API URL [default: http://atc.plane.watch]
    #[arg(long, env = "PW_ATC_URL")]
    pub atcurl: Option<String>,

    /// Disable the MLAT tunnel
    #[arg(long, env = "DISABLE_MLAT")]
    pub disable_mlat: bool,

    /// Skip certificate verification of the plane.watch endpoints
    #[arg(long, env = "INSECURE")]
    pub insecure: bool,

    /// Fail the connection when the certificate chain cannot be verified
    #[arg(long, env = "STRICT_CHAIN")]
    pub strict_chain: bool,

    /// Disable periodic feeder status checks against ATC
    #[arg(long, env = "DISABLE_STATUS")]
    pub disable_status: bool,

    /// Enable debug logging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Optional TOML configuration file
    #[arg(short, long, env = "PW_FEEDER_CONFIG", value_name = "PATH")]
    pub config: Option<String>,
}

impl Cli {
    /// 合并配置文件与命令行参数
    pub fn into_config(self) -> Result<FeederConfig> {
        let base = match &self.config {
            Some(path) => FeederConfig::load(path)?,
            None => FeederConfig::default(),
        };
        self.apply(base)
    }

    /// 用显式给出的参数覆盖 `base`
    pub fn apply(self, mut base: FeederConfig) -> Result<FeederConfig> {
        if let Some(apikey) = self.apikey {
            base.api_key = apikey;
        }
        if let Some(host) = self.beasthost {
            base.beast_host = host;
        }
        if let Some(port) = self.beastport {
            base.beast_port = port;
        }
        if let Some(host) = self.mlatserverhost {
            base.mlat_server_host = host;
        }
        if let Some(port) = self.mlatserverport {
            base.mlat_server_port = port;
        }
        if let Some(endpoint) = self.beastout {
            base.beast_endpoint = endpoint;
        }
        if let Some(endpoint) = self.mlatout {
            base.mlat_endpoint = endpoint;
        }
        if let Some(url) = self.atcurl {
            base.atc_url = url;
        }

        base.disable_mlat |= self.disable_mlat;
        base.disable_status |= self.disable_status;
        base.insecure |= self.insecure;
        base.debug |= self.debug;
        if self.strict_chain {
            base.chain_trust = ChainTrust::Strict;
        }

        if base.api_key.trim().is_empty() {
            bail!("an API key is required (--apikey or API_KEY)");
        }

        Ok(base)
    }
}
