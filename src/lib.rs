/// plane.watch feeder 库入口
///
/// 隧道引擎：把本地 BEAST/MLAT 字节流通过以 API Key 为 SNI 的 TLS 连接转发到 plane.watch
pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod feeder;
pub mod pump;
pub mod stats;
pub mod status;
pub mod tls;
pub mod transport;
pub mod tunnel;

// 重新导出常用类型
pub use backoff::Backoff;
pub use config::{ChainTrust, ControllerConfig, FeederConfig, TlsOptions, TunnelTimings};
pub use error::{FeederError, Result};
pub use feeder::{run_feeder, run_feeder_with};
pub use stats::{TrafficCounters, TrafficSnapshot};
pub use transport::{RemoteConnector, TlsRemoteConnector, Transport};
pub use tunnel::{run_inbound, run_outbound};
