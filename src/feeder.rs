use crate::config::FeederConfig;
use crate::error::{FeederError, Result};
use crate::status::StatusPoller;
use crate::transport::{RemoteConnector, TlsRemoteConnector};
use crate::tunnel::{run_inbound, run_outbound};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 运行 feeder：BEAST 出站、MLAT 入站与状态轮询，直到 `cancel` 触发
///
/// 配置错误与 MLAT 监听失败会直接返回错误；网络错误只在各控制器内部重试。
pub async fn run_feeder(config: FeederConfig, cancel: CancellationToken) -> Result<()> {
    let beast: Arc<dyn RemoteConnector> =
        Arc::new(TlsRemoteConnector::from_config(&config.beast_controller()));
    let mlat: Arc<dyn RemoteConnector> =
        Arc::new(TlsRemoteConnector::from_config(&config.mlat_controller()));

    run_feeder_with(config, beast, mlat, cancel).await
}

/// 使用给定的远端连接器运行 feeder
pub async fn run_feeder_with(
    config: FeederConfig,
    beast_connector: Arc<dyn RemoteConnector>,
    mlat_connector: Arc<dyn RemoteConnector>,
    cancel: CancellationToken,
) -> Result<()> {
    config
        .validate()
        .map_err(|e| FeederError::config_error(format!("{:#}", e)))?;

    // MLAT 监听器在启动时绑定，失败即退出
    let mlat_listener = if config.disable_mlat {
        info!("MLAT tunnel disabled");
        None
    } else {
        let addr = config.mlat_listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| FeederError::ListenFailed {
                addr: addr.clone(),
                source,
            })?;
        Some(listener)
    };

    let poller = if config.disable_status {
        info!("feeder status polling disabled");
        None
    } else {
        Some(StatusPoller::new(
            &config.atc_url,
            &config.api_key,
            config.status_interval(),
        )?)
    };

    if config.tls_options().insecure {
        info!("certificate verification of the plane.watch endpoints is disabled");
    }

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(run_outbound(
        config.beast_controller(),
        beast_connector,
        cancel.clone(),
    )));

    if let Some(listener) = mlat_listener {
        tasks.push(tokio::spawn(run_inbound(
            config.mlat_controller(),
            listener,
            mlat_connector,
            cancel.clone(),
        )));
    }

    if let Some(poller) = poller {
        tasks.push(tokio::spawn(poller.run(cancel.clone())));
    }

    cancel.cancelled().await;
    info!("shutting down");

    for task in tasks {
        if let Err(e) = task.await {
            error!("task failed during shutdown: {}", e);
        }
    }

    info!("plane.watch feeder stopped");
    Ok(())
}
