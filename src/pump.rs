use crate::error::{FeederError, Result};
use crate::stats::TrafficCounters;
use crate::transport::Transport;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// 单次读取的缓冲区大小
const PUMP_BUFFER_SIZE: usize = 256 * 1024;

/// 字节泵方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 本地 -> 远端
    LocalToRemote,
    /// 远端 -> 本地
    RemoteToLocal,
}

impl Direction {
    /// 把 n 字节计入对应的一对计数器
    fn account(self, counters: &TrafficCounters, n: u64) {
        match self {
            Direction::LocalToRemote => counters.increment(n, 0, 0, n),
            Direction::RemoteToLocal => counters.increment(0, n, n, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LocalToRemote => write!(f, "local->remote"),
            Direction::RemoteToLocal => write!(f, "remote->local"),
        }
    }
}

/// 字节泵退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// 会话被取消
    Cancelled,
    /// 源端正常关闭（读到 EOF）
    SourceClosed,
    /// 读错误
    ReadError,
    /// 写错误
    WriteError,
}

/// 对端已关闭类错误，在协同拆除时属于预期情况
fn is_closed_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// 单向搬运字节，直到取消、EOF 或 I/O 错误
///
/// 每次读取都带有 `read_deadline`，超时只是一次空转，用来检查取消信号；
/// 写入阻塞时直接响应取消。返回源和目标，由调用方负责关闭。
pub async fn run_pump<R, W>(
    mut src: R,
    mut dst: W,
    direction: Direction,
    counters: TrafficCounters,
    read_deadline: Duration,
    cancel: CancellationToken,
) -> (R, W, PumpExit)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];

    let exit = loop {
        if cancel.is_cancelled() {
            break PumpExit::Cancelled;
        }

        let n = match tokio::time::timeout(read_deadline, src.read(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!(%direction, "source closed");
                break PumpExit::SourceClosed;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                if is_closed_error(&e) {
                    debug!(%direction, "read on closed connection: {}", e);
                } else {
                    warn!(%direction, "read error: {}", e);
                }
                break PumpExit::ReadError;
            }
        };

        // 对端不再读取时写入会一直阻塞，必须同时等待取消信号
        let write_result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%direction, "cancelled while writing");
                break PumpExit::Cancelled;
            }
            result = async {
                dst.write_all(&buf[..n]).await?;
                dst.flush().await
            } => result,
        };

        if let Err(e) = write_result {
            if is_closed_error(&e) {
                debug!(%direction, "write on closed connection: {}", e);
            } else {
                warn!(%direction, "write error: {}", e);
            }
            break PumpExit::WriteError;
        }

        direction.account(&counters, n as u64);
    };

    (src, dst, exit)
}

/// 在本地与远端之间双向搬运字节
///
/// 两个方向各占一个任务；任一方向退出后取消 `session`，另一方向在一个读超时内停止。
/// 返回重新合并的两端连接。
pub async fn pipe<L, R>(
    local: L,
    remote: R,
    counters: &TrafficCounters,
    read_deadline: Duration,
    session: CancellationToken,
) -> Result<(L, R)>
where
    L: Transport,
    R: Transport,
{
    let (local_rd, local_wr) = tokio::io::split(local);
    let (remote_rd, remote_wr) = tokio::io::split(remote);

    let upstream = tokio::spawn(
        run_pump(
            local_rd,
            remote_wr,
            Direction::LocalToRemote,
            counters.clone(),
            read_deadline,
            session.clone(),
        )
        .in_current_span(),
    );
    let downstream = tokio::spawn(
        run_pump(
            remote_rd,
            local_wr,
            Direction::RemoteToLocal,
            counters.clone(),
            read_deadline,
            session.clone(),
        )
        .in_current_span(),
    );

    let upstream = async {
        let result = upstream.await;
        session.cancel();
        result
    };
    let downstream = async {
        let result = downstream.await;
        session.cancel();
        result
    };
    let (upstream, downstream) = tokio::join!(upstream, downstream);

    let (local_rd, remote_wr, up_exit) = upstream.map_err(join_error)?;
    let (remote_rd, local_wr, down_exit) = downstream.map_err(join_error)?;
    debug!(?up_exit, ?down_exit, "pumps stopped");

    Ok((rejoin(local_rd, local_wr), rejoin(remote_rd, remote_wr)))
}

fn rejoin<T: Transport>(rd: ReadHalf<T>, wr: WriteHalf<T>) -> T {
    rd.unsplit(wr)
}

fn join_error(e: tokio::task::JoinError) -> FeederError {
    FeederError::Other(anyhow::anyhow!("pump task failed: {}", e))
}
