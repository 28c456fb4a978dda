use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, trace};

use crate::uri::Uri;

/// Conduit 生命周期状态。
///
/// 本层只会产出 `Active`（`dial` 建立）与 `Passive`（`accept` 接受）两种状态；
/// `Open`、`Closed`、`Error` 由上层协议协商或显式关闭驱动。`Undefined` 不会出现在
/// 机制返回的 Conduit 上。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConduitState {
    #[default]
    Undefined,
    Active,
    Passive,
    Open,
    Closed,
    Error,
}

/// 由安全机制填写的安全元数据；纯传输建立的 Conduit 保持默认值。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityInfo {
    /// 安全层认证得到的主体名。
    pub principal: String,
    /// 加密强度估计值。
    pub strength: u32,
    pub encrypted: bool,
    pub integrity: bool,
}

/// Conduit 独占持有的双向字节流。
pub trait Link: AsyncRead + AsyncWrite + Send + Sync + Unpin + fmt::Debug {}

impl<T> Link for T where T: AsyncRead + AsyncWrite + Send + Sync + Unpin + fmt::Debug {}

/// 一条已建立或待协商的连接。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - Conduit 只能由机制的 `dial`/`accept` 创建，独占其 [`Link`]；
/// - [`Conduit::close`] 关闭底层链路恰好一次：首次调用执行关闭并进入 `Closed`，
///   之后的调用直接返回 `Ok(())`；
/// - Conduit 实现 [`AsyncRead`]/[`AsyncWrite`]，读写委托给底层链路；关闭后返回
///   `NotConnected`。
///
/// ## 注意事项（Trade-offs）
/// - 协商相关字段（协议版本、RTT、对端描述、安全元数据）对上层公开可写，本层不解释其含义。
pub struct Conduit {
    state: ConduitState,
    error: Option<Box<dyn StdError + Send + Sync + 'static>>,
    local_uri: Uri,
    remote_uri: Uri,
    link: Option<Box<dyn Link>>,

    /// 支持的最低协议版本。
    pub min_proto: u32,
    /// 支持的最高协议版本。
    pub max_proto: u32,
    /// 协商选定的协议版本。
    pub proto: u32,
    /// 往返时延估计。
    pub rtt: Duration,
    /// 往返时延偏差估计。
    pub deviation: Duration,
    /// 对端或客户端的不透明描述。
    pub peer: Option<Box<dyn Any + Send + Sync>>,
    pub security: SecurityInfo,
}

impl Conduit {
    /// 构造主动建立（出站）的 Conduit。
    pub fn active(local_uri: Uri, remote_uri: Uri, link: impl Link + 'static) -> Self {
        Self::with_state(ConduitState::Active, local_uri, remote_uri, Box::new(link))
    }

    /// 构造被动接受（入站）的 Conduit。
    pub fn passive(local_uri: Uri, remote_uri: Uri, link: impl Link + 'static) -> Self {
        Self::with_state(ConduitState::Passive, local_uri, remote_uri, Box::new(link))
    }

    fn with_state(
        state: ConduitState,
        local_uri: Uri,
        remote_uri: Uri,
        link: Box<dyn Link>,
    ) -> Self {
        Self {
            state,
            error: None,
            local_uri,
            remote_uri,
            link: Some(link),
            min_proto: 0,
            max_proto: 0,
            proto: 0,
            rtt: Duration::ZERO,
            deviation: Duration::ZERO,
            peer: None,
            security: SecurityInfo::default(),
        }
    }

    pub fn state(&self) -> ConduitState {
        self.state
    }

    /// 供上层协议推进状态（例如协商完成后进入 `Open`）。
    pub fn set_state(&mut self, state: ConduitState) {
        self.state = state;
    }

    /// 仅在 `Error` 状态下存在的故障原因。
    pub fn error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.error.as_deref()
    }

    /// 将 Conduit 标记为 `Error` 并记录原因。
    pub fn fail(&mut self, cause: impl Into<Box<dyn StdError + Send + Sync + 'static>>) {
        self.state = ConduitState::Error;
        self.error = Some(cause.into());
    }

    pub fn local_uri(&self) -> &Uri {
        &self.local_uri
    }

    pub fn remote_uri(&self) -> &Uri {
        &self.remote_uri
    }

    /// 借用底层链路；关闭后返回 `None`。
    pub fn link_mut(&mut self) -> Option<&mut (dyn Link + 'static)> {
        self.link.as_deref_mut()
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_none()
    }

    /// 关闭底层链路并进入 `Closed` 状态。
    pub async fn close(&mut self) -> io::Result<()> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        if self.state != ConduitState::Error {
            self.state = ConduitState::Closed;
        }
        trace!(remote = %self.remote_uri, local = %self.local_uri, "closing conduit link");
        let result = tokio::io::AsyncWriteExt::shutdown(&mut link).await;
        drop(link);
        match result {
            // 对端已先行断开时，关闭视为完成。
            Err(err) if err.kind() == io::ErrorKind::NotConnected => {
                debug!(remote = %self.remote_uri, error = %err, "peer already disconnected");
                Ok(())
            }
            other => other,
        }
    }

    fn link_pin(&mut self) -> io::Result<Pin<&mut (dyn Link + 'static)>> {
        match self.link.as_deref_mut() {
            Some(link) => Ok(Pin::new(link)),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "conduit is closed",
            )),
        }
    }
}

impl fmt::Debug for Conduit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conduit")
            .field("state", &self.state)
            .field("local_uri", &self.local_uri.to_string())
            .field("remote_uri", &self.remote_uri.to_string())
            .field("closed", &self.link.is_none())
            .field("proto", &self.proto)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Conduit {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().link_pin() {
            Ok(link) => link.poll_read(cx, buf),
            Err(err) => Poll::Ready(Err(err)),
        }
    }
}

impl AsyncWrite for Conduit {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().link_pin() {
            Ok(link) => link.poll_write(cx, buf),
            Err(err) => Poll::Ready(Err(err)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().link_pin() {
            Ok(link) => link.poll_flush(cx),
            Err(err) => Poll::Ready(Err(err)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().link_pin() {
            Ok(link) => link.poll_shutdown(cx),
            Err(err) => Poll::Ready(Err(err)),
        }
    }
}
