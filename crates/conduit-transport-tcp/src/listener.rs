use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use conduit_core::{Conduit, ConduitError, Listener, Uri, async_trait};
use socket2::SockRef;
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::mechanism::apply_keep_alive;
use crate::tcp_addr_to_uri;

/// 对 Tokio `TcpListener` 的语义封装。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以 [`Listener`] 契约暴露“接受连接 → 产出 Passive Conduit”的能力；
/// - `close` 必须能唤醒挂起中的 `accept`，因此关闭信号与原生监听器分开持有。
///
/// ## 逻辑 (How)
/// - 原生监听器放在 `Arc` 中：`accept` 克隆一份后释放锁再等待，`close` 取走监听器并通过
///   `watch` 通道广播关闭信号；挂起的 `accept` 观测到信号后返回，最后一份 `Arc` 随之释放，
///   套接字真正关闭；
/// - 被接受的连接继承监听配置中的 keep-alive 与 `[transport.tcp]` 的 `nodelay`。
///
/// ## 契约 (What)
/// - `accept` 返回的 Conduit：`local_uri` 为监听器 URI，`remote_uri` 由对端地址推导；
/// - `close` 幂等；关闭后 `accept` 返回 [`ConduitError::ListenerClosed`]；
/// - `addr` 返回实际绑定地址。
#[derive(Debug)]
pub struct TcpListener {
    native: Mutex<Option<Arc<TokioTcpListener>>>,
    closed: watch::Sender<bool>,
    uri: Uri,
    keep_alive: Option<Duration>,
    nodelay: bool,
}

impl TcpListener {
    pub(crate) fn new(
        native: TokioTcpListener,
        uri: Uri,
        keep_alive: Option<Duration>,
        nodelay: bool,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            native: Mutex::new(Some(Arc::new(native))),
            closed,
            uri,
            keep_alive,
            nodelay,
        }
    }

    fn closed_error(&self) -> ConduitError {
        ConduitError::ListenerClosed {
            uri: self.uri.to_string(),
        }
    }
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> Result<Conduit, ConduitError> {
        let native = self
            .native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| self.closed_error())?;
        let mut closed = self.closed.subscribe();

        let (stream, peer) = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => return Err(self.closed_error()),
            result = native.accept() => result?,
        };
        drop(native);

        if let Some(period) = self.keep_alive {
            apply_keep_alive(&SockRef::from(&stream), period)?;
        }
        stream.set_nodelay(self.nodelay)?;

        let remote = tcp_addr_to_uri(peer);
        trace!(local = %self.uri, remote = %remote, "tcp connection accepted");
        Ok(Conduit::passive(self.uri.clone(), remote, stream))
    }

    async fn close(&self) -> Result<(), ConduitError> {
        let native = self
            .native
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if native.is_some() {
            debug!(uri = %self.uri, "closing tcp listener");
        }
        self.closed.send_replace(true);
        Ok(())
    }

    fn addr(&self) -> &Uri {
        &self.uri
    }
}
