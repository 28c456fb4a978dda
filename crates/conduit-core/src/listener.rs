use async_trait::async_trait;

use crate::conduit::Conduit;
use crate::error::ConduitError;
use crate::uri::Uri;

/// 由机制 `listen` 返回的监听器。
///
/// # 契约（What）
/// - `accept` 阻塞直到有入站连接、出错或监听器被关闭；成功返回的 Conduit 处于 `Passive`
///   状态，`local_uri` 与发起方 `remote_uri` 的字符串形式一致；
/// - `close` 幂等，关闭后挂起中的与后续的 `accept` 以
///   [`ConduitError::ListenerClosed`] 结束；
/// - `addr` 返回实际绑定地址（端口 0 会被替换为内核分配的端口）。
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> Result<Conduit, ConduitError>;

    async fn close(&self) -> Result<(), ConduitError>;

    fn addr(&self) -> &Uri;
}
