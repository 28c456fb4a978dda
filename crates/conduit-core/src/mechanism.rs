//! 可插拔机制契约：传输、安全与发现。
//!
//! # 教案级注释
//!
//! ## 契约（What）
//! - [`Mechanism`] 同时覆盖传输机制与安全机制：`dial` 建立出站 Conduit，`listen` 返回监听器；
//! - 传输机制被调用时 `lower` 为 `None`；安全机制被调用时 `lower` 携带 URI 所指的传输机制，
//!   安全层在其上建立链路后再执行握手；
//! - [`Discovery`] 把带发现后缀的 URI 展开为一组规范 URI。
//!
//! ## 注意事项（Trade-offs）
//! - 机制实例注册后以 `Arc` 共享，实现必须是 `Send + Sync`，可被多个任务并发调用。

use async_trait::async_trait;

use crate::conduit::Conduit;
use crate::config::Config;
use crate::context::CallContext;
use crate::error::ConduitError;
use crate::listener::Listener;
use crate::options::{DialerOption, ListenerOption};
use crate::uri::Uri;

/// 传输或安全机制。
#[async_trait]
pub trait Mechanism: Send + Sync {
    /// 建立到 `uri` 的出站 Conduit。
    ///
    /// - `uri` 已保证规范；
    /// - 安全机制收到的 `lower` 一定是已注册的传输机制：传输名未注册时分发器先返回
    ///   `UnknownTransport`，安全机制不会被调用；
    /// - 成功返回的 Conduit 处于 `Active` 状态，`remote_uri` 字符串与对端 `local_uri` 一致。
    async fn dial(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        uri: &Uri,
        options: Vec<DialerOption>,
        lower: Option<&dyn Mechanism>,
    ) -> Result<Conduit, ConduitError>;

    /// 在 `uri` 上开始监听。
    ///
    /// `uri` 已保证规范；主机为空表示由机制自行选择通配地址。`lower` 的约定与
    /// [`Mechanism::dial`] 相同。
    async fn listen(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        uri: &Uri,
        options: Vec<ListenerOption>,
        lower: Option<&dyn Mechanism>,
    ) -> Result<Box<dyn Listener>, ConduitError>;
}

/// 服务发现机制。
#[async_trait]
pub trait Discovery: Send + Sync {
    /// 将 `uri` 展开为零个或多个规范 URI。
    async fn discover(&self, ctx: &CallContext, uri: &Uri) -> Result<Vec<Uri>, ConduitError>;
}
