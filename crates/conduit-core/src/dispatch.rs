//! 顶层分发器：规范化 URI 并把建连请求路由到注册的机制。
//!
//! # 教案级注释
//!
//! ## 契约（What）
//! - `dial`/`listen` 只接受规范 URI，否则在调用任何机制前返回 [`ConduitError::NotCanonical`]；
//! - 传输名为空时直接返回 [`ConduitError::UnknownTransport`]，不查询注册表；
//! - 指定安全层时由安全机制负责整个操作，并通过 `lower` 参数取得 URI 所指的传输机制；
//!   安全机制或传输机制未注册时分别返回 `UnknownSecurity`/`UnknownTransport`；
//! - 未指定安全层时直接调用传输机制。
//!
//! ## 逻辑（How）
//! - 注册表与解析器均以 `Arc` 共享，分发器可廉价克隆并跨任务使用；
//! - [`Dispatcher::canonicalize`] 中主机名与服务名各自最多查询一次，
//!   同一个端口与每个解析出的 IP 配对。

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use crate::conduit::Conduit;
use crate::config::Config;
use crate::context::CallContext;
use crate::error::ConduitError;
use crate::listener::Listener;
use crate::mechanism::Mechanism;
use crate::options::{DialerOption, ListenerOption};
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::uri::{Uri, join_host_port, parse_port, split_host_port};

/// 持有注册表与解析器的建连入口。
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    resolver: Arc<dyn Resolver>,
}

impl Dispatcher {
    /// 使用系统解析器构造分发器。
    #[cfg(feature = "runtime-tokio")]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_resolver(registry, Arc::new(crate::resolver::SystemResolver::default()))
    }

    /// 使用调用方提供的解析器构造分发器。
    pub fn with_resolver(registry: Arc<Registry>, resolver: Arc<dyn Resolver>) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 将 URI 展开为一组规范 URI。
    ///
    /// - 指定发现机制时整体委托给该机制，结果原样返回；
    /// - 无主机时返回仅含自身的列表；
    /// - 否则解析主机（字面量 IP 或 DNS 正向查询）与端口（数字或按传输名查询服务），
    ///   为每个 IP 派生一个 URI，其余组件保持不变。
    pub async fn canonicalize(
        &self,
        ctx: &CallContext,
        uri: &Uri,
    ) -> Result<Vec<Uri>, ConduitError> {
        if !uri.discovery().is_empty() {
            let discovery = self.registry.lookup_discovery(uri.discovery()).ok_or_else(|| {
                ConduitError::UnknownDiscovery {
                    name: uri.discovery().to_owned(),
                }
            })?;
            debug!(uri = %uri, discovery = uri.discovery(), "delegating to discovery mechanism");
            return discovery.discover(ctx, uri).await;
        }

        if uri.host().is_empty() {
            return Ok(vec![uri.clone()]);
        }

        let (host, port) = split_host_port(uri.host())?;

        let ips = match host.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => self.resolver.lookup_ip(host).await?,
        };

        let port = if parse_port(port).is_some() {
            port.to_owned()
        } else {
            self.resolver
                .lookup_port(uri.transport(), port)
                .await?
                .to_string()
        };

        debug!(uri = %uri, candidates = ips.len(), port = %port, "canonicalized uri");
        Ok(ips
            .into_iter()
            .map(|ip| uri.with_host(join_host_port(&ip.to_string(), &port)))
            .collect())
    }

    /// 以主动模式建立 Conduit。
    pub async fn dial(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        uri: &Uri,
        options: Vec<DialerOption>,
    ) -> Result<Conduit, ConduitError> {
        let (mechanism, lower) = self.select(uri)?;
        debug!(
            uri = %uri,
            transport = uri.transport(),
            security = uri.security(),
            "dialing"
        );
        mechanism
            .dial(ctx, config, uri, options, lower.as_deref())
            .await
    }

    /// 以被动模式开始监听。
    pub async fn listen(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        uri: &Uri,
        options: Vec<ListenerOption>,
    ) -> Result<Box<dyn Listener>, ConduitError> {
        let (mechanism, lower) = self.select(uri)?;
        debug!(
            uri = %uri,
            transport = uri.transport(),
            security = uri.security(),
            "listening"
        );
        mechanism
            .listen(ctx, config, uri, options, lower.as_deref())
            .await
    }

    /// 解析原始字符串后调用 [`Dispatcher::dial`]。
    pub async fn dial_str(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        raw: &str,
        options: Vec<DialerOption>,
    ) -> Result<Conduit, ConduitError> {
        let uri = Uri::parse(raw)?;
        self.dial(ctx, config, &uri, options).await
    }

    /// 解析原始字符串后调用 [`Dispatcher::listen`]。
    pub async fn listen_str(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        raw: &str,
        options: Vec<ListenerOption>,
    ) -> Result<Box<dyn Listener>, ConduitError> {
        let uri = Uri::parse(raw)?;
        self.listen(ctx, config, &uri, options).await
    }

    /// 选出负责本次操作的机制，以及安全层场景下交给它的传输机制。
    #[allow(clippy::type_complexity)]
    fn select(
        &self,
        uri: &Uri,
    ) -> Result<(Arc<dyn Mechanism>, Option<Arc<dyn Mechanism>>), ConduitError> {
        if !uri.is_canonical() {
            return Err(ConduitError::NotCanonical {
                uri: uri.to_string(),
            });
        }
        if uri.transport().is_empty() {
            return Err(self.unknown_transport(uri));
        }

        if !uri.security().is_empty() {
            let security = self.registry.lookup_security(uri.security()).ok_or_else(|| {
                ConduitError::UnknownSecurity {
                    uri: uri.to_string(),
                    name: uri.security().to_owned(),
                }
            })?;
            let transport = self
                .registry
                .lookup_transport(uri.transport())
                .ok_or_else(|| self.unknown_transport(uri))?;
            return Ok((security, Some(transport)));
        }

        let transport = self
            .registry
            .lookup_transport(uri.transport())
            .ok_or_else(|| self.unknown_transport(uri))?;
        Ok((transport, None))
    }

    fn unknown_transport(&self, uri: &Uri) -> ConduitError {
        ConduitError::UnknownTransport {
            uri: uri.to_string(),
            name: uri.transport().to_owned(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
