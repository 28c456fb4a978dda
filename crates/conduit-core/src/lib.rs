#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# conduit-core

## 设计动机（Why）
- **定位**：与具体传输无关的建连层。调用方给出复合 URI（传输名、可选安全层、可选发现机制），
  本 crate 负责把它解析为具体地址、分发给已注册的机制，并返回统一的 [`Conduit`] 或 [`Listener`]。
- **架构角色**：定义机制契约（[`Mechanism`]、[`Discovery`]、[`Listener`]）与选项/过滤器框架，
  传输实现（例如 `conduit-transport-tcp`）只需依赖本 crate 即可接入。

## 核心契约（What）
- URI 语法：`transport[+security[+security...]][.discovery]://host[:port]/path...`；
- [`Dispatcher::canonicalize`] 将带发现后缀或主机名/服务名的 URI 展开为规范 URI；
- [`Dispatcher::dial`]/[`Dispatcher::listen`] 只接受规范 URI，按安全层优先的顺序选择机制；
- 所有错误以 [`ConduitError`] 返回，原生解析器/套接字错误原样透传，本层不做重试。

## 实现策略（How）
- 注册表显式构造、初始化完成后以 `Arc` 冻结，不存在进程级全局映射；
- 建连调用接收 [`CallContext`]，机制在等待原生 Future 时同时观察取消与截止时间；
- 名称解析通过 [`Resolver`] 注入，默认的 `SystemResolver` 依赖 `runtime-tokio` 特性。

## 风险与考量（Trade-offs）
- URI 端口允许服务名，因此使用内部解析器而非 RFC 3986 严格实现；
- 安全机制自行在 `lower` 传输机制之上完成握手，本层不解释安全元数据。
"#]

pub mod conduit;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod mechanism;
pub mod options;
pub mod registry;
pub mod resolver;
pub mod uri;

pub use async_trait::async_trait;

pub use conduit::{Conduit, ConduitState, Link, SecurityInfo};
pub use config::{ConduitConfig, Config, NoConfig};
pub use context::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use dispatch::Dispatcher;
pub use error::ConduitError;
pub use listener::Listener;
pub use mechanism::{Discovery, Mechanism};
pub use options::{
    Control, ControlHook, DialerConfig, DialerFilter, DialerOption, KeepAlive, ListenConfig,
    ListenerFilter, ListenerOption, LocalAddrOption, local_addr, make_dialer, make_listen_config,
};
pub use registry::Registry;
pub use resolver::Resolver;
#[cfg(feature = "runtime-tokio")]
pub use resolver::SystemResolver;
pub use uri::Uri;
