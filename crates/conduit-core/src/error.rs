//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总 URI 解析、规范化、注册表分发与机制建连中可能出现的全部错误；
//! - 底层解析器/套接字产生的原生错误通过 [`ConduitError::Io`] 原样透传，不做二次包装。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，可安全跨线程传播；
//! - 每个变体对应一个稳定错误码（见 [`ConduitError::code`]），遵循 `conduit.<域>.<语义>` 命名；
//! - 本层不执行任何重试，退避策略由调用方在 `dial`/`listen` 之上自行编排。

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::uri::{AddrError, ParseError};

/// conduit 建连层的统一错误域。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConduitError {
    /// 原始字符串不符合 URL 语法。
    #[error("parse {raw:?}: {source}")]
    Parse {
        raw: String,
        #[source]
        source: ParseError,
    },

    /// `host[:port]` 无法拆分为主机与端口。
    #[error(transparent)]
    Addr(#[from] AddrError),

    /// 需要规范 URI 的操作收到了带发现后缀或非字面量主机/端口的 URI。
    #[error("{uri}: URI is not canonical")]
    NotCanonical { uri: String },

    /// 传输机制未注册（或 URI 未给出传输名）。
    #[error("{uri}: {name:?}: unknown transport")]
    UnknownTransport { uri: String, name: String },

    /// 安全机制未注册。
    #[error("{uri}: {name:?}: unknown security layer")]
    UnknownSecurity { uri: String, name: String },

    /// 发现机制未注册。
    #[error("{name:?}: unknown discovery mechanism")]
    UnknownDiscovery { name: String },

    /// 调用上下文在操作完成前被取消。
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// 调用上下文的截止时间先于操作完成到达。
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// 监听器已关闭，`accept` 不再产出 Conduit。
    #[error("{uri}: listener closed")]
    ListenerClosed { uri: String },

    /// 配置段无法反序列化为机制所需的设置。
    #[error("config section {section:?}: {message}")]
    Config { section: String, message: String },

    /// 第三方机制（安全层、发现机制等）返回的自定义错误。
    #[error("{mechanism}: {source}")]
    Mechanism {
        mechanism: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// 解析器或套接字层的原生错误。
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ConduitError {
    /// 返回稳定错误码，便于日志与告警按语义聚合。
    pub fn code(&self) -> &'static str {
        match self {
            ConduitError::Parse { .. } => "conduit.uri.parse_failed",
            ConduitError::Addr(_) => "conduit.uri.bad_address",
            ConduitError::NotCanonical { .. } => "conduit.uri.not_canonical",
            ConduitError::UnknownTransport { .. } => "conduit.registry.unknown_transport",
            ConduitError::UnknownSecurity { .. } => "conduit.registry.unknown_security",
            ConduitError::UnknownDiscovery { .. } => "conduit.registry.unknown_discovery",
            ConduitError::Cancelled { .. } => "conduit.context.cancelled",
            ConduitError::Timeout { .. } => "conduit.context.timeout",
            ConduitError::ListenerClosed { .. } => "conduit.listener.closed",
            ConduitError::Config { .. } => "conduit.config.invalid",
            ConduitError::Mechanism { .. } => "conduit.mechanism.failed",
            ConduitError::Io(_) => "conduit.io.failed",
        }
    }

    /// 便捷构造：把插件机制的错误包装为 [`ConduitError::Mechanism`]。
    pub fn mechanism(
        mechanism: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        ConduitError::Mechanism {
            mechanism: mechanism.into(),
            source: source.into(),
        }
    }
}
