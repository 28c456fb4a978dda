//! 复合 scheme URI 的解析与规范性判定。
//!
//! # 教案级注释
//!
//! ## 契约（What）
//! - scheme 语法为 `transport[+security[+security...]][.discovery]`：
//!   最后一个 `.` 之后是发现机制，其余部分中第一个 `+` 之后是安全层，剩余为传输名；
//! - 因此 `tcp+s1+s2.d1.d2` 拆解为传输 `tcp`、安全层 `s1+s2.d1`、发现 `d2`，
//!   安全层标识内部可以包含 `.`，但最右侧的 `.` 永远归属发现机制；
//! - 拼回 `transport["+"security]["."discovery]` 必须得到原 scheme。
//!
//! ## 逻辑（How）
//! - 通用 URL 组件由内部的 `parse` 子模块拆分，`host` 字段保留 `host[:port]` 原文；
//! - 规范化需要 DNS 与服务名查询，位于 [`crate::Dispatcher::canonicalize`]。
//!
//! ## 注意事项（Trade-offs）
//! - URI 构造后不可变；派生新地址请使用 [`Uri::with_host`]。

mod hostport;
mod parse;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

pub use hostport::{AddrError, join_host_port, split_host_port};
pub use parse::ParseError;

use crate::error::ConduitError;

/// conduit 复合 URI。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    opaque: String,
    user: Option<String>,
    host: String,
    path: String,
    raw_query: String,
    force_query: bool,
    fragment: String,

    transport: String,
    security: String,
    discovery: String,
}

impl Uri {
    /// 解析原始字符串并拆解复合 scheme。
    pub fn parse(raw: &str) -> Result<Self, ConduitError> {
        let parts = parse::split_components(raw).map_err(|source| ConduitError::Parse {
            raw: raw.to_owned(),
            source,
        })?;
        let (transport, security, discovery) = decompose_scheme(&parts.scheme);

        Ok(Self {
            transport: transport.to_owned(),
            security: security.to_owned(),
            discovery: discovery.to_owned(),
            scheme: parts.scheme,
            opaque: parts.opaque,
            user: parts.user,
            host: parts.host,
            path: parts.path,
            raw_query: parts.raw_query,
            force_query: parts.force_query,
            fragment: parts.fragment,
        })
    }

    /// 以 `scheme://ip:port` 形式描述一个套接字地址。
    pub fn from_socket_addr(scheme: &str, addr: SocketAddr) -> Self {
        let (transport, security, discovery) = decompose_scheme(scheme);
        Self {
            scheme: scheme.to_owned(),
            host: addr.to_string(),
            transport: transport.to_owned(),
            security: security.to_owned(),
            discovery: discovery.to_owned(),
            ..Self::default()
        }
    }

    /// 复制当前 URI，仅替换 `host[:port]` 部分。
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// `host[:port]` 原文；端口可能是服务名。
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// scheme 中 `+` 之前的传输名。
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// 安全层标识；未指定时为空串。
    pub fn security(&self) -> &str {
        &self.security
    }

    /// 发现机制标识；未指定时为空串。
    pub fn discovery(&self) -> &str {
        &self.discovery
    }

    /// 判断 URI 是否规范。
    ///
    /// - 指定了发现机制的 URI 永远不规范；
    /// - 无主机的 URI（例如通配监听）天然规范；
    /// - 否则主机必须是字面量 IP，端口必须是 `u16` 数字。
    pub fn is_canonical(&self) -> bool {
        if !self.discovery.is_empty() {
            return false;
        }
        if self.host.is_empty() {
            return true;
        }
        match split_host_port(&self.host) {
            Ok((host, port)) => parse_port(port).is_some() && host.parse::<IpAddr>().is_ok(),
            Err(_) => false,
        }
    }
}

/// 按 `[.discovery]` → `[+security]` → `transport` 的顺序拆解 scheme。
fn decompose_scheme(scheme: &str) -> (&str, &str, &str) {
    let (rest, discovery) = scheme.rsplit_once('.').unwrap_or((scheme, ""));
    let (transport, security) = rest.split_once('+').unwrap_or((rest, ""));
    (transport, security, discovery)
}

/// 严格的十进制端口解析：拒绝符号、空串与越界值。
pub(crate) fn parse_port(port: &str) -> Option<u16> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok()
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        if !self.opaque.is_empty() {
            f.write_str(&self.opaque)?;
        } else {
            if !self.scheme.is_empty() || !self.host.is_empty() || self.user.is_some() {
                if !self.host.is_empty() || !self.path.is_empty() || self.user.is_some() {
                    f.write_str("//")?;
                }
                if let Some(user) = &self.user {
                    write!(f, "{user}@")?;
                }
                f.write_str(&self.host)?;
            }
            if !self.path.is_empty() && !self.path.starts_with('/') && !self.host.is_empty() {
                f.write_str("/")?;
            }
            f.write_str(&self.path)?;
        }
        if self.force_query || !self.raw_query.is_empty() {
            write!(f, "?{}", self.raw_query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = ConduitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}
