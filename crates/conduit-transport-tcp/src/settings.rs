use std::time::Duration;

use conduit_core::config::{Config, section};
use conduit_core::ConduitError;
use serde::Deserialize;

/// `[transport.tcp]` 配置段。
///
/// ```toml
/// [transport.tcp]
/// nodelay = true
/// connect_timeout_ms = 2000
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TcpSettings {
    /// 是否为每条连接设置 `TCP_NODELAY`，默认开启。
    pub nodelay: bool,
    /// 单次建连的超时毫秒数，与调用上下文的截止时间取较早者。
    pub connect_timeout_ms: Option<u64>,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            nodelay: true,
            connect_timeout_ms: None,
        }
    }
}

impl TcpSettings {
    /// 从配置对象中读取 `tcp` 传输段；缺省时使用默认值。
    pub fn from_config(config: &dyn Config) -> Result<Self, ConduitError> {
        section("transport.tcp", config.for_transport("tcp"))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
