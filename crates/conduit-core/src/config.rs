//! 机制配置。
//!
//! 核心层不解释配置内容；[`Config`] 只负责按机制名交出对应的配置段，具体字段由
//! 各机制自行反序列化（参见 [`section`]）。

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ConduitError;

/// 透传给机制的配置对象。
pub trait Config: Send + Sync {
    /// 返回名为 `name` 的传输机制配置段。
    fn for_transport(&self, name: &str) -> Option<&toml::Table>;

    /// 返回名为 `name` 的安全机制配置段。
    fn for_security(&self, name: &str) -> Option<&toml::Table>;
}

/// 基于 TOML 的默认配置实现。
///
/// ```toml
/// [transport.tcp]
/// nodelay = true
/// connect_timeout_ms = 2000
///
/// [security.tls]
/// principal = "node-a"
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConduitConfig {
    pub transport: BTreeMap<String, toml::Table>,
    pub security: BTreeMap<String, toml::Table>,
}

impl ConduitConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConduitError> {
        toml::from_str(raw).map_err(|err| ConduitError::Config {
            section: String::new(),
            message: err.to_string(),
        })
    }
}

impl Config for ConduitConfig {
    fn for_transport(&self, name: &str) -> Option<&toml::Table> {
        self.transport.get(name)
    }

    fn for_security(&self, name: &str) -> Option<&toml::Table> {
        self.security.get(name)
    }
}

/// 不携带任何配置段的空实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoConfig;

impl Config for NoConfig {
    fn for_transport(&self, _name: &str) -> Option<&toml::Table> {
        None
    }

    fn for_security(&self, _name: &str) -> Option<&toml::Table> {
        None
    }
}

/// 将配置段反序列化为机制的强类型设置；缺省段落回退到 `T::default()`。
pub fn section<T>(label: &str, table: Option<&toml::Table>) -> Result<T, ConduitError>
where
    T: DeserializeOwned + Default,
{
    match table {
        None => Ok(T::default()),
        Some(table) => toml::Value::Table(table.clone())
            .try_into()
            .map_err(|err: toml::de::Error| ConduitError::Config {
                section: label.to_owned(),
                message: err.to_string(),
            }),
    }
}
