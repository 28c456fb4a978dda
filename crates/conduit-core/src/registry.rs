use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::mechanism::{Discovery, Mechanism};

/// 按名称索引的机制目录。
///
/// # 教案级注释
/// - **目标 (Why)**
///   - 分发器根据 URI 的 `transport`/`security`/`discovery` 字段选择机制，注册表集中维护
///     三张互相独立的“名称 → 机制”映射；
///   - 注册表显式构造并注入 [`Dispatcher`](crate::Dispatcher)，不存在进程级全局状态。
/// - **契约 (What)**
///   - `register_*` 插入或覆盖同名条目，返回被替换的旧机制，后注册者生效；
///   - `lookup_*` 未命中时返回 `None`，这不是错误，调用方需自行转换为对应的 `UnknownX` 错误。
/// - **风险与注意事项 (Trade-offs)**
///   - 注册只应发生在初始化阶段；写操作需要 `&mut self`，注册完成后包装进 `Arc` 即冻结，
///     由借用检查器保证运行期不存在并发写入，因此内部不加锁。
#[derive(Default, Clone)]
pub struct Registry {
    transports: BTreeMap<String, Arc<dyn Mechanism>>,
    securities: BTreeMap<String, Arc<dyn Mechanism>>,
    discoveries: BTreeMap<String, Arc<dyn Discovery>>,
}

impl Registry {
    /// 创建空的注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册传输机制。
    pub fn register_transport(
        &mut self,
        name: impl Into<String>,
        mechanism: Arc<dyn Mechanism>,
    ) -> Option<Arc<dyn Mechanism>> {
        let name = name.into();
        debug!(kind = "transport", name = %name, "registering mechanism");
        self.transports.insert(name, mechanism)
    }

    /// 注册安全机制。
    pub fn register_security(
        &mut self,
        name: impl Into<String>,
        mechanism: Arc<dyn Mechanism>,
    ) -> Option<Arc<dyn Mechanism>> {
        let name = name.into();
        debug!(kind = "security", name = %name, "registering mechanism");
        self.securities.insert(name, mechanism)
    }

    /// 注册发现机制。
    pub fn register_discovery(
        &mut self,
        name: impl Into<String>,
        discovery: Arc<dyn Discovery>,
    ) -> Option<Arc<dyn Discovery>> {
        let name = name.into();
        debug!(kind = "discovery", name = %name, "registering mechanism");
        self.discoveries.insert(name, discovery)
    }

    pub fn lookup_transport(&self, name: &str) -> Option<Arc<dyn Mechanism>> {
        self.transports.get(name).cloned()
    }

    pub fn lookup_security(&self, name: &str) -> Option<Arc<dyn Mechanism>> {
        self.securities.get(name).cloned()
    }

    pub fn lookup_discovery(&self, name: &str) -> Option<Arc<dyn Discovery>> {
        self.discoveries.get(name).cloned()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .field("securities", &self.securities.keys().collect::<Vec<_>>())
            .field("discoveries", &self.discoveries.keys().collect::<Vec<_>>())
            .finish()
    }
}
