//! 拨号器/监听器选项与机制过滤器。
//!
//! # 教案级注释
//!
//! ## 契约（What）
//! - 选项是不可变的配置片段，[`make_dialer`]/[`make_listen_config`] 按从左到右的顺序
//!   折叠进可变的 [`DialerConfig`]/[`ListenConfig`]；标量字段后写覆盖先写；
//! - 每个机制实例可提供一个过滤器：应用每个选项前先交给过滤器，过滤器可拒绝（立即返回
//!   错误，后续选项不再应用）或原地改写选项（例如把本地地址 URI 解析为原生地址）；
//! - 未提供过滤器时，全部选项原样接受。
//!
//! ## 逻辑（How）
//! - `KeepAlive` 与 `Control` 同时适用于拨号器与监听器；`LocalAddr` 仅适用于拨号器，
//!   且只有经过机制过滤器解析出原生地址后才会生效。

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::Socket;

use crate::error::ConduitError;
use crate::uri::Uri;

type ControlFn = dyn Fn(&str, &str, &Socket) -> io::Result<()> + Send + Sync;

/// 原始套接字钩子：在 bind/connect 之前以 `(network, address, socket)` 调用。
///
/// 平台相关的套接字操作集中在钩子内部，机制只负责在正确的时机调用它。
#[derive(Clone)]
pub struct ControlHook(Arc<ControlFn>);

impl ControlHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&str, &str, &Socket) -> io::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub fn call(&self, network: &str, address: &str, socket: &Socket) -> io::Result<()> {
        (self.0)(network, address, socket)
    }
}

impl fmt::Debug for ControlHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ControlHook(..)")
    }
}

/// 拨号器配置，由 [`make_dialer`] 折叠选项得到。
#[derive(Clone, Debug, Default)]
pub struct DialerConfig {
    /// TCP keep-alive 空闲时长；`None` 沿用系统默认，`Some(ZERO)` 关闭探测。
    pub keep_alive: Option<Duration>,
    pub control: Option<ControlHook>,
    /// 出站连接绑定的本地地址。
    pub local_addr: Option<SocketAddr>,
}

/// 监听配置，由 [`make_listen_config`] 折叠选项得到。
#[derive(Clone, Debug, Default)]
pub struct ListenConfig {
    /// 应用于每条被接受连接的 keep-alive 空闲时长，语义同 [`DialerConfig::keep_alive`]。
    pub keep_alive: Option<Duration>,
    pub control: Option<ControlHook>,
}

/// 设置 keep-alive；`Duration::ZERO` 表示关闭。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepAlive(pub Duration);

/// 安装原始套接字钩子。
#[derive(Clone, Debug)]
pub struct Control(pub ControlHook);

/// 出站连接的本地地址。
///
/// 需要机制校验：支持该选项的机制在过滤阶段把 [`uri`](Self::uri) 解析为原生地址并写回；
/// 不支持的机制应忽略它，未解析的选项在应用阶段不产生效果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalAddrOption {
    uri: Uri,
    addr: Option<SocketAddr>,
}

impl LocalAddrOption {
    pub fn new(uri: Uri) -> Self {
        Self { uri, addr: None }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// 过滤器解析出的原生地址。
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn set_addr(&mut self, addr: SocketAddr) {
        self.addr = Some(addr);
    }
}

/// 便捷构造 [`DialerOption::LocalAddr`]。
pub fn local_addr(uri: Uri) -> DialerOption {
    DialerOption::LocalAddr(LocalAddrOption::new(uri))
}

/// 作用于拨号器的选项。
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum DialerOption {
    KeepAlive(KeepAlive),
    Control(Control),
    LocalAddr(LocalAddrOption),
}

impl DialerOption {
    /// 将选项写入拨号器配置。
    pub fn dial_apply(&self, dialer: &mut DialerConfig) {
        match self {
            DialerOption::KeepAlive(KeepAlive(period)) => dialer.keep_alive = Some(*period),
            DialerOption::Control(Control(hook)) => dialer.control = Some(hook.clone()),
            DialerOption::LocalAddr(opt) => {
                if let Some(addr) = opt.addr {
                    dialer.local_addr = Some(addr);
                }
            }
        }
    }
}

/// 作用于监听器的选项。
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ListenerOption {
    KeepAlive(KeepAlive),
    Control(Control),
}

impl ListenerOption {
    /// 将选项写入监听配置。
    pub fn listen_apply(&self, config: &mut ListenConfig) {
        match self {
            ListenerOption::KeepAlive(KeepAlive(period)) => config.keep_alive = Some(*period),
            ListenerOption::Control(Control(hook)) => config.control = Some(hook.clone()),
        }
    }
}

impl From<KeepAlive> for DialerOption {
    fn from(value: KeepAlive) -> Self {
        DialerOption::KeepAlive(value)
    }
}

impl From<KeepAlive> for ListenerOption {
    fn from(value: KeepAlive) -> Self {
        ListenerOption::KeepAlive(value)
    }
}

impl From<Control> for DialerOption {
    fn from(value: Control) -> Self {
        DialerOption::Control(value)
    }
}

impl From<Control> for ListenerOption {
    fn from(value: Control) -> Self {
        ListenerOption::Control(value)
    }
}

impl From<LocalAddrOption> for DialerOption {
    fn from(value: LocalAddrOption) -> Self {
        DialerOption::LocalAddr(value)
    }
}

/// 机制提供的拨号选项过滤器。
pub trait DialerFilter: Send + Sync {
    /// 校验或改写选项；返回错误时中止整个折叠过程。
    fn dial_filter(&self, option: &mut DialerOption) -> Result<(), ConduitError>;
}

/// 机制提供的监听选项过滤器。
pub trait ListenerFilter: Send + Sync {
    /// 校验或改写选项；返回错误时中止整个折叠过程。
    fn listen_filter(&self, option: &mut ListenerOption) -> Result<(), ConduitError>;
}

/// 依次过滤并应用拨号选项。
pub fn make_dialer(
    options: Vec<DialerOption>,
    filter: Option<&dyn DialerFilter>,
) -> Result<DialerConfig, ConduitError> {
    let mut dialer = DialerConfig::default();
    for mut option in options {
        if let Some(filter) = filter {
            filter.dial_filter(&mut option)?;
        }
        option.dial_apply(&mut dialer);
    }
    Ok(dialer)
}

/// 依次过滤并应用监听选项。
pub fn make_listen_config(
    options: Vec<ListenerOption>,
    filter: Option<&dyn ListenerFilter>,
) -> Result<ListenConfig, ConduitError> {
    let mut config = ListenConfig::default();
    for mut option in options {
        if let Some(filter) = filter {
            filter.listen_filter(&mut option)?;
        }
        option.listen_apply(&mut config);
    }
    Ok(config)
}
