use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use conduit_core::{
    CallContext, Conduit, ConduitError, Config, Control, ControlHook, Deadline, DialerOption,
    Listener, ListenerOption, Mechanism, Uri, async_trait, make_dialer, make_listen_config,
};
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener as TokioTcpListener, TcpSocket};
use tracing::{debug, warn};

use crate::error::{BIND, CONNECT};
use crate::filter::TcpFilter;
use crate::listener::TcpListener;
use crate::settings::TcpSettings;
use crate::tcp_addr_to_uri;
use crate::util::{
    check_context, host_to_socket_addr, local_for_target, network_of, run_with_context,
};

const LISTEN_BACKLOG: i32 = 1024;

/// TCP 传输机制。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `dial`：选项经 [`TcpFilter`] 过滤后折叠为拨号配置，按调用上下文的取消/截止语义连接
///   `uri.host`；成功返回 `Active` Conduit，`local_uri` 由本地地址推导，`remote_uri` 为 `uri`；
/// - `listen`：在选项末尾追加地址复用钩子，不经过滤器折叠监听配置，绑定 `uri.host`
///   并返回 [`TcpListener`]；空主机绑定双栈通配地址 `[::]`，IPv6 不可用时退回 `0.0.0.0`；
/// - TCP 不是安全机制，`lower` 参数被忽略。
///
/// ## 逻辑（How）
/// - 套接字由 `socket2` 创建，依次执行原始钩子、keep-alive、本地绑定，再交给 Tokio 完成异步连接；
/// - 配置段 `[transport.tcp]` 提供 `nodelay` 与 `connect_timeout_ms`。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpMechanism;

impl TcpMechanism {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mechanism for TcpMechanism {
    async fn dial(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        uri: &Uri,
        options: Vec<DialerOption>,
        _lower: Option<&dyn Mechanism>,
    ) -> Result<Conduit, ConduitError> {
        let settings = TcpSettings::from_config(config)?;
        let dialer = make_dialer(options, Some(&TcpFilter))?;
        let target = host_to_socket_addr(uri.host())?;

        let ctx = match settings.connect_timeout() {
            Some(timeout) => ctx.with_tighter_deadline(Deadline::after(timeout)),
            None => ctx.clone(),
        };
        check_context(&ctx, CONNECT)?;

        let socket = new_socket(target)?;
        if let Some(hook) = &dialer.control {
            hook.call(network_of(&target), &target.to_string(), &socket)?;
        }
        if let Some(period) = dialer.keep_alive {
            apply_keep_alive(&SockRef::from(&socket), period)?;
        }
        if let Some(local) = dialer.local_addr {
            socket.bind(&local_for_target(local, &target).into())?;
        }
        socket.set_nonblocking(true)?;
        let socket = TcpSocket::from_std_stream(socket.into());

        debug!(uri = %uri, target = %target, "tcp dialing");
        let stream = run_with_context(&ctx, CONNECT, socket.connect(target)).await?;
        stream.set_nodelay(settings.nodelay)?;

        let local = tcp_addr_to_uri(stream.local_addr()?);
        debug!(local = %local, remote = %uri, "tcp connection established");
        Ok(Conduit::active(local, uri.clone(), stream))
    }

    async fn listen(
        &self,
        ctx: &CallContext,
        config: &dyn Config,
        uri: &Uri,
        mut options: Vec<ListenerOption>,
        _lower: Option<&dyn Mechanism>,
    ) -> Result<Box<dyn Listener>, ConduitError> {
        check_context(ctx, BIND)?;
        let settings = TcpSettings::from_config(config)?;

        options.push(Control(tcp_reuse_addr()).into());
        let listen = make_listen_config(options, None)?;
        let (socket, bind_addr) = listen_socket(uri.host())?;
        if let Some(hook) = &listen.control {
            hook.call(network_of(&bind_addr), &bind_addr.to_string(), &socket)?;
        }
        socket.bind(&bind_addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;
        let native = TokioTcpListener::from_std(socket.into())?;

        let bound = tcp_addr_to_uri(native.local_addr()?);
        debug!(uri = %uri, bound = %bound, "tcp listening");
        Ok(Box::new(TcpListener::new(
            native,
            bound,
            listen.keep_alive,
            settings.nodelay,
        )))
    }
}

/// 设置 `SO_REUSEADDR` 的原始套接字钩子。
pub fn tcp_reuse_addr() -> ControlHook {
    ControlHook::new(|_network, _address, socket| socket.set_reuse_address(true))
}

fn new_socket(addr: SocketAddr) -> io::Result<Socket> {
    Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
}

/// 为监听创建套接字；空主机优先使用双栈通配地址。
fn listen_socket(host: &str) -> io::Result<(Socket, SocketAddr)> {
    if !host.is_empty() {
        let addr = host_to_socket_addr(host)?;
        return Ok((new_socket(addr)?, addr));
    }

    let any6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0));
    let dual_stack = new_socket(any6).and_then(|socket| {
        socket.set_only_v6(false)?;
        Ok(socket)
    });
    match dual_stack {
        Ok(socket) => Ok((socket, any6)),
        Err(err) => {
            warn!(error = %err, "dual-stack wildcard unavailable, listening on ipv4 only");
            let any4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
            Ok((new_socket(any4)?, any4))
        }
    }
}

/// `Duration::ZERO` 关闭 keep-alive，其余值作为空闲探测时长。
pub(crate) fn apply_keep_alive(socket: &SockRef<'_>, period: Duration) -> io::Result<()> {
    if period.is_zero() {
        return socket.set_keepalive(false);
    }
    socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(period))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_addr_hook_sets_the_flag() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("地址");
        let socket = new_socket(addr).expect("创建套接字");
        assert!(!socket.reuse_address().expect("读取选项"));
        tcp_reuse_addr()
            .call(network_of(&addr), &addr.to_string(), &socket)
            .expect("钩子");
        assert!(socket.reuse_address().expect("读取选项"));
    }

    #[test]
    fn hostless_listen_socket_is_dual_stack() {
        let (socket, addr) = listen_socket("").expect("通配监听套接字");
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 0);
        if addr.is_ipv6() {
            assert!(!socket.only_v6().expect("读取选项"));
        }

        let (_, addr) = listen_socket("127.0.0.1:0").expect("指定地址");
        assert_eq!(addr, "127.0.0.1:0".parse::<SocketAddr>().expect("地址"));
    }

    #[test]
    fn keep_alive_zero_turns_keepalive_off() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("地址");
        let socket = new_socket(addr).expect("创建套接字");
        let sock = SockRef::from(&socket);

        apply_keep_alive(&sock, Duration::from_secs(30)).expect("开启");
        assert!(socket.keepalive().expect("读取选项"));
        apply_keep_alive(&sock, Duration::ZERO).expect("关闭");
        assert!(!socket.keepalive().expect("读取选项"));
    }
}
