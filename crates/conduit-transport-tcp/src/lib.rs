#![doc = r#"
# conduit-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供 conduit 建连层在 Tokio 运行时上的 TCP 传输机制，
  封装拨号、监听与接受连接的底层细节。
- **架构角色**：实现 `conduit-core` 的 [`Mechanism`](conduit_core::Mechanism) 与
  [`Listener`](conduit_core::Listener) 契约，通过 [`register`] 以 `tcp` 名称接入注册表。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时中使用本实现；传入的 URI 已由分发器保证规范；
- **输出保障**：`dial` 产出 `Active` Conduit，`accept` 产出 `Passive` Conduit，两端的
  `remote_uri` 与对端 `local_uri` 字符串一致；
- **错误语义**：取消与超时映射为 `Cancelled`/`Timeout`，套接字错误原样透传。

## 实现策略（How）
- 套接字由 `socket2` 创建，原始钩子、keep-alive 与本地绑定在连接前完成；
- 使用 `tokio::select!` 将取消/超时与连接 Future 组合，并周期性轮询取消令牌。

## 风险与考量（Trade-offs）
- 取消响应依赖定时轮询，存在毫秒级延迟；
- 监听在通配地址时，监听器 URI 与拨号方使用的目标地址可能不同。
"#]

mod error;
mod filter;
mod listener;
mod mechanism;
mod settings;
mod util;

use std::net::SocketAddr;
use std::sync::Arc;

use conduit_core::{Registry, Uri};

pub use filter::TcpFilter;
pub use listener::TcpListener;
pub use mechanism::{TcpMechanism, tcp_reuse_addr};
pub use settings::TcpSettings;

/// 将 TCP 套接字地址转换为 `tcp://ip:port` 形式的 URI。
pub fn tcp_addr_to_uri(addr: SocketAddr) -> Uri {
    Uri::from_socket_addr("tcp", addr)
}

/// 以 `tcp` 名称注册传输机制，返回被替换的旧机制（如有）。
pub fn register(registry: &mut Registry) -> Option<Arc<dyn conduit_core::Mechanism>> {
    registry.register_transport("tcp", Arc::new(TcpMechanism::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_to_uri_is_canonical() {
        let uri = tcp_addr_to_uri("127.0.0.1:8080".parse().expect("地址"));
        assert_eq!(uri.to_string(), "tcp://127.0.0.1:8080");
        assert_eq!(uri.transport(), "tcp");
        assert!(uri.is_canonical());

        let uri = tcp_addr_to_uri("[::1]:9".parse().expect("地址"));
        assert_eq!(uri.to_string(), "tcp://[::1]:9");
    }

    #[test]
    fn register_installs_tcp() {
        let mut registry = Registry::new();
        assert!(register(&mut registry).is_none());
        assert!(registry.lookup_transport("tcp").is_some());
        assert!(register(&mut registry).is_some());
    }
}
