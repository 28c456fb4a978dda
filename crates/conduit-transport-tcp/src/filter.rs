use conduit_core::{ConduitError, DialerFilter, DialerOption};

use crate::util::host_to_socket_addr;

/// TCP 拨号选项过滤器。
///
/// # 契约（What）
/// - `LocalAddr`：URI 必须规范（否则 `NotCanonical`）且传输名为 `tcp`（否则
///   `UnknownTransport`）；主机解析为原生地址后写回选项，解析失败原样返回；
/// - 其余选项直接放行。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpFilter;

impl DialerFilter for TcpFilter {
    fn dial_filter(&self, option: &mut DialerOption) -> Result<(), ConduitError> {
        let DialerOption::LocalAddr(local) = option else {
            return Ok(());
        };

        let uri = local.uri();
        if !uri.is_canonical() {
            return Err(ConduitError::NotCanonical {
                uri: uri.to_string(),
            });
        }
        if uri.transport() != "tcp" {
            return Err(ConduitError::UnknownTransport {
                uri: uri.to_string(),
                name: uri.transport().to_owned(),
            });
        }

        let addr = host_to_socket_addr(uri.host())?;
        local.set_addr(addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{KeepAlive, Uri, local_addr, make_dialer};
    use std::time::Duration;

    fn uri(raw: &str) -> Uri {
        Uri::parse(raw).expect("测试 URI")
    }

    #[test]
    fn resolves_local_addr() {
        let dialer = make_dialer(
            vec![
                KeepAlive(Duration::from_secs(30)).into(),
                local_addr(uri("tcp://127.0.0.1:4000")),
            ],
            Some(&TcpFilter),
        )
        .expect("合法本地地址");
        assert_eq!(dialer.local_addr, Some("127.0.0.1:4000".parse().expect("地址")));
        assert_eq!(dialer.keep_alive, Some(Duration::from_secs(30)));
    }

    #[test]
    fn hostless_local_addr_binds_any() {
        let dialer = make_dialer(vec![local_addr(uri("tcp:"))], Some(&TcpFilter))
            .expect("无主机 URI 规范");
        assert_eq!(dialer.local_addr, Some("0.0.0.0:0".parse().expect("地址")));
    }

    #[test]
    fn rejects_non_canonical_local_addr() {
        let err = make_dialer(vec![local_addr(uri("tcp.srv://127.0.0.1:1"))], Some(&TcpFilter))
            .unwrap_err();
        assert_eq!(err.code(), "conduit.uri.not_canonical");

        let err = make_dialer(vec![local_addr(uri("tcp://localhost:1"))], Some(&TcpFilter))
            .unwrap_err();
        assert_eq!(err.code(), "conduit.uri.not_canonical");
    }

    #[test]
    fn rejects_foreign_transport() {
        let err = make_dialer(vec![local_addr(uri("udp://127.0.0.1:1"))], Some(&TcpFilter))
            .unwrap_err();
        assert!(matches!(err, ConduitError::UnknownTransport { ref name, .. } if name == "udp"));
    }
}
