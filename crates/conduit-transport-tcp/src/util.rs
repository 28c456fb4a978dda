use crate::error::{OperationKind, cancelled_error, timeout_error};
use conduit_core::{CallContext, Cancellation, ConduitError};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant as TokioInstant;

const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 将规范 URI 的 `host[:port]` 解析为原生地址；空主机表示通配地址与内核分配端口。
pub(crate) fn host_to_socket_addr(host: &str) -> io::Result<SocketAddr> {
    if host.is_empty() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
    }
    host.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{host}: not a literal tcp address"),
        )
    })
}

/// 未指定 IP 只表示“任意本地地址”，按拨号目标的地址族改写，端口保持不变。
pub(crate) fn local_for_target(local: SocketAddr, target: &SocketAddr) -> SocketAddr {
    if !local.ip().is_unspecified() || local.is_ipv4() == target.is_ipv4() {
        return local;
    }
    let ip: IpAddr = if target.is_ipv4() {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv6Addr::UNSPECIFIED.into()
    };
    SocketAddr::new(ip, local.port())
}

/// 原始套接字钩子看到的网络名，区分地址族。
pub(crate) fn network_of(addr: &SocketAddr) -> &'static str {
    if addr.is_ipv4() { "tcp4" } else { "tcp6" }
}

/// 在进入 IO 前检查上下文是否已取消或超时。
pub(crate) fn check_context(ctx: &CallContext, kind: OperationKind) -> Result<(), ConduitError> {
    if ctx.deadline().is_expired() {
        return Err(timeout_error(kind));
    }
    if ctx.cancellation().is_cancelled() {
        return Err(cancelled_error(kind));
    }
    Ok(())
}

async fn wait_for_cancellation(cancellation: &Cancellation) {
    while !cancellation.is_cancelled() {
        tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
    }
}

/// 在保留取消/超时语义的前提下执行 IO Future；IO 错误原样透传。
pub(crate) async fn run_with_context<F, T>(
    ctx: &CallContext,
    kind: OperationKind,
    future: F,
) -> Result<T, ConduitError>
where
    F: Future<Output = io::Result<T>>,
{
    check_context(ctx, kind)?;

    let cancel = wait_for_cancellation(ctx.cancellation());
    tokio::pin!(cancel);
    tokio::pin!(future);

    if let Some(deadline) = ctx.deadline().instant() {
        let sleep = tokio::time::sleep_until(TokioInstant::from_std(deadline));
        tokio::pin!(sleep);
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            _ = &mut sleep => Err(timeout_error(kind)),
            result = &mut future => result.map_err(ConduitError::from),
        }
    } else {
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            result = &mut future => result.map_err(ConduitError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CONNECT;
    use conduit_core::Deadline;

    #[test]
    fn empty_host_means_any_address() {
        assert_eq!(
            host_to_socket_addr("").expect("空主机"),
            "0.0.0.0:0".parse::<SocketAddr>().expect("地址")
        );
        assert_eq!(
            host_to_socket_addr("[::1]:80").expect("IPv6"),
            "[::1]:80".parse::<SocketAddr>().expect("地址")
        );
        let err = host_to_socket_addr("localhost:80").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn unspecified_local_follows_target_family() {
        let any4: SocketAddr = "0.0.0.0:0".parse().expect("地址");
        let v6: SocketAddr = "[::1]:80".parse().expect("地址");
        let v4: SocketAddr = "127.0.0.1:80".parse().expect("地址");

        assert_eq!(local_for_target(any4, &v6), "[::]:0".parse::<SocketAddr>().expect("地址"));
        assert_eq!(local_for_target(any4, &v4), any4);
        assert_eq!(
            local_for_target("[::]:7".parse().expect("地址"), &v4),
            "0.0.0.0:7".parse::<SocketAddr>().expect("地址")
        );

        // 具体地址不做改写，族不匹配时由内核报错。
        let fixed: SocketAddr = "127.0.0.1:0".parse().expect("地址");
        assert_eq!(local_for_target(fixed, &v6), fixed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_interrupts_pending_future() {
        let token = Cancellation::new();
        let ctx = CallContext::builder().with_cancellation(token.clone()).build();
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = run_with_context(&ctx, CONNECT, std::future::pending::<io::Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::Cancelled { operation: "tcp connect" }));
        trigger.await.expect("取消任务");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_interrupts_pending_future() {
        let ctx = CallContext::builder()
            .with_deadline(Deadline::after(Duration::from_millis(20)))
            .build();
        let err = run_with_context(&ctx, CONNECT, std::future::pending::<io::Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::Timeout { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn io_errors_pass_through() {
        let err = run_with_context(&CallContext::default(), CONNECT, async {
            Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ConduitError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
    }
}
