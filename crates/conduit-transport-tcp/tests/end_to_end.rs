//! TCP 机制端到端测试：经分发器监听、拨号、回显与关闭。

use std::io;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use conduit_core::{
    CallContext, Cancellation, ConduitConfig, ConduitError, ConduitState, Control, ControlHook,
    Deadline, Dispatcher, KeepAlive, Listener, NoConfig, Registry, Uri, local_addr,
};
use socket2::Socket;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn dispatcher() -> Dispatcher {
    init_tracing();
    let mut registry = Registry::new();
    conduit_transport_tcp::register(&mut registry);
    Dispatcher::new(Arc::new(registry))
}

async fn listen_loopback(dispatcher: &Dispatcher) -> Box<dyn Listener> {
    dispatcher
        .listen_str(
            &CallContext::default(),
            &NoConfig,
            "tcp://127.0.0.1:0",
            vec![KeepAlive(Duration::from_secs(60)).into()],
        )
        .await
        .expect("监听回环地址")
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_with_symmetric_uris() {
    let dispatcher = dispatcher();
    let listener: Arc<dyn Listener> = Arc::from(listen_loopback(&dispatcher).await);
    let addr = listener.addr().clone();
    assert!(addr.is_canonical());
    assert_ne!(addr.host(), "127.0.0.1:0", "端口应由内核分配");

    let server = {
        let listener = listener.clone();
        tokio::spawn(async move {
            let mut accepted = Vec::new();
            for _ in 0..2 {
                let mut conduit = listener.accept().await.expect("接受连接");
                assert_eq!(conduit.state(), ConduitState::Passive);
                let mut buf = [0u8; 5];
                conduit.read_exact(&mut buf).await.expect("读取");
                conduit.write_all(&buf).await.expect("回显");
                accepted.push((
                    conduit.local_uri().to_string(),
                    conduit.remote_uri().to_string(),
                ));
                conduit.close().await.expect("服务端关闭");
            }
            accepted
        })
    };

    let mut dialed = Vec::new();
    for payload in [b"hello", b"world"] {
        let mut conduit = dispatcher
            .dial(&CallContext::default(), &NoConfig, &addr, Vec::new())
            .await
            .expect("拨号");
        assert_eq!(conduit.state(), ConduitState::Active);
        conduit.write_all(payload).await.expect("发送");
        let mut buf = [0u8; 5];
        conduit.read_exact(&mut buf).await.expect("接收回显");
        assert_eq!(&buf, payload);
        dialed.push((
            conduit.local_uri().to_string(),
            conduit.remote_uri().to_string(),
        ));
        conduit.close().await.expect("客户端关闭");
        assert_eq!(conduit.state(), ConduitState::Closed);
    }

    let accepted = server.await.expect("服务端任务");
    for ((client_local, client_remote), (server_local, server_remote)) in
        dialed.iter().zip(accepted.iter())
    {
        assert_eq!(client_remote, server_local);
        assert_eq!(server_remote, client_local);
    }
    listener.close().await.expect("关闭监听器");
}

#[tokio::test(flavor = "multi_thread")]
async fn close_unblocks_pending_accept() {
    let dispatcher = dispatcher();
    let listener: Arc<dyn Listener> = Arc::from(listen_loopback(&dispatcher).await);

    let pending = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.accept().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    listener.close().await.expect("首次关闭");
    listener.close().await.expect("重复关闭");

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("accept 应被唤醒")
        .expect("任务未崩溃");
    assert!(matches!(result, Err(ConduitError::ListenerClosed { .. })));
    assert!(matches!(
        listener.accept().await,
        Err(ConduitError::ListenerClosed { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn dial_honors_local_addr_and_config() {
    let dispatcher = dispatcher();
    let listener = listen_loopback(&dispatcher).await;
    let config = ConduitConfig::from_toml_str(
        "[transport.tcp]\nnodelay = false\nconnect_timeout_ms = 5000\n",
    )
    .expect("合法配置");

    let conduit = dispatcher
        .dial(
            &CallContext::default(),
            &config,
            listener.addr(),
            vec![local_addr(Uri::parse("tcp://127.0.0.1:0").expect("URI"))],
        )
        .await
        .expect("带本地地址拨号");
    assert!(conduit.local_uri().host().starts_with("127.0.0.1:"));

    let accepted = listener.accept().await.expect("接受");
    assert_eq!(accepted.remote_uri(), conduit.local_uri());

    let err = dispatcher
        .dial(
            &CallContext::default(),
            &NoConfig,
            listener.addr(),
            vec![local_addr(Uri::parse("udp://127.0.0.1:0").expect("URI"))],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conduit.registry.unknown_transport");
    listener.close().await.expect("关闭");
}

#[tokio::test(flavor = "multi_thread")]
async fn dial_reports_context_and_socket_errors() {
    let dispatcher = dispatcher();
    let listener = listen_loopback(&dispatcher).await;
    let addr = listener.addr().clone();

    let cancellation = Cancellation::new();
    cancellation.cancel();
    let ctx = CallContext::builder().with_cancellation(cancellation).build();
    let err = dispatcher.dial(&ctx, &NoConfig, &addr, Vec::new()).await.unwrap_err();
    assert!(matches!(err, ConduitError::Cancelled { .. }));

    let ctx = CallContext::builder()
        .with_deadline(Deadline::after(Duration::ZERO))
        .build();
    let err = dispatcher.dial(&ctx, &NoConfig, &addr, Vec::new()).await.unwrap_err();
    assert!(matches!(err, ConduitError::Timeout { .. }));

    listener.close().await.expect("关闭");
    drop(listener);
    let err = dispatcher
        .dial(&CallContext::default(), &NoConfig, &addr, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
}

#[tokio::test(flavor = "multi_thread")]
async fn canonicalized_localhost_is_dialable() {
    let dispatcher = dispatcher();
    let listener = listen_loopback(&dispatcher).await;
    let port = listener
        .addr()
        .host()
        .rsplit_once(':')
        .map(|(_, port)| port.to_owned())
        .expect("端口");

    let candidates = dispatcher
        .canonicalize(
            &CallContext::default(),
            &Uri::parse(&format!("tcp://localhost:{port}")).expect("URI"),
        )
        .await
        .expect("解析 localhost");
    let v4 = candidates
        .iter()
        .find(|uri| uri.host().starts_with("127.0.0.1:"))
        .expect("包含 IPv4 回环地址");

    let mut conduit = dispatcher
        .dial(&CallContext::default(), &NoConfig, v4, Vec::new())
        .await
        .expect("拨号规范化结果");
    conduit.close().await.expect("关闭");
    listener.close().await.expect("关闭监听器");
}

#[tokio::test(flavor = "multi_thread")]
async fn hostless_local_addr_follows_ipv6_target() {
    let dispatcher = dispatcher();
    let listener = match dispatcher
        .listen_str(&CallContext::default(), &NoConfig, "tcp://[::1]:0", Vec::new())
        .await
    {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("跳过：IPv6 回环不可用（{err}）");
            return;
        }
    };

    let mut conduit = dispatcher
        .dial(
            &CallContext::default(),
            &NoConfig,
            listener.addr(),
            vec![local_addr(Uri::parse("tcp:").expect("URI"))],
        )
        .await
        .expect("无主机本地地址按目标地址族绑定");
    assert!(conduit.local_uri().host().starts_with("[::1]:"));
    conduit.close().await.expect("关闭");
    listener.close().await.expect("关闭监听器");
}

#[tokio::test(flavor = "multi_thread")]
async fn hostless_listen_accepts_ipv4_clients() {
    let dispatcher = dispatcher();
    let listener = dispatcher
        .listen_str(&CallContext::default(), &NoConfig, "tcp:", Vec::new())
        .await
        .expect("通配监听");
    let host = listener.addr().host().to_owned();
    assert!(host.starts_with("[::]:") || host.starts_with("0.0.0.0:"), "{host}");
    let port = host.rsplit_once(':').map(|(_, port)| port.to_owned()).expect("端口");

    let target = Uri::parse(&format!("tcp://127.0.0.1:{port}")).expect("URI");
    let mut conduit = dispatcher
        .dial(&CallContext::default(), &NoConfig, &target, Vec::new())
        .await
        .expect("IPv4 客户端可连入通配监听");
    let accepted = listener.accept().await.expect("接受");
    assert_eq!(accepted.remote_uri().transport(), "tcp");
    conduit.close().await.expect("关闭");
    listener.close().await.expect("关闭监听器");
}

#[tokio::test(flavor = "multi_thread")]
async fn dial_runs_control_hook_before_connect() {
    let dispatcher = dispatcher();
    let listener = listen_loopback(&dispatcher).await;

    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let captured: Arc<Mutex<Option<Socket>>> = Arc::default();
    let hook = {
        let seen = seen.clone();
        let captured = captured.clone();
        ControlHook::new(move |network, address, socket| {
            seen.lock()
                .expect("记录锁")
                .push((network.to_owned(), address.to_owned()));
            *captured.lock().expect("套接字锁") = Some(socket.try_clone()?);
            Ok(())
        })
    };

    let mut conduit = dispatcher
        .dial(
            &CallContext::default(),
            &NoConfig,
            listener.addr(),
            vec![
                Control(hook).into(),
                KeepAlive(Duration::from_secs(45)).into(),
            ],
        )
        .await
        .expect("带钩子拨号");

    assert_eq!(
        *seen.lock().expect("记录锁"),
        vec![("tcp4".to_owned(), listener.addr().host().to_owned())]
    );
    // 钩子拿到的是同一个套接字，keep-alive 在钩子之后设置。
    let socket = captured.lock().expect("套接字锁").take().expect("钩子已捕获套接字");
    assert!(socket.keepalive().expect("读取选项"));

    conduit.close().await.expect("关闭");
    listener.close().await.expect("关闭监听器");
}

#[tokio::test(flavor = "multi_thread")]
async fn control_hook_errors_abort_dial() {
    let dispatcher = dispatcher();
    let listener = listen_loopback(&dispatcher).await;

    let hook = ControlHook::new(|_, _, _| {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied by hook"))
    });
    let err = dispatcher
        .dial(
            &CallContext::default(),
            &NoConfig,
            listener.addr(),
            vec![Control(hook).into()],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConduitError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
    listener.close().await.expect("关闭监听器");
}

#[tokio::test(flavor = "multi_thread")]
async fn listen_reuse_addr_hook_overrides_user_control() {
    let dispatcher = dispatcher();
    let called: Arc<Mutex<bool>> = Arc::default();
    let hook = {
        let called = called.clone();
        ControlHook::new(move |_, _, _| {
            *called.lock().expect("标志锁") = true;
            Ok(())
        })
    };

    let listener = dispatcher
        .listen_str(
            &CallContext::default(),
            &NoConfig,
            "tcp://127.0.0.1:0",
            vec![Control(hook).into()],
        )
        .await
        .expect("监听");
    // 控制钩子后写覆盖先写，地址复用钩子追加在最后。
    assert!(!*called.lock().expect("标志锁"));

    listener.close().await.expect("关闭监听器");
}
