//! 名称解析接缝：主机名正向查询与服务名端口查询。
//!
//! [`Dispatcher::canonicalize`](crate::Dispatcher::canonicalize) 通过 [`Resolver`] 完成
//! 非字面量主机与非数字端口的解析；测试可注入自定义实现，生产环境默认使用
//! [`SystemResolver`]（需要 `runtime-tokio` 特性）。
//!
//! 解析失败以原生 [`io::Error`] 返回，分发器不做二次包装。

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

/// 名称解析器。
#[async_trait]
pub trait Resolver: Send + Sync {
    /// 查询主机名对应的全部 IP，顺序由解析器决定；可以返回空列表。
    async fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>>;

    /// 查询服务名在 `network`（通常是 URI 的传输名）下的端口。
    async fn lookup_port(&self, network: &str, service: &str) -> io::Result<u16>;
}

#[cfg(feature = "runtime-tokio")]
pub use system::SystemResolver;

#[cfg(feature = "runtime-tokio")]
mod system {
    use std::io;
    use std::net::IpAddr;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use tracing::trace;

    use super::Resolver;

    const SERVICES_PATH: &str = "/etc/services";

    /// 系统服务数据库缺失时使用的内置服务表。
    const WELL_KNOWN: &[(&str, &str, u16)] = &[
        ("tcp", "ftp", 21),
        ("tcp", "ftps", 990),
        ("tcp", "gopher", 70),
        ("tcp", "http", 80),
        ("tcp", "https", 443),
        ("tcp", "imap2", 143),
        ("tcp", "imap3", 220),
        ("tcp", "imaps", 993),
        ("tcp", "pop3", 110),
        ("tcp", "pop3s", 995),
        ("tcp", "smtp", 25),
        ("tcp", "submissions", 465),
        ("tcp", "ssh", 22),
        ("tcp", "telnet", 23),
        ("udp", "domain", 53),
    ];

    /// 基于 Tokio 的系统解析器。
    ///
    /// - 主机名经 `tokio::net::lookup_host` 查询，结果按首次出现顺序去重；
    /// - 服务名先查服务数据库文件（默认 `/etc/services`），未命中再查内置表。
    #[derive(Clone, Debug)]
    pub struct SystemResolver {
        services: PathBuf,
    }

    impl Default for SystemResolver {
        fn default() -> Self {
            Self {
                services: PathBuf::from(SERVICES_PATH),
            }
        }
    }

    impl SystemResolver {
        pub fn new() -> Self {
            Self::default()
        }

        /// 使用指定路径的服务数据库。
        pub fn with_services_file(path: impl AsRef<Path>) -> Self {
            Self {
                services: path.as_ref().to_path_buf(),
            }
        }
    }

    #[async_trait]
    impl Resolver for SystemResolver {
        async fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            let mut ips: Vec<IpAddr> = Vec::new();
            for addr in tokio::net::lookup_host((host, 0)).await? {
                if !ips.contains(&addr.ip()) {
                    ips.push(addr.ip());
                }
            }
            trace!(host, count = ips.len(), "resolved host");
            Ok(ips)
        }

        async fn lookup_port(&self, network: &str, service: &str) -> io::Result<u16> {
            let protocols = protocols_for(network)?;
            // 空服务名等价于端口 0。
            if service.is_empty() {
                return Ok(0);
            }
            let service = service.to_ascii_lowercase();

            match tokio::fs::read_to_string(&self.services).await {
                Ok(text) => {
                    for proto in protocols {
                        if let Some(port) = find_service(&text, proto, &service) {
                            return Ok(port);
                        }
                    }
                }
                Err(err) => {
                    trace!(path = %self.services.display(), error = %err, "services database unavailable");
                }
            }

            protocols
                .iter()
                .find_map(|proto| well_known(proto, &service))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("unknown port {network}/{service}"),
                    )
                })
        }
    }

    fn protocols_for(network: &str) -> io::Result<&'static [&'static str]> {
        match network {
            "tcp" | "tcp4" | "tcp6" => Ok(&["tcp"]),
            "udp" | "udp4" | "udp6" => Ok(&["udp"]),
            "" => Ok(&["tcp", "udp"]),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown network {other}"),
            )),
        }
    }

    fn well_known(proto: &str, service: &str) -> Option<u16> {
        WELL_KNOWN
            .iter()
            .find(|(p, name, _)| *p == proto && *name == service)
            .map(|(_, _, port)| *port)
    }

    /// 在 services(5) 格式的文本中查找 `service/proto` 的端口，别名同样匹配。
    pub(super) fn find_service(text: &str, proto: &str, service: &str) -> Option<u16> {
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, entry_proto)) = port_proto.split_once('/') else {
                continue;
            };
            if entry_proto != proto {
                continue;
            }
            let Ok(port) = port.parse::<u16>() else {
                continue;
            };
            if name.eq_ignore_ascii_case(service)
                || fields.any(|alias| alias.eq_ignore_ascii_case(service))
            {
                return Some(port);
            }
        }
        None
    }

}
