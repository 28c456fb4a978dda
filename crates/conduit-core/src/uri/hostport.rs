use thiserror::Error;

/// `host:port` 文本无法拆分。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("address {addr}: {reason}")]
pub struct AddrError {
    pub addr: String,
    pub reason: &'static str,
}

impl AddrError {
    fn new(addr: &str, reason: &'static str) -> Self {
        Self {
            addr: addr.to_owned(),
            reason,
        }
    }
}

const MISSING_PORT: &str = "missing port in address";
const TOO_MANY_COLONS: &str = "too many colons in address";

/// 将 `host:port`、`[host]:port` 拆分为主机与端口文本。
///
/// 端口不要求是数字，服务名原样返回；IPv6 字面量必须使用方括号。
pub fn split_host_port(hostport: &str) -> Result<(&str, &str), AddrError> {
    let Some(colon) = hostport.rfind(':') else {
        return Err(AddrError::new(hostport, MISSING_PORT));
    };

    let (host, inner_start, inner_end) = if hostport.starts_with('[') {
        let Some(end) = hostport.find(']') else {
            return Err(AddrError::new(hostport, "missing ']' in address"));
        };
        if end + 1 == hostport.len() {
            return Err(AddrError::new(hostport, MISSING_PORT));
        }
        if end + 1 != colon {
            let reason = if hostport.as_bytes()[end + 1] == b':' {
                TOO_MANY_COLONS
            } else {
                MISSING_PORT
            };
            return Err(AddrError::new(hostport, reason));
        }
        (&hostport[1..end], 1, end + 1)
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return Err(AddrError::new(hostport, TOO_MANY_COLONS));
        }
        (host, 0, 0)
    };

    if hostport[inner_start..].contains('[') {
        return Err(AddrError::new(hostport, "unexpected '[' in address"));
    }
    if hostport[inner_end..].contains(']') {
        return Err(AddrError::new(hostport, "unexpected ']' in address"));
    }

    Ok((host, &hostport[colon + 1..]))
}

/// `split_host_port` 的逆操作；含冒号的主机（IPv6）自动加方括号。
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
