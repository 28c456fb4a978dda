//! 通用 URL 拆分。
//!
//! 按 `scheme:[//[user@]host][path][?query][#fragment]` 的顺序拆解原始字符串，主机部分保留
//! `host[:port]` 原文。与 RFC 3986 解析器不同，端口部分允许出现服务名（例如 `:http`），
//! 以便规范化阶段按传输协议查询服务端口。

use thiserror::Error;

/// URL 语法错误。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("missing protocol scheme")]
    MissingScheme,
    #[error("invalid control character in URL")]
    ControlCharacter,
    #[error("first path segment in URL cannot contain colon")]
    ColonInFirstSegment,
    #[error("missing ']' in host {host:?}")]
    MissingBracket { host: String },
    #[error("invalid character {found:?} in host {host:?}")]
    InvalidHost { host: String, found: char },
}

/// 拆分后的通用组件，字段语义与 [`crate::Uri`] 对应字段一致。
#[derive(Debug, Default)]
pub(crate) struct Components {
    pub scheme: String,
    pub opaque: String,
    pub user: Option<String>,
    pub host: String,
    pub path: String,
    pub raw_query: String,
    pub force_query: bool,
    pub fragment: String,
}

pub(crate) fn split_components(raw: &str) -> Result<Components, ParseError> {
    if raw.chars().any(|c| c.is_ascii_control()) {
        return Err(ParseError::ControlCharacter);
    }

    let mut out = Components::default();

    let rest = match raw.split_once('#') {
        Some((head, fragment)) => {
            out.fragment = fragment.to_owned();
            head
        }
        None => raw,
    };

    let (scheme, rest) = split_scheme(rest)?;
    out.scheme = scheme.to_ascii_lowercase();

    let rest = if rest.ends_with('?') && rest.matches('?').count() == 1 {
        out.force_query = true;
        &rest[..rest.len() - 1]
    } else {
        match rest.split_once('?') {
            Some((head, query)) => {
                out.raw_query = query.to_owned();
                head
            }
            None => rest,
        }
    };

    if !rest.starts_with('/') {
        if !out.scheme.is_empty() {
            // `scheme:opaque` 形式，不再继续拆解。
            out.opaque = rest.to_owned();
            return Ok(out);
        }
        let first_segment = rest.split('/').next().unwrap_or_default();
        if first_segment.contains(':') {
            return Err(ParseError::ColonInFirstSegment);
        }
    }

    let rest = match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find('/').unwrap_or(after.len());
            let (authority, path) = after.split_at(end);
            let (user, host) = split_authority(authority)?;
            out.user = user;
            out.host = host;
            path
        }
        None => rest,
    };
    out.path = rest.to_owned();

    Ok(out)
}

fn split_scheme(raw: &str) -> Result<(&str, &str), ParseError> {
    for (idx, c) in raw.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if idx > 0 => {}
            ':' if idx == 0 => return Err(ParseError::MissingScheme),
            ':' => return Ok((&raw[..idx], &raw[idx + 1..])),
            // 非法字符出现在冒号之前：整体视为无 scheme 的相对引用。
            _ => return Ok(("", raw)),
        }
    }
    Ok(("", raw))
}

fn split_authority(authority: &str) -> Result<(Option<String>, String), ParseError> {
    let (user, host) = match authority.rfind('@') {
        Some(idx) => (
            Some(authority[..idx].to_owned()),
            &authority[idx + 1..],
        ),
        None => (None, authority),
    };
    validate_host(host)?;
    Ok((user, host.to_owned()))
}

fn validate_host(host: &str) -> Result<(), ParseError> {
    if let Some(after) = host.strip_prefix('[') {
        let Some(close) = after.find(']') else {
            return Err(ParseError::MissingBracket {
                host: host.to_owned(),
            });
        };
        let tail = &after[close + 1..];
        if !tail.is_empty() && !tail.starts_with(':') {
            return Err(ParseError::InvalidHost {
                host: host.to_owned(),
                found: tail.chars().next().unwrap_or(']'),
            });
        }
        return Ok(());
    }

    match host
        .chars()
        .find(|c| matches!(c, ' ' | '[' | ']' | '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`'))
    {
        Some(found) => Err(ParseError::InvalidHost {
            host: host.to_owned(),
            found,
        }),
        None => Ok(()),
    }
}
