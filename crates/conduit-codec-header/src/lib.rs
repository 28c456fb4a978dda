#![warn(missing_docs)]

//! # conduit-codec-header
//!
//! ## 教案目的（Why）
//! - **定位**：conduit 上承载的 PDU 以 4 字节定长头部开头，协议扩展以 4 字节扩展头部开头；
//!   本 crate 负责二者与字节序列之间的互转。
//! - **架构角色**：位于 Conduit 之上、具体协议之下，只处理位域布局，不解释协议号与长度的业务含义。
//!
//! ## 交互契约（What）
//! - [`Header`]：字节 0 高 4 位为主版本号（不得超过 [`MAX_MAJOR`]），`0x08` 为应答位，`0x04` 为错误位；
//!   字节 1 为协议号；字节 2-3 为大端长度；
//! - [`ExtHeader`]：字节 0 的 `0x80`/`0x40`/`0x20` 分别为忽略、关闭、逐跳位；字节 1 为下一协议号；
//!   字节 2-3 为大端长度；
//! - 解码先检查输入长度再检查版本；编码先检查版本再检查输出长度。
//!
//! ## 风险提示（Trade-offs）
//! - 头部字节 0 的低 2 位与扩展头部字节 0 的低 5 位为保留位：解码时忽略，编码时写 0。

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// 定长头部字节数。
pub const HEADER_SIZE: usize = 4;
/// 扩展头部字节数。
pub const EXT_HEADER_SIZE: usize = 4;
/// 当前支持的最高主版本号。
pub const MAX_MAJOR: u8 = 0;

const MAJOR_MASK: u8 = 0xf0;
const MAJOR_SHIFT: u32 = 4;
const REPLY_BIT: u8 = 0x08;
const ERROR_BIT: u8 = 0x04;

const IGNORE_BIT: u8 = 0x80;
const CLOSE_BIT: u8 = 0x40;
const HOP_BIT: u8 = 0x20;

/// 头部编解码错误。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum HeaderError {
    /// 输入不足 4 字节。
    #[error("short input buffer")]
    ShortInput,
    /// 输出缓冲不足 4 字节。
    #[error("short output buffer")]
    ShortOutput,
    /// 主版本号超过 [`MAX_MAJOR`]。
    #[error("{version}: maximum version exceeded")]
    MaxVersionExceeded {
        /// 越界的主版本号。
        version: u8,
    },
}

/// PDU 定长头部。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Header {
    /// 主协议版本。
    pub major: u8,
    /// 应答标志。
    pub reply: bool,
    /// 错误标志。
    pub error: bool,
    /// 协议号。
    pub protocol: u8,
    /// 报文长度。
    pub length: u16,
}

impl Header {
    /// 从字节序列解码头部，返回头部与消耗的字节数。
    pub fn decode(data: &[u8]) -> Result<(Self, usize), HeaderError> {
        let Some(bytes) = data.first_chunk::<HEADER_SIZE>() else {
            return Err(HeaderError::ShortInput);
        };

        let version = (bytes[0] & MAJOR_MASK) >> MAJOR_SHIFT;
        if version > MAX_MAJOR {
            return Err(HeaderError::MaxVersionExceeded { version });
        }

        let header = Self {
            major: version,
            reply: bytes[0] & REPLY_BIT != 0,
            error: bytes[0] & ERROR_BIT != 0,
            protocol: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
        };
        Ok((header, HEADER_SIZE))
    }

    /// 将头部编码进 `out` 的前 4 字节，返回写入的字节数。
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, HeaderError> {
        let bytes = self.to_bytes()?;
        let Some(dst) = out.first_chunk_mut::<HEADER_SIZE>() else {
            return Err(HeaderError::ShortOutput);
        };
        *dst = bytes;
        Ok(HEADER_SIZE)
    }

    /// 将头部追加到 `buf` 末尾。
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), HeaderError> {
        buf.put_slice(&self.to_bytes()?);
        Ok(())
    }

    fn to_bytes(&self) -> Result<[u8; HEADER_SIZE], HeaderError> {
        if self.major > MAX_MAJOR {
            return Err(HeaderError::MaxVersionExceeded {
                version: self.major,
            });
        }

        let mut first = (self.major << MAJOR_SHIFT) & MAJOR_MASK;
        if self.reply {
            first |= REPLY_BIT;
        }
        if self.error {
            first |= ERROR_BIT;
        }
        let [hi, lo] = self.length.to_be_bytes();
        Ok([first, self.protocol, hi, lo])
    }
}

/// 协议扩展头部。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExtHeader {
    /// 不认识该扩展时可忽略。
    pub ignore: bool,
    /// 不认识该扩展时应关闭连接。
    pub close: bool,
    /// 扩展仅作用于当前一跳。
    pub hop_by_hop: bool,
    /// 下一协议号。
    pub protocol: u8,
    /// 扩展长度。
    pub length: u16,
}

impl ExtHeader {
    /// 从字节序列解码扩展头部，返回扩展头部与消耗的字节数。
    pub fn decode(data: &[u8]) -> Result<(Self, usize), HeaderError> {
        let Some(bytes) = data.first_chunk::<EXT_HEADER_SIZE>() else {
            return Err(HeaderError::ShortInput);
        };

        let header = Self {
            ignore: bytes[0] & IGNORE_BIT != 0,
            close: bytes[0] & CLOSE_BIT != 0,
            hop_by_hop: bytes[0] & HOP_BIT != 0,
            protocol: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
        };
        Ok((header, EXT_HEADER_SIZE))
    }

    /// 将扩展头部编码进 `out` 的前 4 字节，返回写入的字节数。
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, HeaderError> {
        let Some(dst) = out.first_chunk_mut::<EXT_HEADER_SIZE>() else {
            return Err(HeaderError::ShortOutput);
        };
        *dst = self.to_bytes();
        Ok(EXT_HEADER_SIZE)
    }

    /// 将扩展头部追加到 `buf` 末尾。
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.to_bytes());
    }

    fn to_bytes(&self) -> [u8; EXT_HEADER_SIZE] {
        let mut first = 0;
        if self.ignore {
            first |= IGNORE_BIT;
        }
        if self.close {
            first |= CLOSE_BIT;
        }
        if self.hop_by_hop {
            first |= HOP_BIT;
        }
        let [hi, lo] = self.length.to_be_bytes();
        [first, self.protocol, hi, lo]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_round_trip() {
        let header = Header {
            major: 0,
            reply: true,
            error: false,
            protocol: 0x17,
            length: 0x01ff,
        };
        let mut buf = [0u8; HEADER_SIZE];
        assert_eq!(header.encode(&mut buf), Ok(HEADER_SIZE));
        assert_eq!(buf, [0x08, 0x17, 0x01, 0xff]);
        assert_eq!(Header::decode(&buf), Ok((header, HEADER_SIZE)));
    }

    #[test]
    fn header_decode_failures() {
        assert_eq!(Header::decode(&[0x00, 0x17, 0x01]), Err(HeaderError::ShortInput));
        assert_eq!(
            Header::decode(&[0x10, 0x17, 0x01, 0xff]),
            Err(HeaderError::MaxVersionExceeded { version: 1 })
        );
        // 长度检查先于版本检查。
        assert_eq!(Header::decode(&[0xf0]), Err(HeaderError::ShortInput));
    }

    #[test]
    fn header_encode_failures() {
        let mut short = [0u8; 3];
        assert_eq!(Header::default().encode(&mut short), Err(HeaderError::ShortOutput));

        let future = Header {
            major: 2,
            ..Header::default()
        };
        // 版本检查先于长度检查。
        assert_eq!(
            future.encode(&mut short),
            Err(HeaderError::MaxVersionExceeded { version: 2 })
        );
        assert_eq!(
            future.encode_to(&mut BytesMut::new()),
            Err(HeaderError::MaxVersionExceeded { version: 2 })
        );
        assert_eq!(
            HeaderError::MaxVersionExceeded { version: 2 }.to_string(),
            "2: maximum version exceeded"
        );
    }

    #[test]
    fn header_ignores_reserved_bits_and_trailing_bytes() {
        let (header, used) = Header::decode(&[0x0f, 0x01, 0x00, 0x04, 0xaa, 0xbb]).expect("合法头部");
        assert_eq!(used, HEADER_SIZE);
        assert!(header.reply && header.error);
        assert_eq!(header.length, 4);
    }

    #[test]
    fn ext_header_layout() {
        let ext = ExtHeader {
            ignore: true,
            close: false,
            hop_by_hop: true,
            protocol: 0x42,
            length: 0x1234,
        };
        // 预先填充的脏字节不会残留在编码结果中。
        let mut buf = [0xffu8; 6];
        assert_eq!(ext.encode(&mut buf), Ok(EXT_HEADER_SIZE));
        assert_eq!(&buf[..EXT_HEADER_SIZE], &[0xa0, 0x42, 0x12, 0x34]);
        assert_eq!(ExtHeader::decode(&buf), Ok((ext, EXT_HEADER_SIZE)));

        assert_eq!(ExtHeader::decode(&buf[..2]), Err(HeaderError::ShortInput));
        assert_eq!(ext.encode(&mut [0u8; 2]), Err(HeaderError::ShortOutput));
    }

    #[test]
    fn encode_to_appends() {
        let mut buf = BytesMut::from(&b"pre"[..]);
        Header {
            protocol: 1,
            length: 2,
            ..Header::default()
        }
        .encode_to(&mut buf)
        .expect("合法版本");
        ExtHeader {
            close: true,
            ..ExtHeader::default()
        }
        .encode_to(&mut buf);
        assert_eq!(&buf[..], b"pre\x00\x01\x00\x02\x40\x00\x00\x00");
    }

    proptest! {
        #[test]
        fn prop_first_byte_flags_survive_decode(byte in any::<u8>(), rest in any::<[u8; 3]>()) {
            let input = [byte, rest[0], rest[1], rest[2]];
            match Header::decode(&input) {
                Ok((header, _)) => {
                    prop_assert_eq!(byte >> 4, 0);
                    let mut out = [0u8; HEADER_SIZE];
                    header.encode(&mut out).expect("已解码的头部可再编码");
                    prop_assert_eq!(out, [byte & 0xfc, rest[0], rest[1], rest[2]]);
                }
                Err(err) => prop_assert_eq!(err, HeaderError::MaxVersionExceeded { version: byte >> 4 }),
            }
        }
    }
}
