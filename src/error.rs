use std::io;

use thiserror::Error;

use crate::container::HeaderKey;

/// KFN 容器编解码过程中可能发生的错误。
#[derive(Debug, Error)]
pub enum FormatError {
    /// 文件头4字节不是 `KFNB`。
    #[error("无效的 KFN 签名: {found:02X?}")]
    BadSignature { found: [u8; 4] },

    /// 头部条目的类型标志既不是 1 (整数) 也不是 2 (字节串)。
    #[error("头部 '{key}' 的类型标志未知: {flag}")]
    UnexpectedHeaderFlag { key: HeaderKey, flag: u8 },

    /// 某个字段声明的长度超出了输入范围。
    #[error("输入被截断: 在偏移 {offset} 处读取 {context} 需要 {wanted} 字节")]
    TruncatedInput {
        offset: u64,
        wanted: u64,
        context: String,
    },

    /// 记录的内容无法按 KFN 格式解析。
    #[error("在偏移 {offset} 处解析 {context} 失败: {message}")]
    Malformed {
        offset: u64,
        message: String,
        context: String,
    },

    /// 编码时某个长度或偏移超出了 32 位字段的范围。
    #[error("{context} 的长度 {len} 超出 32 位范围")]
    Oversized { context: String, len: u64 },

    /// 底层读取器或写入器返回的 IO 错误。
    #[error("处理 {context} 时发生 IO 错误: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: String,
    },
}

impl FormatError {
    /// 给错误补充上下文（头部键名或子文件序号）。
    #[must_use]
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            Self::TruncatedInput { offset, wanted, .. } => Self::TruncatedInput {
                offset,
                wanted,
                context,
            },
            Self::Malformed {
                offset, message, ..
            } => Self::Malformed {
                offset,
                message,
                context,
            },
            Self::Io { source, .. } => Self::Io { source, context },
            other => other,
        }
    }
}

/// 解锁过程中的致命错误。任何一个发生时，整个解锁都不会生效。
#[derive(Debug, Error)]
pub enum UnlockError {
    /// `FLID` 头部存在，但长度不是16字节或不是字节串。
    #[error("无效的解锁密钥: 需要16字节，实际为 {len} 字节")]
    InvalidKey { len: usize },

    /// 某个子文件解密失败。
    #[error("子文件 #{index} ('{name}') 解密失败: {reason}")]
    CryptoFailure {
        index: usize,
        name: String,
        reason: String,
    },
}

/// `Song.ini` 无法按 INI 解析。只影响该子文件的规范化步骤。
#[derive(Debug, Error)]
#[error("子文件 #{index} 的歌曲配置无法解析: {source}")]
pub struct SongConfigError {
    pub index: usize,
    #[source]
    pub source: ini::Error,
}

/// 同步格式中无法解析的一行。该行会被跳过，所在的效果段继续解析。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("效果段 Eff{section} 第 {line_num} 行格式错误: {message}")]
pub struct SyncLineError {
    pub section: u32,
    pub line_num: usize,
    pub message: String,
}

/// 面向命令行和文件级辅助函数的统一错误类型。
#[derive(Debug, Error)]
pub enum KfnError {
    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),

    #[error("KFN 格式错误: {0}")]
    Format(#[from] FormatError),

    #[error("解锁失败: {0}")]
    Unlock(#[from] UnlockError),

    #[error("配置文件错误: {0}")]
    Settings(#[from] ini::Error),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("错误: {0}")]
    Custom(String),
}

pub type Result<T, E = KfnError> = std::result::Result<T, E>;
