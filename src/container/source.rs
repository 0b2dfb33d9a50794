//! 字节来源抽象。
//!
//! 解码算法只依赖 [`ByteSource`]，因此同一份代码既可以处理完整读入内存的缓冲区
//! ([`SliceSource`])，也可以处理可随机访问的文件句柄 ([`SeekSource`])。
//!
//! 读取位置用不可变的 [`Position`] 显式传递：每次读取返回读到的值和新的位置，
//! 下一次读取必须使用上一次返回的位置。

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use super::records::{Record, Shortfall, decisive_error};
use crate::error::FormatError;

/// 输入中的读取位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position(u64);

impl Position {
    pub const START: Self = Self(0);

    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn advance(self, len: u64) -> Self {
        Self(self.0 + len)
    }
}

fn io_error(source: io::Error) -> FormatError {
    FormatError::Io {
        source,
        context: String::new(),
    }
}

/// 把 binrw 的错误转换为 [`FormatError`]。`at` 是记录的起点。
fn record_error(err: binrw::Error, at: Position, min_len: u64) -> FormatError {
    let err = decisive_error(err);
    if let Some(Shortfall { wanted }) = err.custom_err::<Shortfall>().copied() {
        let offset = match err {
            binrw::Error::Custom { pos, .. } => pos,
            _ => at.offset(),
        };
        return FormatError::TruncatedInput {
            offset,
            wanted,
            context: String::new(),
        };
    }

    match err {
        binrw::Error::Io(source) if source.kind() == io::ErrorKind::UnexpectedEof => {
            FormatError::TruncatedInput {
                offset: at.offset(),
                wanted: min_len,
                context: String::new(),
            }
        }
        binrw::Error::Io(source) => io_error(source),
        other => FormatError::Malformed {
            offset: at.offset(),
            message: other.to_string(),
            context: String::new(),
        },
    }
}

/// 能在指定位置读取数据的字节来源。
pub trait ByteSource {
    type Reader: Read + Seek;

    /// 输入的总长度。
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 把内部读取器移动到 `pos`，交给调用方读取。
    fn reader_at(&mut self, pos: Position) -> Result<&mut Self::Reader, FormatError>;

    /// 越界检查。在分配缓冲区之前调用，避免被伪造的长度字段拖垮。
    fn ensure_available(&self, pos: Position, wanted: u64) -> Result<(), FormatError> {
        match pos.offset().checked_add(wanted) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(FormatError::TruncatedInput {
                offset: pos.offset(),
                wanted,
                context: String::new(),
            }),
        }
    }

    /// 在 `pos` 处读取一个记录，返回记录和记录之后的位置。
    fn read_record<T: Record>(&mut self, pos: Position) -> Result<(T, Position), FormatError>
    where
        Self: Sized,
    {
        self.ensure_available(pos, T::MIN_LEN)?;
        let reader = self.reader_at(pos)?;
        let record = T::read_from(reader).map_err(|e| record_error(e, pos, T::MIN_LEN))?;
        let next = reader.stream_position().map_err(io_error)?;
        Ok((record, Position::new(next)))
    }

    /// 读取一段原始字节，例如子文件的数据。
    fn read_bytes(&mut self, pos: Position, len: u64) -> Result<(Vec<u8>, Position), FormatError>
    where
        Self: Sized,
    {
        self.ensure_available(pos, len)?;
        let reader = self.reader_at(pos)?;
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).map_err(io_error)?;
        Ok((buf, pos.advance(len)))
    }
}

/// 完整读入内存的输入。
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> SliceSource<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl<'a> ByteSource for SliceSource<'a> {
    type Reader = Cursor<&'a [u8]>;

    fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    fn reader_at(&mut self, pos: Position) -> Result<&mut Self::Reader, FormatError> {
        self.cursor.set_position(pos.offset());
        Ok(&mut self.cursor)
    }
}

/// 基于可随机访问读取器的顺序读取模式，适用于无法整体读入内存的大文件。
///
/// 每次读取都依赖上一次读取的结果（例如先读长度再读内容），所以只能串行进行。
#[derive(Debug)]
pub struct SeekSource<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> SeekSource<R> {
    pub fn new(mut inner: R) -> Result<Self, FormatError> {
        let len = inner
            .seek(SeekFrom::End(0))
            .map_err(|source| FormatError::Io {
                source,
                context: "输入长度".to_string(),
            })?;
        inner
            .seek(SeekFrom::Start(0))
            .map_err(|source| FormatError::Io {
                source,
                context: "输入起点".to_string(),
            })?;
        Ok(Self { inner, len })
    }

    /// 读取器当前所在的位置。
    pub fn stream_position(&mut self) -> Result<u64, FormatError> {
        self.inner.stream_position().map_err(io_error)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for SeekSource<R> {
    type Reader = R;

    fn len(&self) -> u64 {
        self.len
    }

    fn reader_at(&mut self, pos: Position) -> Result<&mut R, FormatError> {
        // 以读取器报告的实际位置为准，失败的读取之后也不会错位
        if self.inner.stream_position().map_err(io_error)? != pos.offset() {
            self.inner
                .seek(SeekFrom::Start(pos.offset()))
                .map_err(io_error)?;
        }
        Ok(&mut self.inner)
    }
}
