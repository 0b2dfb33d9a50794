//! KFN 文件中的定长/带长度前缀的记录，用 `binrw` 描述。
//!
//! 这里只是线上格式，解码器把它们转换为 [`super::types`] 中的类型。

use std::io::{Read, Seek, SeekFrom};

use binrw::{BinRead, BinResult, binrw};

use super::types::{HeaderKey, HeaderValue, SubfileDescriptor, SubfileType};

/// 长度字段声明的字节数超过了输入剩余的字节数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Shortfall {
    pub wanted: u64,
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "需要 {} 字节，输入不足", self.wanted)
    }
}

/// 读取 `len` 字节。先和剩余长度比较，伪造的长度不会导致过量分配。
#[binrw::parser(reader)]
fn bounded_bytes(len: u32) -> BinResult<Vec<u8>> {
    let start = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;

    let wanted = u64::from(len);
    if end.saturating_sub(start) < wanted {
        return Err(binrw::Error::Custom {
            pos: start,
            err: Box::new(Shortfall { wanted }),
        });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// 头部条目：4字节键，后面是由类型标志决定的值。
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub key: [u8; 4],
    pub value: HeaderValueRecord,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValueRecord {
    #[brw(magic(1u8))]
    Int(u32),
    #[brw(magic(2u8))]
    Bytes {
        #[bw(try_calc = u32::try_from(data.len()))]
        len: u32,
        #[br(parse_with = bounded_bytes, args(len))]
        data: Vec<u8>,
    },
}

/// 目录中的一个子文件条目。
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    #[bw(try_calc = u32::try_from(name.len()))]
    name_len: u32,
    #[br(parse_with = bounded_bytes, args(name_len))]
    pub name: Vec<u8>,
    pub kind: u32,
    pub unencrypted_len: u32,
    pub offset: u32,
    pub disk_len: u32,
    pub encrypted: u32,
}

impl From<(HeaderKey, HeaderValue)> for HeaderRecord {
    fn from((key, value): (HeaderKey, HeaderValue)) -> Self {
        let value = match value {
            HeaderValue::Int(v) => HeaderValueRecord::Int(v),
            HeaderValue::Bytes(data) => HeaderValueRecord::Bytes { data },
        };
        Self {
            key: *key.as_bytes(),
            value,
        }
    }
}

impl From<HeaderRecord> for (HeaderKey, HeaderValue) {
    fn from(record: HeaderRecord) -> Self {
        let value = match record.value {
            HeaderValueRecord::Int(v) => HeaderValue::Int(v),
            HeaderValueRecord::Bytes { data } => HeaderValue::Bytes(data),
        };
        (HeaderKey(record.key), value)
    }
}

impl From<DirectoryRecord> for SubfileDescriptor {
    fn from(record: DirectoryRecord) -> Self {
        Self {
            name: record.name,
            kind: SubfileType::from_tag(record.kind),
            unencrypted_len: record.unencrypted_len,
            offset: record.offset,
            disk_len: record.disk_len,
            encrypted: record.encrypted != 0,
        }
    }
}

/// 能从 [`super::ByteSource`] 中读取的记录。
pub trait Record: Sized {
    /// 记录至少占用的字节数，读取前先检查
    const MIN_LEN: u64;

    fn read_from<R: Read + Seek>(reader: &mut R) -> BinResult<Self>;
}

macro_rules! impl_record {
    ($ty:ty, $min_len:expr) => {
        impl Record for $ty {
            const MIN_LEN: u64 = $min_len;

            fn read_from<R: Read + Seek>(reader: &mut R) -> BinResult<Self> {
                <$ty>::read_le(reader)
            }
        }
    };
}

impl_record!(u32, 4);
impl_record!([u8; 4], 4);
impl_record!([u8; 5], 5);
// 键(4) 标志(1) 整数或长度(4)
impl_record!(HeaderRecord, 9);
// 名称长度(4) 类型(4) 未加密长度(4) 偏移(4) 实际长度(4) 加密标志(4)
impl_record!(DirectoryRecord, 24);

/// 找出真正导致失败的错误：展开回溯信息，并从枚举的各个分支中挑出签名匹配后才失败的那个。
/// 所有分支的签名都不匹配时返回 `NoVariantMatch`。
pub(crate) fn decisive_error(err: binrw::Error) -> binrw::Error {
    match err {
        binrw::Error::Backtrace(backtrace) => decisive_error(*backtrace.error),
        binrw::Error::EnumErrors { pos, variant_errors } => {
            let mut errors: Vec<binrw::Error> = variant_errors
                .into_iter()
                .map(|(_, e)| decisive_error(e))
                .collect();
            match errors
                .iter()
                .position(|e| !matches!(e, binrw::Error::BadMagic { .. }))
            {
                Some(index) => errors.swap_remove(index),
                None => binrw::Error::NoVariantMatch { pos },
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinWrite;
    use std::io::Cursor;

    #[test]
    fn test_header_record_layout() {
        let record = HeaderRecord::from((HeaderKey::new(b"TITL"), HeaderValue::Bytes(b"ab".to_vec())));
        let mut writer = Cursor::new(Vec::new());
        record.write_le(&mut writer).unwrap();
        assert_eq!(writer.into_inner(), b"TITL\x02\x02\x00\x00\x00ab");

        let decoded = HeaderRecord::read_le(&mut Cursor::new(b"DIFM\x01\x03\x00\x00\x00")).unwrap();
        assert_eq!(
            <(HeaderKey, HeaderValue)>::from(decoded),
            (HeaderKey::new(b"DIFM"), HeaderValue::Int(3))
        );
    }

    #[test]
    fn test_unknown_flag_fails_on_magic() {
        let err = HeaderRecord::read_le(&mut Cursor::new(b"TITL\x07\x00\x00\x00\x00")).unwrap_err();
        let err = decisive_error(err);
        assert!(
            matches!(err, binrw::Error::NoVariantMatch { .. }),
            "收到的错误: {err:?}"
        );
    }

    #[test]
    fn test_oversized_length_reports_shortfall() {
        let data = b"ARTS\x02\xFF\xFF\xFF\x7Fshort";
        let err = HeaderRecord::read_le(&mut Cursor::new(data)).unwrap_err();
        let shortfall = decisive_error(err).custom_err::<Shortfall>().copied();
        assert_eq!(shortfall, Some(Shortfall { wanted: 0x7FFF_FFFF }));
    }

    #[test]
    fn test_directory_record_layout() {
        let record = DirectoryRecord {
            name: b"a.mp3".to_vec(),
            kind: 2,
            unencrypted_len: 10,
            offset: 7,
            disk_len: 16,
            encrypted: 1,
        };
        let mut writer = Cursor::new(Vec::new());
        record.write_le(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 24 + 5);
        assert_eq!(&bytes[..9], b"\x05\x00\x00\x00a.mp3");

        let decoded = DirectoryRecord::read_le(&mut Cursor::new(&bytes)).unwrap();
        let descriptor = SubfileDescriptor::from(decoded);
        assert_eq!(descriptor.kind, SubfileType::Audio);
        assert_eq!(descriptor.offset, 7);
        assert!(descriptor.encrypted);
    }
}
