use std::io::{self, Cursor, Write};

use binrw::BinWrite;

use super::records::{DirectoryRecord, HeaderRecord, HeaderValueRecord};
use super::types::{HeaderKey, HeaderValue, Package, keys};
use super::{END_OF_HEADERS_VALUE, SIGNATURE};
use crate::error::FormatError;

/// 把 `Package` 编码为 KFN 字节。
///
/// 头部按迭代顺序写出，`ENDH` 总是最后写出，值保持原样。子文件偏移按写出顺序重新计算，
/// 所以对偏移不连续的原文件，结果不一定与原文件逐字节相同，但再次解码的结果相同。
///
/// 任何长度或偏移超出 32 位时返回 [`FormatError::Oversized`]。
pub fn encode(package: &Package) -> Result<Vec<u8>, FormatError> {
    let data_len: usize = package.subfiles.iter().map(|s| s.data.len()).sum();
    let mut writer = Cursor::new(Vec::with_capacity(data_len + 1024));

    SIGNATURE
        .write_le(&mut writer)
        .map_err(write_error(|| "文件签名".to_string()))?;

    for (key, value) in &package.headers {
        if *key == keys::END_OF_HEADERS {
            continue;
        }
        write_header(&mut writer, HeaderRecord::from((*key, value.clone())))?;
    }

    let end_value = package
        .header(keys::END_OF_HEADERS)
        .cloned()
        .unwrap_or(HeaderValue::Int(END_OF_HEADERS_VALUE));
    write_header(&mut writer, HeaderRecord::from((keys::END_OF_HEADERS, end_value)))?;

    let count = wire_len(package.subfiles.len() as u64, || "子文件数量".to_string())?;
    count
        .write_le(&mut writer)
        .map_err(write_error(|| "子文件数量".to_string()))?;

    let mut offset: u64 = 0;
    for (index, subfile) in package.subfiles.iter().enumerate() {
        let descriptor = &subfile.descriptor;
        let context = || format!("子文件 #{index} ('{}')", descriptor.name_lossy());
        let disk_len = subfile.data.len() as u64;

        wire_len(descriptor.name.len() as u64, || format!("{} 的名称", context()))?;
        let record = DirectoryRecord {
            name: descriptor.name.clone(),
            kind: descriptor.kind.tag(),
            unencrypted_len: descriptor.unencrypted_len,
            offset: wire_len(offset, || format!("{} 的偏移", context()))?,
            disk_len: wire_len(disk_len, || format!("{} 的数据", context()))?,
            encrypted: u32::from(descriptor.encrypted),
        };
        record.write_le(&mut writer).map_err(write_error(context))?;

        offset += disk_len;
    }

    for subfile in &package.subfiles {
        writer
            .write_all(&subfile.data)
            .map_err(|source| FormatError::Io {
                source,
                context: format!("子文件 '{}' 的数据", subfile.descriptor.name_lossy()),
            })?;
    }

    let out = writer.into_inner();
    log::debug!(
        "[KFN 编码] 写出 {} 个头部、{} 个子文件，共 {} 字节",
        package.headers.len(),
        package.subfiles.len(),
        out.len()
    );

    Ok(out)
}

/// 编码并写入任意输出。
pub fn encode_to_writer<W: Write>(package: &Package, mut writer: W) -> Result<(), FormatError> {
    let bytes = encode(package)?;
    writer
        .write_all(&bytes)
        .and_then(|()| writer.flush())
        .map_err(|source| FormatError::Io {
            source,
            context: "输出".to_string(),
        })
}

fn wire_len(len: u64, context: impl FnOnce() -> String) -> Result<u32, FormatError> {
    u32::try_from(len).map_err(|_| FormatError::Oversized {
        context: context(),
        len,
    })
}

fn write_header(writer: &mut Cursor<Vec<u8>>, record: HeaderRecord) -> Result<(), FormatError> {
    let key = HeaderKey(record.key);
    if let HeaderValueRecord::Bytes { data } = &record.value {
        wire_len(data.len() as u64, || format!("头部 '{key}'"))?;
    }
    record
        .write_le(writer)
        .map_err(write_error(|| format!("头部 '{key}'")))
}

fn write_error(context: impl FnOnce() -> String) -> impl FnOnce(binrw::Error) -> FormatError {
    move |err| {
        let source = match err {
            binrw::Error::Io(source) => source,
            other => io::Error::other(other.to_string()),
        };
        FormatError::Io {
            source,
            context: context(),
        }
    }
}
