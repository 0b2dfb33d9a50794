use std::io::{Read, Seek};

use super::SIGNATURE;
use super::records::{DirectoryRecord, HeaderRecord};
use super::source::{ByteSource, Position, SeekSource, SliceSource};
use super::types::{HeaderKey, HeaderValue, Package, Subfile, SubfileDescriptor, keys};
use crate::error::FormatError;

/// 解码完整读入内存的 KFN 数据。
pub fn decode(buffer: &[u8]) -> Result<Package, FormatError> {
    decode_from_source(&mut SliceSource::new(buffer))
}

/// 以顺序读取模式解码 KFN，适用于不便整体读入内存的大文件。
pub fn decode_from_reader<R: Read + Seek>(reader: R) -> Result<Package, FormatError> {
    let mut source = SeekSource::new(reader)?;
    decode_from_source(&mut source)
}

/// 从任意字节来源解码 KFN。
pub fn decode_from_source<S: ByteSource>(source: &mut S) -> Result<Package, FormatError> {
    let pos = read_signature(source, Position::START)?;
    let (headers, pos) = read_headers(source, pos)?;
    let (descriptors, data_start) = read_directory(source, pos)?;

    log::debug!(
        "[KFN 解码] 读取了 {} 个头部、{} 个子文件条目，数据区起点 {}",
        headers.len(),
        descriptors.len(),
        data_start.offset()
    );

    let subfiles = read_subfiles(source, data_start, descriptors)?;
    Ok(Package { headers, subfiles })
}

fn read_signature<S: ByteSource>(source: &mut S, pos: Position) -> Result<Position, FormatError> {
    let (found, next) = source
        .read_record::<[u8; 4]>(pos)
        .map_err(|e| e.with_context("文件签名"))?;
    if &found != SIGNATURE {
        return Err(FormatError::BadSignature { found });
    }
    Ok(next)
}

fn read_headers<S: ByteSource>(
    source: &mut S,
    mut pos: Position,
) -> Result<(Vec<(HeaderKey, HeaderValue)>, Position), FormatError> {
    let mut headers = Vec::new();

    loop {
        let (record, next) = match source.read_record::<HeaderRecord>(pos) {
            Ok(read) => read,
            Err(err) => return Err(header_error(source, pos, headers.len(), err)),
        };
        let (key, value): (HeaderKey, HeaderValue) = record.into();

        log::trace!("[KFN 解码] 头部 {key} = {value}");
        headers.push((key, value));
        pos = next;

        if key == keys::END_OF_HEADERS {
            return Ok((headers, pos));
        }
    }
}

/// 给头部读取错误补上键名。类型标志不是 1 或 2 时报告 `UnexpectedHeaderFlag`。
fn header_error<S: ByteSource>(
    source: &mut S,
    pos: Position,
    index: usize,
    err: FormatError,
) -> FormatError {
    let Ok(([k0, k1, k2, k3, flag], _)) = source.read_record::<[u8; 5]>(pos) else {
        return err.with_context(format!("第 {} 个头部", index + 1));
    };
    let key = HeaderKey([k0, k1, k2, k3]);
    match err {
        FormatError::Malformed { .. } if flag != 1 && flag != 2 => {
            FormatError::UnexpectedHeaderFlag { key, flag }
        }
        other => other.with_context(format!("头部 '{key}'")),
    }
}

fn read_directory<S: ByteSource>(
    source: &mut S,
    pos: Position,
) -> Result<(Vec<SubfileDescriptor>, Position), FormatError> {
    let (count, mut pos) = source
        .read_record::<u32>(pos)
        .map_err(|e| e.with_context("子文件数量"))?;

    // 每个条目至少占 24 字节，先检查一下，避免伪造的数量导致过量分配
    source
        .ensure_available(pos, u64::from(count) * 24)
        .map_err(|e| e.with_context(format!("{count} 个子文件条目")))?;

    let mut descriptors = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let (record, next) = source
            .read_record::<DirectoryRecord>(pos)
            .map_err(|e| e.with_context(format!("子文件 #{index} 的目录条目")))?;
        descriptors.push(SubfileDescriptor::from(record));
        pos = next;
    }

    Ok((descriptors, pos))
}

fn read_subfiles<S: ByteSource>(
    source: &mut S,
    data_start: Position,
    descriptors: Vec<SubfileDescriptor>,
) -> Result<Vec<Subfile>, FormatError> {
    descriptors
        .into_iter()
        .enumerate()
        .map(|(index, descriptor)| {
            // 偏移量以存储值为准，不假设连续或有序
            let at = data_start.advance(u64::from(descriptor.offset));
            let (data, _) = source
                .read_bytes(at, u64::from(descriptor.disk_len))
                .map_err(|e| {
                    e.with_context(format!(
                        "子文件 #{index} ('{}') 的数据",
                        descriptor.name_lossy()
                    ))
                })?;
            Ok(Subfile { descriptor, data })
        })
        .collect()
}
