//! # KFN 容器编解码
//!
//! 文件布局（整数均为小端无符号）：
//!
//! ```text
//! "KFNB"
//! { 键(4) 标志(1) 值 }*          标志 1 = u32，标志 2 = 长度(4) + 字节串，以 "ENDH" 结束
//! 子文件数量(4)
//! { 名称长度(4) 名称 类型(4) 未加密长度(4) 偏移(4) 实际长度(4) 加密标志(4) }*
//! 数据区                          各子文件按偏移（相对数据区起点）寻址
//! ```

pub mod reader;
pub mod records;
pub mod source;
pub mod types;
pub mod writer;

pub use reader::{decode, decode_from_reader, decode_from_source};
pub use source::{ByteSource, Position, SeekSource, SliceSource};
pub use types::{HeaderKey, HeaderValue, Package, Subfile, SubfileDescriptor, SubfileType, keys};
pub use writer::{encode, encode_to_writer};

pub(crate) const SIGNATURE: &[u8; 4] = b"KFNB";
pub(crate) const END_OF_HEADERS_VALUE: u32 = 0xFFFF_FFFF;
