use std::fmt;

use crate::utils::latin1_to_string;

/// 头部条目的4字节 ASCII 键，例如 `TITL`、`FLID`。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderKey(pub [u8; 4]);

impl HeaderKey {
    #[must_use]
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&latin1_to_string(&self.0))
    }
}

impl fmt::Debug for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeaderKey({:?})", latin1_to_string(&self.0))
    }
}

impl From<&[u8; 4]> for HeaderKey {
    fn from(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }
}

/// 常见的头部键。
pub mod keys {
    use super::HeaderKey;

    pub const TITLE: HeaderKey = HeaderKey::new(b"TITL");
    pub const ARTIST: HeaderKey = HeaderKey::new(b"ARTS");
    pub const ALBUM: HeaderKey = HeaderKey::new(b"ALBM");
    pub const COMPOSER: HeaderKey = HeaderKey::new(b"COMP");
    pub const GENRE: HeaderKey = HeaderKey::new(b"GNRE");
    pub const YEAR: HeaderKey = HeaderKey::new(b"YEAR");
    pub const SOURCE: HeaderKey = HeaderKey::new(b"SORC");
    pub const TRACK: HeaderKey = HeaderKey::new(b"TRAK");
    pub const LANGUAGE: HeaderKey = HeaderKey::new(b"LANG");
    pub const COPYRIGHT: HeaderKey = HeaderKey::new(b"COPY");
    pub const COMMENT: HeaderKey = HeaderKey::new(b"COMM");
    pub const KARAOKE_VERSION: HeaderKey = HeaderKey::new(b"KARV");
    pub const VOCAL_GUIDE: HeaderKey = HeaderKey::new(b"VOCV");
    /// 解锁密钥，16字节。全零表示未加密或已解锁。
    pub const UNLOCK_KEY: HeaderKey = HeaderKey::new(b"FLID");
    /// 发布权限标志，非零时播放器会限制再次发布。
    pub const PUBLISHING_RIGHTS: HeaderKey = HeaderKey::new(b"RGHT");
    /// 头部结束标记。
    pub const END_OF_HEADERS: HeaderKey = HeaderKey::new(b"ENDH");
}

/// 头部条目的值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Int(u32),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    #[must_use]
    pub const fn as_int(&self) -> Option<u32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bytes(_) => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Int(_) => None,
            Self::Bytes(b) => Some(b),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bytes(b) if b.iter().all(|c| !c.is_ascii_control()) => {
                write!(f, "\"{}\"", latin1_to_string(b))
            }
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// 子文件类型。未知的类型标签会原样保留。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubfileType {
    /// 歌曲配置 (`Song.ini`)
    Song,
    Audio,
    Image,
    Font,
    Video,
    /// Milkdrop 可视化预设
    Milkdrop,
    /// CD+G 图形
    Cdg,
    Other(u32),
}

impl SubfileType {
    #[must_use]
    pub const fn from_tag(tag: u32) -> Self {
        match tag {
            1 => Self::Song,
            2 => Self::Audio,
            3 => Self::Image,
            4 => Self::Font,
            5 => Self::Video,
            6 => Self::Milkdrop,
            7 => Self::Cdg,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::Song => 1,
            Self::Audio => 2,
            Self::Image => 3,
            Self::Font => 4,
            Self::Video => 5,
            Self::Milkdrop => 6,
            Self::Cdg => 7,
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for SubfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Song => f.write_str("歌曲配置"),
            Self::Audio => f.write_str("音频"),
            Self::Image => f.write_str("图片"),
            Self::Font => f.write_str("字体"),
            Self::Video => f.write_str("视频"),
            Self::Milkdrop => f.write_str("Milkdrop"),
            Self::Cdg => f.write_str("CDG"),
            Self::Other(tag) => write!(f, "未知({tag})"),
        }
    }
}

/// 目录中的一个子文件条目。
#[derive(Debug, Clone, Eq)]
pub struct SubfileDescriptor {
    /// 原始字节。格式本身不规定编码。
    pub name: Vec<u8>,
    pub kind: SubfileType,
    /// 未加密时的长度
    pub unencrypted_len: u32,
    /// 相对于数据区起点的偏移
    pub offset: u32,
    /// 文件中实际占用的长度（可能含分组填充）
    pub disk_len: u32,
    pub encrypted: bool,
}

// 偏移量只对原始文件有意义，编码时会重新计算，因此不参与比较。
impl PartialEq for SubfileDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.unencrypted_len == other.unencrypted_len
            && self.disk_len == other.disk_len
            && self.encrypted == other.encrypted
    }
}

impl SubfileDescriptor {
    #[must_use]
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// 子文件：目录条目加上它的数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfile {
    pub descriptor: SubfileDescriptor,
    pub data: Vec<u8>,
}

impl Subfile {
    /// 用明文数据构造一个未加密的子文件。
    #[must_use]
    pub fn new(name: impl Into<Vec<u8>>, kind: SubfileType, data: Vec<u8>) -> Self {
        let len = data.len() as u32;
        Self {
            descriptor: SubfileDescriptor {
                name: name.into(),
                kind,
                unencrypted_len: len,
                offset: 0,
                disk_len: len,
                encrypted: false,
            },
            data,
        }
    }

    /// 替换为明文数据，并同步两个长度字段。
    pub fn replace_plain_data(&mut self, data: Vec<u8>) {
        let len = data.len() as u32;
        self.descriptor.unencrypted_len = len;
        self.descriptor.disk_len = len;
        self.descriptor.encrypted = false;
        self.data = data;
    }
}

/// 解码后的 KFN 包。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Package {
    /// 按文件中出现顺序排列的头部条目，解码结果总是以 `ENDH` 结尾。
    pub headers: Vec<(HeaderKey, HeaderValue)>,
    pub subfiles: Vec<Subfile>,
}

impl Package {
    #[must_use]
    pub fn header(&self, key: HeaderKey) -> Option<&HeaderValue> {
        self.headers.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// 设置头部的值。已存在的键原地替换，保持原有顺序；否则插入到 `ENDH` 之前。
    pub fn set_header(&mut self, key: HeaderKey, value: HeaderValue) {
        if let Some((_, existing)) = self.headers.iter_mut().find(|(k, _)| *k == key) {
            *existing = value;
            return;
        }
        let insert_at = self
            .headers
            .iter()
            .position(|(k, _)| *k == keys::END_OF_HEADERS)
            .unwrap_or(self.headers.len());
        self.headers.insert(insert_at, (key, value));
    }

    /// 以 Latin-1 解释一个字节串头部。
    #[must_use]
    pub fn header_str(&self, key: HeaderKey) -> Option<String> {
        self.header(key)
            .and_then(HeaderValue::as_bytes)
            .map(latin1_to_string)
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.header_str(keys::TITLE)
    }

    #[must_use]
    pub fn artist(&self) -> Option<String> {
        self.header_str(keys::ARTIST)
    }

    /// `FLID` 头部的原始字节。
    #[must_use]
    pub fn unlock_key(&self) -> Option<&[u8]> {
        self.header(keys::UNLOCK_KEY).and_then(HeaderValue::as_bytes)
    }

    /// 是否仍带有非零的解锁密钥。
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.unlock_key()
            .is_some_and(|key| key.iter().any(|&b| b != 0))
    }

    /// 第一个歌曲配置子文件。
    #[must_use]
    pub fn song_config(&self) -> Option<&Subfile> {
        self.subfiles
            .iter()
            .find(|s| s.descriptor.kind == SubfileType::Song)
    }

    #[must_use]
    pub fn subfile_by_name(&self, name: &[u8]) -> Option<&Subfile> {
        self.subfiles.iter().find(|s| s.descriptor.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_inserts_before_end_marker() {
        let mut package = Package {
            headers: vec![
                (keys::TITLE, HeaderValue::Bytes(b"Song".to_vec())),
                (keys::END_OF_HEADERS, HeaderValue::Int(u32::MAX)),
            ],
            subfiles: vec![],
        };

        package.set_header(keys::PUBLISHING_RIGHTS, HeaderValue::Int(1));
        package.set_header(keys::TITLE, HeaderValue::Bytes(b"New".to_vec()));

        let order: Vec<_> = package.headers.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            order,
            vec![keys::TITLE, keys::PUBLISHING_RIGHTS, keys::END_OF_HEADERS]
        );
        assert_eq!(package.title().as_deref(), Some("New"));
    }

    #[test]
    fn test_unknown_subfile_tag_is_preserved() {
        let kind = SubfileType::from_tag(42);
        assert_eq!(kind, SubfileType::Other(42));
        assert_eq!(kind.tag(), 42);
        assert_eq!(SubfileType::from_tag(1), SubfileType::Song);
    }

    #[test]
    fn test_is_locked() {
        let mut package = Package::default();
        assert!(!package.is_locked());

        package.set_header(keys::UNLOCK_KEY, HeaderValue::Bytes(vec![0; 16]));
        assert!(!package.is_locked());

        package.set_header(keys::UNLOCK_KEY, HeaderValue::Bytes(vec![7; 16]));
        assert!(package.is_locked());
    }
}
