//! KFN 卡拉OK歌曲包的解码、解锁与同步歌词解析。

pub mod app_settings;
pub mod container;
pub mod error;
pub mod io;
pub mod logger;
pub mod sync_parser;
pub mod types;
pub mod unlock;
pub mod utils;

pub use container::{
    HeaderKey, HeaderValue, Package, Subfile, SubfileDescriptor, SubfileType, decode,
    decode_from_reader, encode, keys,
};
pub use error::{FormatError, KfnError, Result, SongConfigError, SyncLineError, UnlockError};
pub use sync_parser::{parse_sync_format, parse_sync_tracks};
pub use types::*;
pub use unlock::{UnlockOptions, unlock, unlock_with_options};
