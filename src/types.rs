use serde::{Deserialize, Serialize};

use crate::error::SyncLineError;

/// 带时间戳的最小歌词单元（一个子词）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedLyricUnit {
    /// 开始时间（秒）
    pub start: f64,
    /// 结束时间（秒）
    pub end: f64,
    /// 从 1 开始的行号
    pub line: usize,
    /// 行内从 1 开始的词序号
    pub word: usize,
    /// 词内从 1 开始的子词序号
    pub subword: usize,
    pub text: String,
}

/// `Song.ini` 中的一个 `[Eff<N>]` 段：同步点和文本行。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectSection {
    pub id: u32,
    /// 同步点，单位为百分之一秒
    pub sync_points: Vec<u64>,
    pub text_lines: Vec<String>,
}

/// 一个效果段产生的歌词序列。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTrack {
    pub effect_id: u32,
    pub units: Vec<SyncedLyricUnit>,
}

/// 同步格式的完整解析结果。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedSyncData {
    /// 只包含至少产生了一个单元的效果段，按出现顺序排列
    pub tracks: Vec<SyncTrack>,
    /// 被跳过的格式错误行
    pub warnings: Vec<SyncLineError>,
}
