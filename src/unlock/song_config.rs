//! `Song.ini` 的规范化。
//!
//! 歌曲配置以 Latin-1 存储。解锁时把它解析为 INI 再重新写出；
//! 如果给出了允许的效果编号，还会删掉其余的 `[Eff<N>]` 段。

use std::sync::LazyLock;

use ini::{EscapePolicy, Ini, LineSeparator, ParseOption, WriteOption};
use regex::Regex;

use crate::container::Package;
use crate::utils::{latin1_to_string, string_to_latin1};

static EFFECT_SECTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Eff(\d+)$").expect("未能编译 EFFECT_SECTION_REGEX"));

fn parse_option() -> ParseOption {
    // 歌词文本里的反斜杠和引号都是字面内容
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn write_option() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Nothing,
        line_separator: LineSeparator::CRLF,
        ..WriteOption::default()
    }
}

/// 解析并重新写出歌曲配置。
///
/// `allowed_effect_ids` 为 `None` 时不删除任何段，结果只是一次规范化的重写。
pub fn normalize_song_config(
    data: &[u8],
    allowed_effect_ids: Option<&[u32]>,
) -> Result<Vec<u8>, ini::Error> {
    let text = latin1_to_string(data);
    let mut conf = Ini::load_from_str_opt(&text, parse_option()).map_err(ini::Error::Parse)?;

    if let Some(allowed) = allowed_effect_ids {
        let rejected: Vec<String> = conf
            .sections()
            .flatten()
            .filter(|name| effect_id(name).is_some_and(|id| !allowed.contains(&id)))
            .map(ToString::to_string)
            .collect();
        for name in rejected {
            log::debug!("[歌曲配置] 移除未允许的效果段 [{name}]");
            conf.delete(Some(name.as_str()));
        }
    }

    let mut out = Vec::with_capacity(data.len());
    conf.write_to_opt(&mut out, write_option())
        .map_err(ini::Error::Io)?;

    // 写出的是 UTF-8，转回 Latin-1
    let written = String::from_utf8_lossy(&out);
    Ok(string_to_latin1(&written))
}

/// 从 `Eff12` 这样的段名中取出效果编号。
fn effect_id(section: &str) -> Option<u32> {
    EFFECT_SECTION_REGEX
        .captures(section)
        .and_then(|caps| caps[1].parse().ok())
}

/// 取出包中第一个歌曲配置子文件的文本。
#[must_use]
pub fn song_config_text(package: &Package) -> Option<String> {
    package
        .song_config()
        .filter(|s| !s.descriptor.encrypted)
        .map(|s| latin1_to_string(&s.data))
}
