//! # KFN 同步格式解析器
//!
//! `Song.ini` 里每个 `[Eff<N>]` 段带有一组同步点（百分之一秒）和若干文本行：
//!
//! ```text
//! [Eff1]
//! Sync0=100,150,200,300
//! Text0=be/cause me
//! ```
//!
//! 文本按空白分词，词内用 `/` 分出子词。所有子词按顺序共用一个同步点指针，
//! 每消耗一个子词前进一格。

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SyncLineError;
use crate::types::{EffectSection, ParsedSyncData, SyncTrack, SyncedLyricUnit};

/// 匹配效果段的段头，例如 `[Eff12]`
static EFFECT_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[Eff(\d+)\]$").expect("未能编译 EFFECT_HEADER_REGEX"));

/// 匹配任意段头
static SECTION_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]*\]$").expect("未能编译 SECTION_HEADER_REGEX"));

static SYNC_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Sync(\d+)=(.*)$").expect("未能编译 SYNC_LINE_REGEX"));

static TEXT_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Text(\d+)=(.*)$").expect("未能编译 TEXT_LINE_REGEX"));

/// 像 `Sync3`、`Text0` 这样带编号的键。`SyncCount` 之类的其他键不在此列。
static NUMBERED_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:Sync|Text)\d").expect("未能编译 NUMBERED_KEY_REGEX"));

/// 解析同步格式文本，每个产生了歌词单元的效果段对应一个序列。
#[must_use]
pub fn parse_sync_format(content: &str) -> Vec<Vec<SyncedLyricUnit>> {
    parse_sync_tracks(content)
        .tracks
        .into_iter()
        .map(|track| track.units)
        .collect()
}

/// 解析同步格式文本，同时保留效果段编号和被跳过的行。
#[must_use]
pub fn parse_sync_tracks(content: &str) -> ParsedSyncData {
    let (sections, warnings) = extract_effect_sections(content);

    let tracks: Vec<SyncTrack> = sections
        .iter()
        .filter_map(|section| {
            let units = assign_timings(section);
            if units.is_empty() {
                log::debug!("[同步解析] 效果段 Eff{} 没有产生任何歌词单元，已忽略", section.id);
                None
            } else {
                Some(SyncTrack {
                    effect_id: section.id,
                    units,
                })
            }
        })
        .collect();

    log::debug!(
        "[同步解析] 共 {} 个效果段，保留 {} 个序列，跳过 {} 行",
        sections.len(),
        tracks.len(),
        warnings.len()
    );

    ParsedSyncData { tracks, warnings }
}

/// 逐行扫描，收集所有效果段的同步点和文本行。
///
/// 无法解析的 `Sync`/`Text` 行会被跳过并记录在返回的警告中。
#[must_use]
pub fn extract_effect_sections(content: &str) -> (Vec<EffectSection>, Vec<SyncLineError>) {
    let mut sections: Vec<EffectSection> = Vec::new();
    let mut warnings = Vec::new();
    // 当前是否处于一个效果段内
    let mut in_effect = false;

    for (line_idx, raw_line) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let line = raw_line.trim_start();
        let trimmed = line.trim_end();

        if let Some(caps) = EFFECT_HEADER_REGEX.captures(trimmed) {
            match caps[1].parse::<u32>() {
                Ok(id) => {
                    sections.push(EffectSection {
                        id,
                        ..Default::default()
                    });
                    in_effect = true;
                }
                Err(e) => {
                    log::warn!("[同步解析] 行 {line_num}: 效果段编号无效 '{trimmed}': {e}");
                    in_effect = false;
                }
            }
            continue;
        }

        if SECTION_HEADER_REGEX.is_match(trimmed) {
            in_effect = false;
            continue;
        }

        if !in_effect {
            continue;
        }
        let Some(section) = sections.last_mut() else {
            continue;
        };

        if let Some(caps) = SYNC_LINE_REGEX.captures(trimmed) {
            match parse_sync_points(&caps[2]) {
                Ok(points) => section.sync_points.extend(points),
                Err(message) => {
                    let warning = SyncLineError {
                        section: section.id,
                        line_num,
                        message,
                    };
                    log::warn!("[同步解析] {warning}，已跳过");
                    warnings.push(warning);
                }
            }
        } else if let Some(caps) = TEXT_LINE_REGEX.captures(line) {
            // 文本保留原样，只去掉行尾换行
            section.text_lines.push(caps[2].to_string());
        } else if NUMBERED_KEY_REGEX.is_match(trimmed) {
            let warning = SyncLineError {
                section: section.id,
                line_num,
                message: format!("无法识别的行 '{trimmed}'"),
            };
            log::warn!("[同步解析] {warning}，已跳过");
            warnings.push(warning);
        }
    }

    (sections, warnings)
}

fn parse_sync_points(value: &str) -> Result<Vec<u64>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u64>()
                .map_err(|e| format!("无效的同步点 '{item}': {e}"))
        })
        .collect()
}

fn centis_to_seconds(centis: u64) -> f64 {
    centis as f64 / 100.0
}

/// 给一个效果段的所有子词分配时间。
///
/// 非行末词的子词取 `[S[i], S[i+1]]`。行末词的结束时间按本行已产生单元的
/// 平均每字符时长估算，且不超过 `S[i+1]`。同步点用完后剩余的子词不再输出。
#[must_use]
pub fn assign_timings(section: &EffectSection) -> Vec<SyncedLyricUnit> {
    let points = &section.sync_points;
    let mut units: Vec<SyncedLyricUnit> = Vec::new();
    if points.len() < 2 {
        return units;
    }
    let last_point = points.len() - 1;
    let mut cursor = 0;

    'lines: for (line_idx, line) in section.text_lines.iter().enumerate() {
        let words: Vec<&str> = line.split_whitespace().collect();
        let line_first_unit = units.len();

        for (word_idx, word) in words.iter().enumerate() {
            let is_last_word = word_idx + 1 == words.len();

            for (subword_idx, subword) in word.split('/').filter(|s| !s.is_empty()).enumerate() {
                if cursor >= last_point {
                    break 'lines;
                }

                let start = centis_to_seconds(points[cursor]);
                let next = centis_to_seconds(points[cursor + 1]);
                let end = if is_last_word {
                    estimate_line_end(&units[line_first_unit..], start, next, subword)
                } else {
                    next
                };
                cursor += 1;

                if is_zero_boundary(end) {
                    log::trace!(
                        "[同步解析] Eff{} 行 {} 的子词 '{subword}' 结束时间为 0，已丢弃",
                        section.id,
                        line_idx + 1
                    );
                    continue;
                }

                units.push(SyncedLyricUnit {
                    start,
                    end,
                    line: line_idx + 1,
                    word: word_idx + 1,
                    subword: subword_idx + 1,
                    text: subword.to_string(),
                });
            }
        }
    }

    if cursor >= last_point {
        log::trace!("[同步解析] Eff{} 的同步点已用完", section.id);
    }

    units
}

/// 按同一行已输出单元的平均每字符时长估算行末子词的结束时间。
fn estimate_line_end(
    emitted_in_line: &[SyncedLyricUnit],
    start: f64,
    limit: f64,
    text: &str,
) -> f64 {
    let (Some(first), Some(last)) = (emitted_in_line.first(), emitted_in_line.last()) else {
        return limit;
    };
    let total_chars: usize = emitted_in_line
        .iter()
        .map(|unit| unit.text.chars().count())
        .sum();
    if total_chars == 0 {
        return limit;
    }

    let span = last.end - first.start;
    let estimated = start + span * text.chars().count() as f64 / total_chars as f64;
    estimated.min(limit)
}

// 结束时间为 0 的子词视为没有时间
#[allow(clippy::float_cmp)]
fn is_zero_boundary(end: f64) -> bool {
    end == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn unit(start: f64, end: f64, line: usize, word: usize, subword: usize, text: &str) -> SyncedLyricUnit {
        SyncedLyricUnit {
            start,
            end,
            line,
            word,
            subword,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_hello_world_example() {
        let content = "[Eff1]\r\nSync0=0,100,250\r\nText0=Hello World\r\n";
        let sequences = parse_sync_format(content);

        assert_eq!(
            sequences,
            vec![vec![
                unit(0.0, 1.0, 1, 1, 1, "Hello"),
                unit(1.0, 2.0, 1, 2, 1, "World"),
            ]]
        );
    }

    #[test]
    fn test_empty_input_and_empty_sections() {
        assert!(parse_sync_format("").is_empty());
        assert!(parse_sync_format("[Eff3]\nID=51\n").is_empty());

        let parsed = parse_sync_tracks("[Eff1]\n[Eff2]\nSync0=0,100\nText0=Hi\n");
        assert_eq!(parsed.tracks.len(), 1);
        assert_eq!(parsed.tracks[0].effect_id, 2);
    }

    #[test]
    fn test_split_last_word_estimates_each_subword() {
        let content = "[Eff1]\nSync0=100,200,300,1000\nText0=abcd be/cause\n";
        let units = &parse_sync_format(content)[0];

        assert_eq!(units.len(), 3);
        assert_eq!(units[0], unit(1.0, 2.0, 1, 1, 1, "abcd"));

        // 每字符 0.25 秒
        let be = &units[1];
        assert_eq!((be.word, be.subword), (2, 1));
        assert!(approx_eq(be.start, 2.0));
        assert!(approx_eq(be.end, 2.5), "be 的结束时间: {}", be.end);

        // 估算包含同一个词里前面的子词
        let cause = &units[2];
        assert_eq!((cause.word, cause.subword), (2, 2));
        assert!(approx_eq(cause.start, 3.0));
        assert!(approx_eq(cause.end, 4.25), "cause 的结束时间: {}", cause.end);
    }

    #[test]
    fn test_subwords_share_word_index() {
        let content = "[Eff1]\nSync0=100,150,200,300\nText0=be/cause me\n";
        let units = &parse_sync_format(content)[0];

        assert_eq!(units.len(), 3);
        assert_eq!(units[0], unit(1.0, 1.5, 1, 1, 1, "be"));
        assert_eq!(units[1], unit(1.5, 2.0, 1, 1, 2, "cause"));

        // 行末词：本行已用 1.0 秒覆盖 7 个字符
        let me = &units[2];
        assert_eq!((me.line, me.word, me.subword), (1, 2, 1));
        assert!(approx_eq(me.start, 2.0));
        assert!(approx_eq(me.end, 2.0 + 2.0 / 7.0), "结束时间: {}", me.end);
    }

    #[test]
    fn test_last_word_is_clamped_to_next_sync_point() {
        let content = "[Eff1]\nSync0=100,200\nSync1=300,310\nText0=ab cdefgh\nText1=x\n";
        let units = &parse_sync_format(content)[0];

        assert_eq!(
            *units,
            vec![
                unit(1.0, 2.0, 1, 1, 1, "ab"),
                unit(2.0, 3.0, 1, 2, 1, "cdefgh"),
                unit(3.0, 3.1, 2, 1, 1, "x"),
            ]
        );
    }

    #[test]
    fn test_pointer_is_shared_across_lines_and_runs_out() {
        let content = "[Eff1]\nSync0=100,200,300\nText0=a b\nText1=c d\n";
        let units = &parse_sync_format(content)[0];

        assert_eq!(units.len(), 2);
        assert_eq!(units[0], unit(1.0, 2.0, 1, 1, 1, "a"));
        assert_eq!(units[1], unit(2.0, 3.0, 1, 2, 1, "b"));
    }

    #[test]
    fn test_zero_end_boundary_is_dropped() {
        let content = "[Eff1]\nSync0=0,0,100\nText0=a b\n";
        let units = &parse_sync_format(content)[0];

        assert_eq!(*units, vec![unit(0.0, 1.0, 1, 2, 1, "b")]);
    }

    #[test]
    fn test_sections_are_independent() {
        let content = "[General]\nSync0=1,2\nText0=ignored\n\
            [Eff1]\nSync0=100,200\nText0=one\n\
            [Eff7]\nSync0=500,600\nText0=two\n\
            [Fonts]\nText0=not lyrics\n";
        let parsed = parse_sync_tracks(content);

        let ids: Vec<u32> = parsed.tracks.iter().map(|t| t.effect_id).collect();
        assert_eq!(ids, vec![1, 7]);
        assert_eq!(parsed.tracks[0].units, vec![unit(1.0, 2.0, 1, 1, 1, "one")]);
        assert_eq!(parsed.tracks[1].units, vec![unit(5.0, 6.0, 1, 1, 1, "two")]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let content = "[Eff4]\nSync0=100,abc\nSync1=100,200,\nSyncCount=2\nText0=ok\nText1\n";
        let parsed = parse_sync_tracks(content);

        assert_eq!(parsed.tracks[0].units, vec![unit(1.0, 2.0, 1, 1, 1, "ok")]);
        let lines: Vec<usize> = parsed.warnings.iter().map(|w| w.line_num).collect();
        assert_eq!(lines, vec![2, 6]);
        assert!(parsed.warnings.iter().all(|w| w.section == 4));
    }

    #[test]
    fn test_extracted_sections_keep_raw_text() {
        let (sections, warnings) =
            extract_effect_sections("[Eff2]\nText0=  two  spaces/ \nSync0=1, 2 ,3\n");

        assert!(warnings.is_empty());
        assert_eq!(
            sections,
            vec![EffectSection {
                id: 2,
                sync_points: vec![1, 2, 3],
                text_lines: vec!["  two  spaces/ ".to_string()],
            }]
        );
    }
}
