/// 按 Latin-1 (ISO-8859-1) 把字节解码为字符串。每个字节对应一个同码位的字符，不会失败。
#[must_use]
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// 把字符串编码回 Latin-1。超出 U+00FF 的字符无法表示，替换为 `?`。
#[must_use]
pub fn string_to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_is_lossless_for_every_byte() {
        let all: Vec<u8> = (0u8..=255).collect();
        assert_eq!(string_to_latin1(&latin1_to_string(&all)), all);
        assert_eq!(latin1_to_string(b"Caf\xe9"), "Café");
    }

    #[test]
    fn test_unrepresentable_chars_become_question_marks() {
        assert_eq!(string_to_latin1("a歌b"), b"a?b");
    }
}
