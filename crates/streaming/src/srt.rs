/// Text of the last cue in an SRT document, or an empty string
///
/// Cues are separated by blank lines; the returned text is the final line of
/// the final cue.
#[must_use]
pub fn latest_line(srt: &str) -> String {
    let normalized = srt.replace("\r\n", "\n");
    normalized
        .trim()
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .last()
        .and_then(|block| block.lines().last())
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_line_of_multiple_cues() {
        let srt = "1\n00:00:00,000 --> 00:00:02,000\nHello\n\n2\n00:00:02,000 --> 00:00:04,000\nWorld\n";
        assert_eq!(latest_line(srt), "World");
    }

    #[test]
    fn test_latest_line_multi_line_cue() {
        let srt = "1\r\n00:00:00,000 --> 00:00:02,000\r\nfirst\r\nsecond\r\n\r\n\r\n";
        assert_eq!(latest_line(srt), "second");
    }

    #[test]
    fn test_latest_line_empty() {
        assert_eq!(latest_line(""), "");
        assert_eq!(latest_line("\n\n  \n"), "");
    }
}
