/// WebVTT → plain prose.
///
/// Drops blank lines, the `WEBVTT` header, `-->` timing lines and bare cue
/// sequence numbers, then joins the remaining caption lines with single spaces.
pub fn vtt_to_text(vtt: &str) -> String {
    vtt.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("WEBVTT"))
        .filter(|line| !line.contains("-->"))
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}
