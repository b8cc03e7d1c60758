//! Invisible watermark codec for newline-delimited JSON datasets
//!
//! Every paid download embeds the purchase timestamp as zero-width Unicode
//! characters spread across groups of 6 lines: line 0 of a group carries a
//! START marker, lines 1..5 carry two timestamp digits each. The insertion
//! point is chosen by a structural pattern match over the raw text (never a
//! JSON parse/re-emit), so the marker always lands inside an existing string
//! token and the line stays valid JSON.

use lazy_static::lazy_static;
use std::borrow::Cow;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Number of consecutive lines that carry one full timestamp
pub const FINGERPRINT_GROUP_SIZE: usize = 6;

/// Marker that opens a fingerprint group (zero-width no-break space)
pub const START_MARK: char = '\u{FEFF}';

lazy_static! {
    /// Digit -> invisible marker. Fixed bijection shared by encode and decode.
    static ref DIGIT_MARKS: HashMap<char, char> = [
        ('0', '\u{2060}'),
        ('1', '\u{2061}'),
        ('2', '\u{2062}'),
        ('3', '\u{2063}'),
        ('4', '\u{2064}'),
        ('5', '\u{206A}'),
        ('6', '\u{206B}'),
        ('7', '\u{200B}'),
        ('8', '\u{200C}'),
        ('9', '\u{200D}'),
    ]
    .into_iter()
    .collect();

    /// Invisible marker -> digit
    static ref MARK_DIGITS: HashMap<char, char> =
        DIGIT_MARKS.iter().map(|(digit, mark)| (*mark, *digit)).collect();
}

/// Structural insertion point of a fingerprint within a line.
///
/// The same three tiers are used for embedding and for extraction, in the
/// same order, so both sides agree on where the markers sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkSlot {
    /// Line ends with `"}` - marker sits just before the closing quote
    TrailingQuote,
    /// First `:` followed by optional spaces and a quote - marker after it
    AfterColon,
    /// Marker after the first `"` anywhere in the line
    FirstQuote,
}

/// Embed one group position of the fingerprint into `line`.
///
/// `timestamp` must be exactly 10 ASCII decimal digits; anything else makes
/// the call a no-op (skip, not an error). Lines shorter than 6 bytes are
/// returned unchanged. `group_pos == 0` embeds the START marker, positions
/// 1..5 embed timestamp digits `(pos-1)*2` and `(pos-1)*2+1`.
pub fn insert_fingerprint(line: &str, timestamp: &str, group_pos: usize) -> String {
    if timestamp.len() != 10 || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return line.to_string();
    }

    let mut payload = String::with_capacity(8);
    if group_pos == 0 {
        payload.push(START_MARK);
    } else {
        let idx = (group_pos - 1) * 2;
        let digits = timestamp.as_bytes();
        payload.push(DIGIT_MARKS[&(digits[idx] as char)]);
        payload.push(DIGIT_MARKS[&(digits[idx + 1] as char)]);
    }

    insert_into_json_string(line, &payload)
}

/// Insert `payload` at the first matching structural slot of `line`.
fn insert_into_json_string(line: &str, payload: &str) -> String {
    let bytes = line.as_bytes();
    let len = bytes.len();
    if len < 6 {
        return line.to_string();
    }

    // Tier 1: object closing after a quoted value - insert before the quote
    if bytes[len - 2] == b'"' && bytes[len - 1] == b'}' {
        return format!("{}{}\"}}", &line[..len - 2], payload);
    }

    // Tier 2: first colon, optional spaces, then a quoted value
    if let Some(idx) = line.find(':') {
        let mut j = idx + 1;
        while j < len && bytes[j] == b' ' {
            j += 1;
        }
        if j < len && bytes[j] == b'"' {
            return format!("{}{}{}", &line[..j + 1], payload, &line[j + 1..]);
        }
    }

    // Tier 3: first quote anywhere (key of a degenerate line)
    if let Some(q) = line.find('"') {
        return format!("{}{}{}", &line[..q + 1], payload, &line[q + 1..]);
    }

    line.to_string()
}

/// Detect which structural slot a line would carry markers in, if any.
fn mark_slot(line: &str) -> Option<MarkSlot> {
    let bytes = line.as_bytes();
    let len = bytes.len();
    if len < 2 {
        return None;
    }
    if bytes[len - 2] == b'"' && bytes[len - 1] == b'}' {
        return Some(MarkSlot::TrailingQuote);
    }
    if let Some(idx) = line.find(':') {
        let mut j = idx + 1;
        while j < len && bytes[j] == b' ' {
            j += 1;
        }
        if j < len && bytes[j] == b'"' {
            return Some(MarkSlot::AfterColon);
        }
    }
    if line.contains('"') {
        return Some(MarkSlot::FirstQuote);
    }
    None
}

/// The byte window of `line` that markers for `slot` would occupy.
///
/// Suffix windows are sized for the exact marker payloads (START + `"}` is 5
/// bytes, two digit marks + `"}` is 8); a window boundary that splits a
/// multi-byte character on an unmarked line simply yields no markers.
fn slot_window(line: &str, slot: MarkSlot, suffix_len: usize) -> Cow<'_, str> {
    match slot {
        MarkSlot::TrailingQuote => {
            let bytes = line.as_bytes();
            let start = bytes.len().saturating_sub(suffix_len);
            String::from_utf8_lossy(&bytes[start..])
        }
        MarkSlot::AfterColon => match line.find(':') {
            Some(idx) => Cow::Borrowed(&line[idx..]),
            None => Cow::Borrowed(""),
        },
        MarkSlot::FirstQuote => match line.find('"') {
            Some(idx) => Cow::Borrowed(&line[idx..]),
            None => Cow::Borrowed(""),
        },
    }
}

/// Whether `line` carries the START marker at `slot`.
fn contains_start(line: &str, slot: MarkSlot) -> bool {
    slot_window(line, slot, 5).contains(START_MARK)
}

/// Extract the digits encoded by the invisible markers within `slot`.
fn extract_digits(line: &str, slot: MarkSlot) -> String {
    slot_window(line, slot, 8)
        .chars()
        .filter_map(|c| MARK_DIGITS.get(&c).copied())
        .collect()
}

/// Recover the embedded timestamp from a suspect file's lines.
///
/// Scans for the first line carrying START at one of the structural slots,
/// then reads two digits from the same slot in each of the next 5 lines.
/// `None` means no fingerprint was found.
pub fn extract_timestamp<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    for (i, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let Some(slot) = mark_slot(line) else {
            continue;
        };
        if !contains_start(line, slot) {
            continue;
        }

        let mut timestamp = String::with_capacity(10);
        for data_line in lines.iter().skip(i + 1).take(FINGERPRINT_GROUP_SIZE - 1) {
            timestamp.push_str(&extract_digits(data_line.as_ref(), slot));
        }
        return Some(timestamp);
    }
    None
}

/// Read a suspect stream line by line and recover the embedded timestamp.
pub async fn verify_stream<R>(reader: R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Some(line) = lines.next_line().await? {
        collected.push(line);
    }
    Ok(extract_timestamp(&collected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> Vec<String> {
        vec![
            r#"{"id": 1, "text": "alpha"}"#.to_string(),
            r#"{"id": 2, "text": "beta"}"#.to_string(),
            r#"{"id": 3, "text": "gamma"}"#.to_string(),
            r#"{"id": 4, "text": "delta"}"#.to_string(),
            r#"{"id": 5, "text": "epsilon"}"#.to_string(),
            r#"{"id": 6, "text": "zeta"}"#.to_string(),
        ]
    }

    fn encode_group(lines: &[String], timestamp: &str) -> Vec<String> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| insert_fingerprint(line, timestamp, i % FINGERPRINT_GROUP_SIZE))
            .collect()
    }

    #[test]
    fn concrete_group_embeds_expected_markers() {
        let encoded = encode_group(&sample_group(), "1700000000");

        assert!(encoded[0].contains(START_MARK));
        for line in &encoded[1..] {
            assert!(!line.contains(START_MARK));
        }
        // line 1 carries digits '1','7'; lines 2..5 carry '0','0'
        assert!(encoded[1].contains('\u{2061}'));
        assert!(encoded[1].contains('\u{200B}'));
        for line in &encoded[2..] {
            assert_eq!(line.matches('\u{2060}').count(), 2);
        }

        assert_eq!(
            extract_timestamp(&encoded),
            Some("1700000000".to_string())
        );
    }

    #[test]
    fn round_trip_over_various_timestamps() {
        for timestamp in ["1700000000", "0123456789", "9876543210", "1111111111"] {
            let encoded = encode_group(&sample_group(), timestamp);
            assert_eq!(extract_timestamp(&encoded), Some(timestamp.to_string()));
        }
    }

    #[test]
    fn round_trip_without_trailing_quote_shape() {
        // Lines ending in a numeric value fall through to the colon tier
        let lines: Vec<String> = (0..6)
            .map(|i| format!(r#"{{"label": "row", "n": {}}}"#, i))
            .collect();
        let encoded = encode_group(&lines, "1734567890");
        assert_eq!(extract_timestamp(&encoded), Some("1734567890".to_string()));
    }

    #[test]
    fn round_trip_on_bare_string_lines() {
        // No colon at all - markers land after the first quote
        let lines: Vec<String> = (0..6).map(|i| format!(r#""value-{}""#, i)).collect();
        let encoded = encode_group(&lines, "1699999999");
        assert_eq!(extract_timestamp(&encoded), Some("1699999999".to_string()));
    }

    #[test]
    fn encoded_lines_remain_valid_json() {
        let encoded = encode_group(&sample_group(), "1700000000");
        for line in &encoded {
            serde_json::from_str::<serde_json::Value>(line)
                .unwrap_or_else(|e| panic!("line no longer parses: {} ({})", line, e));
        }
    }

    #[test]
    fn invalid_timestamp_is_a_skip() {
        let line = r#"{"id": 1, "text": "alpha"}"#;
        assert_eq!(insert_fingerprint(line, "123", 0), line);
        assert_eq!(insert_fingerprint(line, "12345678901", 0), line);
        assert_eq!(insert_fingerprint(line, "17abc00000", 0), line);
    }

    #[test]
    fn short_lines_are_never_marked() {
        assert_eq!(insert_fingerprint("", "1700000000", 0), "");
        assert_eq!(insert_fingerprint("{}", "1700000000", 0), "{}");
        assert_eq!(insert_fingerprint("[1]", "1700000000", 2), "[1]");
    }

    #[test]
    fn unmarked_input_yields_no_fingerprint() {
        assert_eq!(extract_timestamp(&sample_group()), None);
        let empty: Vec<String> = Vec::new();
        assert_eq!(extract_timestamp(&empty), None);
    }

    #[test]
    fn truncated_group_returns_partial_digits() {
        let encoded = encode_group(&sample_group(), "1700000000");
        // Only the START line and two data lines survive
        assert_eq!(
            extract_timestamp(&encoded[..3]),
            Some("1700".to_string())
        );
    }

    #[tokio::test]
    async fn verify_stream_finds_fingerprint_mid_file() {
        let mut content = String::new();
        // A full unmarked group first, then a marked one
        for line in sample_group() {
            content.push_str(&line);
            content.push('\n');
        }
        for line in encode_group(&sample_group(), "1723456789") {
            content.push_str(&line);
            content.push('\n');
        }

        let found = verify_stream(content.as_bytes()).await.unwrap();
        assert_eq!(found, Some("1723456789".to_string()));
    }

    #[tokio::test]
    async fn verify_stream_reports_missing_fingerprint() {
        let content = "{\"a\": \"b\"}\n{\"c\": \"d\"}\n";
        let found = verify_stream(content.as_bytes()).await.unwrap();
        assert_eq!(found, None);
    }
}
