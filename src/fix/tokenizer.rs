//! Line tokenization for tag-delimited protocol logs.

/// Candidate separators, in priority order. SOH outranks the visible pipe:
/// a pipe can legitimately appear inside a value of a whitespace-delimited
/// line, so the control character must win when both occur.
const SEPARATORS: [char; 2] = ['\x01', '|'];

/// Split a raw log line into field tokens.
///
/// The first candidate separator found anywhere in the line is used for the
/// whole line; if none occurs, the line is split on runs of whitespace.
/// An empty or whitespace-only line yields no tokens.
pub fn tokenize(line: &str) -> Vec<&str> {
    let line = line.trim();
    for sep in SEPARATORS {
        if line.contains(sep) {
            return line.split(sep).collect();
        }
    }
    line.split_whitespace().collect()
}
