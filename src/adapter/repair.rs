//! Best-effort repair of truncated JSON arrays/objects.
//!
//! The input is scanned once with a bracket stack that skips string contents. Every
//! position where a closing bracket completes a value is a candidate cut point. Cut
//! points are tried from last to first. Each candidate is the prefix up to the cut plus
//! the closers still open at that point. The first candidate that parses wins. When
//! none parses the input is returned unchanged.

use serde_json::Value;

/// Cut point: byte index just past a closing bracket, with the closers still open there.
struct CutPoint {
    end: usize,
    open: Vec<u8>,
}

fn scan(input: &str) -> Vec<CutPoint> {
    let mut stack: Vec<u8> = Vec::new();
    let mut cuts = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in input.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.last() != Some(&b) {
                    // Mismatched closer: nothing after this point can be trusted.
                    break;
                }
                stack.pop();
                cuts.push(CutPoint {
                    end: i + 1,
                    open: stack.iter().rev().copied().collect(),
                });
            }
            _ => {}
        }
    }
    cuts
}

/// Repaired text, or `input` itself when no cut point yields valid JSON.
pub fn repair_truncated_json(input: &str) -> String {
    try_repair(input)
        .map(|(text, _)| text)
        .unwrap_or_else(|| input.to_string())
}

/// Repaired text and its parsed value.
pub fn try_repair(input: &str) -> Option<(String, Value)> {
    let trimmed = input.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    for cut in scan(trimmed).iter().rev() {
        let mut candidate = String::with_capacity(cut.end + cut.open.len());
        candidate.push_str(&trimmed[..cut.end]);
        candidate.extend(cut.open.iter().map(|&b| b as char));
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Some((candidate, value));
        }
    }
    None
}
