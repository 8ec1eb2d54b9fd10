//! Candidate extraction strategies, tried in order by the decoder.
//!
//! Each strategy is a pure `text -> Option<Value>` function. Adding a new
//! recovery technique means adding one function and one entry to
//! [`STRATEGIES`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::DecodeMethod;

/// Bounds for the brace scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecodeLimits {
    pub max_scan_chars: usize,
    pub max_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_scan_chars: 65_536,
            max_depth: 64,
        }
    }
}

pub(crate) type Strategy = fn(&str, &DecodeLimits, &mut Vec<String>) -> Option<Value>;

pub(crate) const STRATEGIES: &[(DecodeMethod, Strategy)] = &[
    (DecodeMethod::Direct, direct),
    (DecodeMethod::Fenced, fenced),
    (DecodeMethod::BraceExtract, brace_extract),
];

/// Key paths under which models commonly wrap the real action.
pub(crate) const UNWRAP_PATHS: &[&[&str]] = &[&["action"], &["response", "action"], &["result"]];

pub(crate) fn unwrap_candidates(value: &Value) -> impl Iterator<Item = &Value> {
    UNWRAP_PATHS.iter().filter_map(move |path| {
        path.iter()
            .try_fold(value, |current, key| current.get(*key))
    })
}

fn direct(text: &str, _limits: &DecodeLimits, _warnings: &mut Vec<String>) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

struct Fence<'a> {
    lang: &'a str,
    body: &'a str,
}

fn fences(text: &str) -> Vec<Fence<'_>> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(newline) = after_open.find('\n') else {
            break;
        };
        let lang = after_open[..newline].trim();
        let body_start = &after_open[newline + 1..];
        let Some(close) = body_start.find("```") else {
            break;
        };
        out.push(Fence {
            lang,
            body: &body_start[..close],
        });
        rest = &body_start[close + 3..];
    }
    out
}

fn fenced(text: &str, _limits: &DecodeLimits, _warnings: &mut Vec<String>) -> Option<Value> {
    let blocks = fences(text);
    let tagged = blocks
        .iter()
        .filter(|f| f.lang.eq_ignore_ascii_case("json"));
    let untagged = blocks
        .iter()
        .filter(|f| !f.lang.eq_ignore_ascii_case("json"));
    tagged
        .chain(untagged)
        .find_map(|f| serde_json::from_str(f.body.trim()).ok())
}

enum Scan {
    Found(usize),
    Unbalanced,
    TooDeep,
    TooLong,
}

/// Find the byte index of the `}` closing the object that opens at `start`.
fn scan_object(text: &str, start: usize, limits: &DecodeLimits, budget: &mut usize) -> Scan {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if *budget == 0 {
            return Scan::TooLong;
        }
        *budget -= 1;

        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                depth += 1;
                if depth > limits.max_depth {
                    return Scan::TooDeep;
                }
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Scan::Found(start + offset);
                }
            }
            _ => {}
        }
    }
    Scan::Unbalanced
}

fn brace_extract(
    text: &str,
    limits: &DecodeLimits,
    warnings: &mut Vec<String>,
) -> Option<Value> {
    let mut budget = limits.max_scan_chars;
    let mut from = 0;

    while let Some(rel) = text[from..].find('{') {
        let start = from + rel;
        match scan_object(text, start, limits, &mut budget) {
            Scan::Found(end) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                    return Some(value);
                }
                from = start + 1;
            }
            // A stray `{` in prose never closes; try the next one.
            Scan::Unbalanced => from = start + 1,
            Scan::TooDeep => {
                warnings.push(format!(
                    "brace-extract aborted: nesting deeper than {}",
                    limits.max_depth
                ));
                return None;
            }
            Scan::TooLong => {
                warnings.push(format!(
                    "brace-extract aborted: scanned more than {} chars",
                    limits.max_scan_chars
                ));
                return None;
            }
        }
    }
    None
}
