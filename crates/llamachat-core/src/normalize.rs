//! Repair of a finished reply that was only ever seen fragment by fragment.
//!
//! Applied once when a stream ends. Every rule is idempotent, so running the
//! whole pass again over its own output changes nothing.

use std::sync::LazyLock;

use regex::Regex;

const FENCE: &str = "```";

/// Two or more blank (or whitespace-only) lines, with `\n` or `\r\n` endings.
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n(?:[ \t\r]*\n){2,}").expect("Invalid blank run regex"));

/// A line that is exactly one inline code span.
static INLINE_CODE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^`([^`]+)`$").expect("Invalid inline code regex"));

/// Minimum run of inline-code lines treated as a code block that lost its fence.
const MIN_INLINE_RUN: usize = 3;

pub fn normalize(text: &str) -> String {
    let text = collapse_blank_lines(text);
    let text = fence_inline_code_runs(&text);
    let text = close_open_fence(&text);
    text.trim_end().to_string()
}

fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUN.replace_all(text, "\n\n").into_owned()
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn inline_code(line: &str) -> Option<&str> {
    INLINE_CODE_LINE
        .captures(line.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|code| !code.trim().is_empty())
}

fn fence_inline_code_runs(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_fence = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if is_fence(line) {
            in_fence = !in_fence;
            out.push(line.to_string());
            i += 1;
            continue;
        }
        if in_fence {
            out.push(line.to_string());
            i += 1;
            continue;
        }

        let run: Vec<&str> = lines[i..].iter().map_while(|line| inline_code(line)).collect();
        if run.len() >= MIN_INLINE_RUN {
            out.push(format!("{FENCE}text"));
            out.extend(run.iter().map(|code| code.to_string()));
            out.push(FENCE.to_string());
            i += run.len();
        } else {
            out.push(line.to_string());
            i += 1;
        }
    }

    out.join("\n")
}

fn close_open_fence(text: &str) -> String {
    let fences = text.lines().filter(|line| is_fence(line)).count();
    if fences % 2 == 0 {
        return text.to_string();
    }

    let mut closed = text.trim_end().to_string();
    closed.push('\n');
    closed.push_str(FENCE);
    closed
}
