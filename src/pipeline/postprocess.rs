//! Post-processing: deterministic cleanup of model-generated text.
//!
//! ## Why is post-processing necessary?
//!
//! Translations and summaries go straight into page markdown reports. Models
//! sometimes wrap their answer in a ` ```markdown ` fence, emit `\r\n` line
//! endings, pad lines with trailing spaces, or leak zero-width characters.
//! None of that is content, so it is removed here rather than fought in the
//! prompt.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a leading BOM cannot hide a fence, and
//! line endings are normalised before fence detection so CRLF fences match.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to a raw model reply.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip an outer markdown fence
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Trim leading and trailing blank space
pub fn clean_model_output(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_markdown_fences(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer markdown fences ──────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|text)?\n(.*)\n```$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_markdown_fences("```markdown\n- a\n- b\n```"), "- a\n- b");
        assert_eq!(strip_markdown_fences("```\nplain\n```"), "plain");
    }

    #[test]
    fn inner_code_blocks_survive() {
        let input = "Intro\n```rust\nfn main() {}\n```\nOutro";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn crlf_fence_is_recognised() {
        assert_eq!(clean_model_output("```markdown\r\nTITLE: x\r\n```"), "TITLE: x");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn removes_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c\u{00AD}d"), "abcd");
    }

    #[test]
    fn full_cleanup() {
        let raw = "\u{FEFF}```\n- Revenue grew 12%   \r\n\r\n\r\n\r\n\r\n- Margin flat\n```\n";
        assert_eq!(clean_model_output(raw), "- Revenue grew 12%\n\n\n- Margin flat");
    }

    #[test]
    fn empty_reply_stays_empty() {
        assert_eq!(clean_model_output("   \n  "), "");
    }
}
