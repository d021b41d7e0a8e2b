//! Answer formatting - a pure string transform over model output.
//!
//! Strips private-reasoning blocks some models emit, re-flows prose to
//! one sentence per line, moves inline bullet markers onto their own
//! lines, and collapses large blank runs. No access to context or query.

use std::sync::OnceLock;

use regex::Regex;

fn think_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").expect("invalid regex"))
}

fn inline_dot_bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+•[ \t]*").expect("invalid regex"))
}

fn inline_dash_bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A dash surrounded by spaces and followed by a letter; avoids
    // splitting numeric ranges like "3 - 5".
    RE.get_or_init(|| Regex::new(r"[ \t]+-[ \t]+([A-Za-z])").expect("invalid regex"))
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Three or more consecutive blank lines collapse to exactly one.
    RE.get_or_init(|| Regex::new(r"\n{4,}").expect("invalid regex"))
}

/// Format raw model output for display.
pub fn format_answer(raw: &str) -> String {
    // 1. Drop private-reasoning blocks.
    let text = think_block_re().replace_all(raw, "");

    // 2. Inline bullet markers start their own line.
    let text = inline_dot_bullet_re().replace_all(&text, "\n• ");
    let text = inline_dash_bullet_re().replace_all(&text, "\n- $1");

    // 3. One sentence per line, preserving blank lines between paragraphs.
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.push(String::new());
        } else {
            lines.extend(split_sentences(trimmed));
        }
    }
    let joined = lines.join("\n");

    // 4. Collapse oversized blank runs.
    blank_run_re()
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Split a line into sentences, breaking after `.`, `!` or `?` followed
/// by whitespace. Coarse by design; abbreviations are not special-cased.
fn split_sentences(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| *n == ' ' || *n == '\t') {
                chars.next();
            }
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current = String::new();
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_think_blocks() {
        let raw = "<think>secret chain of thought</think>The answer is yes.";
        assert_eq!(format_answer(raw), "The answer is yes.");
    }

    #[test]
    fn test_strips_multiline_think_blocks() {
        let raw = "Before. <THINK>line one\nline two</THINK> After.";
        let formatted = format_answer(raw);
        assert!(!formatted.contains("line one"));
        assert!(formatted.contains("Before."));
        assert!(formatted.contains("After."));
    }

    #[test]
    fn test_one_sentence_per_line() {
        let raw = "First sentence. Second sentence! Third?";
        assert_eq!(
            format_answer(raw),
            "First sentence.\nSecond sentence!\nThird?"
        );
    }

    #[test]
    fn test_trailing_period_does_not_split() {
        assert_eq!(format_answer("Just one sentence."), "Just one sentence.");
    }

    #[test]
    fn test_inline_bullets_get_own_lines() {
        let raw = "Key points: • first point • second point";
        let formatted = format_answer(raw);
        let bullets: Vec<&str> = formatted
            .lines()
            .filter(|l| l.starts_with("• "))
            .collect();
        assert_eq!(bullets.len(), 2);
    }

    #[test]
    fn test_inline_dash_bullets_get_own_lines() {
        let raw = "Options: - red - green";
        let formatted = format_answer(raw);
        assert!(formatted.contains("\n- red"));
        assert!(formatted.contains("\n- green"));
    }

    #[test]
    fn test_numeric_range_dash_is_not_a_bullet() {
        let formatted = format_answer("Takes 3 - 5 days.");
        assert_eq!(formatted, "Takes 3 - 5 days.");
    }

    #[test]
    fn test_blank_runs_collapse() {
        let raw = "Paragraph one.\n\n\n\n\n\nParagraph two.";
        assert_eq!(format_answer(raw), "Paragraph one.\n\nParagraph two.");
    }

    #[test]
    fn test_single_blank_line_preserved() {
        let raw = "Paragraph one.\n\nParagraph two.";
        assert_eq!(format_answer(raw), "Paragraph one.\n\nParagraph two.");
    }

    #[test]
    fn test_whitespace_only_input() {
        assert_eq!(format_answer("   \n\n  "), "");
    }
}
