//! OPTIONS / ESCALATE blocks that agents append to their replies.
//!
//! Delimiters are matched loosely: two or more dashes, any case, and optional
//! spaces or underscores in the closing keyword.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static OPTIONS_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)-{2,}\s*OPTIONS\s*-{2,}\s*([\s\S]*?)\s*-{2,}\s*END[\s_]*OPTIONS\s*-{2,}").unwrap()
});

static ESCALATE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)-{2,}\s*ESCALATE\s*-{2,}\s*([\s\S]*?)\s*-{2,}\s*END[\s_]*ESCALATE\s*-{2,}").unwrap()
});

static NUMBERING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s*").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*•]\s*").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub content: String,
    pub options: Vec<String>,
    pub escalation_message: Option<String>,
}

fn clean_option_line(line: &str) -> String {
    let line = NUMBERING.replace(line.trim(), "");
    let line = BULLET.replace(&line, "");
    line.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

pub fn parse_message_markers(raw: &str) -> ParsedMessage {
    let mut content = raw.to_string();
    let mut options = Vec::new();
    let mut escalation_message = None;

    if let Some(block) = OPTIONS_BLOCK.captures(&content).and_then(|c| c.get(1)) {
        options = block
            .as_str()
            .lines()
            .map(clean_option_line)
            .filter(|line| !line.is_empty())
            .collect();
        content = OPTIONS_BLOCK.replace(&content, "").trim().to_string();
    }

    if let Some(block) = ESCALATE_BLOCK.captures(&content).and_then(|c| c.get(1)) {
        escalation_message = Some(block.as_str().trim().to_string());
        content = ESCALATE_BLOCK.replace(&content, "").trim().to_string();
    }

    ParsedMessage { content, options, escalation_message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_block_is_extracted_and_removed() {
        let parsed = parse_message_markers("Sorry about that.\n---ESCALATE---\nHello...\n---END_ESCALATE---");
        assert_eq!(parsed.escalation_message.as_deref(), Some("Hello..."));
        assert_eq!(parsed.content, "Sorry about that.");
        assert!(parsed.options.is_empty());
    }

    #[test]
    fn option_lines_are_cleaned() {
        let raw =
            "Which order?\n----options----\n1. ORD-2025-001\n2) \"ORD-2025-002\"\n\n- `Cancel`\n• Keep it\n-- END OPTIONS --";
        let parsed = parse_message_markers(raw);
        assert_eq!(parsed.options, vec!["ORD-2025-001", "ORD-2025-002", "Cancel", "Keep it"]);
        assert_eq!(parsed.content, "Which order?");
    }

    #[test]
    fn both_blocks_are_surfaced_independently() {
        let raw =
            "I could not find it.\n---OPTIONS---\nTry again\n---END_OPTIONS---\n---ESCALATE---\nA human will help.\n---END__ESCALATE---";
        let parsed = parse_message_markers(raw);
        assert_eq!(parsed.options, vec!["Try again"]);
        assert_eq!(parsed.escalation_message.as_deref(), Some("A human will help."));
        assert_eq!(parsed.content, "I could not find it.");
    }

    #[test]
    fn plain_text_is_untouched() {
        let parsed = parse_message_markers("Your order ships tomorrow - expect it soon.");
        assert_eq!(parsed.content, "Your order ships tomorrow - expect it soon.");
        assert_eq!(parsed.escalation_message, None);
    }
}
