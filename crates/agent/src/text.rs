//! Helpers for pulling structured content out of free-form model output.

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const FENCE: &str = "```";

/// Removes `<think>...</think>` reasoning blocks. An unterminated block swallows the
/// rest of the text.
pub fn strip_reasoning(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;

    loop {
        let Some(start) = find_ignore_case(rest, THINK_OPEN) else {
            output.push_str(rest);
            break;
        };
        output.push_str(&rest[..start]);
        let after_open = &rest[start + THINK_OPEN.len()..];
        match find_ignore_case(after_open, THINK_CLOSE) {
            Some(end) => rest = &after_open[end + THINK_CLOSE.len()..],
            None => break,
        }
    }

    output.trim().to_owned()
}

/// Body of the first fenced block whose info string equals `language`
/// (case-insensitive). `None` matches any fence.
pub fn fenced_block<'a>(text: &'a str, language: Option<&str>) -> Option<&'a str> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_fence = &rest[open + FENCE.len()..];
        let line_end = after_fence.find('\n')?;
        let info = after_fence[..line_end].trim();
        let body = &after_fence[line_end + 1..];
        let close = body.find(FENCE)?;

        let matches = match language {
            Some(expected) => info.eq_ignore_ascii_case(expected),
            None => true,
        };
        if matches {
            return Some(body[..close].trim());
        }
        rest = &body[close + FENCE.len()..];
    }
    None
}

/// Outermost `{ ... }` span, preferring a ```json fence when one exists.
pub fn json_object(text: &str) -> Option<&str> {
    let candidate = fenced_block(text, Some("json")).or_else(|| fenced_block(text, None)).unwrap_or(text);
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    (end > start).then(|| &candidate[start..=end])
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{fenced_block, json_object, strip_reasoning};

    #[test]
    fn reasoning_blocks_are_removed() {
        let raw = "<think>the user wants counts</think>\nSELECT 1";
        assert_eq!(strip_reasoning(raw), "SELECT 1");
        assert_eq!(strip_reasoning("a <THINK>x</THINK> b"), "a  b");
        assert_eq!(strip_reasoning("answer <think>never closed"), "answer");
    }

    #[test]
    fn fenced_block_honours_language() {
        let text = "intro\n```python\nprint(1)\n```\n```sql\nSELECT 2\n```";
        assert_eq!(fenced_block(text, Some("sql")), Some("SELECT 2"));
        assert_eq!(fenced_block(text, None), Some("print(1)"));
        assert_eq!(fenced_block("no fences", None), None);
    }

    #[test]
    fn json_object_tolerates_prose_and_fences() {
        assert_eq!(
            json_object("Sure! ```json\n{\"question_type\": \"WHY\"}\n``` done"),
            Some("{\"question_type\": \"WHY\"}")
        );
        assert_eq!(json_object("prefix {\"a\": {\"b\": 1}} suffix"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(json_object("no braces"), None);
    }
}
