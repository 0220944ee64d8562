/// Keywords that mark a statement as mutating, schema-altering or otherwise unsafe.
pub const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "EXEC", "EXECUTE",
    "REPLACE", "MERGE", "GRANT", "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX",
];

/// Denied keywords that are also ordinary scalar functions when directly followed by `(`.
const FUNCTION_NAMES: &[&str] = &["REPLACE"];

const ALLOWED_LEADING_KEYWORDS: &[&str] = &["SELECT", "WITH"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryVerdict {
    Allow,
    Deny { reason_code: &'static str, reason: String },
}

impl QueryVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Read-only check applied to generated queries before execution.
///
/// The check is a pure function of the query text. Comments are ignored, keyword
/// matching is case-insensitive and on whole words, and the contents of quoted
/// literals and identifiers are opaque to both the keyword and statement checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryGuard;

impl QueryGuard {
    pub fn evaluate(&self, query: &str) -> QueryVerdict {
        let masked = mask_comments_and_literals(query);
        let statement = masked.trim().trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace());

        if statement.is_empty() {
            return deny("empty_query", "query is empty");
        }

        let words = words(statement);

        let leading = words.first().map(|(word, _)| word.as_str()).unwrap_or_default();
        if !ALLOWED_LEADING_KEYWORDS.contains(&leading) {
            return deny(
                "not_a_select",
                format!("query must start with SELECT or WITH, found `{leading}`"),
            );
        }

        for (word, followed_by_paren) in &words {
            if !DENIED_KEYWORDS.contains(&word.as_str()) {
                continue;
            }
            if *followed_by_paren && FUNCTION_NAMES.contains(&word.as_str()) {
                continue;
            }
            return deny("denied_keyword", format!("query contains forbidden keyword `{word}`"));
        }

        if statement.contains(';') {
            return deny("multiple_statements", "query contains more than one statement");
        }

        QueryVerdict::Allow
    }
}

fn deny(reason_code: &'static str, reason: impl Into<String>) -> QueryVerdict {
    QueryVerdict::Deny { reason_code, reason: reason.into() }
}

/// Replaces `-- line` and `/* block */` comments with a single space and
/// collapses every quoted token to an empty `''`.
///
/// Quotes follow SQLite's tokenizer: `'text'`, `"ident"` and `` `ident` `` with
/// doubled-quote escapes, and `[ident]` without escapes. Comment markers and `;`
/// inside a quoted token are data. An unterminated quote is left in place so
/// the remainder is still scanned.
fn mask_comments_and_literals(query: &str) -> String {
    let mut output = String::with_capacity(query.len());
    let mut chars = query.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        match (ch, chars.peek().map(|(_, next)| *next)) {
            ('-', Some('-')) => {
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                output.push(' ');
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for (_, next) in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
                output.push(' ');
            }
            ('\'' | '"' | '`' | '[', _) => {
                let close = if ch == '[' { ']' } else { ch };
                let escapable = ch != '[';
                let mut terminated = false;
                while let Some((_, next)) = chars.next() {
                    if next != close {
                        continue;
                    }
                    if escapable && chars.peek().map(|(_, after)| *after) == Some(close) {
                        chars.next();
                        continue;
                    }
                    terminated = true;
                    break;
                }
                if terminated {
                    output.push_str("''");
                } else {
                    output.push_str(&query[start..]);
                }
            }
            _ => output.push(ch),
        }
    }

    output
}

/// Upper-cased identifier-like words, each flagged when the next non-space
/// character is `(`.
fn words(statement: &str) -> Vec<(String, bool)> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = statement.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            current.push(ch.to_ascii_uppercase());
            let continues = chars.peek().is_some_and(|next| next.is_ascii_alphanumeric() || *next == '_');
            if continues {
                continue;
            }
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            let followed_by_paren = chars.peek() == Some(&'(');
            words.push((std::mem::take(&mut current), followed_by_paren));
        }
    }

    words
}
