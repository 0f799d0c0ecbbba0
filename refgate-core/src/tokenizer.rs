//! Shell-free argument tokenizer
//!
//! Splits a resolved command line into an argv vector that is handed straight
//! to the process launcher. No shell ever sees the string, so metacharacters
//! like `;`, `|` or `$(..)` are just bytes inside an argument.
//!
//! Rules:
//! - unquoted whitespace ends a token; empty tokens are dropped
//! - `'` or `"` opens a span closed only by the same quote character
//! - outside quotes `\` escapes whitespace, a quote or another backslash;
//!   before anything else it is kept literally
//! - inside quotes `\` escapes only the active quote character
//! - a trailing backslash and an unterminated quote are kept, never an error

/// Split `raw` into arguments
pub fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => match c {
                '\\' => match chars.peek() {
                    Some(&next) if next == q => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                _ if c == q => quote = None,
                _ => current.push(c),
            },
            None => match c {
                '\\' => match chars.peek() {
                    Some(&next) if is_escapable(next) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                '\'' | '"' => quote = Some(c),
                _ if c.is_whitespace() => flush(&mut current, &mut tokens),
                _ => current.push(c),
            },
        }
    }

    flush(&mut current, &mut tokens);
    tokens
}

fn is_escapable(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\'' | '"' | '\\')
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}
