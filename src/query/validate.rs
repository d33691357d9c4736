//! Local query checks run before a subscription is added.
//!
//! This is a tokenizer, not a parser: it catches malformed text and
//! unknown properties. Anything subtler (non-queryable fields, unsupported
//! operators) is left to the server.

use super::Query;
use crate::error::{Result, SyncError};
use crate::schema::{ObjectSchema, Schema};

const KEYWORDS: &[&str] = &[
    "AND",
    "OR",
    "NOT",
    "TRUEPREDICATE",
    "FALSEPREDICATE",
    "BEGINSWITH",
    "ENDSWITH",
    "CONTAINS",
    "LIKE",
    "IN",
    "ANY",
    "SOME",
    "ALL",
    "NONE",
    "BETWEEN",
    "TRUE",
    "FALSE",
    "NULL",
    "NIL",
    "SORT",
    "DISTINCT",
    "LIMIT",
    "ASC",
    "ASCENDING",
    "DESC",
    "DESCENDING",
    "INCLUDE",
    "SUBQUERY",
];

#[derive(Debug, PartialEq)]
enum Token {
    KeyPath(String),
    Keyword,
    Literal,
    Placeholder(String),
    Open,
    Close,
    Operator,
}

/// Check a query against the realm schema.
pub(crate) fn validate(query: &Query, schema: &Schema) -> Result<()> {
    let object_type = query.object_type();
    if object_type.trim().is_empty() {
        return Err(SyncError::Validation("object type must not be empty".into()));
    }

    let object = match schema.object(object_type) {
        Some(object) => Some(object),
        None if schema.is_empty() => None,
        None => {
            return Err(SyncError::Validation(format!(
                "object type '{object_type}' is not in the schema"
            )))
        }
    };

    for filter in query.filters() {
        validate_filter(filter, object)?;
    }

    Ok(())
}

fn validate_filter(filter: &str, object: Option<&ObjectSchema>) -> Result<()> {
    if filter.trim().is_empty() {
        return Err(SyncError::Validation("filter must not be empty".into()));
    }

    let tokens = tokenize(filter)?;
    let mut depth = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    SyncError::Validation(format!("unbalanced ')' in '{filter}'"))
                })?;
            }
            Token::Placeholder(p) => {
                return Err(SyncError::Validation(format!(
                    "unresolved placeholder {p} in '{filter}'"
                )))
            }
            Token::KeyPath(path) => {
                // Function-style literals such as oid(...) and uuid(...).
                if tokens.get(i + 1) == Some(&Token::Open) {
                    continue;
                }
                if let Some(object) = object {
                    check_key_path(path, object)?;
                }
            }
            Token::Keyword | Token::Literal | Token::Operator => {}
        }
    }

    if depth != 0 {
        return Err(SyncError::Validation(format!("unbalanced '(' in '{filter}'")));
    }

    Ok(())
}

fn check_key_path(path: &str, object: &ObjectSchema) -> Result<()> {
    if object.properties.is_empty() {
        return Ok(());
    }
    let head = path.split('.').next().unwrap_or(path);
    if head.starts_with('@') || head.starts_with('$') {
        return Ok(());
    }
    if !object.has_property(head) {
        return Err(SyncError::Validation(format!(
            "'{}' has no property '{head}'",
            object.name
        )));
    }
    Ok(())
}

fn tokenize(filter: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = filter.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '[' => {
                // Comparison modifiers like [c] and [d].
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| SyncError::Validation(format!("unterminated '[' in '{filter}'")))?;
                i += end + 1;
            }
            '{' | '}' | ',' => i += 1,
            '\'' | '"' => {
                let quote = c;
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' => j += 2,
                        ch if ch == quote => {
                            closed = true;
                            break;
                        }
                        _ => j += 1,
                    }
                }
                if !closed {
                    return Err(SyncError::Validation(format!(
                        "unterminated string literal in '{filter}'"
                    )));
                }
                tokens.push(Token::Literal);
                i = j + 1;
            }
            '$' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if text.len() > 1 && text[1..].chars().all(|d| d.is_ascii_digit()) {
                    tokens.push(Token::Placeholder(text));
                } else {
                    // Subquery variable.
                    while i < chars.len() && is_path_char(chars[i]) {
                        i += 1;
                    }
                    tokens.push(Token::Keyword);
                }
            }
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.' || chars[i] == ':') {
                    i += 1;
                }
                tokens.push(Token::Literal);
            }
            c if c.is_alphabetic() || c == '_' || c == '@' || c == '.' => {
                let start = i;
                while i < chars.len() && is_path_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let upper = word.to_ascii_uppercase();
                // A leading '.' continues a subquery result, e.g. `SUBQUERY(...).@count`.
                if word.starts_with('.') || KEYWORDS.contains(&upper.as_str()) {
                    tokens.push(Token::Keyword);
                } else {
                    tokens.push(Token::KeyPath(word));
                }
            }
            '=' | '!' | '<' | '>' | '&' | '|' | '+' | '-' | '*' | '/' => {
                i += 1;
                tokens.push(Token::Operator);
            }
            other => {
                return Err(SyncError::Validation(format!(
                    "unexpected character '{other}' in '{filter}'"
                )))
            }
        }
    }

    Ok(tokens)
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '@'
}
