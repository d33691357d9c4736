//! Query descriptions used as subscription keys.
//!
//! A [`Query`] names one object type plus an optional filter and sort.
//! Subscriptions are identified by `(object_type, query_string)`; sort
//! descriptors never take part in that identity.

mod validate;

pub(crate) use validate::validate;

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query string used when no filter was given.
pub const TRUE_PREDICATE: &str = "TRUEPREDICATE";

/// A query over one object type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    object_type: String,
    filters: Vec<String>,
    sort: Vec<String>,
}

impl Query {
    /// All objects of a type.
    pub fn objects(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            filters: Vec::new(),
            sort: Vec::new(),
        }
    }

    /// Narrow with a filter. Repeated filters are AND-ed.
    pub fn filtered(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Narrow with a filter whose `$0`, `$1`, ... placeholders are
    /// replaced by `args`.
    pub fn filtered_with(self, filter: &str, args: &[Value]) -> Result<Self> {
        let interpolated = interpolate(filter, args)?;
        Ok(self.filtered(interpolated))
    }

    /// Attach a sort descriptor. Does not change the subscription identity.
    pub fn sorted(mut self, descriptor: impl Into<String>) -> Self {
        self.sort.push(descriptor.into());
        self
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn sort_descriptors(&self) -> &[String] {
        &self.sort
    }

    /// Canonical filter text.
    pub fn query_string(&self) -> String {
        match self.filters.as_slice() {
            [] => TRUE_PREDICATE.to_string(),
            [single] => normalize(single),
            many => many
                .iter()
                .map(|f| format!("({})", normalize(f)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    pub fn descriptor(&self) -> QueryDescriptor {
        QueryDescriptor {
            object_type: self.object_type.clone(),
            query_string: self.query_string(),
        }
    }
}

/// The identity of a query as stored in a subscription and sent to the server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub object_type: String,
    pub query_string: String,
}

/// Collapse whitespace runs outside string literals and trim.
fn normalize(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;

    for c in filter.trim().chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
        out.push(c);
    }

    out
}

fn interpolate(filter: &str, args: &[Value]) -> Result<String> {
    let mut out = String::with_capacity(filter.len());
    let mut chars = filter.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '$' if chars.peek().map_or(false, |n| n.is_ascii_digit()) => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| SyncError::Validation(format!("bad placeholder ${digits}")))?;
                let arg = args.get(index).ok_or_else(|| {
                    SyncError::Validation(format!(
                        "placeholder ${index} has no argument ({} given)",
                        args.len()
                    ))
                })?;
                out.push_str(&literal(arg)?);
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Render a JSON value as a query-language literal.
fn literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
            format!("'{escaped}'")
        }
        Value::Array(items) => {
            let rendered = items.iter().map(literal).collect::<Result<Vec<_>>>()?;
            format!("{{{}}}", rendered.join(", "))
        }
        Value::Object(_) => {
            return Err(SyncError::Validation(
                "objects cannot be used as query arguments".into(),
            ))
        }
    })
}
