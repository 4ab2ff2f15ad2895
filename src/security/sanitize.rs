//! Request payload sanitization.
//!
//! Walks a JSON value tree and rewrites string leaves that look like NoSQL
//! operator injection, script/markup injection or template-literal injection.
//! Containers keep their shape and non-string leaves pass through.
//!
//! # String classification
//! Each pass checks the classes in this order and rewrites only the first
//! one that matches:
//! 1. NoSQL operator: `{` followed later by `$where`, `$ne`, `$gt`, `$lt`,
//!    `$regex`, `$exists`, `$in`, `$nin`, `$or` or `$and`. Handed to the
//!    configured [`OperatorStripper`].
//! 2. Markup: `<script>` blocks become `[SCRIPT_REMOVED]`, `javascript:` and
//!    inline `on*=` handler attributes are removed. All three rewrites run.
//! 3. Template literal: every `${...}` becomes `[TEMPLATE_LITERAL_REMOVED]`.
//! 4. Anything else is returned as is.
//!
//! Passes repeat until the string stops changing, so an operator string is
//! stripped before markup or template rewrites ever see it, and whatever the
//! stripper leaves behind is then checked like any other string. Reordering
//! the classes changes the output for strings that match more than one.

use std::borrow::Cow;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const SCRIPT_MARKER: &str = "[SCRIPT_REMOVED]";
pub const TEMPLATE_MARKER: &str = "[TEMPLATE_LITERAL_REMOVED]";

/// Upper bound on cascade passes over one string.
const MAX_PASSES: usize = 8;

static NOSQL_OPERATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\{.*\$(?:where|ne|gt|lt|regex|exists|in|nin|or|and)")
        .expect("valid nosql operator pattern")
});
static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid script block pattern")
});
static JAVASCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid javascript scheme pattern"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)on\w+\s*=").expect("valid event handler pattern"));
static TEMPLATE_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{[^}]*\}").expect("valid template literal pattern"));

/// Neutralizes strings classified as NoSQL operator injection.
pub trait OperatorStripper: Send + Sync {
    fn strip(&self, input: &str) -> String;
}

/// Removes `$`-prefixed keys from strings that hold a JSON object or array.
///
/// Strings that are not JSON containers are returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoKeyStripper;

impl OperatorStripper for MongoKeyStripper {
    fn strip(&self, input: &str) -> String {
        match serde_json::from_str::<Value>(input) {
            Ok(mut value @ (Value::Object(_) | Value::Array(_))) => {
                strip_operator_keys(&mut value);
                value.to_string()
            }
            _ => input.to_string(),
        }
    }
}

fn strip_operator_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with('$'));
            map.values_mut().for_each(strip_operator_keys);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_operator_keys),
        _ => {}
    }
}

/// Shape-preserving sanitizer for request payloads.
#[derive(Clone)]
pub struct Sanitizer {
    stripper: Arc<dyn OperatorStripper>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(Arc::new(MongoKeyStripper))
    }
}

impl Sanitizer {
    pub fn new(stripper: Arc<dyn OperatorStripper>) -> Self {
        Self { stripper }
    }

    /// Sanitize every string leaf of `value`.
    pub fn sanitize(&self, value: Value) -> Value {
        match value {
            Value::String(s) => {
                let rewritten = match self.sanitize_string(&s) {
                    Cow::Owned(out) => Some(out),
                    Cow::Borrowed(_) => None,
                };
                Value::String(rewritten.unwrap_or(s))
            }
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.sanitize(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, v)| (key, self.sanitize(v)))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Sanitize a single string. Borrowed output means nothing changed.
    ///
    /// Passes of the cascade repeat until one leaves the string as it is, so
    /// sanitizing the output again is a no-op.
    pub fn sanitize_string<'a>(&self, s: &'a str) -> Cow<'a, str> {
        let Some(mut current) = self.rewrite(s) else {
            return Cow::Borrowed(s);
        };
        for _ in 1..MAX_PASSES {
            match self.rewrite(&current) {
                Some(next) => current = next,
                None => break,
            }
        }
        Cow::Owned(current)
    }

    /// One pass: the rewrite of the first matching class, or `None` when the
    /// pass leaves `s` unchanged.
    fn rewrite(&self, s: &str) -> Option<String> {
        let out = if NOSQL_OPERATOR.is_match(s) {
            self.stripper.strip(s)
        } else if SCRIPT_BLOCK.is_match(s)
            || JAVASCRIPT_SCHEME.is_match(s)
            || EVENT_HANDLER.is_match(s)
        {
            let out = SCRIPT_BLOCK.replace_all(s, SCRIPT_MARKER);
            let out = JAVASCRIPT_SCHEME.replace_all(&out, "");
            EVENT_HANDLER.replace_all(&out, "").into_owned()
        } else if TEMPLATE_LITERAL.is_match(s) {
            TEMPLATE_LITERAL.replace_all(s, TEMPLATE_MARKER).into_owned()
        } else {
            return None;
        };
        (out != s).then_some(out)
    }
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer").finish_non_exhaustive()
    }
}
