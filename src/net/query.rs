//! Query string construction.
//!
//! The output is a bit-exact contract: equal parameter maps always produce
//! the same URL, whatever order the keys were inserted in, which keeps cache
//! and in-flight keys stable.
//!
//! Values are percent-encoded with URI-component rules, after which `@`, `:`,
//! `$` and `,` are restored to their literal form and spaces become `+`
//! (or `%20` when configured).
use serde_json::Value;

use crate::net::request::Params;

/// How parameter maps are turned into `key=value` pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamSerializer {
    /// Flat pairs; arrays repeat the key, objects are sent as JSON text.
    #[default]
    Default,
    /// Bracket notation for nested values (`a[]=1`, `a[b]=c`).
    JqLike,
}

/// Builds request URLs from a base URL and parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEncoder {
    serializer: ParamSerializer,
    spaces_as_percent: bool,
}

impl QueryEncoder {
    pub fn new(serializer: ParamSerializer) -> Self {
        Self {
            serializer,
            spaces_as_percent: false,
        }
    }

    /// Encode spaces as `%20` instead of `+`.
    pub fn spaces_as_percent(mut self, on: bool) -> Self {
        self.spaces_as_percent = on;
        self
    }

    /// Appends the serialized `params` to `url`.
    pub fn build(&self, url: &str, params: Option<&Params>) -> String {
        let Some(params) = params else {
            return url.to_string();
        };

        let query = self.serialize(params);
        if query.is_empty() {
            return url.to_string();
        }

        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{query}")
    }

    /// Serializes `params` without the leading separator.
    pub fn serialize(&self, params: &Params) -> String {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();

        let mut parts = Vec::new();
        for key in keys {
            let value = &params[key];
            match self.serializer {
                ParamSerializer::Default => self.push_flat(&mut parts, key, value),
                ParamSerializer::JqLike => self.push_nested(&mut parts, key, value),
            }
        }
        parts.join("&")
    }

    fn push_flat(&self, parts: &mut Vec<String>, key: &str, value: &Value) {
        let values: &[Value] = match value {
            Value::Null => return,
            Value::Array(items) => items,
            scalar => std::slice::from_ref(scalar),
        };

        for item in values {
            if item.is_null() {
                continue;
            }
            parts.push(self.pair(key, &scalar_text(item)));
        }
    }

    fn push_nested(&self, parts: &mut Vec<String>, prefix: &str, value: &Value) {
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let nested = if is_structured(item) {
                        format!("{prefix}[{index}]")
                    } else {
                        format!("{prefix}[]")
                    };
                    self.push_nested(parts, &nested, item);
                }
            }
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    self.push_nested(parts, &format!("{prefix}[{key}]"), &map[key]);
                }
            }
            Value::Null => parts.push(format!("{}=", self.encode(prefix))),
            scalar => parts.push(self.pair(prefix, &scalar_text(scalar))),
        }
    }

    fn pair(&self, key: &str, value: &str) -> String {
        format!("{}={}", self.encode(key), self.encode(value))
    }

    fn encode(&self, raw: &str) -> String {
        encode_query_component(raw, self.spaces_as_percent)
    }
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Text form of a single value: strings as-is, structured values as JSON.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Characters that URI-component encoding escapes but a query keeps literal.
const RESTORED: [(&str, &str); 4] = [("%40", "@"), ("%3A", ":"), ("%24", "$"), ("%2C", ",")];

/// Marks that URI-component encoding leaves unescaped.
const UNRESERVED_MARKS: [(&str, &str); 5] =
    [("%21", "!"), ("%2A", "*"), ("%27", "'"), ("%28", "("), ("%29", ")")];

/// Percent-encodes one key or value for use in a query string.
pub fn encode_query_component(raw: &str, spaces_as_percent: bool) -> String {
    let mut encoded = urlencoding::encode(raw).into_owned();
    for (escaped, literal) in UNRESERVED_MARKS.iter().chain(RESTORED.iter()) {
        encoded = encoded.replace(escaped, literal);
    }
    if !spaces_as_percent {
        encoded = encoded.replace("%20", "+");
    }
    encoded
}
