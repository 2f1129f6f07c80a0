//! Structured description of a single runtime value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a [`StructuredValue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Bigint,
    Function,
    Array,
    Date,
    Error,
    Regexp,
    Object,
    Unknown,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Symbol => "symbol",
            ValueKind::Bigint => "bigint",
            ValueKind::Function => "function",
            ValueKind::Array => "array",
            ValueKind::Date => "date",
            ValueKind::Error => "error",
            ValueKind::Regexp => "regexp",
            ValueKind::Object => "object",
            ValueKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical description of one runtime value.
///
/// `display` is always populated and is the rendering consumers fall back to
/// when they do not special-case `kind`. The optional fields are only set
/// for the kinds they belong to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredValue {
    pub kind: ValueKind,
    pub display: String,
    /// JSON snapshot of primitive values. References (objects, functions,
    /// symbols) cannot cross the channel and are always `null`.
    #[serde(default)]
    pub raw: serde_json::Value,
    /// Array length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    /// Formatted array elements, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<StructuredValue>>,
    /// Number of own enumerable keys of a plain object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<usize>,
    /// Formatted object properties, in the object's own key order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, StructuredValue>>,
    /// Stack text of an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Truncated source text of a function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Constructor name of a non-plain object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
}

impl StructuredValue {
    /// Create a value with only a kind and display text.
    pub fn new(kind: ValueKind, display: impl Into<String>) -> Self {
        Self {
            kind,
            display: display.into(),
            raw: serde_json::Value::Null,
            length: None,
            items: None,
            keys: None,
            properties: None,
            stack: None,
            preview: None,
            constructor: None,
        }
    }

    /// A plain string entry, used for console messages the host composes
    /// itself (timer and counter output, warnings).
    pub fn text(display: impl Into<String>) -> Self {
        let display = display.into();
        let raw = serde_json::Value::String(display.clone());
        Self::new(ValueKind::String, display).with_raw(raw)
    }

    /// The placeholder that replaces a property whose getter threw.
    pub fn getter_error() -> Self {
        Self::new(ValueKind::Error, "[Getter Error]")
    }

    /// The placeholder emitted once the depth limit is exceeded.
    pub fn max_depth() -> Self {
        Self::new(ValueKind::Object, "[Max Depth Reached]")
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_items(mut self, items: Vec<StructuredValue>) -> Self {
        self.length = Some(items.len());
        self.items = Some(items);
        self
    }

    pub fn with_properties(mut self, properties: IndexMap<String, StructuredValue>) -> Self {
        self.keys = Some(properties.len());
        self.properties = Some(properties);
        self
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    pub fn with_constructor(mut self, constructor: impl Into<String>) -> Self {
        self.constructor = Some(constructor.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == ValueKind::Error
    }
}

impl fmt::Display for StructuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ValueKind::Bigint).unwrap();
        assert_eq!(json, "\"bigint\"");
        assert_eq!(ValueKind::Regexp.to_string(), "regexp");
    }

    #[test]
    fn test_optional_fields_skipped() {
        let value = StructuredValue::new(ValueKind::Number, "42").with_raw(serde_json::json!(42));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "number", "display": "42", "raw": 42}));
    }

    #[test]
    fn test_with_items_sets_length() {
        let value = StructuredValue::new(ValueKind::Array, "[1]")
            .with_items(vec![StructuredValue::new(ValueKind::Number, "1")]);
        assert_eq!(value.length, Some(1));
        assert_eq!(value.items.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(StructuredValue::getter_error().display, "[Getter Error]");
        assert!(StructuredValue::getter_error().is_error());
        assert_eq!(StructuredValue::max_depth().kind, ValueKind::Object);
    }
}
