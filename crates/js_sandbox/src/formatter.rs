//! Conversion of live script values into [`StructuredValue`] trees.
//!
//! One pass produces both the single-line `display` rendering and the
//! structured children (array items, object properties), so the two can
//! never disagree. Recursion is bounded by a depth limit instead of cycle
//! detection: a self-referential object simply bottoms out in a
//! `[Max Depth Reached]` placeholder.

use boa_engine::{
    Context, JsNativeError, JsObject, JsResult, JsString, JsValue,
    js_string,
    object::builtins::{JsDate, JsRegExp},
};
use common::{StructuredValue, ValueKind};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as Json;
use std::rc::Rc;

use crate::config::{DEFAULT_MAX_DEPTH, DEFAULT_PREVIEW_LEN};

/// Formats script values with a fixed depth limit.
#[derive(Clone, Debug)]
pub struct ValueFormatter {
    max_depth: usize,
    preview_len: usize,
    /// Text the values came from, used for function previews.
    source: Option<Rc<str>>,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl ValueFormatter {
    /// Create a formatter with the given depth limit.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            preview_len: DEFAULT_PREVIEW_LEN,
            source: None,
        }
    }

    /// Set the function preview threshold.
    pub fn with_preview_len(mut self, preview_len: usize) -> Self {
        self.preview_len = preview_len.max(3);
        self
    }

    /// Attach the evaluated source so function previews show real code.
    pub fn with_source(mut self, source: impl Into<Rc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Format a top-level value.
    pub fn format(&self, value: &JsValue, context: &mut Context) -> StructuredValue {
        self.format_at(value, 0, context)
    }

    /// Format every console argument.
    pub fn format_args(&self, args: &[JsValue], context: &mut Context) -> Vec<StructuredValue> {
        args.iter().map(|arg| self.format(arg, context)).collect()
    }

    /// Format a value found at `depth` levels below the top.
    pub fn format_at(&self, value: &JsValue, depth: usize, context: &mut Context) -> StructuredValue {
        if depth > self.max_depth {
            return StructuredValue::max_depth();
        }

        match value {
            JsValue::Undefined => StructuredValue::new(ValueKind::Undefined, "undefined"),
            JsValue::Null => StructuredValue::new(ValueKind::Null, "null"),
            JsValue::Boolean(b) => {
                StructuredValue::new(ValueKind::Boolean, b.to_string()).with_raw(Json::Bool(*b))
            }
            JsValue::Integer(i) => {
                StructuredValue::new(ValueKind::Number, i.to_string()).with_raw(Json::from(*i))
            }
            JsValue::Rational(r) => format_number(*r, context),
            JsValue::String(s) => {
                let s = s.to_std_string_escaped();
                StructuredValue::new(ValueKind::String, format!("\"{}\"", s)).with_raw(Json::String(s))
            }
            JsValue::Symbol(sym) => {
                let description = sym
                    .description()
                    .map(|d| d.to_std_string_escaped())
                    .unwrap_or_default();
                StructuredValue::new(ValueKind::Symbol, format!("Symbol({})", description))
            }
            JsValue::BigInt(b) => {
                let digits = b.to_string();
                StructuredValue::new(ValueKind::Bigint, format!("{}n", digits))
                    .with_raw(Json::String(digits))
            }
            JsValue::Object(obj) => self.format_object(value, obj, depth, context),
        }
    }

    fn format_object(
        &self,
        value: &JsValue,
        obj: &JsObject,
        depth: usize,
        context: &mut Context,
    ) -> StructuredValue {
        if obj.is_callable() {
            return self.format_function(value, obj, context);
        }

        if obj.is_array() {
            return self.format_array(obj, depth, context);
        }

        if let Ok(date) = JsDate::from_object(obj.clone()) {
            let display = date
                .to_iso_string(context)
                .ok()
                .and_then(|iso| iso.as_string().map(|s| s.to_std_string_escaped()))
                .unwrap_or_else(|| "Invalid Date".to_string());
            return StructuredValue::new(ValueKind::Date, display);
        }

        if is_error(value, context) {
            return format_error(obj, context);
        }

        if JsRegExp::from_object(obj.clone()).is_ok() {
            let display = value
                .to_string(context)
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_else(|_| "/(?:)/".to_string());
            return StructuredValue::new(ValueKind::Regexp, display);
        }

        if let Some(name) = constructor_name(obj, context).filter(|name| name != "Object") {
            return StructuredValue::new(ValueKind::Object, format!("{} {{...}}", name))
                .with_constructor(name);
        }

        let keys = match own_enumerable_keys(obj, context) {
            Ok(keys) => keys,
            Err(_) => return fallback(value, context),
        };

        if keys.is_empty() {
            return StructuredValue::new(ValueKind::Object, "{}");
        }

        let mut properties = IndexMap::with_capacity(keys.len());
        for key in keys {
            // A throwing getter only poisons its own entry.
            let entry = match obj.get(JsString::from(key.as_str()), context) {
                Ok(child) => self.format_at(&child, depth + 1, context),
                Err(_) => StructuredValue::getter_error(),
            };
            properties.insert(key, entry);
        }

        let pairs = properties
            .iter()
            .map(|(key, entry)| format!("{}: {}", key, entry.display))
            .collect::<Vec<_>>();

        StructuredValue::new(ValueKind::Object, format!("{{{}}}", pairs.join(", ")))
            .with_properties(properties)
    }

    fn format_function(&self, value: &JsValue, obj: &JsObject, context: &mut Context) -> StructuredValue {
        let name = obj
            .get(js_string!("name"), context)
            .ok()
            .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "anonymous".to_string());

        // The engine has no source text for functions, so look the definition
        // up in the evaluated source by name.
        let source = self
            .source
            .as_deref()
            .and_then(|source| function_source(source, &name, self.preview_len + 1))
            .unwrap_or_else(|| {
                value
                    .to_string(context)
                    .map(|s| s.to_std_string_escaped())
                    .unwrap_or_default()
            });

        StructuredValue::new(ValueKind::Function, format!("ƒ {}()", name))
            .with_preview(truncate_preview(&source, self.preview_len))
    }

    fn format_array(&self, obj: &JsObject, depth: usize, context: &mut Context) -> StructuredValue {
        let length = array_length(obj, context);

        if length == 0 {
            return StructuredValue::new(ValueKind::Array, "[]").with_items(Vec::new());
        }

        let mut items = Vec::new();
        for i in 0..length {
            let item = match obj.get(i, context) {
                Ok(item) => self.format_at(&item, depth + 1, context),
                Err(_) => StructuredValue::getter_error(),
            };
            items.push(item);
        }

        let display = items
            .iter()
            .map(|item| item.display.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        StructuredValue::new(ValueKind::Array, format!("[{}]", display)).with_items(items)
    }
}

/// Format a value with the default depth limit.
pub fn format_value(value: &JsValue, context: &mut Context) -> StructuredValue {
    ValueFormatter::default().format(value, context)
}

/// Format a value starting at `depth` with an explicit depth limit.
pub fn format_value_with(
    value: &JsValue,
    depth: usize,
    max_depth: usize,
    context: &mut Context,
) -> StructuredValue {
    ValueFormatter::new(max_depth).format_at(value, depth, context)
}

/// Render an error object as `<name>: <message>`, keeping its stack.
pub fn format_error(obj: &JsObject, context: &mut Context) -> StructuredValue {
    let (name, message, stack) = error_parts(obj, context);
    StructuredValue::new(ValueKind::Error, format!("{}: {}", name, message)).with_stack(stack)
}

/// Name, message and stack text of an error-like object.
///
/// Missing or throwing properties fall back to `Error` and an empty message.
pub fn error_parts(obj: &JsObject, context: &mut Context) -> (String, String, Option<String>) {
    let name = string_property(obj, js_string!("name"), context).unwrap_or_else(|| "Error".to_string());
    let message = string_property(obj, js_string!("message"), context).unwrap_or_default();
    let stack = string_property(obj, js_string!("stack"), context).filter(|s| !s.is_empty());
    (name, message, stack)
}

/// Whether a value is an instance of the realm's `Error` constructor.
pub fn is_error(value: &JsValue, context: &mut Context) -> bool {
    let error_ctor: JsValue = context.intrinsics().constructors().error().constructor().into();
    value.instance_of(&error_ctor, context).unwrap_or(false)
}

/// Own enumerable string keys, in property order.
pub(crate) fn own_enumerable_keys(obj: &JsObject, context: &mut Context) -> JsResult<Vec<String>> {
    let object_ctor = context.intrinsics().constructors().object().constructor();
    let keys_fn = object_ctor.get(js_string!("keys"), context)?;
    let keys_fn = keys_fn
        .as_callable()
        .ok_or_else(|| JsNativeError::typ().with_message("Object.keys is not callable"))?;
    let keys = keys_fn.call(&JsValue::undefined(), &[obj.clone().into()], context)?;
    let keys = keys
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("Object.keys did not return an array"))?;

    let length = array_length(keys, context);
    let mut result = Vec::with_capacity(length as usize);
    for i in 0..length {
        let key = keys.get(i, context)?.to_string(context)?;
        result.push(key.to_std_string_escaped());
    }
    Ok(result)
}

/// `length` of an array-like object, zero when unreadable.
pub(crate) fn array_length(obj: &JsObject, context: &mut Context) -> u64 {
    obj.get(js_string!("length"), context)
        .ok()
        .and_then(|v| v.to_length(context).ok())
        .unwrap_or(0)
}

fn format_number(r: f64, context: &mut Context) -> StructuredValue {
    if r.is_nan() {
        return StructuredValue::new(ValueKind::Number, "NaN");
    }
    if r.is_infinite() {
        let display = if r > 0.0 { "Infinity" } else { "-Infinity" };
        return StructuredValue::new(ValueKind::Number, display);
    }

    let display = JsValue::from(r)
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| r.to_string());
    let raw = serde_json::Number::from_f64(r).map(Json::Number).unwrap_or(Json::Null);
    StructuredValue::new(ValueKind::Number, display).with_raw(raw)
}

fn constructor_name(obj: &JsObject, context: &mut Context) -> Option<String> {
    let constructor = obj.get(js_string!("constructor"), context).ok()?;
    let constructor = constructor.as_object()?;
    string_property(constructor, js_string!("name"), context)
}

fn string_property(obj: &JsObject, key: JsString, context: &mut Context) -> Option<String> {
    let value = obj.get(key, context).ok()?;
    if value.is_undefined() {
        return None;
    }
    value.to_string(context).ok().map(|s| s.to_std_string_escaped())
}

fn fallback(value: &JsValue, context: &mut Context) -> StructuredValue {
    let display = value
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| "[object Object]".to_string());
    StructuredValue::new(ValueKind::Unknown, display)
}

/// Text of the first definition of function `name` in `source`, at most
/// `max_chars` long. Declarations, assigned function expressions and
/// arrows, and method shorthand are recognised.
fn function_source(source: &str, name: &str, max_chars: usize) -> Option<String> {
    if name == "anonymous" {
        return None;
    }
    let name = regex::escape(name);
    let patterns = [
        format!(r"(?:async\s+)?function\s*\*?\s*{}\s*\(", name),
        format!(
            r"(?:^|[^\w$.]){}\s*[:=]\s*((?:async\s+)?(?:function\b|\([^()]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>))",
            name
        ),
        format!(r"(?m)(?:^|[^\w$.])((?:async\s+)?{}\s*\([^()]*\)\s*\{{)", name),
    ];

    let start = patterns.iter().find_map(|pattern| {
        let caps = Regex::new(pattern).ok()?.captures(source)?;
        caps.get(1).or_else(|| caps.get(0)).map(|m| m.start())
    })?;

    Some(source[start..].chars().take(max_chars).collect())
}

fn truncate_preview(source: &str, limit: usize) -> String {
    if source.chars().count() > limit {
        let head: String = source.chars().take(limit.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    fn eval(context: &mut Context, source: &str) -> JsValue {
        context.eval(Source::from_bytes(source.as_bytes())).unwrap()
    }

    fn format_js(source: &str) -> StructuredValue {
        let mut context = Context::default();
        let value = eval(&mut context, source);
        format_value(&value, &mut context)
    }

    #[test]
    fn test_format_primitive() {
        let mut context = Context::default();

        assert_eq!(format_value(&JsValue::undefined(), &mut context).display, "undefined");
        assert_eq!(format_value(&JsValue::null(), &mut context).display, "null");
        assert_eq!(format_value(&JsValue::from(true), &mut context).display, "true");
        assert_eq!(format_value(&JsValue::from(42), &mut context).display, "42");
        assert_eq!(format_value(&JsValue::from(42), &mut context).kind, ValueKind::Number);
    }

    #[test]
    fn test_non_finite_numbers() {
        assert_eq!(format_js("NaN").display, "NaN");
        assert_eq!(format_js("Infinity").display, "Infinity");
        assert_eq!(format_js("-Infinity").display, "-Infinity");
        assert_eq!(format_js("1.5").display, "1.5");
        assert_eq!(format_js("1.5").raw, serde_json::json!(1.5));
    }

    #[test]
    fn test_string_is_quoted() {
        let value = format_js("'hello'");
        assert_eq!(value.kind, ValueKind::String);
        assert_eq!(value.display, "\"hello\"");
        assert_eq!(value.raw, serde_json::json!("hello"));
    }

    #[test]
    fn test_symbol_and_bigint() {
        assert_eq!(format_js("Symbol('tag')").display, "Symbol(tag)");
        let big = format_js("10n");
        assert_eq!(big.kind, ValueKind::Bigint);
        assert_eq!(big.display, "10n");
    }

    #[test]
    fn test_array_is_fully_elaborated() {
        let value = format_js("[1, 2, 3]");
        assert_eq!(value.kind, ValueKind::Array);
        assert_eq!(value.display, "[1, 2, 3]");
        assert_eq!(value.length, Some(3));
        assert_eq!(value.items.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn test_long_array_is_not_truncated() {
        let value = format_js("Array.from({ length: 150 }, (_, i) => i)");
        assert_eq!(value.length, Some(150));
        assert!(value.display.ends_with("148, 149]"));
    }

    #[test]
    fn test_nested_and_empty_arrays() {
        assert_eq!(format_js("[]").display, "[]");
        assert_eq!(format_js("[1, [2, [3]], 'x']").display, "[1, [2, [3]], \"x\"]");
    }

    #[test]
    fn test_plain_object() {
        let value = format_js("({ b: 1, a: 'x', nested: { ok: true } })");
        assert_eq!(value.kind, ValueKind::Object);
        assert_eq!(value.display, "{b: 1, a: \"x\", nested: {ok: true}}");
        assert_eq!(value.keys, Some(3));

        let keys: Vec<_> = value.properties.as_ref().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a", "nested"]);
    }

    #[test]
    fn test_empty_object() {
        let value = format_js("({})");
        assert_eq!(value.display, "{}");
        assert!(value.properties.is_none());
    }

    #[test]
    fn test_self_reference_hits_depth_guard() {
        let mut context = Context::default();
        let value = eval(&mut context, "var a = { name: 'a' }; a.self = a; a");
        let formatted = format_value_with(&value, 0, 2, &mut context);

        assert!(formatted.display.contains("[Max Depth Reached]"));
        let self_entry = &formatted.properties.as_ref().unwrap()["self"];
        let deeper = &self_entry.properties.as_ref().unwrap()["self"];
        let deepest = &deeper.properties.as_ref().unwrap()["self"];
        assert_eq!(deepest.display, "[Max Depth Reached]");
        assert_eq!(deepest.kind, ValueKind::Object);
    }

    #[test]
    fn test_throwing_getter_is_contained() {
        let value = format_js("({ ok: 1, get boom() { throw new Error('nope'); } })");
        let properties = value.properties.as_ref().unwrap();
        assert_eq!(properties["ok"].display, "1");
        assert_eq!(properties["boom"].kind, ValueKind::Error);
        assert_eq!(properties["boom"].display, "[Getter Error]");
        assert_eq!(value.display, "{ok: 1, boom: [Getter Error]}");
    }

    fn format_with_source(source: &str) -> StructuredValue {
        let mut context = Context::default();
        let value = eval(&mut context, source);
        ValueFormatter::default().with_source(source).format(&value, &mut context)
    }

    #[test]
    fn test_functions() {
        let named = format_with_source("(function greet(name) { return 'hi ' + name; })");
        assert_eq!(named.kind, ValueKind::Function);
        assert_eq!(named.display, "ƒ greet()");
        assert_eq!(
            named.preview.as_deref(),
            Some("function greet(name) { return 'hi ' + name; })")
        );

        let anonymous = format_js("(() => 1)");
        assert_eq!(anonymous.display, "ƒ anonymous()");
    }

    #[test]
    fn test_function_preview_from_source() {
        let arrow = format_with_source("const add = (a, b) => a + b;\nadd");
        assert_eq!(arrow.display, "ƒ add()");
        assert_eq!(arrow.preview.as_deref(), Some("(a, b) => a + b;\nadd"));

        let long = format_with_source(
            "function describe(value) { return 'the value is ' + String(value) + ' today'; }\ndescribe",
        );
        let preview = long.preview.unwrap();
        assert_eq!(preview, "function describe(value) { return 'the value is...");
        assert_eq!(preview.chars().count(), 50);
    }

    #[test]
    fn test_function_preview_without_source() {
        // Without the source only the engine's placeholder text is available.
        let named = format_js("(function greet(name) { return name; })");
        assert_eq!(named.preview.as_deref(), Some("function greet() { [native code] }"));
    }

    #[test]
    fn test_function_source_lookup() {
        let source = "const obj = { run(x) { return x; } };\nlet greeter = 1;\nasync function greet() {}";
        assert_eq!(function_source(source, "run", 20).as_deref(), Some("run(x) { return x; }"));
        assert_eq!(function_source(source, "greet", 16).as_deref(), Some("async function g"));
        assert!(function_source(source, "missing", 10).is_none());
        assert!(function_source(source, "anonymous", 10).is_none());
    }

    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(80);
        let preview = truncate_preview(&long, 50);
        assert_eq!(preview.chars().count(), 50);
        assert!(preview.ends_with("..."));
        assert_eq!(truncate_preview("short", 50), "short");
    }

    #[test]
    fn test_dates() {
        assert_eq!(format_js("new Date(0)").display, "1970-01-01T00:00:00.000Z");
        let invalid = format_js("new Date(NaN)");
        assert_eq!(invalid.kind, ValueKind::Date);
        assert_eq!(invalid.display, "Invalid Date");
    }

    #[test]
    fn test_errors() {
        let value = format_js("new TypeError('bad input')");
        assert_eq!(value.kind, ValueKind::Error);
        assert_eq!(value.display, "TypeError: bad input");
    }

    #[test]
    fn test_regexp() {
        let value = format_js("/ab+c/gi");
        assert_eq!(value.kind, ValueKind::Regexp);
        assert_eq!(value.display, "/ab+c/gi");
    }

    #[test]
    fn test_class_instance_is_shallow() {
        let value = format_js("class Point { constructor() { this.x = 1; } }; new Point()");
        assert_eq!(value.display, "Point {...}");
        assert_eq!(value.constructor.as_deref(), Some("Point"));
        assert!(value.properties.is_none());
    }

    #[test]
    fn test_deterministic() {
        let source = "({ list: [1, 2, { deep: 'yes' }], flag: false })";
        assert_eq!(format_js(source), format_js(source));
    }
}
