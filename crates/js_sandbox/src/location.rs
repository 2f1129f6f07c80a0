//! Best-effort source locations for failures.
//!
//! Dynamically compiled code gives no reliable position API, so two
//! heuristics are used. Parse failures are pinned by re-parsing growing line
//! prefixes of the source until one fails. Run-time failures are matched
//! against a list of stack-frame patterns. Neither strategy ever fails: the
//! worst case is a [`LocationInfo`] without a location.

use boa_engine::{Context, JsError, Script, Source};
use common::{ContextLine, LocationInfo};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::formatter;

/// Lines shown on each side of the failing line.
const CONTEXT_RADIUS: usize = 2;

/// Stage at which a failure was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePhase {
    Parse,
    Runtime,
}

/// An uncaught failure, detached from the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub phase: FailurePhase,
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl Failure {
    pub fn parse(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase: FailurePhase::Parse,
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn runtime(name: impl Into<String>, message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            phase: FailurePhase::Runtime,
            name: name.into(),
            message: message.into(),
            stack,
        }
    }

    /// Extract name, message and stack from an engine error.
    ///
    /// Thrown values that are not objects are reported as `Uncaught` with
    /// their string conversion as the message.
    pub fn from_js_error(phase: FailurePhase, error: &JsError, context: &mut Context) -> Self {
        let (name, message, stack) = if let Some(native) = error.as_native() {
            (native.kind.to_string(), native.message().to_string(), None)
        } else {
            let value = error.to_opaque(context);
            match value.as_object() {
                Some(obj) => formatter::error_parts(obj, context),
                None => {
                    let message = value
                        .to_string(context)
                        .map(|s| s.to_std_string_escaped())
                        .unwrap_or_default();
                    ("Uncaught".to_string(), message, None)
                }
            }
        };

        Self {
            phase,
            name,
            message,
            stack,
        }
    }

    /// `<name>: <message>`
    pub fn summary(&self) -> String {
        format!("{}: {}", self.name, self.message)
    }
}

/// Checks whether a piece of source text parses.
pub trait SyntaxCheck {
    /// `Err` carries the parser's message.
    fn check(&mut self, source: &str) -> Result<(), String>;
}

/// Syntax checker backed by a private boa context. Nothing is evaluated.
pub struct BoaSyntaxCheck {
    context: Context,
}

impl BoaSyntaxCheck {
    pub fn new() -> Self {
        Self {
            context: Context::default(),
        }
    }
}

impl Default for BoaSyntaxCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxCheck for BoaSyntaxCheck {
    fn check(&mut self, source: &str) -> Result<(), String> {
        Script::parse(Source::from_bytes(source.as_bytes()), None, &mut self.context)
            .map(|_| ())
            .map_err(|err| {
                err.as_native()
                    .map(|native| native.message().to_string())
                    .unwrap_or_else(|| err.to_string())
            })
    }
}

/// Resolves failures to source locations.
pub struct LocationResolver<P = BoaSyntaxCheck> {
    checker: P,
}

impl LocationResolver<BoaSyntaxCheck> {
    pub fn new() -> Self {
        Self::with_checker(BoaSyntaxCheck::new())
    }
}

impl Default for LocationResolver<BoaSyntaxCheck> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: SyntaxCheck> LocationResolver<P> {
    pub fn with_checker(checker: P) -> Self {
        Self { checker }
    }

    pub fn resolve(&mut self, failure: &Failure, source: &str) -> LocationInfo {
        match failure.phase {
            FailurePhase::Parse => self.locate_parse_failure(failure, source),
            FailurePhase::Runtime => locate_runtime_failure(failure, source),
        }
    }

    fn locate_parse_failure(&mut self, failure: &Failure, source: &str) -> LocationInfo {
        let lines: Vec<&str> = source.lines().collect();
        if lines.is_empty() {
            return LocationInfo::none();
        }

        let line_number = self.first_failing_line(&lines).unwrap_or(1);
        let column = parse_error_column(&failure.message, lines[line_number - 1]);
        build_location(&lines, line_number, column)
    }

    /// 1-based number of the first line whose prefix fails to parse.
    ///
    /// A prefix that fails only because input ended early is incomplete, not
    /// faulty, unless it is the whole source.
    fn first_failing_line(&mut self, lines: &[&str]) -> Option<usize> {
        for end in 1..=lines.len() {
            let prefix = lines[..end].join("\n");
            match self.checker.check(&prefix) {
                Ok(()) => {}
                Err(message) if end < lines.len() && is_incomplete_input(&message) => {}
                Err(_) => return Some(end),
            }
        }
        None
    }
}

/// Resolve with a fresh boa syntax checker.
pub fn resolve(failure: &Failure, source: &str) -> LocationInfo {
    LocationResolver::new().resolve(failure, source)
}

static INCOMPLETE_MARKERS: &[&str] = &[
    "abrupt end",
    "unexpected end",
    "unterminated multiline comment",
    "unterminated template",
];

fn is_incomplete_input(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    INCOMPLETE_MARKERS.iter().any(|marker| message.contains(marker))
}

static COLUMN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:column|col|char|position|pos)\b\s*[:=]?\s*(\d+)").expect("valid column pattern")
});

static UNEXPECTED_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)unexpected token\s*['"`]([^'"`]+)['"`]"#).expect("valid token pattern")
});

/// Column of a parse failure, from a numeric token in the message or from
/// the first occurrence of the quoted offending token in the line.
fn parse_error_column(message: &str, line: &str) -> Option<usize> {
    if let Some(column) = COLUMN_PATTERN
        .captures(message)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .filter(|column| *column > 0)
    {
        return Some(column);
    }

    let token = UNEXPECTED_TOKEN_PATTERN.captures(message)?;
    let byte_index = line.find(&token[1])?;
    Some(line[..byte_index].chars().count() + 1)
}

/// Stack-frame patterns, most specific first. Each captures line and column.
static STACK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"<anonymous>:(\d+):(\d+)",
        r"Function:(\d+):(\d+)",
        r"eval[^\n]*?:(\d+):(\d+)",
        r"at\s+[^\n]*?:(\d+):(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid stack pattern"))
    .collect()
});

fn locate_runtime_failure(failure: &Failure, source: &str) -> LocationInfo {
    let Some(stack) = failure.stack.as_deref() else {
        return LocationInfo::none();
    };

    let position = STACK_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(stack)?;
        let line = caps[1].parse::<usize>().ok()?;
        let column = caps[2].parse::<usize>().ok()?;
        Some((line, column))
    });

    match position {
        Some((line, column)) => {
            let lines: Vec<&str> = source.lines().collect();
            build_location(&lines, line, Some(column))
        }
        None => LocationInfo::none(),
    }
}

/// Build the context window around a known line. Out-of-range lines yield no
/// location.
pub fn build_location(lines: &[&str], line_number: usize, column: Option<usize>) -> LocationInfo {
    if line_number == 0 || line_number > lines.len() {
        return LocationInfo::none();
    }

    let start = line_number.saturating_sub(CONTEXT_RADIUS).max(1);
    let end = (line_number + CONTEXT_RADIUS).min(lines.len());

    let context_lines = (start..=end)
        .map(|number| {
            let is_error_line = number == line_number;
            ContextLine {
                line_number: number,
                content: lines[number - 1].to_string(),
                is_error_line,
                column_number: if is_error_line { column } else { None },
            }
        })
        .collect();

    LocationInfo {
        line_number: Some(line_number),
        column_number: column,
        error_line: Some(lines[line_number - 1].to_string()),
        context_lines,
        has_location: true,
    }
}
