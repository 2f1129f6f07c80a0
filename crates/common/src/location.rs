//! Source location attached to error records.

use serde::{Deserialize, Serialize};

/// One line of the context window around a failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextLine {
    /// 1-based line number.
    pub line_number: usize,
    pub content: String,
    pub is_error_line: bool,
    /// Only set on the failing line.
    pub column_number: Option<usize>,
}

/// Best-effort position of a failure in the submitted source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub line_number: Option<usize>,
    pub column_number: Option<usize>,
    /// Text of the failing line.
    pub error_line: Option<String>,
    /// Empty unless `has_location` is set.
    pub context_lines: Vec<ContextLine>,
    pub has_location: bool,
}

impl LocationInfo {
    /// A location that could not be resolved.
    pub fn none() -> Self {
        Self::default()
    }

    /// The context line flagged as the failing one, if any.
    pub fn error_context(&self) -> Option<&ContextLine> {
        self.context_lines.iter().find(|line| line.is_error_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_has_no_context() {
        let location = LocationInfo::none();
        assert!(!location.has_location);
        assert!(location.context_lines.is_empty());
        assert!(location.error_context().is_none());
    }

    #[test]
    fn test_camel_case_fields() {
        let location = LocationInfo {
            line_number: Some(2),
            column_number: None,
            error_line: Some("foo(".to_string()),
            context_lines: vec![ContextLine {
                line_number: 2,
                content: "foo(".to_string(),
                is_error_line: true,
                column_number: None,
            }],
            has_location: true,
        };
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["lineNumber"], 2);
        assert_eq!(json["hasLocation"], true);
        assert_eq!(json["contextLines"][0]["isErrorLine"], true);
        assert!(json["contextLines"][0]["columnNumber"].is_null());
    }
}
