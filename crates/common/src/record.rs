//! Output records sent from an isolation unit to its caller.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::location::LocationInfo;
use crate::value::StructuredValue;

/// Record type, matching the console method that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Log,
    Error,
    Warn,
    Info,
    Table,
    Time,
    Count,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Log => "log",
            RecordType::Error => "error",
            RecordType::Warn => "warn",
            RecordType::Info => "info",
            RecordType::Table => "table",
            RecordType::Time => "time",
            RecordType::Count => "count",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a `console.table` record. Rows are not uniform.
pub type TableRow = IndexMap<String, StructuredValue>;

/// Payload of a record.
///
/// Serialized untagged. Which variant a payload deserializes to is decided
/// by the record's type, since an empty table and an empty value list look
/// the same on the wire.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordContent {
    Values(Vec<StructuredValue>),
    Rows(Vec<TableRow>),
}

impl RecordContent {
    pub fn len(&self) -> usize {
        match self {
            RecordContent::Values(values) => values.len(),
            RecordContent::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> &[StructuredValue] {
        match self {
            RecordContent::Values(values) => values,
            RecordContent::Rows(_) => &[],
        }
    }

    pub fn rows(&self) -> &[TableRow] {
        match self {
            RecordContent::Rows(rows) => rows,
            RecordContent::Values(_) => &[],
        }
    }
}

/// Where an error record's failure originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaultOrigin {
    /// The submitted code failed to parse or threw.
    UserCode,
    /// The execution host could not prepare the evaluation context.
    HostSetup,
    /// The isolation unit could not be created or reached.
    Channel,
    /// The caller gave up waiting and terminated the unit.
    Timeout,
}

/// One message crossing the isolation channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RecordWire")]
pub struct OutputRecord {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub content: RecordContent,
    /// Capture time in milliseconds since the Unix epoch. Display only.
    pub timestamp: u64,
    /// Number of arguments passed to the console call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Timer or counter label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    /// Set on error records produced from an uncaught failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultOrigin>,
}

/// Wire shape of [`OutputRecord`] before `content` is resolved.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    #[serde(rename = "type")]
    record_type: RecordType,
    content: serde_json::Value,
    timestamp: u64,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    location: Option<LocationInfo>,
    #[serde(default)]
    fault: Option<FaultOrigin>,
}

impl TryFrom<RecordWire> for OutputRecord {
    type Error = serde_json::Error;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let content = match wire.record_type {
            RecordType::Table => RecordContent::Rows(serde_json::from_value(wire.content)?),
            _ => RecordContent::Values(serde_json::from_value(wire.content)?),
        };
        Ok(Self {
            record_type: wire.record_type,
            content,
            timestamp: wire.timestamp,
            count: wire.count,
            label: wire.label,
            location: wire.location,
            fault: wire.fault,
        })
    }
}

impl OutputRecord {
    pub fn new(record_type: RecordType, values: Vec<StructuredValue>) -> Self {
        Self {
            record_type,
            content: RecordContent::Values(values),
            timestamp: timestamp_now(),
            count: None,
            label: None,
            location: None,
            fault: None,
        }
    }

    pub fn table(rows: Vec<TableRow>) -> Self {
        Self {
            content: RecordContent::Rows(rows),
            ..Self::new(RecordType::Table, Vec::new())
        }
    }

    /// A single-line message composed by the host.
    pub fn text(record_type: RecordType, message: impl Into<String>) -> Self {
        Self::new(record_type, vec![StructuredValue::text(message)])
    }

    /// An error record describing an uncaught failure.
    pub fn fault(origin: FaultOrigin, error: StructuredValue, location: Option<LocationInfo>) -> Self {
        Self {
            location,
            fault: Some(origin),
            ..Self::new(RecordType::Error, vec![error])
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.record_type == RecordType::Error
    }

    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }

    /// Space-joined display text of the content.
    pub fn display_text(&self) -> String {
        match &self.content {
            RecordContent::Values(values) => values
                .iter()
                .map(|value| value.display.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            RecordContent::Rows(rows) => rows
                .iter()
                .map(|row| {
                    let cells = row
                        .iter()
                        .map(|(key, value)| format!("{}: {}", key, value.display))
                        .collect::<Vec<_>>();
                    format!("{{{}}}", cells.join(", "))
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
