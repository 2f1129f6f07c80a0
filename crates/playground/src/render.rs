//! Terminal rendering of output records.

use common::{LocationInfo, OutputRecord, RecordContent};

/// Output format selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Renderer {
    /// `[type] display` lines with a source window under located errors.
    Human,
    /// One JSON object per record.
    Json,
}

impl Renderer {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Renderer::Json
        } else {
            Renderer::Human
        }
    }

    pub fn render(&self, record: &OutputRecord) -> serde_json::Result<String> {
        match self {
            Renderer::Human => Ok(render_record(record)),
            Renderer::Json => render_json(record),
        }
    }
}

/// Serialize a record as a single JSON line.
pub fn render_json(record: &OutputRecord) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

/// Human-readable rendering, without the timestamp.
pub fn render_record(record: &OutputRecord) -> String {
    let tag = format!("[{}]", record.record_type);
    let mut out = match &record.content {
        RecordContent::Values(_) => format!("{} {}", tag, record.display_text()),
        RecordContent::Rows(rows) if rows.is_empty() => format!("{} (empty)", tag),
        RecordContent::Rows(_) => {
            let body = record
                .display_text()
                .lines()
                .map(|line| format!("  {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}\n{}", tag, body)
        }
    };

    if let Some(location) = record.location.as_ref().filter(|l| l.has_location) {
        out.push('\n');
        out.push_str(&render_location(location));
    }
    out
}

/// Source window around a failure. The failing line is marked with `>` and
/// followed by a caret when the column is known.
pub fn render_location(location: &LocationInfo) -> String {
    let width = location
        .context_lines
        .iter()
        .map(|line| line.line_number.to_string().len())
        .max()
        .unwrap_or(1);

    let mut lines = Vec::with_capacity(location.context_lines.len() + 1);
    for line in &location.context_lines {
        let marker = if line.is_error_line { '>' } else { ' ' };
        lines.push(format!("{} {:>width$} | {}", marker, line.line_number, line.content, width = width));

        if let (true, Some(column)) = (line.is_error_line, line.column_number) {
            let pad = " ".repeat(width + 5 + column.saturating_sub(1));
            lines.push(format!("{}^", pad));
        }
    }
    lines.join("\n")
}
