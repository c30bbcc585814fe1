use serde::Serialize;

use crate::parser::ParserContext;
use crate::types::{FieldId, ParseState, ProtocolId};

/// Serializable snapshot of a [`ParserContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub protocol: Option<ProtocolId>,
    pub state: ParseState,
    /// Reason for [`ParseState::Error`], if any.
    pub error: Option<String>,
    pub bytes_consumed: u64,
    pub fields: Vec<FieldSummary>,
}

/// One observed field of a [`ContextSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub field: FieldId,
    /// Field value as lossy UTF-8.
    pub value: String,
    pub len: usize,
    /// Number of buffers the value is spread over.
    pub segments: usize,
}

impl ContextSummary {
    /// Snapshot `ctx`. Field values are copied here, not in the parser.
    pub fn from_context(ctx: &ParserContext) -> Self {
        Self {
            protocol: ctx.protocol(),
            state: ctx.state(),
            error: ctx.error().map(ToString::to_string),
            bytes_consumed: ctx.bytes_consumed(),
            fields: ctx
                .fields()
                .map(|(field, list)| FieldSummary {
                    field,
                    value: list.to_string_lossy(),
                    len: list.len(),
                    segments: list.segments().len(),
                })
                .collect(),
        }
    }
}

/// Serialize a context snapshot to a JSON string.
///
/// When `pretty` is `true` the output is indented for readability.
pub fn format_json(ctx: &ParserContext, pretty: bool) -> String {
    let summary = ContextSummary::from_context(ctx);
    if pretty {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    } else {
        serde_json::to_string(&summary).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Render a context in a human-readable debug format.
pub fn format_debug(ctx: &ParserContext) -> String {
    let summary = ContextSummary::from_context(ctx);
    let mut out = String::with_capacity(256);

    out.push_str("=== DPI Flow ===\n");
    out.push_str(&format!(
        "Protocol: {}\n",
        summary
            .protocol
            .map_or("undetermined", |p| p.as_str())
    ));
    out.push_str(&format!("State:    {}\n", summary.state));
    out.push_str(&format!("Consumed: {} bytes\n", summary.bytes_consumed));
    if let Some(error) = &summary.error {
        out.push_str(&format!("Error:    {error}\n"));
    }

    out.push_str(&format!("\n--- Fields ({}) ---\n", summary.fields.len()));
    for f in &summary.fields {
        out.push_str(&format!(
            "  {}: {} ({} bytes in {} segment{})\n",
            f.field,
            f.value,
            f.len,
            f.segments,
            if f.segments == 1 { "" } else { "s" }
        ));
    }

    out.push_str("================\n");
    out
}

/// Render only `name: value` lines for the observed fields.
pub fn format_fields_only(ctx: &ParserContext) -> String {
    let mut out = String::new();
    for (field, list) in ctx.fields() {
        out.push_str(&format!("{field}: {}\n", list.to_string_lossy()));
    }
    out
}
