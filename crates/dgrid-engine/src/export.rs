//! CSV export of the download query

use std::io::Write;

use dgrid_core::{Connection, Value};

use crate::column::ColumnRegistry;
use crate::query::CompiledQuery;

pub(crate) fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Runs a compiled download query and writes a header row of export names
/// followed by one line per row. Returns the number of data rows written.
pub async fn export_csv<W: Write>(
    conn: &dyn Connection,
    registry: &ColumnRegistry,
    query: &CompiledQuery,
    mut out: W,
) -> dgrid_core::Result<usize> {
    let result = conn.query(&query.sql, &[]).await?;

    let header: Vec<String> = query
        .projected
        .iter()
        .map(|id| escape_csv_field(registry.export_name(*id).unwrap_or_default()))
        .collect();
    writeln!(out, "{}", header.join(","))?;

    for row in &result.rows {
        let line: Vec<String> = row
            .values
            .iter()
            .map(|v| escape_csv_field(&cell_text(v)))
            .collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()?;

    tracing::info!(rows = result.rows.len(), "exported rows as CSV");
    Ok(result.rows.len())
}
