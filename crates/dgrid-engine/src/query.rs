//! Query compilation
//!
//! The four variants are independent read projections over the current
//! column and filter state. Nothing is cached between calls; toggling a
//! column or editing a filter is picked up by the next compile.

use serde::{Deserialize, Serialize};

use crate::column::{ColumnId, ColumnRegistry, ColumnTable};
use crate::filter::{EncodeContext, FilterTree};

/// What rows a grid shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySource {
    /// Everything after `from`, joins included
    pub from: String,
    /// Expression selected by the id query
    pub primary_key: String,
    /// Scoping predicate supplied by the embedding page
    pub additional_where: Option<String>,
}

impl QuerySource {
    pub fn new(from: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            primary_key: primary_key.into(),
            additional_where: None,
        }
    }

    pub fn with_where(mut self, predicate: impl Into<String>) -> Self {
        self.additional_where = Some(predicate.into());
        self
    }
}

/// Table written by cell edits and bulk deletes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteTarget {
    pub table: String,
    pub primary_key: String,
}

impl WriteTarget {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }
}

/// SQL text plus the column behind each projected position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub projected: Vec<ColumnId>,
}

pub struct QueryCompiler<'a> {
    registry: &'a ColumnRegistry,
    columns: &'a ColumnTable,
    filters: &'a FilterTree,
    source: &'a QuerySource,
    ctx: EncodeContext,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(
        registry: &'a ColumnRegistry,
        columns: &'a ColumnTable,
        filters: &'a FilterTree,
        source: &'a QuerySource,
        ctx: EncodeContext,
    ) -> Self {
        Self {
            registry,
            columns,
            filters,
            source,
            ctx,
        }
    }

    fn where_clause(&self) -> String {
        let mut conditions = Vec::with_capacity(2);
        if let Some(filter) = self.filters.serialize(self.registry, &self.ctx) {
            conditions.push(format!("coalesce(({}), true)", filter));
        }
        if let Some(extra) = self
            .source
            .additional_where
            .as_deref()
            .filter(|w| !w.trim().is_empty())
        {
            conditions.push(format!("({})", extra));
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" where {}", conditions.join(" and "))
        }
    }

    fn order_by_clause(&self) -> String {
        let keys: Vec<String> = self
            .columns
            .sort_keys()
            .into_iter()
            .filter_map(|(id, asc)| {
                self.registry.projection(id).map(|expr| {
                    let direction = if asc { "asc" } else { "desc" };
                    format!("{} {} nulls last", expr, direction)
                })
            })
            .collect();
        if keys.is_empty() {
            String::new()
        } else {
            format!(" order by {}", keys.join(", "))
        }
    }

    /// Rows shown by the grid, one projection per queryable column in id order
    pub fn live(&self, row_count: u32) -> CompiledQuery {
        let mut projected = Vec::new();
        let mut select = Vec::new();
        for column in self.columns.iter() {
            let Some(expr) = self.registry.projection(column.id) else {
                continue;
            };
            let needed = column.displaying || column.always_generate || column.sort_index.is_some();
            select.push(if needed { expr } else { "null" });
            projected.push(column.id);
        }
        if select.is_empty() {
            select.push("null");
        }

        let sql = format!(
            "select {} from {}{}{} limit {}",
            select.join(", "),
            self.source.from,
            self.where_clause(),
            self.order_by_clause(),
            row_count
        );
        tracing::debug!(%sql, "compiled live query");
        CompiledQuery { sql, projected }
    }

    /// Number of rows matching the current filter
    pub fn count(&self) -> CompiledQuery {
        CompiledQuery {
            sql: format!("select count(*) from {}{}", self.source.from, self.where_clause()),
            projected: Vec::new(),
        }
    }

    /// Primary keys of every matching row
    pub fn ids(&self) -> CompiledQuery {
        CompiledQuery {
            sql: format!(
                "select {} from {}{}",
                self.source.primary_key,
                self.source.from,
                self.where_clause()
            ),
            projected: Vec::new(),
        }
    }

    /// Every exportable column in display order, visible or not, aliased to its export name
    pub fn download(&self) -> CompiledQuery {
        let mut projected = Vec::new();
        let mut select = Vec::new();
        for id in self.columns.ordered_ids() {
            let (Some(expr), Some(name)) =
                (self.registry.download_expr(id), self.registry.export_name(id))
            else {
                continue;
            };
            select.push(format!("{} as {}", expr, quote_identifier(name)));
            projected.push(id);
        }
        if select.is_empty() {
            select.push("null".to_string());
        }

        let sql = format!(
            "select {} from {}{}{}",
            select.join(", "),
            self.source.from,
            self.where_clause(),
            self.order_by_clause()
        );
        tracing::debug!(%sql, "compiled download query");
        CompiledQuery { sql, projected }
    }
}

/// Double-quoted identifier with embedded quotes doubled
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
