use std::fmt;

use indexmap::IndexMap;

use super::{ColumnDef, ColumnHandlers, ColumnId};
use crate::decision_table::DecisionTable;
use crate::error::{GridError, GridResult};
use crate::filter::op::{default_for, ops_for};
use crate::filter::{CustomFilter, FilterOp, FilterType};

/// Column metadata compiled into lookups once per grid
///
/// A missing entry is never an error: a column with no projection simply
/// contributes no data to the queries.
pub struct ColumnRegistry {
    defs: Vec<ColumnDef>,
    projections: DecisionTable<String>,
    storage_names: DecisionTable<String>,
    by_storage_name: IndexMap<String, ColumnId>,
    filter_types: DecisionTable<FilterType>,
    default_ops: DecisionTable<FilterOp>,
    filter_exprs: DecisionTable<String>,
    custom_filters: DecisionTable<CustomFilter>,
    export_names: DecisionTable<String>,
    download_exprs: DecisionTable<String>,
    update_fields: DecisionTable<String>,
}

impl fmt::Debug for ColumnRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnRegistry")
            .field("defs", &self.defs)
            .field("filterable", &self.filter_types.len())
            .field("custom_filters", &self.custom_filters.len())
            .finish_non_exhaustive()
    }
}

impl ColumnRegistry {
    pub fn new(defs: Vec<ColumnDef>) -> GridResult<Self> {
        let ids = || (0..defs.len()).map(ColumnId);

        let mut by_storage_name = IndexMap::new();
        for (id, def) in ids().zip(&defs) {
            if let Some(name) = &def.storage_name
                && by_storage_name.insert(name.clone(), id).is_some()
            {
                return Err(GridError::Configuration(format!(
                    "storage name '{}' is declared by more than one column",
                    name
                )));
            }
            if def.exportable && def.query.is_none() && def.download.is_none() {
                return Err(GridError::Configuration(format!(
                    "column '{}' is exportable but has neither a projection nor a download expression",
                    def.display_name
                )));
            }
        }

        let rules = |pick: fn(&ColumnDef) -> Option<String>| {
            DecisionTable::compile(ids().zip(&defs).filter_map(|(id, def)| pick(def).map(|v| (id, v))))
        };

        let projections = rules(|d| d.query.clone());
        let storage_names = rules(|d| d.storage_name.clone());
        let filter_exprs = rules(|d| {
            d.filter
                .as_ref()
                .and_then(|f| f.expr.clone().or_else(|| d.query.clone()))
        });
        let export_names = rules(|d| {
            d.exportable.then(|| {
                d.export_name
                    .clone()
                    .or_else(|| d.storage_name.clone())
                    .unwrap_or_else(|| d.display_name.clone())
            })
        });
        let download_exprs = rules(|d| {
            d.exportable
                .then(|| d.download.clone().or_else(|| d.query.clone()))
                .flatten()
        });
        let update_fields = rules(|d| d.update_field.clone());

        let filter_types = DecisionTable::compile(
            ids()
                .zip(&defs)
                .filter_map(|(id, d)| d.filter.as_ref().map(|f| (id, f.filter_type.clone()))),
        );
        let default_ops = DecisionTable::compile(
            filter_types
                .iter()
                .map(|(id, filter_type)| (id, default_for(filter_type))),
        );
        let custom_filters = DecisionTable::compile(ids().zip(&defs).filter_map(|(id, d)| {
            d.filter
                .as_ref()
                .and_then(|f| f.custom.clone())
                .map(|c| (id, c))
        }));

        tracing::debug!(
            columns = defs.len(),
            filterable = filter_types.len(),
            "compiled column registry"
        );

        Ok(Self {
            defs,
            projections,
            storage_names,
            by_storage_name,
            filter_types,
            default_ops,
            filter_exprs,
            custom_filters,
            export_names,
            download_exprs,
            update_fields,
        })
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Column ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        (0..self.defs.len()).map(ColumnId)
    }

    pub fn def(&self, id: ColumnId) -> Option<&ColumnDef> {
        self.defs.get(id.index())
    }

    pub fn check(&self, id: ColumnId) -> GridResult<&ColumnDef> {
        self.def(id).ok_or(GridError::UnknownColumn(id))
    }

    pub fn projection(&self, id: ColumnId) -> Option<&str> {
        self.projections.get(id).map(String::as_str)
    }

    pub fn storage_name(&self, id: ColumnId) -> Option<&str> {
        self.storage_names.get(id).map(String::as_str)
    }

    pub fn column_for_storage_name(&self, name: &str) -> Option<ColumnId> {
        self.by_storage_name.get(name).copied()
    }

    pub fn filter_type(&self, id: ColumnId) -> Option<&FilterType> {
        self.filter_types.get(id)
    }

    pub fn default_op(&self, id: ColumnId) -> Option<FilterOp> {
        self.default_ops.get(id).copied()
    }

    pub fn filter_expr(&self, id: ColumnId) -> Option<&str> {
        self.filter_exprs.get(id).map(String::as_str)
    }

    /// Whether `op` is one of the operators offered for the column's filter type
    pub fn offers_op(&self, id: ColumnId, op: FilterOp) -> bool {
        self.filter_type(id)
            .is_some_and(|filter_type| ops_for(filter_type).contains(&op))
    }

    pub fn custom_filter(&self, id: ColumnId) -> Option<&CustomFilter> {
        self.custom_filters.get(id)
    }

    pub fn is_filterable(&self, id: ColumnId) -> bool {
        self.filter_types.contains(id)
    }

    pub fn first_filterable(&self) -> Option<ColumnId> {
        self.filter_types.iter().next().map(|(id, _)| id)
    }

    pub fn display_name(&self, id: ColumnId) -> Option<&str> {
        self.def(id).map(|d| d.display_name.as_str())
    }

    pub fn export_name(&self, id: ColumnId) -> Option<&str> {
        self.export_names.get(id).map(String::as_str)
    }

    pub fn download_expr(&self, id: ColumnId) -> Option<&str> {
        self.download_exprs.get(id).map(String::as_str)
    }

    pub fn update_field(&self, id: ColumnId) -> Option<&str> {
        self.update_fields.get(id).map(String::as_str)
    }

    pub fn is_sortable(&self, id: ColumnId) -> bool {
        self.def(id).is_some_and(|d| d.sortable)
    }

    pub fn handlers(&self, id: ColumnId) -> Option<&ColumnHandlers> {
        self.def(id).map(|d| &d.handlers).filter(|h| !h.is_empty())
    }
}
