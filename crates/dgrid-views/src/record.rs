//! Stored row shapes and their conversion to grid layouts

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use dgrid_core::{QueryResult, Row, Value};
use dgrid_engine::filter::{FilterLeaf, FilterNode, FilterOp};
use dgrid_engine::{ColumnLayout, ColumnRegistry, FilterTermLayout, OrderKey};
use serde::{Deserialize, Serialize};

use crate::error::{ViewError, ViewResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub i64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ViewId> for Value {
    fn from(id: ViewId) -> Self {
        Value::Int64(id.0)
    }
}

/// A saved view's own row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub id: ViewId,
    pub name: String,
    pub datagrid_name: String,
    /// `None` for views shared by everyone
    pub user: Option<String>,
    pub root_filter_is_any: bool,
    pub row_height: f32,
    pub ordering: OrderKey,
}

pub(crate) const VIEW_COLUMNS: &str =
    "id, name, datagrid_name, user, root_filter_is_any, row_height, ordering";

impl ViewRecord {
    pub(crate) fn from_row(row: &Row) -> ViewResult<Self> {
        Ok(Self {
            id: ViewId(int(row, "id")?),
            name: text(row, "name")?,
            datagrid_name: text(row, "datagrid_name")?,
            user: opt_text(row, "user")?,
            root_filter_is_any: int(row, "root_filter_is_any")? != 0,
            row_height: real(row, "row_height")? as f32,
            ordering: order_key(row, "ordering")?,
        })
    }

    pub(crate) fn all(result: &QueryResult) -> ViewResult<Vec<Self>> {
        result.rows.iter().map(Self::from_row).collect()
    }

    /// The single view in `result`, or `NotFound`
    pub(crate) fn single(result: &QueryResult, id: ViewId) -> ViewResult<Self> {
        match result.rows.first() {
            Some(row) => Self::from_row(row),
            None => Err(ViewError::NotFound(id)),
        }
    }
}

/// One `datagrid_view_column` row
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredColumn {
    pub name: String,
    pub displaying: bool,
    pub ordering: OrderKey,
    pub sort_index: Option<u8>,
    pub sort_asc: bool,
    pub width: Option<f32>,
}

pub(crate) const COLUMN_COLUMNS: &str = "name, displaying, ordering, sort_index, sort_asc, width";

impl StoredColumn {
    /// `None` for columns without a storage name; those are never saved
    pub fn from_layout(registry: &ColumnRegistry, layout: &ColumnLayout) -> Option<Self> {
        Some(Self {
            name: registry.storage_name(layout.column)?.to_string(),
            displaying: layout.displaying,
            ordering: layout.ordering.clone(),
            sort_index: layout.sort_index,
            sort_asc: layout.sort_asc,
            width: layout.width,
        })
    }

    pub fn from_row(row: &Row) -> ViewResult<Self> {
        let sort_index = match opt_int(row, "sort_index")? {
            None => None,
            Some(index) => Some(u8::try_from(index).map_err(|_| {
                ViewError::Corrupt(format!("sort index {} is out of range", index))
            })?),
        };
        Ok(Self {
            name: text(row, "name")?,
            displaying: int(row, "displaying")? != 0,
            ordering: order_key(row, "ordering")?,
            sort_index,
            sort_asc: opt_int(row, "sort_asc")?.is_none_or(|asc| asc != 0),
            width: opt_real(row, "width")?.map(|w| w as f32),
        })
    }

    pub fn params(&self, view: ViewId) -> Vec<Value> {
        vec![
            view.into(),
            Value::from(self.name.as_str()),
            Value::Bool(self.displaying),
            Value::from(self.ordering.as_str()),
            self.sort_index.map(i64::from).into(),
            Value::Bool(self.sort_asc),
            self.width.map(f64::from).into(),
        ]
    }

    /// Resolves the storage name; `None` when the grid no longer has the column
    pub fn into_layout(self, registry: &ColumnRegistry) -> Option<ColumnLayout> {
        let Some(column) = registry.column_for_storage_name(&self.name) else {
            tracing::warn!(column = %self.name, "saved view references a removed column");
            return None;
        };
        Some(ColumnLayout {
            column,
            displaying: self.displaying,
            ordering: self.ordering,
            sort_index: self.sort_index,
            sort_asc: self.sort_asc,
            width: self.width,
        })
    }
}

/// One `datagrid_view_filter_term` row
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredFilterTerm {
    pub id: i64,
    pub group_id: Option<i64>,
    pub ordering: OrderKey,
    pub is_any: Option<bool>,
    pub column_name: Option<String>,
    pub op: Option<String>,
    pub values: [Option<String>; 3],
}

pub(crate) const FILTER_TERM_COLUMNS: &str =
    "id, group_id, ordering, is_any, column_name, op, value_1, value_2, value_3";

impl StoredFilterTerm {
    pub fn from_row(row: &Row) -> ViewResult<Self> {
        Ok(Self {
            id: int(row, "id")?,
            group_id: opt_int(row, "group_id")?,
            ordering: order_key(row, "ordering")?,
            is_any: opt_int(row, "is_any")?.map(|v| v != 0),
            column_name: opt_text(row, "column_name")?,
            op: opt_text(row, "op")?,
            values: [
                opt_text(row, "value_1")?,
                opt_text(row, "value_2")?,
                opt_text(row, "value_3")?,
            ],
        })
    }

    /// Snapshot term as stored; `None` for a condition on a column without a storage name
    pub fn from_layout(registry: &ColumnRegistry, term: &FilterTermLayout) -> Option<Self> {
        let stored = match &term.node {
            FilterNode::Group { is_any } => Self {
                id: 0,
                group_id: None,
                ordering: term.ordering.clone(),
                is_any: Some(*is_any),
                column_name: None,
                op: None,
                values: [None, None, None],
            },
            FilterNode::Leaf(leaf) => Self {
                id: 0,
                group_id: None,
                ordering: term.ordering.clone(),
                is_any: None,
                column_name: Some(registry.storage_name(leaf.column)?.to_string()),
                op: Some(leaf.op.to_string()),
                values: [
                    leaf.value_1.clone(),
                    leaf.value_2.clone(),
                    leaf.value_3.clone(),
                ],
            },
        };
        Some(stored)
    }

    /// Insert parameters under `group`, which replaces the stored group id
    pub fn params(&self, view: ViewId, group: Option<i64>) -> Vec<Value> {
        let [value_1, value_2, value_3] = self.values.clone();
        vec![
            view.into(),
            group.into(),
            Value::from(self.ordering.as_str()),
            self.is_any.into(),
            self.column_name.clone().into(),
            self.op.clone().into(),
            value_1.into(),
            value_2.into(),
            value_3.into(),
        ]
    }

    /// `None` for conditions on removed columns or with an unknown operator
    pub fn into_layout(self, registry: &ColumnRegistry) -> ViewResult<Option<FilterTermLayout>> {
        let key = u64::try_from(self.id)
            .map_err(|_| ViewError::Corrupt(format!("negative filter term id {}", self.id)))?;
        let group = match self.group_id {
            None => None,
            Some(g) => Some(u64::try_from(g).map_err(|_| {
                ViewError::Corrupt(format!("negative filter group id {}", g))
            })?),
        };

        let node = match self.is_any {
            Some(is_any) => FilterNode::Group { is_any },
            None => {
                let (Some(column_name), Some(op)) = (self.column_name, self.op) else {
                    return Err(ViewError::Corrupt(format!(
                        "filter term {} is neither a group nor a condition",
                        self.id
                    )));
                };
                let Some(column) = registry.column_for_storage_name(&column_name) else {
                    tracing::warn!(column = %column_name, "dropping condition on a removed column");
                    return Ok(None);
                };
                let Ok(op) = op.parse::<FilterOp>() else {
                    tracing::warn!(%op, "dropping condition with an unknown operator");
                    return Ok(None);
                };
                let [value_1, value_2, value_3] = self.values;
                FilterNode::Leaf(FilterLeaf {
                    column,
                    op,
                    value_1,
                    value_2,
                    value_3,
                })
            }
        };

        Ok(Some(FilterTermLayout {
            key,
            group,
            ordering: self.ordering,
            node,
        }))
    }
}

/// Splits parent-linked items into tiers: roots first, then the children of
/// the previous tier, for at most `max_depth` nested tiers. Returns the tiers
/// and the number of items that were never reached.
pub(crate) fn tiers<T, K>(
    items: &[T],
    key: impl Fn(&T) -> K,
    parent: impl Fn(&T) -> Option<K>,
    max_depth: usize,
) -> (Vec<Vec<&T>>, usize)
where
    K: Copy + Eq + Hash,
{
    let mut out: Vec<Vec<&T>> = Vec::new();
    let mut placed = 0;
    let mut previous: Option<HashSet<K>> = None;

    for _ in 0..=max_depth {
        let tier: Vec<&T> = items
            .iter()
            .filter(|item| match (&previous, parent(item)) {
                (None, None) => true,
                (Some(keys), Some(p)) => keys.contains(&p),
                _ => false,
            })
            .collect();
        if tier.is_empty() {
            break;
        }
        placed += tier.len();
        previous = Some(tier.iter().map(|item| key(item)).collect());
        out.push(tier);
    }

    (out, items.len() - placed)
}

fn value<'a>(row: &'a Row, name: &str) -> ViewResult<&'a Value> {
    row.get_by_name(name)
        .ok_or_else(|| ViewError::Corrupt(format!("missing column '{}'", name)))
}

fn text(row: &Row, name: &str) -> ViewResult<String> {
    opt_text(row, name)?.ok_or_else(|| ViewError::Corrupt(format!("'{}' is null", name)))
}

fn opt_text(row: &Row, name: &str) -> ViewResult<Option<String>> {
    match value(row, name)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(ViewError::Corrupt(format!("'{}' is not text: {}", name, other))),
    }
}

fn int(row: &Row, name: &str) -> ViewResult<i64> {
    opt_int(row, name)?.ok_or_else(|| ViewError::Corrupt(format!("'{}' is null", name)))
}

fn opt_int(row: &Row, name: &str) -> ViewResult<Option<i64>> {
    match value(row, name)? {
        Value::Null => Ok(None),
        other => other
            .as_i64()
            .map(Some)
            .ok_or_else(|| ViewError::Corrupt(format!("'{}' is not an integer: {}", name, other))),
    }
}

fn real(row: &Row, name: &str) -> ViewResult<f64> {
    opt_real(row, name)?.ok_or_else(|| ViewError::Corrupt(format!("'{}' is null", name)))
}

fn opt_real(row: &Row, name: &str) -> ViewResult<Option<f64>> {
    match value(row, name)? {
        Value::Null => Ok(None),
        other => other
            .as_f64()
            .map(Some)
            .ok_or_else(|| ViewError::Corrupt(format!("'{}' is not a number: {}", name, other))),
    }
}

fn order_key(row: &Row, name: &str) -> ViewResult<OrderKey> {
    let raw = text(row, name)?;
    OrderKey::parse(&raw).map_err(|e| ViewError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrid_engine::ColumnDef;
    use dgrid_engine::filter::FilterType;

    fn registry() -> ColumnRegistry {
        ColumnRegistry::new(vec![
            ColumnDef::new("Select"),
            ColumnDef::new("Name")
                .query("name")
                .storage_name("name")
                .filterable(FilterType::String),
        ])
        .unwrap()
    }

    #[test]
    fn test_tiers_follow_parent_links() {
        // (key, parent)
        let items = [(5, Some(2)), (1, None), (2, None), (7, Some(5)), (9, Some(42))];
        let (tiers, dropped) = tiers(&items, |i| i.0, |i| i.1, 8);
        let keys: Vec<Vec<i32>> = tiers
            .iter()
            .map(|tier| tier.iter().map(|i| i.0).collect())
            .collect();
        assert_eq!(keys, vec![vec![1, 2], vec![5], vec![7]]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_tiers_stop_at_depth_guard() {
        let items = [(1, None), (2, Some(1)), (3, Some(2)), (4, Some(3))];
        let (tiers, dropped) = tiers(&items, |i| i.0, |i| i.1, 2);
        assert_eq!(tiers.len(), 3);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_leaf_on_unsaved_column_is_skipped() {
        let registry = registry();
        let term = FilterTermLayout {
            key: 1,
            group: None,
            ordering: OrderKey::first(),
            node: FilterNode::Leaf(FilterLeaf::new(
                dgrid_engine::ColumnId(0),
                FilterOp::NotEmpty,
            )),
        };
        assert!(StoredFilterTerm::from_layout(&registry, &term).is_none());
    }

    #[test]
    fn test_unknown_operator_is_dropped_on_load() {
        let registry = registry();
        let stored = StoredFilterTerm {
            id: 3,
            group_id: None,
            ordering: OrderKey::first(),
            is_any: None,
            column_name: Some("name".into()),
            op: Some("str_sounds_like".into()),
            values: [None, None, None],
        };
        assert_eq!(stored.into_layout(&registry).unwrap(), None);
    }

    #[test]
    fn test_removed_column_is_dropped_on_load() {
        let stored = StoredColumn {
            name: "gone".into(),
            displaying: true,
            ordering: OrderKey::first(),
            sort_index: None,
            sort_asc: true,
            width: None,
        };
        assert_eq!(stored.into_layout(&registry()), None);
    }
}
