//! Snapshots of column and filter state exchanged with view storage

use serde::{Deserialize, Serialize};

use crate::column::{ColumnId, ColumnRegistry};
use crate::filter::{FilterLeaf, FilterNode, FilterOp};
use crate::order_key::OrderKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub column: ColumnId,
    pub displaying: bool,
    pub ordering: OrderKey,
    pub sort_index: Option<u8>,
    pub sort_asc: bool,
    pub width: Option<f32>,
}

/// One filter term with parent links expressed through `key`
///
/// Keys only need to be unique within one snapshot; restoring allocates fresh
/// term ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTermLayout {
    pub key: u64,
    pub group: Option<u64>,
    pub ordering: OrderKey,
    pub node: FilterNode,
}

/// Complete column and filter state of a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub columns: Vec<ColumnLayout>,
    pub filters: Vec<FilterTermLayout>,
    pub root_filter_is_any: bool,
    pub row_height: f32,
}

/// Caller-supplied initial state used when no saved view is selected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultView {
    /// Display order; columns left out follow in declaration order
    pub column_order: Vec<ColumnId>,
    pub hidden: Vec<ColumnId>,
    /// Sort keys by precedence as `(column, ascending)`
    pub sort: Vec<(ColumnId, bool)>,
    /// Root-level conditions
    pub filters: Vec<FilterLeaf>,
    pub root_filter_is_any: bool,
    pub row_height: Option<f32>,
}

impl DefaultView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, columns: impl IntoIterator<Item = ColumnId>) -> Self {
        self.column_order = columns.into_iter().collect();
        self
    }

    pub fn hide(mut self, column: ColumnId) -> Self {
        self.hidden.push(column);
        self
    }

    pub fn sort(mut self, column: ColumnId, asc: bool) -> Self {
        self.sort.push((column, asc));
        self
    }

    pub fn filter(mut self, column: ColumnId, op: FilterOp, value: Option<&str>) -> Self {
        let mut leaf = FilterLeaf::new(column, op);
        leaf.value_1 = value.map(str::to_string);
        self.filters.push(leaf);
        self
    }

    pub fn match_any(mut self) -> Self {
        self.root_filter_is_any = true;
        self
    }

    pub fn into_layout(self, registry: &ColumnRegistry, default_row_height: f32) -> GridLayout {
        let mut order: Vec<ColumnId> = Vec::with_capacity(registry.len());
        for id in self.column_order.iter().copied().chain(registry.ids()) {
            if registry.def(id).is_some() && !order.contains(&id) {
                order.push(id);
            }
        }

        let keys = OrderKey::sequence(order.len());
        let columns = order
            .into_iter()
            .zip(keys)
            .map(|(id, ordering)| {
                let sort = self.sort.iter().position(|(c, _)| *c == id);
                ColumnLayout {
                    column: id,
                    displaying: !self.hidden.contains(&id)
                        && registry.def(id).is_some_and(|d| d.displaying),
                    ordering,
                    sort_index: sort.and_then(|i| u8::try_from(i).ok()),
                    sort_asc: sort.map(|i| self.sort[i].1).unwrap_or(true),
                    width: None,
                }
            })
            .collect();

        let filter_keys = OrderKey::sequence(self.filters.len());
        let filters = self
            .filters
            .into_iter()
            .zip(filter_keys)
            .enumerate()
            .map(|(key, (leaf, ordering))| FilterTermLayout {
                key: key as u64,
                group: None,
                ordering,
                node: FilterNode::Leaf(leaf),
            })
            .collect();

        GridLayout {
            columns,
            filters,
            root_filter_is_any: self.root_filter_is_any,
            row_height: self.row_height.unwrap_or(default_row_height),
        }
    }
}
