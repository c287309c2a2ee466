//! Filter terms, operators and the filter tree

pub mod encode;
pub mod op;
mod tree;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::ColumnId;
use crate::order_key::OrderKey;

pub use encode::{CustomFilter, EncodeContext, FilterValues};
pub use op::{FilterOp, FilterType};
pub use tree::{FilterTree, Placement, ValueSlot};

/// Identifier of a filter term, allocated from a per-tree counter and never reused
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FilterTermId(pub u64);

impl fmt::Display for FilterTermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A predicate on one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLeaf {
    pub column: ColumnId,
    pub op: FilterOp,
    pub value_1: Option<String>,
    pub value_2: Option<String>,
    pub value_3: Option<String>,
}

impl FilterLeaf {
    pub fn new(column: ColumnId, op: FilterOp) -> Self {
        Self {
            column,
            op,
            value_1: None,
            value_2: None,
            value_3: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value_1 = Some(value.into());
        self
    }

    pub fn values(&self) -> FilterValues<'_> {
        FilterValues {
            value_1: self.value_1.as_deref(),
            value_2: self.value_2.as_deref(),
            value_3: self.value_3.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterNode {
    /// `is_any = true` joins children with `or`, otherwise `and`
    Group { is_any: bool },
    Leaf(FilterLeaf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub id: FilterTermId,
    /// Parent group, `None` for root-level terms
    pub group: Option<FilterTermId>,
    /// Position among siblings of the same group
    pub ordering: OrderKey,
    pub node: FilterNode,
}

impl FilterTerm {
    pub fn is_group(&self) -> bool {
        matches!(self.node, FilterNode::Group { .. })
    }

    pub fn leaf(&self) -> Option<&FilterLeaf> {
        match &self.node {
            FilterNode::Leaf(leaf) => Some(leaf),
            FilterNode::Group { .. } => None,
        }
    }

    pub fn is_any(&self) -> Option<bool> {
        match self.node {
            FilterNode::Group { is_any } => Some(is_any),
            FilterNode::Leaf(_) => None,
        }
    }
}
