use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::encode::{EncodeContext, LeafInput, encode_leaf};
use super::op::{FilterOp, date_value_family, is_relative_date_op, second_value_shape};
use super::{FilterLeaf, FilterNode, FilterTerm, FilterTermId};
use crate::column::{ColumnId, ColumnRegistry};
use crate::error::{GridError, GridResult};
use crate::layout::FilterTermLayout;
use crate::order_key::OrderKey;

/// Where a new or moved term lands among its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    End,
    Before(FilterTermId),
    After(FilterTermId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSlot {
    First,
    Second,
    Third,
}

/// Arena of filter terms with parent pointers
///
/// The root is implicit: root-level terms have `group == None` and are
/// combined by `root_is_any`.
#[derive(Debug, Clone)]
pub struct FilterTree {
    terms: BTreeMap<FilterTermId, FilterTerm>,
    next_id: u64,
    root_is_any: bool,
    max_depth: usize,
}

impl Default for FilterTree {
    fn default() -> Self {
        Self::new(8)
    }
}

impl FilterTree {
    pub fn new(max_depth: usize) -> Self {
        Self {
            terms: BTreeMap::new(),
            next_id: 1,
            root_is_any: false,
            max_depth,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn root_is_any(&self) -> bool {
        self.root_is_any
    }

    pub fn set_root_is_any(&mut self, is_any: bool) {
        self.root_is_any = is_any;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn get(&self, id: FilterTermId) -> Option<&FilterTerm> {
        self.terms.get(&id)
    }

    /// All terms in id order
    pub fn iter(&self) -> impl Iterator<Item = &FilterTerm> {
        self.terms.values()
    }

    /// Removes every term; the id counter keeps counting
    pub fn clear(&mut self) {
        self.terms.clear();
        self.root_is_any = false;
    }

    fn allocate(&mut self) -> FilterTermId {
        let id = FilterTermId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Children of `parent` (or of the root) ordered by their ordering key
    pub fn children(&self, parent: Option<FilterTermId>) -> Vec<&FilterTerm> {
        let mut children: Vec<&FilterTerm> =
            self.terms.values().filter(|t| t.group == parent).collect();
        children.sort_by(|a, b| a.ordering.cmp(&b.ordering).then(a.id.cmp(&b.id)));
        children
    }

    /// Every term below `id`, not including `id`
    pub fn descendants(&self, id: FilterTermId) -> BTreeSet<FilterTermId> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![id];
        while let Some(parent) = frontier.pop() {
            for term in self.terms.values().filter(|t| t.group == Some(parent)) {
                if found.insert(term.id) {
                    frontier.push(term.id);
                }
            }
        }
        found
    }

    /// Number of groups from the root down to and including `group`; the root is 0
    pub fn depth(&self, group: Option<FilterTermId>) -> usize {
        let mut depth = 0;
        let mut cursor = group;
        while let Some(id) = cursor {
            depth += 1;
            cursor = self.terms.get(&id).and_then(|t| t.group);
        }
        depth
    }

    /// Levels of groups in the subtree rooted at `id`, counting `id` itself
    fn group_height(&self, id: FilterTermId) -> usize {
        let Some(term) = self.terms.get(&id) else {
            return 0;
        };
        if !term.is_group() {
            return 0;
        }
        1 + self
            .children(Some(id))
            .iter()
            .map(|child| self.group_height(child.id))
            .max()
            .unwrap_or(0)
    }

    fn check_group(&self, parent: Option<FilterTermId>) -> GridResult<()> {
        match parent {
            None => Ok(()),
            Some(id) => match self.terms.get(&id) {
                None => Err(GridError::UnknownTerm(id)),
                Some(term) if !term.is_group() => Err(GridError::NotAGroup(id)),
                Some(_) => Ok(()),
            },
        }
    }

    fn ordering_for(
        &self,
        parent: Option<FilterTermId>,
        placement: Placement,
        skip: Option<FilterTermId>,
    ) -> GridResult<OrderKey> {
        let siblings: Vec<&FilterTerm> = self
            .children(parent)
            .into_iter()
            .filter(|t| Some(t.id) != skip)
            .collect();

        let position = |anchor: FilterTermId| {
            siblings
                .iter()
                .position(|t| t.id == anchor)
                .ok_or(GridError::UnknownTerm(anchor))
        };

        match placement {
            Placement::End => Ok(match siblings.last() {
                Some(last) => last.ordering.after(),
                None => OrderKey::first(),
            }),
            Placement::Before(anchor) => {
                let pos = position(anchor)?;
                let lower = pos.checked_sub(1).map(|p| &siblings[p].ordering);
                OrderKey::between(lower, Some(&siblings[pos].ordering))
            }
            Placement::After(anchor) => {
                let pos = position(anchor)?;
                let upper = siblings.get(pos + 1).map(|t| &t.ordering);
                OrderKey::between(Some(&siblings[pos].ordering), upper)
            }
        }
    }

    fn default_leaf(registry: &ColumnRegistry, op: Option<FilterOp>) -> GridResult<FilterLeaf> {
        let column = registry
            .first_filterable()
            .ok_or(GridError::NoFilterableColumn)?;
        let op = match op {
            Some(op) => op,
            None => registry
                .default_op(column)
                .ok_or(GridError::NotFilterable(column))?,
        };
        Ok(FilterLeaf::new(column, op))
    }

    /// Adds a condition on the first filterable column at the end of `parent`
    pub fn insert_leaf(
        &mut self,
        registry: &ColumnRegistry,
        parent: Option<FilterTermId>,
    ) -> GridResult<FilterTermId> {
        self.insert_leaf_at(registry, parent, Placement::End)
    }

    pub fn insert_leaf_at(
        &mut self,
        registry: &ColumnRegistry,
        parent: Option<FilterTermId>,
        placement: Placement,
    ) -> GridResult<FilterTermId> {
        self.check_group(parent)?;
        let leaf = Self::default_leaf(registry, None)?;
        let ordering = self.ordering_for(parent, placement, None)?;

        let id = self.allocate();
        self.terms.insert(
            id,
            FilterTerm {
                id,
                group: parent,
                ordering,
                node: FilterNode::Leaf(leaf),
            },
        );
        tracing::debug!(term = %id, parent = ?parent, "inserted filter condition");
        Ok(id)
    }

    /// Adds an `or` group holding one `not_empty` condition; returns `(group, leaf)`
    pub fn insert_group(
        &mut self,
        registry: &ColumnRegistry,
        parent: Option<FilterTermId>,
    ) -> GridResult<(FilterTermId, FilterTermId)> {
        self.check_group(parent)?;
        if self.depth(parent) + 1 > self.max_depth {
            return Err(GridError::NestingTooDeep {
                max: self.max_depth,
            });
        }
        let leaf = Self::default_leaf(registry, Some(FilterOp::NotEmpty))?;
        let ordering = self.ordering_for(parent, Placement::End, None)?;

        let group_id = self.allocate();
        let leaf_id = self.allocate();
        self.terms.insert(
            group_id,
            FilterTerm {
                id: group_id,
                group: parent,
                ordering,
                node: FilterNode::Group { is_any: true },
            },
        );
        self.terms.insert(
            leaf_id,
            FilterTerm {
                id: leaf_id,
                group: Some(group_id),
                ordering: OrderKey::first(),
                node: FilterNode::Leaf(leaf),
            },
        );
        tracing::debug!(group = %group_id, leaf = %leaf_id, parent = ?parent, "inserted filter group");
        Ok((group_id, leaf_id))
    }

    fn leaf_mut(&mut self, id: FilterTermId) -> GridResult<&mut FilterLeaf> {
        match self.terms.get_mut(&id) {
            None => Err(GridError::UnknownTerm(id)),
            Some(FilterTerm {
                node: FilterNode::Leaf(leaf),
                ..
            }) => Ok(leaf),
            Some(_) => Err(GridError::NotALeaf(id)),
        }
    }

    /// Points a condition at another column, resetting its operator and values
    pub fn change_column(
        &mut self,
        registry: &ColumnRegistry,
        id: FilterTermId,
        column: ColumnId,
    ) -> GridResult<()> {
        registry.check(column)?;
        let op = registry
            .default_op(column)
            .ok_or(GridError::NotFilterable(column))?;
        let leaf = self.leaf_mut(id)?;
        *leaf = FilterLeaf::new(column, op);
        Ok(())
    }

    /// Values are kept as they are; a relative date keyword the new operator
    /// cannot read nulls the second value
    pub fn change_op(
        &mut self,
        registry: &ColumnRegistry,
        id: FilterTermId,
        op: FilterOp,
    ) -> GridResult<()> {
        let leaf = self.leaf_mut(id)?;
        if !registry.offers_op(leaf.column, op) {
            return Err(GridError::OpNotOffered {
                column: leaf.column,
                op,
            });
        }
        leaf.op = op;
        if let Some(family) = date_value_family(op)
            && leaf.value_1.as_deref().is_some_and(|v| !family.accepts(v))
        {
            leaf.value_2 = None;
        }
        Ok(())
    }

    pub fn set_value(
        &mut self,
        id: FilterTermId,
        slot: ValueSlot,
        value: Option<String>,
    ) -> GridResult<()> {
        let leaf = self.leaf_mut(id)?;
        match slot {
            ValueSlot::First => {
                if is_relative_date_op(leaf.op)
                    && second_value_shape(leaf.value_1.as_deref())
                        != second_value_shape(value.as_deref())
                {
                    leaf.value_2 = None;
                }
                leaf.value_1 = value;
            }
            ValueSlot::Second => leaf.value_2 = value,
            ValueSlot::Third => leaf.value_3 = value,
        }
        Ok(())
    }

    /// Flips the combinator of `group`, or of the root when `None`
    pub fn toggle_combinator(&mut self, group: Option<FilterTermId>) -> GridResult<bool> {
        let Some(id) = group else {
            self.root_is_any = !self.root_is_any;
            return Ok(self.root_is_any);
        };
        match self.terms.get_mut(&id) {
            None => Err(GridError::UnknownTerm(id)),
            Some(FilterTerm {
                node: FilterNode::Group { is_any },
                ..
            }) => {
                *is_any = !*is_any;
                Ok(*is_any)
            }
            Some(_) => Err(GridError::NotAGroup(id)),
        }
    }

    /// Removes a term and, for groups, everything below it. Returns the number removed.
    pub fn delete(&mut self, id: FilterTermId) -> GridResult<usize> {
        if !self.terms.contains_key(&id) {
            return Err(GridError::UnknownTerm(id));
        }
        let mut doomed = self.descendants(id);
        doomed.insert(id);
        self.terms.retain(|term_id, _| !doomed.contains(term_id));
        tracing::debug!(term = %id, removed = doomed.len(), "deleted filter term");
        Ok(doomed.len())
    }

    /// Re-parents and re-orders `id`; only the moved term's key changes
    pub fn move_term(
        &mut self,
        id: FilterTermId,
        parent: Option<FilterTermId>,
        placement: Placement,
    ) -> GridResult<()> {
        if !self.terms.contains_key(&id) {
            return Err(GridError::UnknownTerm(id));
        }
        self.check_group(parent)?;
        if let Some(target) = parent
            && (target == id || self.descendants(id).contains(&target))
        {
            return Err(GridError::CyclicMove);
        }
        if self.depth(parent) + self.group_height(id) > self.max_depth {
            return Err(GridError::NestingTooDeep {
                max: self.max_depth,
            });
        }

        let ordering = self.ordering_for(parent, placement, Some(id))?;
        if let Some(term) = self.terms.get_mut(&id) {
            term.group = parent;
            term.ordering = ordering;
        }
        Ok(())
    }

    /// The whole filter as one boolean expression, `None` when there are no terms
    pub fn serialize(&self, registry: &ColumnRegistry, ctx: &EncodeContext) -> Option<String> {
        let roots = self.children(None);
        if roots.is_empty() {
            return None;
        }
        let joiner = if self.root_is_any { " or " } else { " and " };
        let parts: Vec<String> = roots
            .iter()
            .map(|term| self.serialize_term(term, registry, ctx))
            .collect();
        Some(parts.join(joiner))
    }

    fn serialize_term(
        &self,
        term: &FilterTerm,
        registry: &ColumnRegistry,
        ctx: &EncodeContext,
    ) -> String {
        match &term.node {
            FilterNode::Leaf(leaf) => Self::serialize_leaf(leaf, registry, ctx),
            FilterNode::Group { is_any } => {
                let children = self.children(Some(term.id));
                if children.is_empty() {
                    return "true".to_string();
                }
                let joiner = if *is_any { " or " } else { " and " };
                let parts: Vec<String> = children
                    .iter()
                    .map(|child| self.serialize_term(child, registry, ctx))
                    .collect();
                format!("({})", parts.join(joiner))
            }
        }
    }

    fn serialize_leaf(leaf: &FilterLeaf, registry: &ColumnRegistry, ctx: &EncodeContext) -> String {
        let (Some(expr), Some(filter_type)) = (
            registry.filter_expr(leaf.column),
            registry.filter_type(leaf.column),
        ) else {
            return super::encode::FAIL_OPEN.to_string();
        };
        encode_leaf(
            &LeafInput {
                op: leaf.op,
                expr,
                filter_type,
                values: leaf.values(),
                custom: registry.custom_filter(leaf.column),
            },
            ctx,
        )
    }

    /// Snapshot in tier order: root terms first, then their children, and so on
    pub fn capture(&self) -> Vec<FilterTermLayout> {
        let mut out = Vec::with_capacity(self.terms.len());
        let mut tier: Vec<Option<FilterTermId>> = vec![None];
        while !tier.is_empty() {
            let mut next = Vec::new();
            for parent in tier {
                for term in self.children(parent) {
                    out.push(FilterTermLayout {
                        key: term.id.0,
                        group: term.group.map(|g| g.0),
                        ordering: term.ordering.clone(),
                        node: term.node.clone(),
                    });
                    if term.is_group() {
                        next.push(Some(term.id));
                    }
                }
            }
            tier = next;
        }
        out
    }

    /// Replaces all terms with a snapshot, allocating fresh ids
    ///
    /// Parents are restored before children tier by tier, up to the depth
    /// guard. Terms whose parent never appears, or that sit deeper than the
    /// guard, are dropped.
    pub fn restore(&mut self, layout: &[FilterTermLayout], root_is_any: bool) -> usize {
        self.terms.clear();
        self.root_is_any = root_is_any;

        let mut mapping: HashMap<u64, FilterTermId> = HashMap::new();
        let mut tier_keys: Option<Vec<u64>> = None;

        for _ in 0..=self.max_depth {
            let tier: Vec<&FilterTermLayout> = layout
                .iter()
                .filter(|t| match (&tier_keys, t.group) {
                    (None, None) => true,
                    (Some(keys), Some(group)) => keys.contains(&group),
                    _ => false,
                })
                .collect();
            if tier.is_empty() {
                break;
            }

            let mut keys = Vec::new();
            for entry in tier {
                if mapping.contains_key(&entry.key) {
                    continue;
                }
                let group = entry.group.and_then(|g| mapping.get(&g).copied());
                let id = self.allocate();
                self.terms.insert(
                    id,
                    FilterTerm {
                        id,
                        group,
                        ordering: entry.ordering.clone(),
                        node: entry.node.clone(),
                    },
                );
                mapping.insert(entry.key, id);
                if matches!(entry.node, FilterNode::Group { .. }) {
                    keys.push(entry.key);
                }
            }
            tier_keys = Some(keys);
        }

        let dropped = layout.len() - mapping.len();
        if dropped > 0 {
            tracing::warn!(dropped, "filter terms were not restored");
        }
        mapping.len()
    }
}
