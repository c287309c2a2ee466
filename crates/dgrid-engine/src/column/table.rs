use serde::{Deserialize, Serialize};

use super::{ColumnId, ColumnRegistry};
use crate::error::{GridError, GridResult};
use crate::layout::ColumnLayout;
use crate::order_key::OrderKey;
use crate::settings::GridSettings;

/// Mutable per-grid state of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnState {
    pub id: ColumnId,
    pub width: f32,
    pub displaying: bool,
    /// Sort precedence, 0 is the primary key
    pub sort_index: Option<u8>,
    pub sort_asc: bool,
    pub ordering: OrderKey,
    pub always_generate: bool,
    pub has_query_generation: bool,
}

/// Column states of one grid instance, indexed by column id
///
/// At least one column is displaying at all times.
#[derive(Debug, Clone)]
pub struct ColumnTable {
    columns: Vec<ColumnState>,
    default_width: f32,
    min_width: f32,
}

impl ColumnTable {
    /// Declaration-order table with declared widths and visibility
    pub fn new(registry: &ColumnRegistry, settings: &GridSettings) -> Self {
        let keys = OrderKey::sequence(registry.len());
        let columns = registry
            .ids()
            .zip(keys)
            .filter_map(|(id, ordering)| {
                let def = registry.def(id)?;
                Some(ColumnState {
                    id,
                    width: def
                        .width
                        .unwrap_or(settings.default_column_width)
                        .max(settings.min_column_width),
                    displaying: def.displaying,
                    sort_index: None,
                    sort_asc: true,
                    ordering,
                    always_generate: def.always_generate,
                    has_query_generation: registry.projection(id).is_some(),
                })
            })
            .collect();

        let mut table = Self {
            columns,
            default_width: settings.default_column_width,
            min_width: settings.min_column_width,
        };
        table.ensure_one_displaying();
        table
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, id: ColumnId) -> Option<&ColumnState> {
        self.columns.get(id.index())
    }

    fn get_mut(&mut self, id: ColumnId) -> GridResult<&mut ColumnState> {
        self.columns
            .get_mut(id.index())
            .ok_or(GridError::UnknownColumn(id))
    }

    /// Column states in id order
    pub fn iter(&self) -> impl Iterator<Item = &ColumnState> {
        self.columns.iter()
    }

    /// Column states in display order
    pub fn ordered(&self) -> Vec<&ColumnState> {
        let mut ordered: Vec<&ColumnState> = self.columns.iter().collect();
        ordered.sort_by(|a, b| a.ordering.cmp(&b.ordering).then(a.id.cmp(&b.id)));
        ordered
    }

    pub fn ordered_ids(&self) -> Vec<ColumnId> {
        self.ordered().into_iter().map(|c| c.id).collect()
    }

    /// Displaying columns in display order
    pub fn visible(&self) -> Vec<&ColumnState> {
        self.ordered().into_iter().filter(|c| c.displaying).collect()
    }

    pub fn displaying_count(&self) -> usize {
        self.columns.iter().filter(|c| c.displaying).count()
    }

    /// Returns whether anything changed; hiding the last visible column is a no-op
    pub fn set_displaying(&mut self, id: ColumnId, displaying: bool) -> GridResult<bool> {
        let last_visible = self.displaying_count() == 1;
        let column = self.get_mut(id)?;
        if column.displaying == displaying {
            return Ok(false);
        }
        if !displaying && last_visible {
            tracing::debug!(column = %id, "refusing to hide the last visible column");
            return Ok(false);
        }
        column.displaying = displaying;
        Ok(true)
    }

    pub fn toggle_displaying(&mut self, id: ColumnId) -> GridResult<bool> {
        let displaying = self.get(id).ok_or(GridError::UnknownColumn(id))?.displaying;
        self.set_displaying(id, !displaying)
    }

    /// Sets the width clamped to the minimum and returns the stored value
    pub fn set_width(&mut self, id: ColumnId, width: f32) -> GridResult<f32> {
        let min_width = self.min_width;
        let column = self.get_mut(id)?;
        column.width = width.max(min_width);
        Ok(column.width)
    }

    pub fn min_width(&self) -> f32 {
        self.min_width
    }

    /// Sort keys by precedence as `(column, ascending)`
    pub fn sort_keys(&self) -> Vec<(ColumnId, bool)> {
        let mut keys: Vec<(u8, ColumnId, bool)> = self
            .columns
            .iter()
            .filter_map(|c| c.sort_index.map(|i| (i, c.id, c.sort_asc)))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, id, asc)| (id, asc)).collect()
    }

    /// Unsorted -> ascending (lowest precedence) -> descending -> unsorted
    pub fn toggle_sort(&mut self, id: ColumnId) -> GridResult<()> {
        let column = self.get(id).ok_or(GridError::UnknownColumn(id))?;
        match (column.sort_index, column.sort_asc) {
            (None, _) => self.set_sort(id, Some(true)),
            (Some(_), true) => self.set_sort(id, Some(false)),
            (Some(_), false) => self.set_sort(id, None),
        }
    }

    /// `Some(asc)` keeps an existing precedence or appends a new sort key, `None` removes it
    pub fn set_sort(&mut self, id: ColumnId, direction: Option<bool>) -> GridResult<()> {
        let next_index = self.sort_keys().len();
        let column = self.get_mut(id)?;
        match direction {
            Some(asc) => {
                if column.sort_index.is_none() {
                    column.sort_index = Some(u8::try_from(next_index).unwrap_or(u8::MAX));
                }
                column.sort_asc = asc;
            }
            None => {
                column.sort_index = None;
                column.sort_asc = true;
            }
        }
        self.compact_sort_indices();
        Ok(())
    }

    pub fn clear_sort(&mut self) {
        for column in &mut self.columns {
            column.sort_index = None;
            column.sort_asc = true;
        }
    }

    /// Moves `id` in front of `before`, or to the end when `before` is `None`.
    /// Only the moved column's key changes.
    pub fn move_before(&mut self, id: ColumnId, before: Option<ColumnId>) -> GridResult<()> {
        self.get(id).ok_or(GridError::UnknownColumn(id))?;
        let others: Vec<&ColumnState> = self.ordered().into_iter().filter(|c| c.id != id).collect();

        let ordering = match before {
            Some(target) => {
                let pos = others
                    .iter()
                    .position(|c| c.id == target)
                    .ok_or(GridError::UnknownColumn(target))?;
                let lower = pos.checked_sub(1).map(|p| &others[p].ordering);
                OrderKey::between(lower, Some(&others[pos].ordering))?
            }
            None => match others.last() {
                Some(last) => last.ordering.after(),
                None => OrderKey::first(),
            },
        };

        self.get_mut(id)?.ordering = ordering;
        Ok(())
    }

    /// Overwrites state from a saved layout; columns absent from it are appended
    /// after the last laid-out column in declaration order.
    pub fn apply_layout(&mut self, layout: &[ColumnLayout]) {
        let mut seen = vec![false; self.columns.len()];
        for entry in layout {
            let min_width = self.min_width;
            let Some(column) = self.columns.get_mut(entry.column.index()) else {
                tracing::warn!(column = %entry.column, "layout references an unknown column");
                continue;
            };
            column.displaying = entry.displaying;
            column.ordering = entry.ordering.clone();
            column.sort_index = entry.sort_index;
            column.sort_asc = entry.sort_asc;
            if let Some(width) = entry.width {
                column.width = width.max(min_width);
            }
            seen[entry.column.index()] = true;
        }

        let mut tail = self
            .columns
            .iter()
            .filter(|c| seen[c.id.index()])
            .map(|c| c.ordering.clone())
            .max();
        for column in self.columns.iter_mut().filter(|c| !seen[c.id.index()]) {
            let key = match &tail {
                Some(last) => last.after(),
                None => OrderKey::first(),
            };
            column.ordering = key.clone();
            column.sort_index = None;
            column.sort_asc = true;
            tail = Some(key);
        }

        self.compact_sort_indices();
        self.ensure_one_displaying();
    }

    /// Snapshot of every column, in id order
    pub fn capture(&self) -> Vec<ColumnLayout> {
        self.columns
            .iter()
            .map(|c| ColumnLayout {
                column: c.id,
                displaying: c.displaying,
                ordering: c.ordering.clone(),
                sort_index: c.sort_index,
                sort_asc: c.sort_asc,
                width: Some(c.width),
            })
            .collect()
    }

    /// Restores declaration order, declared widths and visibility, no sort
    pub fn reset(&mut self, registry: &ColumnRegistry) {
        let settings = GridSettings {
            default_column_width: self.default_width,
            min_column_width: self.min_width,
            ..GridSettings::default()
        };
        *self = Self::new(registry, &settings);
    }

    fn compact_sort_indices(&mut self) {
        let order: Vec<ColumnId> = self.sort_keys().into_iter().map(|(id, _)| id).collect();
        for (index, id) in order.into_iter().enumerate() {
            if let Some(column) = self.columns.get_mut(id.index()) {
                column.sort_index = Some(u8::try_from(index).unwrap_or(u8::MAX));
            }
        }
    }

    fn ensure_one_displaying(&mut self) {
        if self.displaying_count() > 0 {
            return;
        }
        let first = self.ordered_ids().into_iter().next();
        if let Some(column) = first.and_then(|id| self.columns.get_mut(id.index())) {
            tracing::warn!(column = %column.id, "no column was displaying, showing the first one");
            column.displaying = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnDef;

    fn table() -> (ColumnRegistry, ColumnTable) {
        let registry = ColumnRegistry::new(vec![
            ColumnDef::new("A").query("a").storage_name("a").sortable(),
            ColumnDef::new("B").query("b").storage_name("b").sortable(),
            ColumnDef::new("C").query("c").storage_name("c").width(10.0),
        ])
        .unwrap();
        let table = ColumnTable::new(&registry, &GridSettings::default());
        (registry, table)
    }

    #[test]
    fn test_last_visible_column_stays_visible() {
        let (_, mut table) = table();
        assert!(table.toggle_displaying(ColumnId(0)).unwrap());
        assert!(table.toggle_displaying(ColumnId(1)).unwrap());
        assert!(!table.toggle_displaying(ColumnId(2)).unwrap());
        assert_eq!(table.displaying_count(), 1);
        assert!(table.get(ColumnId(2)).unwrap().displaying);
    }

    #[test]
    fn test_width_is_clamped() {
        let (_, mut table) = table();
        assert_eq!(table.get(ColumnId(2)).unwrap().width, 40.0);
        assert_eq!(table.set_width(ColumnId(0), 5.0).unwrap(), 40.0);
        assert_eq!(table.set_width(ColumnId(0), 321.5).unwrap(), 321.5);
    }

    #[test]
    fn test_sort_cycle_and_precedence() {
        let (_, mut table) = table();
        table.toggle_sort(ColumnId(1)).unwrap();
        table.toggle_sort(ColumnId(0)).unwrap();
        assert_eq!(table.sort_keys(), vec![(ColumnId(1), true), (ColumnId(0), true)]);

        table.toggle_sort(ColumnId(1)).unwrap();
        assert_eq!(table.sort_keys(), vec![(ColumnId(1), false), (ColumnId(0), true)]);

        table.toggle_sort(ColumnId(1)).unwrap();
        assert_eq!(table.sort_keys(), vec![(ColumnId(0), true)]);
        assert_eq!(table.get(ColumnId(0)).unwrap().sort_index, Some(0));
    }

    #[test]
    fn test_move_touches_only_moved_key() {
        let (_, mut table) = table();
        let before: Vec<OrderKey> = table.iter().map(|c| c.ordering.clone()).collect();

        table.move_before(ColumnId(2), Some(ColumnId(0))).unwrap();
        assert_eq!(table.ordered_ids(), vec![ColumnId(2), ColumnId(0), ColumnId(1)]);
        assert_eq!(table.get(ColumnId(0)).unwrap().ordering, before[0]);
        assert_eq!(table.get(ColumnId(1)).unwrap().ordering, before[1]);

        table.move_before(ColumnId(2), None).unwrap();
        assert_eq!(table.ordered_ids(), vec![ColumnId(0), ColumnId(1), ColumnId(2)]);

        table.move_before(ColumnId(0), Some(ColumnId(2))).unwrap();
        assert_eq!(table.ordered_ids(), vec![ColumnId(1), ColumnId(0), ColumnId(2)]);
    }

    #[test]
    fn test_apply_layout_appends_missing_columns() {
        let (_, mut table) = table();
        let layout = vec![
            ColumnLayout {
                column: ColumnId(2),
                displaying: true,
                ordering: OrderKey::parse("1").unwrap(),
                sort_index: Some(3),
                sort_asc: false,
                width: Some(99.0),
            },
            ColumnLayout {
                column: ColumnId(0),
                displaying: false,
                ordering: OrderKey::parse("2").unwrap(),
                sort_index: None,
                sort_asc: true,
                width: None,
            },
        ];
        table.apply_layout(&layout);

        assert_eq!(table.ordered_ids(), vec![ColumnId(2), ColumnId(0), ColumnId(1)]);
        assert_eq!(table.sort_keys(), vec![(ColumnId(2), false)]);
        assert_eq!(table.get(ColumnId(2)).unwrap().sort_index, Some(0));
        assert_eq!(table.get(ColumnId(2)).unwrap().width, 99.0);
        assert!(!table.get(ColumnId(0)).unwrap().displaying);
        assert!(table.get(ColumnId(1)).unwrap().displaying);
    }
}
