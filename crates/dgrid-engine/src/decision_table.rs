//! Compiled id -> value lookups
//!
//! A decision table starts as an ordered list of `(ColumnId, T)` rules and is
//! compiled once into a dense vector indexed by column id. The first rule for
//! an id wins; ids without a rule answer `None`.

use crate::column::ColumnId;

#[derive(Debug, Clone)]
pub struct DecisionTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> DecisionTable<T> {
    pub fn compile(rules: impl IntoIterator<Item = (ColumnId, T)>) -> Self {
        let mut slots: Vec<Option<T>> = Vec::new();
        for (id, value) in rules {
            let index = id.index();
            if slots.len() <= index {
                slots.resize_with(index + 1, || None);
            }
            if slots[index].is_none() {
                slots[index] = Some(value);
            }
        }
        Self { slots }
    }

    pub fn get(&self, id: ColumnId) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: ColumnId) -> bool {
        self.get(id).is_some()
    }

    /// Ids with a rule, ascending
    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (ColumnId(i), v)))
    }

    /// First id (ascending) whose value matches
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<ColumnId> {
        self.iter().find(|(_, v)| predicate(v)).map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_rule_wins_and_gaps_are_none() {
        let table = DecisionTable::compile([
            (ColumnId(2), "c"),
            (ColumnId(0), "a"),
            (ColumnId(2), "shadowed"),
        ]);

        assert_eq!(table.get(ColumnId(0)), Some(&"a"));
        assert_eq!(table.get(ColumnId(1)), None);
        assert_eq!(table.get(ColumnId(2)), Some(&"c"));
        assert_eq!(table.get(ColumnId(9)), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_find_is_ascending_by_id() {
        let table = DecisionTable::compile([(ColumnId(3), 1), (ColumnId(1), 1)]);
        assert_eq!(table.find(|v| *v == 1), Some(ColumnId(1)));
        assert_eq!(table.find(|v| *v == 2), None);
    }
}
