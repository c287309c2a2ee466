//! Which view a grid shows, and the outcome of each view operation

use std::collections::HashMap;

use dgrid_core::Connection;
use dgrid_engine::{GridState, QueryStatus, WatchScope};
use strum::Display;

use crate::error::ViewResult;
use crate::record::{ViewId, ViewRecord};
use crate::store::ViewStore;

/// View operations that report their own error next to their control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ViewOperation {
    List,
    Load,
    SaveAsNew,
    SaveToExisting,
    Duplicate,
    Rename,
    Delete,
}

/// Drives a grid from a [`ViewStore`]
///
/// Failed operations leave the grid's state as it was and record their
/// message under the operation; a later success of the same operation clears it.
#[derive(Debug)]
pub struct ViewController {
    store: ViewStore,
    user: Option<String>,
    selected: Option<ViewId>,
    errors: HashMap<ViewOperation, String>,
}

impl ViewController {
    pub fn new(store: ViewStore, user: Option<String>) -> Self {
        Self {
            store,
            user,
            selected: None,
            errors: HashMap::new(),
        }
    }

    pub fn store(&self) -> &ViewStore {
        &self.store
    }

    pub fn selected(&self) -> Option<ViewId> {
        self.selected
    }

    pub fn error(&self, operation: ViewOperation) -> Option<&str> {
        self.errors.get(&operation).map(String::as_str)
    }

    pub fn clear_error(&mut self, operation: ViewOperation) {
        self.errors.remove(&operation);
    }

    fn settle<T>(&mut self, operation: ViewOperation, result: ViewResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.errors.remove(&operation);
                Some(value)
            }
            Err(e) => {
                tracing::warn!(%operation, error = %e, "view operation failed");
                self.errors.insert(operation, e.to_string());
                None
            }
        }
    }

    /// Switches the grid to `view`, or to its default state for `None`; applied by the next [`sync`](Self::sync)
    pub fn select(&mut self, grid: &GridState, view: Option<ViewId>) {
        self.selected = view;
        grid.keys().view.bump();
    }

    /// Discards unsaved changes; applied by the next [`sync`](Self::sync)
    pub fn reset(&self, grid: &GridState) {
        grid.keys().reset.bump();
    }

    /// Reloads the selected view on a structural key change, then requeries
    pub async fn sync(&mut self, grid: &mut GridState, conn: &dyn Connection) -> Option<QueryStatus> {
        if grid.poll()? == WatchScope::ViewStructural {
            self.load_into(grid).await;
        }
        Some(grid.refresh(conn).await)
    }

    async fn load_into(&mut self, grid: &mut GridState) {
        let Some(id) = self.selected else {
            grid.reset_to_default();
            self.errors.remove(&ViewOperation::Load);
            return;
        };
        let result = self.store.load(id, grid.registry()).await;
        if let Some(layout) = self.settle(ViewOperation::Load, result) {
            grid.apply_layout(&layout);
        }
    }

    pub async fn list(&mut self) -> Vec<ViewRecord> {
        let result = self.store.list(self.user.as_deref()).await;
        self.settle(ViewOperation::List, result).unwrap_or_default()
    }

    /// Saves the grid's current state as a personal view and selects it
    pub async fn save_as_new(&mut self, grid: &GridState, name: &str) -> Option<ViewId> {
        let result = self
            .store
            .save_as_new(name, self.user.as_deref(), &grid.capture(), grid.registry())
            .await;
        let id = self.settle(ViewOperation::SaveAsNew, result)?;
        self.selected = Some(id);
        Some(id)
    }

    /// Saves the grid's current state as a view shared by every user
    pub async fn save_as_shared(&mut self, grid: &GridState, name: &str) -> Option<ViewId> {
        let result = self
            .store
            .save_as_new(name, None, &grid.capture(), grid.registry())
            .await;
        let id = self.settle(ViewOperation::SaveAsNew, result)?;
        self.selected = Some(id);
        Some(id)
    }

    pub async fn save_to_existing(&mut self, grid: &GridState, view: ViewId) -> bool {
        let result = self
            .store
            .save_to_existing(view, &grid.capture(), grid.registry())
            .await;
        self.settle(ViewOperation::SaveToExisting, result).is_some()
    }

    pub async fn duplicate(&mut self, view: ViewId) -> Option<ViewId> {
        let result = self.store.duplicate(view).await;
        self.settle(ViewOperation::Duplicate, result)
    }

    pub async fn rename(&mut self, view: ViewId, name: &str) -> bool {
        let result = self.store.rename(view, name).await;
        self.settle(ViewOperation::Rename, result).is_some()
    }

    /// Deletes `view`; a grid showing it falls back to its default state
    pub async fn delete(&mut self, grid: &GridState, view: ViewId) -> bool {
        let result = self.store.delete(view).await;
        let deleted = self
            .settle(ViewOperation::Delete, result)
            .unwrap_or(false);
        if deleted && self.selected == Some(view) {
            self.select(grid, None);
        }
        deleted
    }
}
