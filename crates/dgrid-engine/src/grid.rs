//! Per-instance grid state tying the engine pieces together

use std::sync::Arc;

use dgrid_core::{Connection, QueryResult, Value};

use crate::column::{ColumnDef, ColumnId, ColumnRegistry, ColumnTable};
use crate::debounce::FilterDebouncer;
use crate::edit::{self, EditMachine, EditOutcome, GridEvent, Navigation};
use crate::error::{GridError, GridResult};
use crate::filter::{EncodeContext, FilterOp, FilterTermId, FilterTree, ValueSlot};
use crate::layout::{DefaultView, GridLayout};
use crate::query::{CompiledQuery, QueryCompiler, QuerySource, WriteTarget};
use crate::refresh::{GridKeys, LiveQuery, QueryStatus, WatchScope, Watcher};
use crate::resize::ResizeWrite;
use crate::selection::{BulkDeleteOutcome, Selection, UndoWindow, confirmation_message};
use crate::settings::GridSettings;

/// Everything a caller declares about a grid
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub source: QuerySource,
    pub write_target: Option<WriteTarget>,
    pub default_view: Option<DefaultView>,
}

impl GridConfig {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, source: QuerySource) -> Self {
        Self {
            name: name.into(),
            columns,
            source,
            write_target: None,
            default_view: None,
        }
    }

    pub fn write_target(mut self, target: WriteTarget) -> Self {
        self.write_target = Some(target);
        self
    }

    pub fn default_view(mut self, view: DefaultView) -> Self {
        self.default_view = Some(view);
        self
    }
}

/// Status scalars shown next to the grid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolbarState {
    /// Inline alert for a failed or disallowed query
    pub query_error: Option<String>,
    /// Confirmation prompt for a pending bulk delete
    pub delete_confirmation: Option<String>,
    /// A bulk delete can still be undone
    pub undo_available: bool,
    pub last_delete: Option<BulkDeleteOutcome>,
}

#[derive(Debug)]
pub struct GridState {
    name: String,
    registry: ColumnRegistry,
    settings: GridSettings,
    source: QuerySource,
    write_target: Option<WriteTarget>,
    default_view: Option<DefaultView>,
    columns: ColumnTable,
    filters: FilterTree,
    pub edit: EditMachine,
    pub selection: Selection,
    pub toolbar: ToolbarState,
    keys: GridKeys,
    watcher: Watcher,
    live: LiveQuery,
    debouncer: FilterDebouncer,
    undo: Option<UndoWindow>,
    row_count: u32,
    row_height: f32,
    clock: Option<EncodeContext>,
}

impl GridState {
    pub fn new(config: GridConfig, settings: GridSettings) -> GridResult<Self> {
        Self::with_keys(config, settings, GridKeys::new())
    }

    /// Builds a grid whose keys are shared with the host, e.g. for an app-wide global key
    pub fn with_keys(config: GridConfig, settings: GridSettings, keys: GridKeys) -> GridResult<Self> {
        let registry = ColumnRegistry::new(config.columns)?;
        let columns = ColumnTable::new(&registry, &settings);
        let debouncer = FilterDebouncer::new(settings.debounce(), keys.refresh.clone());

        let mut grid = Self {
            name: config.name,
            columns,
            filters: FilterTree::new(settings.max_filter_depth),
            edit: EditMachine::new(),
            selection: Selection::default(),
            toolbar: ToolbarState::default(),
            watcher: Watcher::new(keys.clone()),
            live: LiveQuery::new(settings.fallback()),
            debouncer,
            undo: None,
            row_count: settings.page_size,
            row_height: settings.default_row_height,
            clock: None,
            keys,
            registry,
            source: config.source,
            write_target: config.write_target,
            default_view: config.default_view,
            settings,
        };
        grid.reset_to_default();
        tracing::debug!(grid = %grid.name, columns = grid.registry.len(), "grid created");
        Ok(grid)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn keys(&self) -> &GridKeys {
        &self.keys
    }

    pub fn columns(&self) -> &ColumnTable {
        &self.columns
    }

    pub fn filters(&self) -> &FilterTree {
        &self.filters
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn row_height(&self) -> f32 {
        self.row_height
    }

    pub fn set_row_height(&mut self, height: f32) {
        self.row_height = height;
    }

    /// Pins the day used for relative date filters
    pub fn set_clock(&mut self, ctx: EncodeContext) {
        self.clock = Some(ctx);
    }

    fn encode_context(&self) -> EncodeContext {
        self.clock.unwrap_or_else(EncodeContext::local)
    }

    fn requery(&self) {
        let key = self.keys.refresh.bump();
        tracing::debug!(grid = %self.name, refresh_key = key, "refresh requested");
    }

    // Layout

    pub fn capture(&self) -> GridLayout {
        GridLayout {
            columns: self.columns.capture(),
            filters: self.filters.capture(),
            root_filter_is_any: self.filters.root_is_any(),
            row_height: self.row_height,
        }
    }

    /// Replaces column and filter state; resets paging, selection and editing
    pub fn apply_layout(&mut self, layout: &GridLayout) {
        self.columns.apply_layout(&layout.columns);
        self.filters.restore(&layout.filters, layout.root_filter_is_any);
        self.row_height = layout.row_height;
        self.reset_transient();
    }

    /// Caller default view if declared, otherwise declaration order
    pub fn reset_to_default(&mut self) {
        self.columns.reset(&self.registry);
        match self.default_view.clone() {
            Some(view) => {
                let layout = view.into_layout(&self.registry, self.settings.default_row_height);
                self.apply_layout(&layout);
            }
            None => {
                self.filters.clear();
                self.row_height = self.settings.default_row_height;
                self.reset_transient();
            }
        }
    }

    fn reset_transient(&mut self) {
        self.debouncer.cancel();
        self.row_count = self.settings.page_size;
        self.selection.clear();
        self.edit = EditMachine::new();
    }

    // Columns

    pub fn toggle_column(&mut self, id: ColumnId) -> GridResult<bool> {
        let changed = self.columns.toggle_displaying(id)?;
        if changed {
            self.requery();
        }
        Ok(changed)
    }

    pub fn toggle_sort(&mut self, id: ColumnId) -> GridResult<()> {
        if !self.registry.is_sortable(id) {
            return Ok(());
        }
        self.columns.toggle_sort(id)?;
        self.requery();
        Ok(())
    }

    pub fn move_column(&mut self, id: ColumnId, before: Option<ColumnId>) -> GridResult<()> {
        self.columns.move_before(id, before)
    }

    pub fn apply_resize(&mut self, write: ResizeWrite) -> GridResult<f32> {
        self.columns.set_width(write.column, write.width)
    }

    // Filters

    pub fn add_filter(&mut self, parent: Option<FilterTermId>) -> GridResult<FilterTermId> {
        let id = self.filters.insert_leaf(&self.registry, parent)?;
        self.requery();
        Ok(id)
    }

    pub fn add_filter_group(
        &mut self,
        parent: Option<FilterTermId>,
    ) -> GridResult<(FilterTermId, FilterTermId)> {
        let ids = self.filters.insert_group(&self.registry, parent)?;
        self.requery();
        Ok(ids)
    }

    pub fn delete_filter(&mut self, id: FilterTermId) -> GridResult<usize> {
        let removed = self.filters.delete(id)?;
        self.requery();
        Ok(removed)
    }

    pub fn change_filter_column(&mut self, id: FilterTermId, column: ColumnId) -> GridResult<()> {
        self.filters.change_column(&self.registry, id, column)?;
        self.requery();
        Ok(())
    }

    pub fn change_filter_op(&mut self, id: FilterTermId, op: FilterOp) -> GridResult<()> {
        self.filters.change_op(&self.registry, id, op)?;
        self.requery();
        Ok(())
    }

    pub fn toggle_filter_combinator(&mut self, group: Option<FilterTermId>) -> GridResult<bool> {
        let is_any = self.filters.toggle_combinator(group)?;
        self.requery();
        Ok(is_any)
    }

    /// Value picked from a control (select, date picker); refreshes at once
    pub fn set_filter_value(
        &mut self,
        id: FilterTermId,
        slot: ValueSlot,
        value: Option<String>,
    ) -> GridResult<()> {
        self.filters.set_value(id, slot, value)?;
        self.requery();
        Ok(())
    }

    /// Typed value; stored now, refreshed after the debounce delay
    pub fn type_filter_value(
        &mut self,
        id: FilterTermId,
        slot: ValueSlot,
        value: Option<String>,
    ) -> GridResult<()> {
        self.filters.set_value(id, slot, value)?;
        self.debouncer.keystroke();
        Ok(())
    }

    /// The typed input lost focus
    pub fn blur_filter_value(&mut self) -> bool {
        self.debouncer.blur()
    }

    // Queries

    fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(
            &self.registry,
            &self.columns,
            &self.filters,
            &self.source,
            self.encode_context(),
        )
    }

    pub fn live_query(&self) -> CompiledQuery {
        self.compiler().live(self.row_count)
    }

    pub fn count_query(&self) -> CompiledQuery {
        self.compiler().count()
    }

    pub fn ids_query(&self) -> CompiledQuery {
        self.compiler().ids()
    }

    pub fn download_query(&self) -> CompiledQuery {
        self.compiler().download()
    }

    /// Grows the row limit by one page and requests a requery
    pub fn load_more(&mut self) {
        self.row_count = self.row_count.saturating_add(self.settings.page_size);
        self.requery();
    }

    /// Which scope changed since the last poll, see [`Watcher::poll`]
    pub fn poll(&mut self) -> Option<WatchScope> {
        self.watcher.poll()
    }

    /// Runs the live query and updates the toolbar from its outcome
    pub async fn refresh(&mut self, conn: &dyn Connection) -> QueryStatus {
        let query = self.live_query();
        let status = self.live.execute(conn, &query).await;
        self.toolbar.query_error = match &status {
            QueryStatus::Failed(message) => Some(message.clone()),
            QueryStatus::Disallowed => Some("You are not allowed to view these rows".to_string()),
            _ => None,
        };
        status
    }

    /// Handles whatever the keys say changed; structural changes reset to the default view
    pub async fn sync(&mut self, conn: &dyn Connection) -> Option<QueryStatus> {
        match self.poll()? {
            WatchScope::ViewStructural => self.reset_to_default(),
            WatchScope::QueryOnly => {}
        }
        Some(self.refresh(conn).await)
    }

    pub fn query_status(&self) -> QueryStatus {
        self.live.status()
    }

    /// Query is past its fallback delay
    pub fn show_spinner(&self) -> bool {
        self.live.status() == QueryStatus::FallbackTriggered
    }

    pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<QueryStatus> {
        self.live.subscribe()
    }

    /// Last good rows, kept while a newer query fails
    pub fn rows(&self) -> Option<&QueryResult> {
        self.live.rows()
    }

    /// Projected position of `column` in [`rows`](Self::rows)
    pub fn row_position(&self, column: ColumnId) -> Option<usize> {
        self.live.projected().iter().position(|c| *c == column)
    }

    // Editing

    pub fn handle_event(&mut self, event: GridEvent) -> GridResult<EditOutcome> {
        let visible: Vec<ColumnId> = self.columns.visible().iter().map(|c| c.id).collect();
        let nav = Navigation {
            columns: &visible,
            row_count: self.rows().map(QueryResult::row_count).unwrap_or(0),
        };
        let outcome = self.edit.dispatch(&self.registry, event, nav);
        if let EditOutcome::ToggleSort(column) = outcome {
            self.toggle_sort(column)?;
        }
        Ok(outcome)
    }

    /// Saves the value of an edited cell; failures land in `edit.display_error_message`
    pub async fn save_edit(
        &mut self,
        conn: &dyn Connection,
        column: ColumnId,
        pk: Value,
        value: Value,
    ) -> GridResult<u64> {
        let target = self
            .write_target
            .clone()
            .ok_or_else(|| GridError::Configuration(format!("grid '{}' is read-only", self.name)))?;
        let field = self
            .registry
            .update_field(column)
            .ok_or_else(|| GridError::Configuration(format!("column {} is not editable", column)))?
            .to_string();

        self.edit.begin_save();
        match edit::save_cell_edit(conn, &target, &field, pk, value).await {
            Ok(updated) => {
                self.edit.finish_save(Ok(()));
                self.requery();
                Ok(updated)
            }
            Err(e) => {
                self.edit.finish_save(Err(e.to_string()));
                Err(e.into())
            }
        }
    }

    // Bulk delete

    /// Fills the confirmation prompt for the current selection
    pub async fn confirm_delete(&mut self, conn: &dyn Connection) -> GridResult<u64> {
        let count = self.selection.count(conn, &self.count_query()).await?;
        self.toolbar.delete_confirmation = Some(confirmation_message(count));
        Ok(count)
    }

    /// Materializes the selection and arms the undo window; a delete still
    /// waiting in an earlier window is committed first
    pub async fn delete_selected(&mut self, conn: Arc<dyn Connection>) -> GridResult<usize> {
        let target = self
            .write_target
            .clone()
            .ok_or_else(|| GridError::Configuration(format!("grid '{}' is read-only", self.name)))?;
        let ids = self
            .selection
            .materialize(conn.as_ref(), &self.ids_query())
            .await?;
        let count = ids.len();

        if let Some(previous) = self.undo.take() {
            self.toolbar.last_delete = Some(previous.commit_now().await);
        }
        self.undo = Some(UndoWindow::arm(
            conn,
            target,
            ids,
            self.settings.undo_window(),
            self.keys.refresh.clone(),
        ));
        self.selection.clear();
        self.toolbar.delete_confirmation = None;
        self.toolbar.undo_available = true;
        Ok(count)
    }

    /// Cancels the pending bulk delete if it has not started
    pub async fn undo_delete(&mut self) -> Option<BulkDeleteOutcome> {
        let window = self.undo.take()?;
        let outcome = window.undo().await;
        self.toolbar.undo_available = false;
        self.toolbar.last_delete = Some(outcome.clone());
        Some(outcome)
    }

    /// Waits for the pending bulk delete to finish
    pub async fn settle_delete(&mut self) -> Option<BulkDeleteOutcome> {
        let window = self.undo.take()?;
        let outcome = window.wait().await;
        self.toolbar.undo_available = false;
        self.toolbar.last_delete = Some(outcome.clone());
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterType;
    use pretty_assertions::assert_eq;

    fn config() -> GridConfig {
        GridConfig::new(
            "people",
            vec![
                ColumnDef::new("Name")
                    .query("name")
                    .storage_name("name")
                    .filterable(FilterType::String)
                    .sortable(),
                ColumnDef::new("Age")
                    .query("age")
                    .storage_name("age")
                    .filterable(FilterType::Number)
                    .sortable(),
            ],
            QuerySource::new("people", "id"),
        )
    }

    #[tokio::test]
    async fn test_load_more_grows_limit_and_bumps_refresh() {
        let mut grid = GridState::new(config(), GridSettings::default()).unwrap();
        assert!(grid.live_query().sql.ends_with(" limit 100"));

        let before = grid.keys().refresh.get();
        grid.load_more();
        assert_eq!(grid.row_count(), 200);
        assert!(grid.live_query().sql.ends_with(" limit 200"));
        assert_eq!(grid.keys().refresh.get(), before + 1);
    }

    #[tokio::test]
    async fn test_structural_filter_edits_requery() {
        let mut grid = GridState::new(config(), GridSettings::default()).unwrap();
        let start = grid.keys().refresh.get();

        let leaf = grid.add_filter(None).unwrap();
        grid.change_filter_op(leaf, FilterOp::StrEq).unwrap();
        assert_eq!(grid.keys().refresh.get(), start + 2);

        // typed values wait for the debouncer
        grid.type_filter_value(leaf, ValueSlot::First, Some("Ann".into()))
            .unwrap();
        assert_eq!(grid.keys().refresh.get(), start + 2);
        assert!(grid.blur_filter_value());
        assert_eq!(grid.keys().refresh.get(), start + 3);
        assert!(grid.live_query().sql.contains("coalesce((name = 'Ann'), true)"));
    }

    #[tokio::test]
    async fn test_layout_resets_paging_and_selection() {
        let mut grid = GridState::new(config(), GridSettings::default()).unwrap();
        grid.toggle_sort(ColumnId(1)).unwrap();
        grid.add_filter(None).unwrap();
        let layout = grid.capture();

        grid.load_more();
        grid.selection.select_all();
        grid.reset_to_default();
        assert_eq!(grid.filters().len(), 0);
        assert!(grid.columns().sort_keys().is_empty());

        grid.apply_layout(&layout);
        assert_eq!(grid.row_count(), 100);
        assert!(grid.selection.is_empty());
        assert_eq!(grid.columns().sort_keys(), vec![(ColumnId(1), true)]);
        assert_eq!(grid.filters().len(), 1);
    }

    #[tokio::test]
    async fn test_default_view_applies_on_reset() {
        let config = config().default_view(
            DefaultView::new()
                .sort(ColumnId(1), false)
                .filter(ColumnId(0), FilterOp::StrContains, Some("a")),
        );
        let grid = GridState::new(config, GridSettings::default()).unwrap();
        assert_eq!(
            grid.live_query().sql,
            "select name, age from people where coalesce((name like '%a%' escape '\\'), true) \
             order by age desc nulls last limit 100"
        );
    }

    #[tokio::test]
    async fn test_save_edit_requires_write_target() {
        let mut grid = GridState::new(config(), GridSettings::default()).unwrap();
        let conn = dgrid_sqlite::SqliteConnection::open_in_memory().unwrap();
        let err = grid
            .save_edit(&conn, ColumnId(0), Value::Int64(1), Value::String("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GridError::Configuration(_)));
    }
}
