//! Cell focus and edit state, event routing and cell saves

use std::sync::Arc;

use dgrid_core::{Connection, Value};

use crate::column::{ColumnId, ColumnRegistry};
use crate::query::{WriteTarget, quote_identifier};

/// Header row or a body row by position in the current result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRow {
    Header,
    Body(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Tab,
    BackTab,
    Enter,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridEvent {
    KeyDown {
        column: ColumnId,
        row: CellRow,
        key: Key,
    },
    Click {
        column: ColumnId,
        row: CellRow,
        double: bool,
    },
}

impl GridEvent {
    pub fn column(&self) -> ColumnId {
        match self {
            Self::KeyDown { column, .. } | Self::Click { column, .. } => *column,
        }
    }

    pub fn row(&self) -> CellRow {
        match self {
            Self::KeyDown { row, .. } | Self::Click { row, .. } => *row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    No,
}

/// Column-declared event handler; returning `Handled::No` lets the generic branch run
pub type CellHandler = Arc<dyn Fn(&GridEvent, &mut EditMachine) -> Handled + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FocusState {
    pub column: Option<ColumnId>,
    pub row: Option<CellRow>,
    /// The host should move keyboard focus to the cell on next render
    pub should_focus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditState {
    pub column: Option<ColumnId>,
    pub row: Option<usize>,
    pub is_editing: bool,
}

/// What the grid must do after an event was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    HandledByColumn,
    FocusMoved,
    EditStarted,
    EditStopped,
    ToggleSort(ColumnId),
    Ignored,
}

/// Visible layout used for keyboard navigation
#[derive(Debug, Clone, Copy)]
pub struct Navigation<'a> {
    /// Displaying columns in display order
    pub columns: &'a [ColumnId],
    pub row_count: usize,
}

#[derive(Debug, Default)]
pub struct EditMachine {
    pub focus: FocusState,
    pub edit: EditState,
    pub saving_edit: bool,
    pub display_error_message: Option<String>,
}

impl EditMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus_cell(&mut self, column: ColumnId, row: CellRow) {
        self.focus = FocusState {
            column: Some(column),
            row: Some(row),
            should_focus: true,
        };
        self.edit.is_editing = false;
    }

    pub fn start_edit(&mut self, column: ColumnId, row: usize) {
        self.focus = FocusState {
            column: Some(column),
            row: Some(CellRow::Body(row)),
            should_focus: true,
        };
        self.edit = EditState {
            column: Some(column),
            row: Some(row),
            is_editing: true,
        };
    }

    pub fn stop_edit(&mut self) {
        self.edit.is_editing = false;
        self.focus.should_focus = true;
    }

    /// Called by the host once keyboard focus was applied
    pub fn focus_applied(&mut self) {
        self.focus.should_focus = false;
    }

    pub fn is_editing(&self, column: ColumnId, row: usize) -> bool {
        self.edit.is_editing && self.edit.column == Some(column) && self.edit.row == Some(row)
    }

    /// Column handlers run first; the generic header/body branch only when none handled it
    pub fn dispatch(
        &mut self,
        registry: &ColumnRegistry,
        event: GridEvent,
        nav: Navigation<'_>,
    ) -> EditOutcome {
        if let Some(handlers) = registry.handlers(event.column()) {
            let handler = match (event, event.row()) {
                (GridEvent::KeyDown { .. }, CellRow::Header) => handlers.on_header_keydown.as_ref(),
                (GridEvent::KeyDown { .. }, CellRow::Body(_)) => handlers.on_body_keydown.as_ref(),
                (GridEvent::Click { .. }, CellRow::Header) => handlers.on_header_click.as_ref(),
                (GridEvent::Click { .. }, CellRow::Body(_)) => handlers.on_body_click.as_ref(),
            };
            if let Some(handler) = handler
                && handler(&event, self) == Handled::Yes
            {
                return EditOutcome::HandledByColumn;
            }
        }

        match event {
            GridEvent::Click {
                column,
                row: CellRow::Header,
                ..
            } => {
                self.focus_cell(column, CellRow::Header);
                if registry.is_sortable(column) {
                    EditOutcome::ToggleSort(column)
                } else {
                    EditOutcome::FocusMoved
                }
            }
            GridEvent::Click {
                column,
                row: CellRow::Body(row),
                double,
            } => {
                if double {
                    self.start_edit(column, row);
                    EditOutcome::EditStarted
                } else {
                    self.focus_cell(column, CellRow::Body(row));
                    EditOutcome::FocusMoved
                }
            }
            GridEvent::KeyDown { column, row, key } => self.key_down(registry, column, row, key, nav),
        }
    }

    fn key_down(
        &mut self,
        registry: &ColumnRegistry,
        column: ColumnId,
        row: CellRow,
        key: Key,
        nav: Navigation<'_>,
    ) -> EditOutcome {
        match (key, row) {
            (Key::Escape, _) if self.edit.is_editing => {
                self.stop_edit();
                EditOutcome::EditStopped
            }
            (Key::Enter, CellRow::Body(r)) => {
                self.start_edit(column, r);
                EditOutcome::EditStarted
            }
            (Key::Enter, CellRow::Header) if registry.is_sortable(column) => {
                EditOutcome::ToggleSort(column)
            }
            (
                Key::ArrowUp
                | Key::ArrowDown
                | Key::ArrowLeft
                | Key::ArrowRight
                | Key::Tab
                | Key::BackTab,
                _,
            ) => match step(column, row, key, nav) {
                Some((column, row)) => {
                    self.focus_cell(column, row);
                    EditOutcome::FocusMoved
                }
                None => EditOutcome::Ignored,
            },
            _ => EditOutcome::Ignored,
        }
    }

    pub fn begin_save(&mut self) {
        self.saving_edit = true;
        self.display_error_message = None;
    }

    pub fn finish_save(&mut self, result: Result<(), String>) {
        self.saving_edit = false;
        match result {
            Ok(()) => self.stop_edit(),
            Err(message) => self.display_error_message = Some(message),
        }
    }
}

/// Next cell for a navigation key, `None` at the grid's edge
fn step(
    column: ColumnId,
    row: CellRow,
    key: Key,
    nav: Navigation<'_>,
) -> Option<(ColumnId, CellRow)> {
    let col = nav.columns.iter().position(|c| *c == column)?;
    let last_col = nav.columns.len().checked_sub(1)?;
    let last_row = nav.row_count.checked_sub(1);

    let next_row = |row: CellRow| match (row, last_row) {
        (CellRow::Header, Some(_)) => Some(CellRow::Body(0)),
        (CellRow::Body(r), Some(last)) if r < last => Some(CellRow::Body(r + 1)),
        _ => None,
    };
    let prev_row = |row: CellRow| match row {
        CellRow::Header => None,
        CellRow::Body(0) => Some(CellRow::Header),
        CellRow::Body(r) => Some(CellRow::Body(r - 1)),
    };

    match key {
        Key::ArrowLeft => col.checked_sub(1).map(|c| (nav.columns[c], row)),
        Key::ArrowRight => (col < last_col).then(|| (nav.columns[col + 1], row)),
        Key::ArrowUp => prev_row(row).map(|r| (column, r)),
        Key::ArrowDown => next_row(row).map(|r| (column, r)),
        Key::Tab if col < last_col => Some((nav.columns[col + 1], row)),
        Key::Tab => next_row(row).map(|r| (nav.columns[0], r)),
        Key::BackTab if col > 0 => Some((nav.columns[col - 1], row)),
        Key::BackTab => prev_row(row).map(|r| (nav.columns[last_col], r)),
        _ => None,
    }
}

/// Writes one cell inside a transaction; returns the number of rows updated
#[tracing::instrument(skip(conn, pk, value), fields(table = %target.table))]
pub async fn save_cell_edit(
    conn: &dyn Connection,
    target: &WriteTarget,
    field: &str,
    pk: Value,
    value: Value,
) -> dgrid_core::Result<u64> {
    let sql = format!(
        "update {} set {} = ?1 where {} = ?2",
        target.table,
        quote_identifier(field),
        target.primary_key
    );
    let tx = conn.begin_transaction().await?;
    match tx.execute(&sql, &[value, pk]).await {
        Ok(result) => {
            tx.commit().await?;
            tracing::debug!(affected = result.affected_rows, "cell saved");
            Ok(result.affected_rows)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(error = %rollback, "rollback after failed cell save failed");
            }
            Err(e)
        }
    }
}
