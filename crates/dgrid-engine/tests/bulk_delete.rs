mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{people, people_config};
use dgrid_core::{Connection, Value};
use dgrid_engine::filter::ValueSlot;
use dgrid_engine::selection::BulkDeleteOutcome;
use dgrid_engine::{ColumnId, FilterOp, GridSettings, GridState};
use pretty_assertions::assert_eq;

async fn remaining(conn: &dyn Connection) -> Option<i64> {
    let result = conn.query("select count(*) from people", &[]).await.unwrap();
    result.scalar().and_then(Value::as_i64)
}

#[tokio::test(start_paused = true)]
async fn test_undo_within_window_keeps_rows() {
    let conn: Arc<dyn Connection> = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();

    grid.selection.toggle_row(Value::Int64(1));
    grid.selection.toggle_row(Value::Int64(2));
    assert_eq!(grid.confirm_delete(conn.as_ref()).await.unwrap(), 2);
    assert_eq!(
        grid.toolbar.delete_confirmation.as_deref(),
        Some("Delete 2 records?")
    );

    assert_eq!(grid.delete_selected(Arc::clone(&conn)).await.unwrap(), 2);
    assert!(grid.toolbar.undo_available);
    assert!(grid.selection.is_empty());

    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(grid.undo_delete().await, Some(BulkDeleteOutcome::Undone));
    assert_eq!(remaining(conn.as_ref()).await, Some(40));

    // the cancelled task never fires later
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(remaining(conn.as_ref()).await, Some(40));
}

#[tokio::test(start_paused = true)]
async fn test_delete_runs_when_window_expires() {
    let conn: Arc<dyn Connection> = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    let before = grid.keys().refresh.get();

    grid.selection.toggle_row(Value::Int64(3));
    grid.selection.toggle_row(Value::Int64(4));
    grid.delete_selected(Arc::clone(&conn)).await.unwrap();

    assert_eq!(grid.settle_delete().await, Some(BulkDeleteOutcome::Deleted(2)));
    assert!(!grid.toolbar.undo_available);
    assert_eq!(remaining(conn.as_ref()).await, Some(38));
    assert_eq!(grid.keys().refresh.get(), before + 1);

    // too late to undo
    assert_eq!(grid.undo_delete().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_new_delete_commits_the_pending_one_at_once() {
    let conn: Arc<dyn Connection> = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();

    grid.selection.toggle_row(Value::Int64(1));
    grid.selection.toggle_row(Value::Int64(2));
    grid.delete_selected(Arc::clone(&conn)).await.unwrap();

    let started = tokio::time::Instant::now();
    grid.selection.toggle_row(Value::Int64(3));
    grid.delete_selected(Arc::clone(&conn)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(grid.toolbar.last_delete, Some(BulkDeleteOutcome::Deleted(2)));
    assert_eq!(remaining(conn.as_ref()).await, Some(38));

    // the second window keeps its own undo chance
    assert_eq!(grid.undo_delete().await, Some(BulkDeleteOutcome::Undone));
    assert_eq!(remaining(conn.as_ref()).await, Some(38));
}

#[tokio::test(start_paused = true)]
async fn test_select_all_deletes_only_filtered_rows() {
    let conn: Arc<dyn Connection> = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();

    let leaf = grid.add_filter(None).unwrap();
    grid.change_filter_column(leaf, ColumnId(2)).unwrap();
    grid.change_filter_op(leaf, FilterOp::NumLte).unwrap();
    grid.set_filter_value(leaf, ValueSlot::First, Some("30".into()))
        .unwrap();

    grid.selection.select_all();
    assert_eq!(grid.confirm_delete(conn.as_ref()).await.unwrap(), 10);
    assert_eq!(
        grid.toolbar.delete_confirmation.as_deref(),
        Some("Delete 10 records?")
    );
    assert_eq!(grid.delete_selected(Arc::clone(&conn)).await.unwrap(), 10);
    assert_eq!(grid.settle_delete().await, Some(BulkDeleteOutcome::Deleted(10)));
    assert_eq!(remaining(conn.as_ref()).await, Some(30));
}
