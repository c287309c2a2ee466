mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{SlowConnection, people, people_config};
use dgrid_core::{Connection, Value};
use dgrid_engine::filter::ValueSlot;
use dgrid_engine::{ColumnId, FilterOp, GridSettings, GridState, LiveQuery, QueryStatus};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_first_sync_loads_default_view_and_rows() {
    let conn = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();

    let status = grid.sync(conn.as_ref()).await;
    assert_eq!(status, Some(QueryStatus::Received));
    assert!(grid.live_query().sql.ends_with(" limit 100"));
    assert_eq!(grid.rows().unwrap().row_count(), 40);

    // nothing changed since the last poll
    assert_eq!(grid.sync(conn.as_ref()).await, None);
}

#[tokio::test]
async fn test_load_more_extends_visible_rows() {
    let conn = people(150).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    grid.sync(conn.as_ref()).await;
    assert_eq!(grid.rows().unwrap().row_count(), 100);

    grid.load_more();
    assert_eq!(grid.sync(conn.as_ref()).await, Some(QueryStatus::Received));
    assert!(grid.live_query().sql.ends_with(" limit 200"));
    assert_eq!(grid.rows().unwrap().row_count(), 150);
}

#[tokio::test]
async fn test_filter_and_sort_shape_the_rows() {
    let conn = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    grid.sync(conn.as_ref()).await;

    let leaf = grid.add_filter(None).unwrap();
    grid.change_filter_column(leaf, ColumnId(2)).unwrap();
    grid.change_filter_op(leaf, FilterOp::NumGt).unwrap();
    grid.set_filter_value(leaf, ValueSlot::First, Some("55".into()))
        .unwrap();
    grid.toggle_sort(ColumnId(0)).unwrap();
    grid.toggle_sort(ColumnId(0)).unwrap();
    grid.sync(conn.as_ref()).await;

    // ages run 21..=60 for ids 1..=40
    let rows = grid.rows().unwrap();
    let ids: Vec<Value> = rows.rows.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(
        ids,
        (36..=40).rev().map(Value::Int64).collect::<Vec<_>>()
    );
    let age = grid.row_position(ColumnId(2)).unwrap();
    assert!(rows.rows.iter().all(|r| r.values[age].as_i64() > Some(55)));
}

#[tokio::test]
async fn test_malformed_filter_value_fails_open() {
    let conn = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();

    let leaf = grid.add_filter(None).unwrap();
    grid.change_filter_column(leaf, ColumnId(2)).unwrap();
    grid.set_filter_value(leaf, ValueSlot::First, Some("not a number".into()))
        .unwrap();
    grid.sync(conn.as_ref()).await;
    assert_eq!(grid.rows().unwrap().row_count(), 40);
}

#[tokio::test]
async fn test_failed_query_keeps_last_rows() {
    let conn = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    grid.sync(conn.as_ref()).await;

    conn.execute("drop table people", &[]).await.unwrap();
    let status = grid.refresh(conn.as_ref()).await;
    assert!(matches!(status, QueryStatus::Failed(_)));
    assert!(grid.toolbar.query_error.is_some());
    assert_eq!(grid.rows().unwrap().row_count(), 40);
}

#[tokio::test(start_paused = true)]
async fn test_slow_query_triggers_fallback_then_receives() {
    let inner = people(5).await;
    let conn = Arc::new(SlowConnection {
        inner,
        delay: Duration::from_millis(2000),
    });
    let grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    let query = grid.live_query();

    let mut live = LiveQuery::new(Duration::from_millis(1000));
    let status = live.subscribe();
    let task = tokio::spawn(async move {
        let result = live.execute(conn.as_ref(), &query).await;
        (result, live)
    });

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(*status.borrow(), QueryStatus::FallbackTriggered);

    let (result, live) = task.await.unwrap();
    assert_eq!(result, QueryStatus::Received);
    assert_eq!(*status.borrow(), QueryStatus::Received);
    assert_eq!(live.rows().unwrap().row_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_fast_query_never_falls_back() {
    let inner = people(5).await;
    let conn = SlowConnection {
        inner,
        delay: Duration::from_millis(200),
    };
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    let mut status = grid.subscribe_status();

    assert_eq!(grid.refresh(&conn).await, QueryStatus::Received);
    assert!(!grid.show_spinner());
    // only the final value is observed once the query finished
    assert_eq!(*status.borrow_and_update(), QueryStatus::Received);
}

#[tokio::test(start_paused = true)]
async fn test_typed_filter_requeries_after_debounce() {
    let conn = people(40).await;
    let mut grid = GridState::new(people_config(), GridSettings::default()).unwrap();
    grid.sync(conn.as_ref()).await;

    let leaf = grid.add_filter(None).unwrap();
    grid.change_filter_op(leaf, FilterOp::StrEq).unwrap();
    grid.sync(conn.as_ref()).await;

    for typed in ["p", "person", "person 7"] {
        grid.type_filter_value(leaf, ValueSlot::First, Some(typed.into()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(grid.poll(), None);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(grid.sync(conn.as_ref()).await, Some(QueryStatus::Received));
    assert_eq!(grid.rows().unwrap().row_count(), 1);
}
