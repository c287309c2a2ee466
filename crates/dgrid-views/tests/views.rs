use std::sync::{Arc, Once};

use dgrid_core::{Connection, Value};
use dgrid_engine::filter::{FilterType, ValueSlot};
use dgrid_engine::{
    ColumnDef, ColumnId, FilterOp, GridConfig, GridSettings, GridState, QuerySource, QueryStatus,
};
use dgrid_sqlite::SqliteConnection;
use dgrid_views::{ViewController, ViewId, ViewOperation, ViewStore};
use pretty_assertions::assert_eq;

const SELECT: ColumnId = ColumnId(0);
const A: ColumnId = ColumnId(1);
const B: ColumnId = ColumnId(2);
const C: ColumnId = ColumnId(3);

fn initialize_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("dgrid_views=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

async fn connection() -> Arc<dyn Connection> {
    initialize_logging();
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute(
        "create table items (id integer primary key, a text, b integer, c text)",
        &[],
    )
    .await
    .unwrap();
    for (a, b) in [("x", 7), ("x", 1), ("y", 3), ("x", 3)] {
        conn.execute(
            "insert into items (a, b, c) values (?1, ?2, 'note')",
            &[Value::from(a), Value::Int64(b)],
        )
        .await
        .unwrap();
    }
    Arc::new(conn)
}

fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("Select"),
        ColumnDef::new("A")
            .query("a")
            .storage_name("a")
            .filterable(FilterType::String)
            .sortable(),
        ColumnDef::new("B")
            .query("b")
            .storage_name("b")
            .filterable(FilterType::Number)
            .sortable(),
        ColumnDef::new("C").query("c").storage_name("c"),
    ]
}

fn grid_with(columns: Vec<ColumnDef>) -> GridState {
    let config = GridConfig::new("items", columns, QuerySource::new("items", "id"));
    GridState::new(config, GridSettings::default()).unwrap()
}

fn grid() -> GridState {
    grid_with(columns())
}

async fn controller(conn: &Arc<dyn Connection>, user: Option<&str>) -> ViewController {
    let store = ViewStore::open(Arc::clone(conn), "items").await.unwrap();
    ViewController::new(store, user.map(str::to_string))
}

/// `a = 'x' and (b > 5 or (b < 2 and a like '%y%'))`, B sorted descending, C hidden, B moved first
fn build_nested_state(grid: &mut GridState) {
    let a = grid.add_filter(None).unwrap();
    grid.change_filter_op(a, FilterOp::StrEq).unwrap();
    grid.set_filter_value(a, ValueSlot::First, Some("x".into()))
        .unwrap();

    let (outer, b_gt) = grid.add_filter_group(None).unwrap();
    grid.change_filter_column(b_gt, B).unwrap();
    grid.change_filter_op(b_gt, FilterOp::NumGt).unwrap();
    grid.set_filter_value(b_gt, ValueSlot::First, Some("5".into()))
        .unwrap();

    let (inner, b_lt) = grid.add_filter_group(Some(outer)).unwrap();
    assert!(!grid.toggle_filter_combinator(Some(inner)).unwrap());
    grid.change_filter_column(b_lt, B).unwrap();
    grid.change_filter_op(b_lt, FilterOp::NumLt).unwrap();
    grid.set_filter_value(b_lt, ValueSlot::First, Some("2".into()))
        .unwrap();
    let a_like = grid.add_filter(Some(inner)).unwrap();
    grid.set_filter_value(a_like, ValueSlot::First, Some("y".into()))
        .unwrap();

    grid.toggle_sort(B).unwrap();
    grid.toggle_sort(B).unwrap();
    grid.toggle_column(C).unwrap();
    grid.move_column(B, Some(SELECT)).unwrap();
    grid.set_row_height(44.0);
}

/// Saved columns in display order with their visibility and sort
fn column_summary(grid: &GridState) -> Vec<(ColumnId, bool, Option<u8>, bool)> {
    grid.columns()
        .ordered()
        .into_iter()
        .filter(|c| grid.registry().storage_name(c.id).is_some())
        .map(|c| (c.id, c.displaying, c.sort_index, c.sort_asc))
        .collect()
}

async fn count(conn: &Arc<dyn Connection>, sql: &str) -> i64 {
    let result = conn.query(sql, &[]).await.unwrap();
    result.scalar().and_then(Value::as_i64).unwrap()
}

#[tokio::test]
async fn test_save_and_load_round_trip_with_nested_groups() {
    let conn = connection().await;
    let mut views = controller(&conn, Some("ann")).await;
    let mut grid = grid();
    views.sync(&mut grid, conn.as_ref()).await;
    build_nested_state(&mut grid);

    let saved_sql = grid.live_query().sql;
    assert!(saved_sql.contains(
        "where coalesce((a = 'x' and (b > 5 or (b < 2 and a like '%y%' escape '\\'))), true)"
    ));
    let saved_columns = column_summary(&grid);

    let id = views.save_as_new(&grid, "Mine").await.unwrap();
    assert_eq!(views.selected(), Some(id));

    views.select(&grid, None);
    views.sync(&mut grid, conn.as_ref()).await;
    assert_eq!(grid.filters().len(), 0);
    assert_eq!(grid.row_height(), 32.0);

    views.select(&grid, Some(id));
    let status = views.sync(&mut grid, conn.as_ref()).await;
    assert_eq!(status, Some(QueryStatus::Received));
    assert_eq!(views.error(ViewOperation::Load), None);
    assert_eq!(grid.live_query().sql, saved_sql);
    assert_eq!(column_summary(&grid), saved_columns);
    assert_eq!(grid.filters().len(), 6);
    assert_eq!(grid.row_height(), 44.0);
    assert_eq!(grid.rows().unwrap().row_count(), 1);
}

#[tokio::test]
async fn test_duplicate_probes_for_a_free_name() {
    let conn = connection().await;
    let mut views = controller(&conn, Some("ann")).await;
    let mut grid = grid();
    build_nested_state(&mut grid);

    let sales = views.save_as_new(&grid, "Sales").await.unwrap();
    views.save_as_new(&grid, "Sales copy").await.unwrap();

    let copy = views.duplicate(sales).await.unwrap();
    let record = views.store().get(copy).await.unwrap();
    assert_eq!(record.name, "Sales copy 2");
    assert_eq!(record.user.as_deref(), Some("ann"));

    // the copy's groups point at its own terms
    let source = views.store().load(sales, grid.registry()).await.unwrap();
    let copied = views.store().load(copy, grid.registry()).await.unwrap();
    grid.apply_layout(&source);
    let source_sql = grid.live_query().sql;
    grid.apply_layout(&copied);
    assert_eq!(grid.live_query().sql, source_sql);
    assert_eq!(
        count(&conn, "select count(*) from datagrid_view_filter_term").await,
        18
    );
}

#[tokio::test]
async fn test_names_are_unique_per_scope() {
    let conn = connection().await;
    let mut views = controller(&conn, Some("ann")).await;
    let grid = grid();

    views.save_as_new(&grid, "Open").await.unwrap();
    assert_eq!(views.save_as_new(&grid, "Open").await, None);
    assert!(
        views
            .error(ViewOperation::SaveAsNew)
            .unwrap()
            .contains("already exists")
    );

    // a shared view may reuse a personal name, and success clears the error
    assert!(views.save_as_shared(&grid, "Open").await.is_some());
    assert_eq!(views.error(ViewOperation::SaveAsNew), None);

    let other = views.save_as_new(&grid, "Closed").await.unwrap();
    assert!(!views.rename(other, "Open").await);
    assert!(views.error(ViewOperation::Rename).is_some());
    assert!(views.rename(other, "Archived").await);
    assert_eq!(views.store().get(other).await.unwrap().name, "Archived");
}

#[tokio::test]
async fn test_list_orders_shared_before_personal() {
    let conn = connection().await;
    let mut ann = controller(&conn, Some("ann")).await;
    let mut bob = controller(&conn, Some("bob")).await;
    let grid = grid();

    ann.save_as_shared(&grid, "Team").await.unwrap();
    ann.save_as_new(&grid, "Mine").await.unwrap();
    ann.save_as_shared(&grid, "Everyone").await.unwrap();
    bob.save_as_new(&grid, "Bob's").await.unwrap();

    let names: Vec<String> = ann.list().await.into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["Team", "Everyone", "Mine"]);
    let names: Vec<String> = bob.list().await.into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["Team", "Everyone", "Bob's"]);
}

#[tokio::test]
async fn test_save_to_existing_replaces_children() {
    let conn = connection().await;
    let mut views = controller(&conn, None).await;
    let mut grid = grid();
    build_nested_state(&mut grid);
    let id = views.save_as_new(&grid, "Work").await.unwrap();

    let root_terms: Vec<_> = grid.filters().children(None).iter().map(|t| t.id).collect();
    for term in root_terms {
        grid.delete_filter(term).unwrap();
    }
    grid.toggle_column(C).unwrap();
    assert!(views.save_to_existing(&grid, id).await);

    assert_eq!(
        count(&conn, "select count(*) from datagrid_view_filter_term").await,
        0
    );
    let layout = views.store().load(id, grid.registry()).await.unwrap();
    assert!(layout.filters.is_empty());
    let c = layout.columns.iter().find(|c| c.column == C).unwrap();
    assert!(c.displaying);

    assert!(!views.save_to_existing(&grid, ViewId(404)).await);
    assert!(views.error(ViewOperation::SaveToExisting).is_some());
}

#[tokio::test]
async fn test_delete_cascades_and_falls_back_to_default() {
    let conn = connection().await;
    let mut views = controller(&conn, None).await;
    let mut grid = grid();
    build_nested_state(&mut grid);
    let id = views.save_as_new(&grid, "Temp").await.unwrap();
    views.select(&grid, Some(id));
    views.sync(&mut grid, conn.as_ref()).await;

    assert!(views.delete(&grid, id).await);
    assert_eq!(views.selected(), None);
    for table in [
        "datagrid_view",
        "datagrid_view_column",
        "datagrid_view_filter_term",
    ] {
        assert_eq!(count(&conn, &format!("select count(*) from {}", table)).await, 0);
    }

    views.sync(&mut grid, conn.as_ref()).await;
    assert_eq!(grid.filters().len(), 0);
    assert!(!views.delete(&grid, id).await);
}

#[tokio::test]
async fn test_failed_load_keeps_current_state() {
    let conn = connection().await;
    let mut views = controller(&conn, None).await;
    let mut grid = grid();
    views.sync(&mut grid, conn.as_ref()).await;
    build_nested_state(&mut grid);
    let before = grid.live_query().sql;

    views.select(&grid, Some(ViewId(999)));
    let status = views.sync(&mut grid, conn.as_ref()).await;
    assert_eq!(status, Some(QueryStatus::Received));
    assert!(views.error(ViewOperation::Load).unwrap().contains("999"));
    assert_eq!(grid.live_query().sql, before);
}

#[tokio::test]
async fn test_load_tolerates_changed_column_declarations() {
    let conn = connection().await;
    let mut views = controller(&conn, None).await;
    let mut grid = grid();
    build_nested_state(&mut grid);
    let id = views.save_as_new(&grid, "Old").await.unwrap();

    // B is gone and D is new
    let mut columns = columns();
    columns.remove(2);
    columns.push(ColumnDef::new("D").query("d").storage_name("d"));
    let mut changed = grid_with(columns);
    let layout = views.store().load(id, changed.registry()).await.unwrap();
    changed.apply_layout(&layout);

    assert_eq!(
        changed.columns().ordered_ids(),
        vec![ColumnId(1), ColumnId(2), ColumnId(0), ColumnId(3)]
    );
    assert_eq!(
        changed.live_query().sql,
        "select a, null, d from items \
         where coalesce((a = 'x' and ((a like '%y%' escape '\\'))), true) limit 100"
    );
}
