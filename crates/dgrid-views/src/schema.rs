//! Table definitions for saved views
//!
//! Written for SQLite: `user is ?` compares NULL owners, and the uniqueness
//! index folds a NULL user to the empty string.

use dgrid_core::Connection;

use crate::error::{ViewError, ViewResult};

pub const CREATE_VIEW_TABLE: &str = "create table if not exists datagrid_view (
    id integer primary key,
    name text not null,
    datagrid_name text not null,
    user text,
    root_filter_is_any integer not null default 0,
    row_height real not null,
    ordering text not null
)";

pub const CREATE_VIEW_NAME_INDEX: &str = "create unique index if not exists datagrid_view_name_unique
    on datagrid_view (datagrid_name, name, ifnull(user, ''))";

pub const CREATE_COLUMN_TABLE: &str = "create table if not exists datagrid_view_column (
    view_id integer not null references datagrid_view (id) on delete cascade,
    name text not null,
    displaying integer not null,
    ordering text not null,
    sort_index integer,
    sort_asc integer,
    width real,
    primary key (view_id, name)
)";

pub const CREATE_FILTER_TERM_TABLE: &str = "create table if not exists datagrid_view_filter_term (
    id integer primary key,
    view_id integer not null references datagrid_view (id) on delete cascade,
    group_id integer references datagrid_view_filter_term (id) on delete cascade,
    ordering text not null,
    is_any integer,
    column_name text,
    op text,
    value_1 text,
    value_2 text,
    value_3 text
)";

pub const CREATE_FILTER_TERM_INDEX: &str = "create index if not exists datagrid_view_filter_term_view
    on datagrid_view_filter_term (view_id)";

/// Creates the view tables if they do not exist yet
pub async fn ensure_schema(conn: &dyn Connection) -> ViewResult<()> {
    for statement in [
        CREATE_VIEW_TABLE,
        CREATE_VIEW_NAME_INDEX,
        CREATE_COLUMN_TABLE,
        CREATE_FILTER_TERM_TABLE,
        CREATE_FILTER_TERM_INDEX,
    ] {
        conn.execute(statement, &[])
            .await
            .map_err(|e| ViewError::Schema(e.to_string()))?;
    }
    tracing::debug!("view schema ready");
    Ok(())
}
