//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dgrid_core::{Connection, QueryResult, Result, StatementResult, Transaction, Value};
use dgrid_engine::filter::FilterType;
use dgrid_engine::{ColumnDef, GridConfig, QuerySource, WriteTarget};
use dgrid_sqlite::SqliteConnection;

/// In-memory database with a `people` table of `rows` rows, ids 1..=rows
pub async fn people(rows: i64) -> Arc<SqliteConnection> {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute(
        "create table people (id integer primary key, name text, age integer, notes text)",
        &[],
    )
    .await
    .unwrap();
    for i in 1..=rows {
        conn.execute(
            "insert into people (id, name, age, notes) values (?1, ?2, ?3, null)",
            &[
                Value::Int64(i),
                Value::String(format!("person {}", i)),
                Value::Int64(20 + i % 50),
            ],
        )
        .await
        .unwrap();
    }
    Arc::new(conn)
}

pub fn people_config() -> GridConfig {
    GridConfig::new(
        "people",
        vec![
            ColumnDef::new("Id").query("id").storage_name("id").sortable(),
            ColumnDef::new("Name")
                .query("name")
                .storage_name("name")
                .export_name("Full name")
                .filterable(FilterType::String)
                .sortable()
                .update_field("name"),
            ColumnDef::new("Age")
                .query("age")
                .storage_name("age")
                .filterable(FilterType::Number)
                .sortable(),
            ColumnDef::new("Notes")
                .query("notes")
                .storage_name("notes")
                .hidden()
                .no_export(),
        ],
        QuerySource::new("people", "id"),
    )
    .write_target(WriteTarget::new("people", "id"))
}

/// Delegates to an inner connection after sleeping on every query
pub struct SlowConnection {
    pub inner: Arc<SqliteConnection>,
    pub delay: Duration,
}

#[async_trait]
impl Connection for SlowConnection {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.query(sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.inner.begin_transaction().await
    }
}
