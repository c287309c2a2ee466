//! Refresh keys, the two-tier watcher and live query execution

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dgrid_core::{Connection, QueryResult};
use tokio::sync::watch;

use crate::query::CompiledQuery;

/// Shared monotonic counter; a change of value is the trigger for a requery
#[derive(Debug, Clone, Default)]
pub struct RefreshKey(Arc<AtomicU64>);

impl RefreshKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the key and returns the new value
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Keys watched by one grid
#[derive(Debug, Clone, Default)]
pub struct GridKeys {
    /// Structural changes that only need a requery
    pub refresh: RefreshKey,
    /// Active view selection
    pub view: RefreshKey,
    /// Explicit "reset to view" requests
    pub reset: RefreshKey,
    /// App-wide refresh, usually shared between grids
    pub global: RefreshKey,
}

impl GridKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(global: RefreshKey) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            refresh: self.refresh.get(),
            view: self.view.get(),
            reset: self.reset.get(),
            global: self.global.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySnapshot {
    pub refresh: u64,
    pub view: u64,
    pub reset: u64,
    pub global: u64,
}

/// What a key change requires from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchScope {
    /// Reload column and filter state from the selected view, then requery
    ViewStructural,
    /// Rerun the live query only
    QueryOnly,
}

/// Compares key snapshots against the last observed one
#[derive(Debug)]
pub struct Watcher {
    keys: GridKeys,
    last: Option<KeySnapshot>,
}

impl Watcher {
    pub fn new(keys: GridKeys) -> Self {
        Self { keys, last: None }
    }

    pub fn keys(&self) -> &GridKeys {
        &self.keys
    }

    /// The widest scope that changed since the previous poll. The first poll
    /// is always structural.
    pub fn poll(&mut self) -> Option<WatchScope> {
        let current = self.keys.snapshot();
        let scope = match self.last {
            None => Some(WatchScope::ViewStructural),
            Some(last) if last.view != current.view || last.reset != current.reset => {
                Some(WatchScope::ViewStructural)
            }
            Some(last) if last.refresh != current.refresh || last.global != current.global => {
                Some(WatchScope::QueryOnly)
            }
            Some(_) => None,
        };
        self.last = Some(current);
        scope
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Requested,
    /// Still running past the fallback delay; stale rows stay visible
    FallbackTriggered,
    Received,
    Failed(String),
    Disallowed,
}

impl QueryStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Requested | Self::FallbackTriggered)
    }
}

/// Runs live queries, publishes their status and keeps the last good result
#[derive(Debug)]
pub struct LiveQuery {
    status: watch::Sender<QueryStatus>,
    fallback: Duration,
    last_good: Option<QueryResult>,
    projected: Vec<crate::column::ColumnId>,
}

impl LiveQuery {
    pub fn new(fallback: Duration) -> Self {
        let (status, _) = watch::channel(QueryStatus::Idle);
        Self {
            status,
            fallback,
            last_good: None,
            projected: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> QueryStatus {
        self.status.borrow().clone()
    }

    /// Rows of the last successful run, kept across failures
    pub fn rows(&self) -> Option<&QueryResult> {
        self.last_good.as_ref()
    }

    /// Column behind each projected position of [`rows`](Self::rows)
    pub fn projected(&self) -> &[crate::column::ColumnId] {
        &self.projected
    }

    pub async fn execute(&mut self, conn: &dyn Connection, query: &CompiledQuery) -> QueryStatus {
        self.status.send_replace(QueryStatus::Requested);

        let run = conn.query(&query.sql, &[]);
        tokio::pin!(run);
        let fallback = tokio::time::sleep(self.fallback);
        tokio::pin!(fallback);
        let mut fell_back = false;

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                _ = &mut fallback, if !fell_back => {
                    fell_back = true;
                    tracing::debug!(fallback_ms = self.fallback.as_millis() as u64, "live query is slow, showing stale rows");
                    self.status.send_replace(QueryStatus::FallbackTriggered);
                }
            }
        };

        let status = match result {
            Ok(rows) => {
                tracing::debug!(rows = rows.row_count(), "live query received");
                self.last_good = Some(rows);
                self.projected = query.projected.clone();
                QueryStatus::Received
            }
            Err(e) if e.is_disallowed() => {
                tracing::warn!(error = %e, "live query disallowed");
                QueryStatus::Disallowed
            }
            Err(e) => {
                tracing::warn!(error = %e, "live query failed, keeping last rows");
                QueryStatus::Failed(e.to_string())
            }
        };
        self.status.send_replace(status.clone());
        status
    }
}
