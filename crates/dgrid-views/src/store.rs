//! Saved view storage
//!
//! Every mutation runs in one transaction and rolls back on the first error,
//! so a failed save never leaves a half-written view behind.

use std::collections::HashMap;
use std::sync::Arc;

use dgrid_core::{Connection, DgridError, QueryResult, StatementResult, Transaction, Value};
use dgrid_engine::{ColumnRegistry, FilterTermLayout, GridLayout, GridSettings, OrderKey};

use crate::error::{ViewError, ViewResult};
use crate::record::{
    COLUMN_COLUMNS, FILTER_TERM_COLUMNS, StoredColumn, StoredFilterTerm, VIEW_COLUMNS, ViewId,
    ViewRecord, tiers,
};
use crate::schema;

/// Views of one grid, identified by its datagrid name
pub struct ViewStore {
    conn: Arc<dyn Connection>,
    datagrid_name: String,
    max_depth: usize,
}

impl std::fmt::Debug for ViewStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStore")
            .field("datagrid_name", &self.datagrid_name)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl ViewStore {
    pub fn new(conn: Arc<dyn Connection>, datagrid_name: impl Into<String>) -> Self {
        Self {
            conn,
            datagrid_name: datagrid_name.into(),
            max_depth: GridSettings::default().max_filter_depth,
        }
    }

    /// Creates the store and its tables
    pub async fn open(conn: Arc<dyn Connection>, datagrid_name: impl Into<String>) -> ViewResult<Self> {
        schema::ensure_schema(conn.as_ref()).await?;
        Ok(Self::new(conn, datagrid_name))
    }

    /// Deepest filter group nesting copied by save and duplicate
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn datagrid_name(&self) -> &str {
        &self.datagrid_name
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    fn grid(&self) -> Value {
        Value::from(self.datagrid_name.as_str())
    }

    pub async fn get(&self, id: ViewId) -> ViewResult<ViewRecord> {
        let result = self
            .conn
            .query(
                &format!(
                    "select {} from datagrid_view where id = ?1 and datagrid_name = ?2",
                    VIEW_COLUMNS
                ),
                &[id.into(), self.grid()],
            )
            .await?;
        ViewRecord::single(&result, id)
    }

    /// Shared views first, then the user's own, each in listing order
    pub async fn list(&self, user: Option<&str>) -> ViewResult<Vec<ViewRecord>> {
        let result = self
            .conn
            .query(
                &format!(
                    "select {} from datagrid_view \
                     where datagrid_name = ?1 and (user is null or user is ?2) \
                     order by user is not null, ordering, id",
                    VIEW_COLUMNS
                ),
                &[self.grid(), user.into()],
            )
            .await?;
        ViewRecord::all(&result)
    }

    #[tracing::instrument(skip(self, layout, registry), fields(grid = %self.datagrid_name))]
    pub async fn save_as_new(
        &self,
        name: &str,
        user: Option<&str>,
        layout: &GridLayout,
        registry: &ColumnRegistry,
    ) -> ViewResult<ViewId> {
        let tx = self.conn.begin_transaction().await?;
        let result = self
            .insert_view(tx.as_ref(), name, user, layout, registry)
            .await;
        let id = finish(tx, result).await?;
        tracing::info!(view = %id, name, "saved new view");
        Ok(id)
    }

    async fn insert_view(
        &self,
        tx: &dyn Transaction,
        name: &str,
        user: Option<&str>,
        layout: &GridLayout,
        registry: &ColumnRegistry,
    ) -> ViewResult<ViewId> {
        if self.name_taken(tx, name, user, None).await? {
            return Err(ViewError::NameTaken(name.to_string()));
        }
        let id = self
            .insert_view_row(
                tx,
                name,
                user,
                layout.root_filter_is_any,
                layout.row_height,
            )
            .await?;
        self.insert_children(tx, id, layout, registry).await?;
        Ok(id)
    }

    /// Overwrites a view's scalars and replaces all of its child rows
    #[tracing::instrument(skip(self, layout, registry), fields(grid = %self.datagrid_name))]
    pub async fn save_to_existing(
        &self,
        id: ViewId,
        layout: &GridLayout,
        registry: &ColumnRegistry,
    ) -> ViewResult<()> {
        let tx = self.conn.begin_transaction().await?;
        let result = self.replace_view(tx.as_ref(), id, layout, registry).await;
        finish(tx, result).await?;
        tracing::info!(view = %id, "saved view");
        Ok(())
    }

    async fn replace_view(
        &self,
        tx: &dyn Transaction,
        id: ViewId,
        layout: &GridLayout,
        registry: &ColumnRegistry,
    ) -> ViewResult<()> {
        let updated = tx
            .execute(
                "update datagrid_view set root_filter_is_any = ?3, row_height = ?4 \
                 where id = ?1 and datagrid_name = ?2",
                &[
                    id.into(),
                    self.grid(),
                    Value::Bool(layout.root_filter_is_any),
                    Value::Float64(f64::from(layout.row_height)),
                ],
            )
            .await?;
        if updated.affected_rows == 0 {
            return Err(ViewError::NotFound(id));
        }

        tx.execute(
            "delete from datagrid_view_filter_term where view_id = ?1",
            &[id.into()],
        )
        .await?;
        tx.execute(
            "delete from datagrid_view_column where view_id = ?1",
            &[id.into()],
        )
        .await?;
        self.insert_children(tx, id, layout, registry).await
    }

    /// Copies a view into the same scope under the first free "<name> copy" name
    #[tracing::instrument(skip(self), fields(grid = %self.datagrid_name))]
    pub async fn duplicate(&self, id: ViewId) -> ViewResult<ViewId> {
        let tx = self.conn.begin_transaction().await?;
        let result = self.copy_view(tx.as_ref(), id).await;
        let copy = finish(tx, result).await?;
        tracing::info!(source = %id, view = %copy, "duplicated view");
        Ok(copy)
    }

    async fn copy_view(&self, tx: &dyn Transaction, id: ViewId) -> ViewResult<ViewId> {
        let result = tx
            .query(
                &format!(
                    "select {} from datagrid_view where id = ?1 and datagrid_name = ?2",
                    VIEW_COLUMNS
                ),
                &[id.into(), self.grid()],
            )
            .await?;
        let source = ViewRecord::single(&result, id)?;
        let user = source.user.as_deref();

        let mut name = format!("{} copy", source.name);
        let mut attempt = 2;
        while self.name_taken(tx, &name, user, None).await? {
            name = format!("{} copy {}", source.name, attempt);
            attempt += 1;
        }

        let copy = self
            .insert_view_row(
                tx,
                &name,
                user,
                source.root_filter_is_any,
                source.row_height,
            )
            .await?;

        tx.execute(
            &format!(
                "insert into datagrid_view_column (view_id, {cols}) \
                 select ?1, {cols} from datagrid_view_column where view_id = ?2",
                cols = COLUMN_COLUMNS
            ),
            &[copy.into(), id.into()],
        )
        .await?;

        let rows = tx
            .query(
                &format!(
                    "select {} from datagrid_view_filter_term where view_id = ?1",
                    FILTER_TERM_COLUMNS
                ),
                &[id.into()],
            )
            .await?;
        let terms = stored_terms(&rows)?;
        let (tiered, dropped) = tiers(&terms, |t| t.id, |t| t.group_id, self.max_depth);
        if dropped > 0 {
            tracing::warn!(dropped, "filter terms nested too deep were not copied");
        }

        let mut mapping: HashMap<i64, i64> = HashMap::new();
        for tier in tiered {
            for term in tier {
                let group = term.group_id.and_then(|g| mapping.get(&g).copied());
                let new_id = insert_filter_term(tx, term.params(copy, group)).await?;
                mapping.insert(term.id, new_id);
            }
        }
        Ok(copy)
    }

    /// Reads a view back as a grid layout; columns and conditions the grid no longer has are dropped
    #[tracing::instrument(skip(self, registry), fields(grid = %self.datagrid_name))]
    pub async fn load(&self, id: ViewId, registry: &ColumnRegistry) -> ViewResult<GridLayout> {
        let view = self.get(id).await?;

        let columns = self
            .conn
            .query(
                &format!(
                    "select {} from datagrid_view_column where view_id = ?1",
                    COLUMN_COLUMNS
                ),
                &[id.into()],
            )
            .await?;
        let mut column_layouts = Vec::with_capacity(columns.row_count());
        for row in &columns.rows {
            if let Some(layout) = StoredColumn::from_row(row)?.into_layout(registry) {
                column_layouts.push(layout);
            }
        }

        let rows = self
            .conn
            .query(
                &format!(
                    "select {} from datagrid_view_filter_term where view_id = ?1",
                    FILTER_TERM_COLUMNS
                ),
                &[id.into()],
            )
            .await?;
        let mut filters: Vec<FilterTermLayout> = Vec::with_capacity(rows.row_count());
        for term in stored_terms(&rows)? {
            if let Some(layout) = term.into_layout(registry)? {
                filters.push(layout);
            }
        }

        tracing::debug!(
            view = %id,
            columns = column_layouts.len(),
            filters = filters.len(),
            "loaded view"
        );
        Ok(GridLayout {
            columns: column_layouts,
            filters,
            root_filter_is_any: view.root_filter_is_any,
            row_height: view.row_height,
        })
    }

    #[tracing::instrument(skip(self), fields(grid = %self.datagrid_name))]
    pub async fn rename(&self, id: ViewId, name: &str) -> ViewResult<()> {
        let tx = self.conn.begin_transaction().await?;
        let result = self.rename_in(tx.as_ref(), id, name).await;
        finish(tx, result).await?;
        tracing::info!(view = %id, name, "renamed view");
        Ok(())
    }

    async fn rename_in(&self, tx: &dyn Transaction, id: ViewId, name: &str) -> ViewResult<()> {
        let result = tx
            .query(
                &format!(
                    "select {} from datagrid_view where id = ?1 and datagrid_name = ?2",
                    VIEW_COLUMNS
                ),
                &[id.into(), self.grid()],
            )
            .await?;
        let view = ViewRecord::single(&result, id)?;
        if self
            .name_taken(tx, name, view.user.as_deref(), Some(id))
            .await?
        {
            return Err(ViewError::NameTaken(name.to_string()));
        }
        tx.execute(
            "update datagrid_view set name = ?2 where id = ?1",
            &[id.into(), Value::from(name)],
        )
        .await?;
        Ok(())
    }

    /// Deletes a view and, through the foreign keys, its child rows
    #[tracing::instrument(skip(self), fields(grid = %self.datagrid_name))]
    pub async fn delete(&self, id: ViewId) -> ViewResult<bool> {
        let tx = self.conn.begin_transaction().await?;
        let result = tx
            .execute(
                "delete from datagrid_view where id = ?1 and datagrid_name = ?2",
                &[id.into(), self.grid()],
            )
            .await
            .map_err(ViewError::from);
        let deleted = finish(tx, result).await?.affected_rows > 0;
        if deleted {
            tracing::info!(view = %id, "deleted view");
        }
        Ok(deleted)
    }

    async fn name_taken(
        &self,
        tx: &dyn Transaction,
        name: &str,
        user: Option<&str>,
        except: Option<ViewId>,
    ) -> ViewResult<bool> {
        let result = tx
            .query(
                "select count(*) from datagrid_view \
                 where datagrid_name = ?1 and name = ?2 and user is ?3 and id is not ?4",
                &[
                    self.grid(),
                    Value::from(name),
                    user.into(),
                    except.map(|id| id.0).into(),
                ],
            )
            .await?;
        Ok(result.scalar().and_then(Value::as_i64).unwrap_or(0) > 0)
    }

    async fn insert_view_row(
        &self,
        tx: &dyn Transaction,
        name: &str,
        user: Option<&str>,
        root_filter_is_any: bool,
        row_height: f32,
    ) -> ViewResult<ViewId> {
        let last = tx
            .query(
                "select max(ordering) from datagrid_view where datagrid_name = ?1 and user is ?2",
                &[self.grid(), user.into()],
            )
            .await?;
        let ordering = match last.scalar() {
            Some(Value::String(raw)) => OrderKey::parse(raw)?.after(),
            _ => OrderKey::first(),
        };

        let inserted = tx
            .execute(
                "insert into datagrid_view \
                 (name, datagrid_name, user, root_filter_is_any, row_height, ordering) \
                 values (?1, ?2, ?3, ?4, ?5, ?6)",
                &[
                    Value::from(name),
                    self.grid(),
                    user.into(),
                    Value::Bool(root_filter_is_any),
                    Value::Float64(f64::from(row_height)),
                    Value::from(ordering.as_str()),
                ],
            )
            .await?;
        Ok(ViewId(inserted_id(&inserted)?))
    }

    /// Writes column rows and filter terms, parents before children
    async fn insert_children(
        &self,
        tx: &dyn Transaction,
        view: ViewId,
        layout: &GridLayout,
        registry: &ColumnRegistry,
    ) -> ViewResult<()> {
        for column in &layout.columns {
            let Some(stored) = StoredColumn::from_layout(registry, column) else {
                continue;
            };
            tx.execute(
                &format!(
                    "insert into datagrid_view_column (view_id, {}) values (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    COLUMN_COLUMNS
                ),
                &stored.params(view),
            )
            .await?;
        }

        let (tiered, dropped) = tiers(&layout.filters, |t| t.key, |t| t.group, self.max_depth);
        if dropped > 0 {
            tracing::warn!(dropped, "filter terms nested too deep were not saved");
        }
        let mut mapping: HashMap<u64, i64> = HashMap::new();
        for tier in tiered {
            for term in tier {
                let Some(stored) = StoredFilterTerm::from_layout(registry, term) else {
                    tracing::warn!(term = term.key, "skipping condition on a column without a storage name");
                    continue;
                };
                let group = term.group.and_then(|g| mapping.get(&g).copied());
                let id = insert_filter_term(tx, stored.params(view, group)).await?;
                mapping.insert(term.key, id);
            }
        }
        Ok(())
    }
}

async fn insert_filter_term(tx: &dyn Transaction, params: Vec<Value>) -> ViewResult<i64> {
    let inserted = tx
        .execute(
            "insert into datagrid_view_filter_term \
             (view_id, group_id, ordering, is_any, column_name, op, value_1, value_2, value_3) \
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            &params,
        )
        .await?;
    inserted_id(&inserted)
}

fn stored_terms(result: &QueryResult) -> ViewResult<Vec<StoredFilterTerm>> {
    result.rows.iter().map(StoredFilterTerm::from_row).collect()
}

fn inserted_id(result: &StatementResult) -> ViewResult<i64> {
    result
        .last_insert_id
        .ok_or_else(|| DgridError::Query("insert did not report a row id".into()).into())
}

/// Commits on success, rolls back on error
async fn finish<T>(tx: Box<dyn Transaction>, result: ViewResult<T>) -> ViewResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(error = %rollback, "rollback after failed view write failed");
            }
            tracing::warn!(error = %e, "view write rolled back");
            Err(e)
        }
    }
}
