//! DGRID Engine - state and query assembly for a filterable, sortable datagrid
//!
//! A grid is declared once as a list of [`ColumnDef`]s plus a [`QuerySource`].
//! From that the engine keeps:
//!
//! - a [`ColumnTable`] of per-column width, visibility, sort and ordering
//! - a [`FilterTree`] of nested and/or conditions
//! - a [`QueryCompiler`] that turns both into live, count, id and download SQL
//! - the refresh keys and [`Watcher`] deciding when to requery or reload a view
//! - focus and edit state for keyboard navigation
//!
//! [`GridState`] ties these together for one grid instance.

pub mod column;
pub mod debounce;
pub mod decision_table;
pub mod edit;
mod error;
pub mod export;
pub mod filter;
pub mod grid;
pub mod layout;
pub mod order_key;
pub mod query;
pub mod refresh;
pub mod resize;
pub mod selection;
pub mod settings;

pub use column::{ColumnDef, ColumnId, ColumnRegistry, ColumnState, ColumnTable};
pub use error::{GridError, GridResult};
pub use filter::{FilterLeaf, FilterNode, FilterOp, FilterTerm, FilterTermId, FilterTree, FilterType};
pub use grid::{GridConfig, GridState, ToolbarState};
pub use layout::{ColumnLayout, DefaultView, FilterTermLayout, GridLayout};
pub use order_key::OrderKey;
pub use query::{CompiledQuery, QueryCompiler, QuerySource, WriteTarget};
pub use refresh::{GridKeys, LiveQuery, QueryStatus, RefreshKey, WatchScope, Watcher};
pub use settings::GridSettings;
