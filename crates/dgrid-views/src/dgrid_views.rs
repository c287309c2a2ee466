//! DGRID Views - saved column, sort and filter layouts
//!
//! A view is stored as one `datagrid_view` row plus child rows for its columns
//! and filter terms. Columns are keyed by storage name so a view survives
//! columns being added to or removed from the grid declaration.

mod controller;
mod error;
mod record;
pub mod schema;
mod store;

pub use controller::{ViewController, ViewOperation};
pub use error::{ViewError, ViewResult};
pub use record::{ViewId, ViewRecord};
pub use store::ViewStore;
