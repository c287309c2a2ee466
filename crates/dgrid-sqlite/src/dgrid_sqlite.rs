//! SQLite backend for the dgrid query execution contract

mod connection;

pub use connection::{SqliteConnection, SqliteTransaction};
