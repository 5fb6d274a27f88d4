pub mod db;
pub mod store;

pub use db::{create_db, seed_default_categories, DbPool};
pub use store::{NewTransaction, SqliteStore};
