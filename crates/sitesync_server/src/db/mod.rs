mod repo;
mod schema;

pub use repo::{ContentRepo, StoredContent};
pub use schema::init_database;
