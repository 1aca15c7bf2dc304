pub mod model;
pub mod query;
pub mod repo;
pub mod search;
pub mod sqlite;

pub use model::*;
pub use query::*;
pub use repo::*;
pub use sqlite::SqliteRepository;
