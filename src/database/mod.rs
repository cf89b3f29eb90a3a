pub mod entity;
pub mod manager;
pub mod query;
pub mod repository;

pub use entity::{Entity, Patch, RelationDef};
pub use manager::{connect_pool, DatabaseError};
pub use query::{DateBound, EntityQuery, Visibility};
pub use repository::{RepoError, Repository};
