pub mod manager;
pub mod triggers;

pub use manager::{DatabaseError, DatabaseManager, PoolSettings};
