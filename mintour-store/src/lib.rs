pub mod app_config;
pub mod database;
pub mod cart_repo;
pub mod catalog_repo;
pub mod order_repo;
pub mod toss_client;
pub mod memory;

pub use cart_repo::StoreCartRepository;
pub use catalog_repo::StoreProductRepository;
pub use database::DbClient;
pub use memory::{InMemoryStore, ScriptedGateway};
pub use order_repo::StoreOrderRepository;
pub use toss_client::TossPaymentsClient;

use mintour_core::StoreError;

/// Map a driver error onto the storage capability's error type
pub(crate) fn db_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Unavailable(err.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode(err.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}
