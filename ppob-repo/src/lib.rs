//! # PPOB Repository
//!
//! Unit of work, typed repositories and persistence backend adapters
//! (in-memory, SQLite) for the PPOB payment core.
//!
//! ```ignore
//! let store = build_store("memory://", StoreConfig::default()).await?;
//! let mut uow = store.begin();
//! uow.repository::<TransactionAggregate>().add(&tx).await?;
//! uow.commit().await?;
//! ```

use std::sync::Arc;

pub mod memory;
pub mod repository;
pub mod store;
pub mod unit_of_work;

#[cfg(feature = "sqlite")]
pub mod sqlite;


pub use memory::MemoryBackend;
pub use repository::Repository;
pub use store::{Store, StoreConfig};
pub use unit_of_work::{RemovePolicy, UnitOfWork};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// Build a store from a database URL.
///
/// `memory://` selects the in-memory backend; `sqlite:` URLs need the
/// `sqlite` feature.
///
/// # Examples
///
/// ```ignore
/// let store = build_store("sqlite://data/ppob.db?mode=rwc", StoreConfig::default()).await?;
/// ```
pub async fn build_store(database_url: &str, config: StoreConfig) -> anyhow::Result<Store> {
    if database_url.starts_with("memory:") {
        return Ok(Store::new(Arc::new(MemoryBackend::new()), config));
    }
    if database_url.starts_with("sqlite:") {
        return sqlite_store(database_url, config).await;
    }
    anyhow::bail!("unsupported database url: {database_url}")
}

#[cfg(feature = "sqlite")]
async fn sqlite_store(database_url: &str, config: StoreConfig) -> anyhow::Result<Store> {
    let backend = SqliteBackend::new(database_url).await?;
    Ok(Store::new(Arc::new(backend), config))
}

#[cfg(not(feature = "sqlite"))]
async fn sqlite_store(database_url: &str, _config: StoreConfig) -> anyhow::Result<Store> {
    anyhow::bail!("{database_url} needs the `sqlite` feature")
}
