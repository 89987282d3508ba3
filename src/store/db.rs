//! Embedded `SurrealDB` connection bootstrap.

use std::fs;
use std::path::Path;

use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;

use crate::{AppError, Result};

/// Alias for the shared `SurrealDB` client.
pub type Database = Surreal<Db>;

/// Connect using `RocksDB` (production) or in-memory (tests) backends.
///
/// # Errors
///
/// Returns `AppError::Store` if the connection fails.
pub async fn connect(db_path: Option<&Path>) -> Result<Database> {
    let db = match db_path {
        None => Surreal::new::<Mem>(()).await?,
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| AppError::Store(format!("failed to create db dir: {err}")))?;
            }
            Surreal::new::<RocksDb>(path.to_path_buf()).await?
        }
    };

    db.use_ns("memberrelay").use_db("backoffice").await?;
    Ok(db)
}
