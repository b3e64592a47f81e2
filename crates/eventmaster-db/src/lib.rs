pub mod error;
pub mod memory;
pub mod reference;
pub mod seed;
pub mod sqlite;
pub mod storage;

#[cfg(test)]
mod conformance;

pub use error::{Result, StorageError};
pub use memory::MemStorage;
pub use sqlite::SqliteStorage;
pub use storage::Storage;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the precision both adapters persist.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
