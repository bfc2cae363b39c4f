//! Embedded-SQL execution (§4.4, §6.2): the abstract `DbDriver` contract,
//! the cursor-lifecycle `SqlExecutor` that runs `SqlStatement`s against it,
//! and two concrete drivers (`MemoryDriver`, always available; `SqliteDriver`,
//! behind the `sqlite` feature).

mod driver;
mod executor;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use driver::{coerce_for_bind, DbDriver, Param, Row};
pub use executor::{CursorState, SqlExecutor, SQLCODE_ERROR, SQLCODE_NO_DATA, SQLCODE_OK};
pub use memory::MemoryDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;
