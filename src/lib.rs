//! Templated SQL select queries with typed result materialization.
//!
//! # Intention
//!
//! - Compile a select template with `:name` placeholders once, for one SQL
//!   dialect, and run it many times with caller-supplied arguments.
//! - Bind arguments either to a prepared statement or as escaped literals.
//! - Hand rows back as positional value lists or column-name maps without
//!   losing type or null information.
//!
//! # Architectural Boundaries
//!
//! - Only read queries belong here: no writes, transactions or schema work.
//! - The hosting framework owns scheduling, logging subscribers and the
//!   argument values; this crate only exposes construct / eval / cleanup.
//!
//! ```no_run
//! use rust_sqlquery::{Activity, Input, Params, Settings, SqlQueryActivity};
//!
//! # async fn example() -> rust_sqlquery::Result<()> {
//! let settings = Settings::new(
//!     "sqlite",
//!     "sqlite3",
//!     "users.db",
//!     "select id, name from users where dept = :dept",
//! );
//! let activity = SqlQueryActivity::new(settings).await?;
//! let output = activity
//!     .eval(Input::new(Params::new().with_value("dept", "eng")))
//!     .await?;
//! println!("{} rows", output.results.len());
//! activity.cleanup().await?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod binder;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod results;
pub mod scan;
pub mod statement;
pub mod value;

pub use activity::{Activity, Input, Output, Settings, SqlQueryActivity, RESULTS_OUTPUT};
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use results::{ResultSet, ResultShape};
pub use statement::{CompiledStatement, StatementKind};
pub use value::{Params, Value};
