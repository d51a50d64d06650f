//! Tessera Task
//!
//! The closed set of task types a pipeline node can execute, plus the value
//! conversions applied across task boundaries.
//!
//! Every task consumes the outcomes of its direct inputs, in declared order,
//! and produces one JSON value or a [`TaskError`]. A failed input normally
//! short-circuits the task: it does not run and fails with the upstream
//! message instead (see [`run_task`]). `median` tolerates a bounded number of
//! failed inputs, and the result aggregator ([`project_results`]) tolerates all
//! of them.

mod bridge;
mod context;
mod error;
mod execute;
mod http;
mod jsonparse;
mod median;
mod multiply;
mod result;
mod value;

pub use context::{BridgeLookup, TaskContext};
pub use error::TaskError;
pub use execute::{TaskInput, composite_error, run_task};
pub use result::{ResultProjection, project_results};
pub use value::{decimal_to_value, parse_document, resolve_path, to_decimal, type_name};
