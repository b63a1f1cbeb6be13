//! Response checking: assertions, captures, and snapshots.
//!
//! - [`evaluator::evaluate`] - typed operators over a response
//! - [`capture::extract`] - projections published into the resolver
//! - [`snapshot::SnapshotStore`] - per-invocation snapshot handle
//! - [`path`] - dot/bracket addressing shared by all of the above

pub mod capture;
pub mod evaluator;
pub mod path;
pub mod snapshot;

pub use capture::{extract, CapturedValue};
pub use evaluator::{evaluate, AssertionResult, EvalOptions};
pub use snapshot::{request_key, SnapshotOutcome, SnapshotStore};
