//! Expense tracker runtime.
//!
//! Wires the session manager, the ledger sync engine and the policy observer
//! into a single [`TrackerRuntime`] built once at startup.

mod error;
mod export;
mod policy;
mod runtime;

#[cfg(test)]
mod tests;

pub use error::{RuntimeError, RuntimeResult};
pub use export::{export_csv, CSV_HEADER};
pub use policy::{evaluate, PolicyCommand, PolicyObserver, PolicyOutcome, PolicyState};
pub use runtime::{RuntimeSettings, TrackerRuntime};
