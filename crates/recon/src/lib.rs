//! `carecall-recon` - Beneficiary/operator reconciliation and call metrics.
//!
//! Pure engine crate: receives pre-loaded snapshots (beneficiary registry,
//! operator roster, assignment list, call log), returns the beneficiary ->
//! operator mapping, per-operator metrics and recency status.
//! No CLI or IO dependencies.

pub mod alias;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod roster;
pub mod status;

pub use config::{MatchStrategy, ReconConfig};
pub use diagnostics::Diagnostics;
pub use engine::{run, run_records};
pub use error::ReconError;
pub use ingest::{load_csv_records, load_json_records};
pub use model::{ReconInput, ReconReport, RecordSet};
