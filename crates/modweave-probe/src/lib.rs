//! Runtime sandbox probe for modweave.
//!
//! This crate executes the Lua content of every enabled package inside an
//! instrumented Lua 5.4 state: the global table is proxied so undefined reads
//! yield `Unknown` stand-ins instead of faults, writes are attributed to the
//! defining file, `Events` callbacks are captured and replayed, and every unit
//! of execution runs under an instruction-count `Watchdog`. The observations
//! accumulate in an `AnalysisSession`, from which `safe_order` derives a
//! dependency-safe execution order.

pub mod candidates;
pub mod env;
pub mod order;
pub mod probe;
pub mod seed;
pub mod session;
pub mod unknown;
pub mod watchdog;

pub use candidates::{discover_candidates, stub_files, CandidateFile, STUB_FILE};
pub use env::{module_name, Sandbox};
pub use order::{order_anomalies, safe_order, OrderAnomaly};
pub use probe::{Probe, ProbeOutcome};
pub use seed::{apply_seed, load_seed};
pub use session::{AnalysisSession, CallbackFault, FileFault, OverrideEvent};
pub use unknown::Unknown;
pub use watchdog::Watchdog;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lua state error: {0}")]
    Lua(#[from] mlua::Error),
    #[error("invalid prior probe report {path}: {source}")]
    Seed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
