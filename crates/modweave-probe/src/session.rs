//! Aggregated observations of one probe run.
//!
//! The session is a plain value owned by the caller and passed explicitly
//! into [`Probe::run`](crate::Probe::run); the Lua hooks write into it while
//! the state is alive and it is handed back afterwards.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A function-valued global replaced by a different function from another file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideEvent {
    pub symbol: String,
    pub previous_file: String,
    pub file: String,
}

/// A load-time fault (syntax error, runtime error or timeout) of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFault {
    pub file: String,
    pub message: String,
}

/// A fault raised by a captured event callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackFault {
    pub event: String,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    /// Undefined-global reads, summed across files.
    pub missing_globals: BTreeMap<String, u64>,
    /// Undefined-global reads per file key.
    pub missing_by_file: BTreeMap<String, BTreeMap<String, u64>>,
    /// Every file that assigned a global, in assignment order, distinct.
    pub definitions: BTreeMap<String, Vec<String>>,
    /// Reads of globals whose current owner is another file.
    pub uses: BTreeMap<String, BTreeSet<String>>,
    pub overrides: Vec<OverrideEvent>,
    pub load_errors: Vec<FileFault>,
    pub timeouts: Vec<FileFault>,
    pub callback_errors: Vec<CallbackFault>,
    pub files_loaded: usize,
    pub callbacks_run: usize,
    #[serde(skip)]
    owners: BTreeMap<String, String>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_missing(&mut self, file: &str, symbol: &str) {
        *self.missing_globals.entry(symbol.to_owned()).or_default() += 1;
        *self
            .missing_by_file
            .entry(file.to_owned())
            .or_default()
            .entry(symbol.to_owned())
            .or_default() += 1;
    }

    /// Record a read of a defined global. Reads of a file's own globals and
    /// of globals with no recorded owner (the standard library) are ignored.
    pub fn record_use(&mut self, file: &str, symbol: &str) {
        match self.owners.get(symbol) {
            Some(owner) if owner != file => {
                self.uses
                    .entry(file.to_owned())
                    .or_default()
                    .insert(symbol.to_owned());
            }
            _ => {}
        }
    }

    /// Record an assignment to a global. `replaced_function` is true when a
    /// function value was replaced by a different function; that becomes an
    /// override event if the previous owner was another file.
    pub fn record_definition(&mut self, file: &str, symbol: &str, replaced_function: bool) {
        if let Some(previous) = self.owners.get(symbol) {
            if replaced_function && previous != file {
                self.overrides.push(OverrideEvent {
                    symbol: symbol.to_owned(),
                    previous_file: previous.clone(),
                    file: file.to_owned(),
                });
            }
        }
        self.owners.insert(symbol.to_owned(), file.to_owned());
        let definers = self.definitions.entry(symbol.to_owned()).or_default();
        if !definers.iter().any(|f| f == file) {
            definers.push(file.to_owned());
        }
    }

    /// The first file that assigned `symbol`, if any.
    pub fn first_definer(&self, symbol: &str) -> Option<&str> {
        self.definitions
            .get(symbol)
            .and_then(|files| files.first())
            .map(String::as_str)
    }

    pub fn record_load_error(&mut self, file: &str, message: String) {
        self.load_errors.push(FileFault {
            file: file.to_owned(),
            message,
        });
    }

    pub fn record_timeout(&mut self, file: &str, message: String) {
        self.timeouts.push(FileFault {
            file: file.to_owned(),
            message,
        });
    }

    pub fn record_callback_error(&mut self, event: &str, file: &str, message: String) {
        self.callback_errors.push(CallbackFault {
            event: event.to_owned(),
            file: file.to_owned(),
            message,
        });
    }

    /// Total number of faults of any kind.
    pub fn fault_count(&self) -> usize {
        self.load_errors.len() + self.timeouts.len() + self.callback_errors.len()
    }
}
