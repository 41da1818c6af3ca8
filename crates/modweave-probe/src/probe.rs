use crate::candidates::{stub_files, CandidateFile, STUB_FILE};
use crate::env::Sandbox;
use crate::order::{order_anomalies, safe_order, OrderAnomaly};
use crate::session::AnalysisSession;
use crate::ProbeError;
use modweave_schema::ProbeSettings;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Orders derived from one probe run. Diagnostics stay in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub raw_order: Vec<String>,
    pub safe_order: Vec<String>,
    pub anomalies: Vec<OrderAnomaly>,
    /// Stub files that loaded without a fault.
    pub stub_files: usize,
}

/// Runs candidate files in a fresh sandbox and derives a safe execution order.
pub struct Probe {
    settings: ProbeSettings,
    stub_root: Option<PathBuf>,
}

fn read_source(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl Probe {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            settings,
            stub_root: None,
        }
    }

    /// Load every `*.lua` under `root` before the candidates, attributed to
    /// [`STUB_FILE`].
    #[must_use]
    pub fn with_stub_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.stub_root = Some(root.into());
        self
    }

    /// Execute `files` in order, then every captured event callback. The
    /// session is lent to the Lua state for the run and handed back with the
    /// observations added, even when the run fails part way.
    pub fn run(
        &self,
        session: &mut AnalysisSession,
        files: &[CandidateFile],
    ) -> Result<ProbeOutcome, ProbeError> {
        let sandbox = Sandbox::new(&self.settings)?;
        sandbox.begin(std::mem::take(session));
        let executed = self.execute(&sandbox, files);
        *session = sandbox.finish();
        let stub_files = executed?;

        let raw_order: Vec<String> = files.iter().map(|f| f.key.clone()).collect();
        let safe = safe_order(&raw_order, session);
        let anomalies = order_anomalies(&raw_order, &safe);
        info!(
            "probe loaded {}/{} files, ran {} callbacks, {} faults, {} order anomalies",
            session.files_loaded.saturating_sub(stub_files),
            files.len(),
            session.callbacks_run,
            session.fault_count(),
            anomalies.len()
        );

        Ok(ProbeOutcome {
            raw_order,
            safe_order: safe,
            anomalies,
            stub_files,
        })
    }

    fn execute(&self, sandbox: &Sandbox, files: &[CandidateFile]) -> Result<usize, ProbeError> {
        let mut stubs = 0;
        if let Some(root) = &self.stub_root {
            for path in stub_files(root)? {
                match read_source(&path) {
                    Ok(source) => {
                        if sandbox.execute(STUB_FILE, &source, None) {
                            stubs += 1;
                        }
                    }
                    Err(e) => warn!("skipping stub {}: {e}", path.display()),
                }
            }
            debug!("loaded {stubs} stub files from {}", root.display());
        }

        for file in files {
            match read_source(&file.path) {
                Ok(source) => {
                    sandbox.execute(&file.key, &source, Some(&file.module));
                }
                Err(e) => sandbox.record_load_error(&file.key, format!("unreadable: {e}")),
            }
        }
        sandbox.run_callbacks();
        Ok(stubs)
    }
}
