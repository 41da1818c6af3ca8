use crate::presence::{PresenceCounts, PresenceEntry, PresenceReport};
use modweave_probe::{AnalysisSession, CallbackFault, FileFault, OrderAnomaly, OverrideEvent, ProbeOutcome};
use modweave_schema::ModId;
use serde::Serialize;
use std::collections::BTreeMap;

/// How many entries each section of the text report lists before eliding.
const TEXT_SECTION_LIMIT: usize = 50;

/// Everything one probe stage observed, as written to the probe reports.
///
/// `safeOrder` is read back by later runs as their seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub generated_at: String,
    pub files_considered: usize,
    pub files_loaded: usize,
    pub stub_files: usize,
    pub callbacks_run: usize,
    pub missing_globals: BTreeMap<String, u64>,
    pub missing_by_file: BTreeMap<String, BTreeMap<String, u64>>,
    pub overrides: Vec<OverrideEvent>,
    pub load_errors: Vec<FileFault>,
    pub timeouts: Vec<FileFault>,
    pub callback_errors: Vec<CallbackFault>,
    pub raw_order: Vec<String>,
    pub safe_order: Vec<String>,
    pub order_anomalies: Vec<OrderAnomaly>,
    pub presence: PresenceCounts,
    pub presence_detail: Vec<PresenceEntry>,
    pub auto_enabled_ids: Vec<ModId>,
}

impl ProbeReport {
    pub fn new(
        generated_at: String,
        session: AnalysisSession,
        outcome: ProbeOutcome,
        presence: PresenceReport,
        auto_enabled_ids: Vec<ModId>,
    ) -> Self {
        Self {
            generated_at,
            files_considered: outcome.raw_order.len(),
            files_loaded: session.files_loaded.saturating_sub(outcome.stub_files),
            stub_files: outcome.stub_files,
            callbacks_run: session.callbacks_run,
            missing_globals: session.missing_globals,
            missing_by_file: session.missing_by_file,
            overrides: session.overrides,
            load_errors: session.load_errors,
            timeouts: session.timeouts,
            callback_errors: session.callback_errors,
            raw_order: outcome.raw_order,
            safe_order: outcome.safe_order,
            order_anomalies: outcome.anomalies,
            presence: presence.counts(),
            presence_detail: presence.entries,
            auto_enabled_ids,
        }
    }

    pub fn fault_count(&self) -> usize {
        self.load_errors.len() + self.timeouts.len() + self.callback_errors.len()
    }

    /// Plain-text rendition for people reading the report file.
    pub fn render_text(&self) -> String {
        let mut out = format!("modweave probe report ({})\n", self.generated_at);
        out.push_str(&format!(
            "files: {} considered, {} loaded, {} stub; callbacks run: {}\n",
            self.files_considered, self.files_loaded, self.stub_files, self.callbacks_run
        ));
        out.push_str(&format!(
            "presence: {} satisfied, {} present but disabled, {} missing on disk\n",
            self.presence.satisfied_enabled,
            self.presence.present_but_not_enabled,
            self.presence.missing_on_disk
        ));

        let mut missing: Vec<(&String, &u64)> = self.missing_globals.iter().collect();
        missing.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        section(
            &mut out,
            "missing globals",
            missing.iter().map(|(symbol, count)| format!("{symbol}: {count}")),
        );
        section(
            &mut out,
            "overrides",
            self.overrides
                .iter()
                .map(|o| format!("{}: {} -> {}", o.symbol, o.previous_file, o.file)),
        );
        section(
            &mut out,
            "load errors",
            self.load_errors.iter().map(|f| format!("{}: {}", f.file, f.message)),
        );
        section(&mut out, "timeouts", self.timeouts.iter().map(|f| f.file.clone()));
        section(
            &mut out,
            "callback errors",
            self.callback_errors
                .iter()
                .map(|f| format!("{} ({}): {}", f.event, f.file, f.message)),
        );
        section(
            &mut out,
            "order anomalies",
            self.order_anomalies
                .iter()
                .map(|a| format!("{}: {} -> {}", a.file, a.raw_index, a.safe_index)),
        );
        section(
            &mut out,
            "auto-enabled",
            self.auto_enabled_ids.iter().map(ToString::to_string),
        );
        out
    }
}

/// Append a titled section listing at most [`TEXT_SECTION_LIMIT`] lines.
/// Empty sections are left out.
fn section(out: &mut String, title: &str, lines: impl ExactSizeIterator<Item = String>) {
    let len = lines.len();
    if len == 0 {
        return;
    }
    out.push_str(&format!("\n{title} ({len}):\n"));
    for line in lines.take(TEXT_SECTION_LIMIT) {
        out.push_str("  ");
        out.push_str(&line);
        out.push('\n');
    }
    if len > TEXT_SECTION_LIMIT {
        out.push_str(&format!("  ... {} more\n", len - TEXT_SECTION_LIMIT));
    }
}
