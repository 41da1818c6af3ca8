use super::{
    colorize_status, json_pretty, spin_fail, spin_ok, spinner, EXIT_CYCLES, EXIT_SUCCESS,
};
use modweave_core::{Engine, ProbeOptions, ProbeReport, Resolution, RunOptions, RunOutcome};
use modweave_schema::{load_config, ModId, RunConfig, RunStatus, RunSummary, WorkshopId};
use modweave_store::RunLayout;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, clap::Args)]
pub struct ResolveArgs {
    /// Path to the registry JSON file.
    #[arg(long)]
    pub registry: PathBuf,

    /// Path to the import feed text file.
    #[arg(long)]
    pub import_feed: PathBuf,

    /// Directory holding one subdirectory per workshop item.
    #[arg(long)]
    pub content_root: Option<PathBuf>,

    /// Persist the registry, clear the import feed and write the summary.
    #[arg(long, default_value_t = false)]
    pub write: bool,

    /// Where to write the last-run summary.
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Optional TOML run configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Execute enabled mod scripts in the Lua sandbox.
    #[arg(long, default_value_t = false)]
    pub probe: bool,

    /// Lua files loaded before any mod script.
    #[arg(long)]
    pub probe_stubs: Option<PathBuf>,

    #[arg(long)]
    pub probe_max_units: Option<usize>,

    #[arg(long)]
    pub probe_max_files: Option<usize>,

    /// Write the human-readable probe report here. Written even without
    /// --write.
    #[arg(long)]
    pub probe_report: Option<PathBuf>,

    /// Write the JSON probe report here. Written even without --write.
    #[arg(long)]
    pub probe_report_json: Option<PathBuf>,

    /// Prior JSON probe report whose safe order seeds this run.
    #[arg(long)]
    pub probe_seed: Option<PathBuf>,

    /// Do not enable disabled dependencies found on disk.
    #[arg(long, default_value_t = false)]
    pub no_autofix: bool,
}

impl ResolveArgs {
    fn has_probe_flags(&self) -> bool {
        self.probe_stubs.is_some()
            || self.probe_max_units.is_some()
            || self.probe_max_files.is_some()
            || self.probe_report.is_some()
            || self.probe_report_json.is_some()
            || self.probe_seed.is_some()
            || self.no_autofix
    }

    /// Flags override the config file, which overrides the defaults.
    fn run_options(&self, config: &RunConfig) -> RunOptions {
        let probe = self.probe.then(|| {
            let mut settings = config.probe.clone();
            if self.probe_max_units.is_some() {
                settings.max_units = self.probe_max_units;
            }
            if self.probe_max_files.is_some() {
                settings.max_files = self.probe_max_files;
            }
            ProbeOptions {
                settings,
                stub_root: self.probe_stubs.clone(),
                seed: self.probe_seed.clone(),
                report: self.probe_report.clone(),
                report_json: self.probe_report_json.clone(),
                autofix: !self.no_autofix,
            }
        });
        RunOptions {
            write: self.write,
            content_root: self.content_root.clone(),
            probe,
        }
    }

    fn layout(&self, config: &RunConfig) -> RunLayout {
        let layout = RunLayout::new(&self.registry, &self.import_feed);
        match self.summary.as_ref().or(config.output.summary.as_ref()) {
            Some(summary) => layout.with_summary(summary),
            None => layout,
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    summary: &'a RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<&'a ProbeReport>,
}

pub fn run(args: &ResolveArgs, json: bool) -> Result<u8, String> {
    let config = match &args.config {
        Some(path) => load_config(path).map_err(|e| e.to_string())?,
        None => RunConfig::default(),
    };
    if !args.probe && args.has_probe_flags() {
        warn!("probe options are ignored without --probe");
    }

    let engine = Engine::new(args.layout(&config));
    let options = args.run_options(&config);

    let pb = (args.probe && !json).then(|| spinner("probing mod scripts..."));
    let outcome = match engine.run(&options) {
        Ok(outcome) => {
            if let Some(pb) = &pb {
                spin_ok(pb, "probe finished");
            }
            outcome
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "run failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        let output = JsonOutput {
            summary: &outcome.summary,
            probe: outcome.probe.as_ref(),
        };
        println!("{}", json_pretty(&output)?);
    } else {
        print_human(&outcome, args);
    }

    Ok(if outcome.summary.status == RunStatus::Error {
        EXIT_CYCLES
    } else {
        EXIT_SUCCESS
    })
}

fn print_human(outcome: &RunOutcome, args: &ResolveArgs) {
    let summary = &outcome.summary;
    let resolution = &outcome.resolution;

    println!("status: {}", colorize_status(summary.status));
    println!("{}", summary.message);

    if !resolution.order.is_empty() {
        println!("\norder:");
        for (i, id) in resolution.order.iter().enumerate() {
            let unit = resolution.providers.get(id).map_or("", WorkshopId::as_str);
            println!("  {:>4}. {id:<32} {unit}", i + 1);
        }
    }
    print_problems(summary, resolution);

    if let Some(report) = &outcome.probe {
        println!(
            "\nprobe: {}/{} files loaded, {} faults, {} missing globals, {} order anomalies",
            report.files_loaded,
            report.files_considered,
            report.fault_count(),
            report.missing_globals.len(),
            report.order_anomalies.len()
        );
    }

    if args.write {
        println!("\nwrote {}", args.registry.display());
    }
}

fn print_problems(summary: &RunSummary, resolution: &Resolution) {
    if !resolution.missing.is_empty() {
        println!("\nmissing requirements:");
        for (token, requesters) in &resolution.missing {
            let by: Vec<&str> = requesters.iter().map(ModId::as_str).collect();
            println!("  {token} (required by {})", by.join(", "));
        }
    }
    if !summary.cycle_members.is_empty() {
        let members: Vec<&str> = summary.cycle_members.iter().map(ModId::as_str).collect();
        println!("\ncycle: {}", members.join(", "));
    }
    let hints = &summary.hints;
    for dup in &hints.duplicate_providers {
        println!(
            "duplicate: {} in {} ignored, kept from {}",
            dup.id, dup.duplicate_unit, dup.kept_unit
        );
    }
    for conflict in &hints.tiledef_conflicts {
        let units: Vec<&str> = conflict.units.iter().map(WorkshopId::as_str).collect();
        println!("tiledef {} claimed by {}", conflict.file_number, units.join(", "));
    }
    for conflict in &hints.map_cell_conflicts {
        let units: Vec<&str> = conflict.units.iter().map(WorkshopId::as_str).collect();
        println!("map cell {}_{} provided by {}", conflict.x, conflict.y, units.join(", "));
    }
    for unit in &hints.untracked_units {
        println!("untracked workshop item: {unit}");
    }
    for id in &hints.auto_enabled_ids {
        println!("auto-enabled: {id}");
    }
}
