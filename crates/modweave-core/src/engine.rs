use crate::conflicts::{map_cell_conflicts, tiledef_conflicts};
use crate::merge::{apply_explicit_selection, merge_import, ImportOutcome};
use crate::presence::{autofix, classify_presence};
use crate::report::ProbeReport;
use crate::resolve::{apply_order, resolve, Resolution};
use crate::roles::Role;
use crate::scan::{enrich_registry, scan_registry, Scans};
use crate::CoreError;
use modweave_probe::{apply_seed, discover_candidates, load_seed, AnalysisSession, Probe};
use modweave_schema::{
    parse_import_feed, ModId, ProbeSettings, Registry, ResolverHints, RunStatus, RunSummary,
    WorkshopId,
};
use modweave_store::{
    clear_import_feed, read_import_feed, save_registry, write_atomic, write_json, write_summary,
    ContentLayout, RegistryLock, RunLayout, StoreError,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Settings of the optional runtime probe stage.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub settings: ProbeSettings,
    pub stub_root: Option<PathBuf>,
    /// Prior JSON probe report whose safe order seeds this run.
    pub seed: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
    pub autofix: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            settings: ProbeSettings::default(),
            stub_root: None,
            seed: None,
            report: None,
            report_json: None,
            autofix: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Persist the registry, the cleared feed and the summary.
    pub write: bool,
    pub content_root: Option<PathBuf>,
    pub probe: Option<ProbeOptions>,
}

/// Result of one pipeline run. The registry is the mutated in-memory copy,
/// whether or not it was written.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub resolution: Resolution,
    pub probe: Option<ProbeReport>,
    pub registry: Registry,
}

/// Runs the import → scan → resolve → probe pipeline over one registry.
pub struct Engine {
    layout: RunLayout,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn write_failed(path: &Path) -> impl FnOnce(StoreError) -> CoreError + '_ {
    move |source| CoreError::Write {
        path: path.display().to_string(),
        source,
    }
}

impl Engine {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }

    fn validate(options: &RunOptions) -> Result<Option<ContentLayout>, CoreError> {
        if options.probe.is_some() && options.content_root.is_none() {
            return Err(CoreError::InvalidInvocation(
                "the probe needs a content root".to_owned(),
            ));
        }
        match &options.content_root {
            Some(root) if !root.is_dir() => Err(CoreError::InvalidInvocation(format!(
                "content root {} is not a directory",
                root.display()
            ))),
            Some(root) => Ok(Some(ContentLayout::new(root))),
            None => Ok(None),
        }
    }

    fn load_registry(&self) -> Result<Registry, CoreError> {
        let path = self.layout.registry();
        if !path.exists() {
            return Err(CoreError::RegistryNotFound(path.display().to_string()));
        }
        Ok(Registry::load(path)?)
    }

    /// Run the whole pipeline. Nothing touches disk unless `options.write` is
    /// set, except probe reports whose paths were given.
    #[allow(clippy::too_many_lines)]
    pub fn run(&self, options: &RunOptions) -> Result<RunOutcome, CoreError> {
        let content = Self::validate(options)?;

        // Held until the outcome is returned so the read-modify-write of the
        // registry cannot interleave with another run.
        let _lock = if options.write {
            Some(RegistryLock::acquire(&self.layout.lock_file())?)
        } else {
            None
        };

        info!("loading registry {}", self.layout.registry().display());
        let mut registry = self.load_registry()?;
        let feed_path = self.layout.import_feed();
        let feed = read_import_feed(feed_path).map_err(|source| CoreError::ImportFeed {
            path: feed_path.display().to_string(),
            source,
        })?;

        let blocks = parse_import_feed(&feed);
        let import = merge_import(&mut registry, &blocks);
        let fresh = import.fresh_units(&registry);
        apply_explicit_selection(&mut registry, &import.selection);

        let scans = match &content {
            Some(layout) => {
                let scans = scan_registry(layout, &registry);
                let changed = enrich_registry(&mut registry, &scans, &fresh);
                debug!("scan enrichment touched {changed} records");
                scans
            }
            None => Scans::new(),
        };

        let mut resolution = resolve(&registry, &scans);
        apply_order(&mut registry, &resolution);

        let mut auto_enabled = Vec::new();
        let probe = match (&options.probe, &content) {
            (Some(probe_options), Some(layout)) => {
                let (report, enabled) =
                    Self::probe_stage(probe_options, layout, &mut registry, &scans)?;
                if !enabled.is_empty() {
                    info!("re-resolving after auto-enabling {} mods", enabled.len());
                    resolution = resolve(&registry, &scans);
                    apply_order(&mut registry, &resolution);
                }
                auto_enabled = enabled;
                Some(report)
            }
            _ => None,
        };

        let summary = build_summary(
            &registry,
            &scans,
            &import,
            &resolution,
            auto_enabled,
            now_rfc3339(),
        );
        match summary.status {
            RunStatus::Error => warn!("{}", summary.message),
            _ => info!("{}", summary.message),
        }

        if options.write {
            let registry_path = self.layout.registry();
            save_registry(registry_path, &registry).map_err(write_failed(registry_path))?;
            clear_import_feed(feed_path).map_err(write_failed(feed_path))?;
            let summary_path = self.layout.summary();
            write_summary(summary_path, &summary).map_err(write_failed(summary_path))?;
            info!("wrote {}", registry_path.display());
        }

        Ok(RunOutcome {
            summary,
            resolution,
            probe,
            registry,
        })
    }

    /// Probe the enabled content, classify requirement presence and, when
    /// allowed, auto-enable what is on disk but disabled.
    fn probe_stage(
        options: &ProbeOptions,
        layout: &ContentLayout,
        registry: &mut Registry,
        scans: &Scans,
    ) -> Result<(ProbeReport, Vec<ModId>), CoreError> {
        let settings = &options.settings;
        let mut files =
            discover_candidates(layout, registry, settings.max_units, settings.max_files);
        if let Some(seed) = &options.seed {
            let prior = load_seed(seed)?;
            apply_seed(&mut files, &prior);
        }

        let mut probe = Probe::new(settings.clone());
        if let Some(stub_root) = &options.stub_root {
            probe = probe.with_stub_root(stub_root);
        }
        let mut session = AnalysisSession::new();
        let outcome = probe.run(&mut session, &files)?;

        let now = now_rfc3339();
        let presence = classify_presence(registry, scans);
        let enabled = if options.autofix {
            autofix(registry, &presence, &now)
        } else {
            Vec::new()
        };

        let report = ProbeReport::new(now, session, outcome, presence, enabled.clone());
        if let Some(path) = &options.report {
            write_atomic(path, report.render_text().as_bytes()).map_err(write_failed(path))?;
        }
        if let Some(path) = &options.report_json {
            write_json(path, &report).map_err(write_failed(path))?;
        }
        Ok((report, enabled))
    }
}

/// blake3 over the ordered ids, one per line.
pub fn order_digest(order: &[ModId]) -> String {
    let mut hasher = blake3::Hasher::new();
    for id in order {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

fn untracked_units(registry: &Registry, scans: &Scans) -> Vec<WorkshopId> {
    registry
        .mods
        .iter()
        .filter(|e| e.mods.is_empty())
        .filter(|e| scans.get(&e.workshop_id).is_none_or(|s| !s.exists))
        .map(|e| e.workshop_id.clone())
        .collect()
}

fn ids_with_role(resolution: &Resolution, role: Role) -> Vec<ModId> {
    resolution
        .order
        .iter()
        .filter(|id| resolution.roles.get(*id).is_some_and(|r| r.role == role))
        .cloned()
        .collect()
}

fn status_message(status: RunStatus, resolution: &Resolution, hints: &ResolverHints) -> String {
    let mut parts = vec![format!("resolved {} mods", resolution.order.len())];
    if resolution.has_cycles() {
        parts.push(format!("{} in cycles", resolution.cycle_members.len()));
    }
    if !resolution.missing.is_empty() {
        parts.push(format!("{} missing requirements", resolution.missing.len()));
    }
    if !hints.duplicate_providers.is_empty() {
        parts.push(format!("{} duplicate providers", hints.duplicate_providers.len()));
    }
    if !hints.untracked_units.is_empty() {
        parts.push(format!("{} untracked workshop items", hints.untracked_units.len()));
    }
    if !hints.auto_enabled_ids.is_empty() {
        parts.push(format!("{} auto-enabled", hints.auto_enabled_ids.len()));
    }
    format!("{status}: {}", parts.join(", "))
}

pub(crate) fn build_summary(
    registry: &Registry,
    scans: &Scans,
    import: &ImportOutcome,
    resolution: &Resolution,
    auto_enabled_ids: Vec<ModId>,
    generated_at: String,
) -> RunSummary {
    let hints = ResolverHints {
        duplicate_providers: resolution.duplicates.clone(),
        library_ids: ids_with_role(resolution, Role::Library),
        resource_provider_ids: ids_with_role(resolution, Role::ResourceProvider),
        tiledef_conflicts: tiledef_conflicts(registry, scans),
        map_cell_conflicts: map_cell_conflicts(registry, scans),
        untracked_units: untracked_units(registry, scans),
        auto_enabled_ids,
    };

    let status = if resolution.has_cycles() {
        RunStatus::Error
    } else if !resolution.missing.is_empty()
        || !hints.duplicate_providers.is_empty()
        || !hints.untracked_units.is_empty()
    {
        RunStatus::Warn
    } else {
        RunStatus::Ok
    };

    RunSummary {
        status,
        message: status_message(status, resolution, &hints),
        generated_at,
        imported_workshop_ids: import.imported_workshop_ids.clone(),
        imported_mod_ids: import.imported_mod_ids.clone(),
        missing_requirements: resolution.missing.keys().cloned().collect(),
        cycle_members: resolution.cycle_members.clone(),
        enabled_workshop_ids: registry.enabled_units(),
        enabled_mod_ids: resolution.order.clone(),
        order_digest: order_digest(&resolution.order),
        hints,
    }
}
