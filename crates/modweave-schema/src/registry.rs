use crate::types::{ModId, WorkshopId};
use crate::{read_lossy, SchemaError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// The persisted mod registry: the source of truth for which workshop items
/// and mods are known, enabled, and in which order they load.
///
/// Keys this model does not know about are carried through `extra` so a
/// load/save cycle never drops data written by other tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Registry {
    #[serde(default)]
    pub mods: Vec<RegistryEntry>,
    #[serde(default, skip_serializing_if = "Overrides::is_empty")]
    pub overrides: Overrides,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    /// Requirement rewrites applied before dependency edges are resolved.
    #[serde(default)]
    pub require_aliases: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.require_aliases.is_empty() && self.extra.is_empty()
    }
}

/// One distribution unit (workshop item) and the packages it bundles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    #[serde(deserialize_with = "workshop_id_from_any")]
    pub workshop_id: WorkshopId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mods: Vec<PackageRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One logical mod inside a workshop item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: ModId,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub version_min: String,
    #[serde(default)]
    pub pzversion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_automatically: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_automatically_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_automatically_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Older registries store workshop ids as JSON numbers.
fn workshop_id_from_any<'de, D>(deserializer: D) -> Result<WorkshopId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => WorkshopId::new(s.trim()),
        Raw::Number(n) => WorkshopId::new(n.to_string()),
    })
}

impl PackageRecord {
    /// A disabled record with nothing but an id, used when a package is known
    /// by name before its descriptor has been scanned.
    pub fn placeholder(id: impl Into<ModId>) -> Self {
        Self {
            id: id.into(),
            enabled: false,
            name: String::new(),
            requires: Vec::new(),
            version_min: String::new(),
            pzversion: String::new(),
            priority: None,
            added_automatically: None,
            added_automatically_reason: None,
            added_automatically_at: None,
            extra: Map::new(),
        }
    }

    /// Enable the record and stamp it as enabled by the tool rather than the user.
    pub fn mark_added_automatically(&mut self, reason: &str, at: &str) {
        self.enabled = true;
        self.added_automatically = Some(true);
        self.added_automatically_reason = Some(reason.to_owned());
        self.added_automatically_at = Some(at.to_owned());
    }
}

impl RegistryEntry {
    pub fn new(workshop_id: impl Into<WorkshopId>) -> Self {
        Self {
            workshop_id: workshop_id.into(),
            name: String::new(),
            mods: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn package(&self, id: &str) -> Option<&PackageRecord> {
        self.mods.iter().find(|p| p.id == *id)
    }

    pub fn package_mut(&mut self, id: &str) -> Option<&mut PackageRecord> {
        self.mods.iter_mut().find(|p| p.id == *id)
    }

    /// Return the record for `id`, appending a disabled placeholder if absent.
    pub fn ensure_package(&mut self, id: &str) -> &mut PackageRecord {
        let idx = match self.mods.iter().position(|p| p.id == *id) {
            Some(idx) => idx,
            None => {
                self.mods.push(PackageRecord::placeholder(id));
                self.mods.len() - 1
            }
        };
        &mut self.mods[idx]
    }

    pub fn has_enabled(&self) -> bool {
        self.mods.iter().any(|p| p.enabled)
    }
}

impl Registry {
    pub fn from_json_str(input: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let content = read_lossy(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Pretty JSON with a trailing newline, the on-disk form of the registry.
    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    pub fn entry(&self, workshop_id: &str) -> Option<&RegistryEntry> {
        self.mods.iter().find(|e| e.workshop_id == *workshop_id)
    }

    pub fn entry_mut(&mut self, workshop_id: &str) -> Option<&mut RegistryEntry> {
        self.mods.iter_mut().find(|e| e.workshop_id == *workshop_id)
    }

    /// Return the entry for `workshop_id`, appending an empty one if absent.
    /// The bool is `true` when the entry was created by this call.
    pub fn ensure_entry(&mut self, workshop_id: &str) -> (&mut RegistryEntry, bool) {
        match self.mods.iter().position(|e| e.workshop_id == *workshop_id) {
            Some(idx) => (&mut self.mods[idx], false),
            None => {
                self.mods.push(RegistryEntry::new(workshop_id));
                let last = self.mods.len() - 1;
                (&mut self.mods[last], true)
            }
        }
    }

    /// Apply the alias map to a requirement token. Exactly one hop: the
    /// target of an alias is never looked up again.
    pub fn resolve_alias<'a>(&'a self, token: &'a str) -> &'a str {
        self.overrides
            .require_aliases
            .get(token)
            .map_or(token, String::as_str)
    }

    /// Every record with the unit it belongs to, in registry order.
    pub fn records(&self) -> impl Iterator<Item = (&WorkshopId, &PackageRecord)> {
        self.mods
            .iter()
            .flat_map(|e| e.mods.iter().map(move |p| (&e.workshop_id, p)))
    }

    /// Units that have at least one enabled package, in registry order.
    pub fn enabled_units(&self) -> Vec<WorkshopId> {
        self.mods
            .iter()
            .filter(|e| e.has_enabled())
            .map(|e| e.workshop_id.clone())
            .collect()
    }
}
