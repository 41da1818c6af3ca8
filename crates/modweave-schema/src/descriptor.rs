use crate::types::ModId;
use crate::{read_lossy, SchemaError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A tile pack declaration from a `tiledef = <pack> <fileNumber>` line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileDef {
    pub pack: String,
    pub file_number: u32,
}

/// Metadata parsed from one `mod.info` package descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModDescriptor {
    pub id: ModId,
    pub name: String,
    pub requires: Vec<String>,
    pub version_min: String,
    pub pz_version: String,
    pub tiledefs: Vec<TileDef>,
}

/// Parse `key = value` descriptor lines. Keys are case-insensitive; a later
/// occurrence of a scalar key replaces an earlier one, `tiledef` accumulates.
/// Returns `None` when the descriptor declares no `id`.
pub fn parse_descriptor_str(input: &str) -> Option<ModDescriptor> {
    let mut id = String::new();
    let mut name = String::new();
    let mut require = String::new();
    let mut version_min = String::new();
    let mut pz_version = String::new();
    let mut tiledefs = Vec::new();

    for line in input.lines() {
        let Some((key, value)) = split_key_value(line) else {
            continue;
        };
        match key.as_str() {
            "id" => value.clone_into(&mut id),
            "name" => value.clone_into(&mut name),
            "require" => value.clone_into(&mut require),
            "versionmin" => value.clone_into(&mut version_min),
            "pzversion" => value.clone_into(&mut pz_version),
            "tiledef" => {
                if let Some(def) = parse_tiledef(value) {
                    tiledefs.push(def);
                }
            }
            _ => {}
        }
    }

    if id.is_empty() {
        return None;
    }
    Some(ModDescriptor {
        id: ModId::new(id),
        name,
        requires: split_requires(&require),
        version_min,
        pz_version,
        tiledefs,
    })
}

pub fn parse_descriptor_file(path: impl AsRef<Path>) -> Result<Option<ModDescriptor>, SchemaError> {
    let content = read_lossy(path.as_ref())?;
    Ok(parse_descriptor_str(&content))
}

fn split_key_value(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty()
        || value.is_empty()
        || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return None;
    }
    Some((key.to_ascii_lowercase(), value))
}

fn parse_tiledef(value: &str) -> Option<TileDef> {
    let mut parts = value.split_whitespace();
    let pack = parts.next()?;
    let file_number = parts.next()?.parse().ok()?;
    Some(TileDef {
        pack: pack.to_owned(),
        file_number,
    })
}

/// Split a `require=` value into tokens, first occurrence wins. Build 42
/// descriptors prefix each id with a backslash; it is not part of the id.
fn split_requires(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in raw.split(',') {
        let token = token.trim().trim_start_matches('\\').trim();
        if !token.is_empty() && !out.iter().any(|t| t == token) {
            out.push(token.to_owned());
        }
    }
    out
}
