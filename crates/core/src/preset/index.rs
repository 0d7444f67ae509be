use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Result, VisualizerError};

/// Identifies a single preset file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PresetKey {
    pub component: String,
    pub version: u32,
    pub name: String,
}

impl PresetKey {
    pub fn new(component: impl Into<String>, version: u32, name: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            version,
            name: name.into(),
        }
    }

    /// Rejects keys whose component or preset name could escape the version
    /// directory they are joined onto.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.component)?;
        validate_name(&self.name)
    }

    /// `root/component/version/name`
    pub fn path_in(&self, root: &Path) -> PathBuf {
        version_dir(root, &self.component, self.version).join(&self.name)
    }
}

impl std::fmt::Display for PresetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.component, self.name)
    }
}

/// Preset and component names may only contain letters, digits and spaces.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.trim().is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(VisualizerError::InvalidName(name.to_string()))
    }
}

pub(crate) fn version_dir(root: &Path, component: &str, version: u32) -> PathBuf {
    root.join(component).join(version.to_string())
}

/// Snapshot of the presets found on disk at the last scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetIndex {
    presets: BTreeMap<String, Vec<(u32, String)>>,
}

impl PresetIndex {
    pub fn get(&self, component: &str) -> Option<&[(u32, String)]> {
        self.presets.get(component).map(Vec::as_slice)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &PresetKey) -> bool {
        self.get(&key.component)
            .map(|presets| {
                presets
                    .iter()
                    .any(|(version, name)| *version == key.version && *name == key.name)
            })
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.presets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Every preset, grouped by component and ordered by version then name.
    pub fn iter(&self) -> impl Iterator<Item = PresetKey> + '_ {
        self.presets.iter().flat_map(|(component, presets)| {
            presets
                .iter()
                .map(move |(version, name)| PresetKey::new(component.clone(), *version, name.clone()))
        })
    }
}

#[cfg(test)]
impl<const N: usize> From<[(&str, Vec<(u32, &str)>); N]> for PresetIndex {
    fn from(entries: [(&str, Vec<(u32, &str)>); N]) -> Self {
        let presets = entries
            .into_iter()
            .map(|(component, presets)| {
                let presets = presets
                    .into_iter()
                    .map(|(version, name)| (version, name.to_string()))
                    .collect();
                (component.to_string(), presets)
            })
            .collect();
        Self { presets }
    }
}

/// Walks `root` and indexes every preset it finds.
///
/// A directory without subdirectories is a version directory; its parent names
/// the component and its files are presets. Version directories whose name is
/// not an integer are skipped. When `known` is given, other components are
/// ignored. A missing root yields an empty index.
pub fn scan(root: &Path, known: Option<&BTreeSet<String>>) -> Result<PresetIndex> {
    let mut presets: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
    if !root.is_dir() {
        tracing::debug!(?root, "preset directory does not exist");
        return Ok(PresetIndex { presets });
    }

    let mut visited = BTreeSet::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        // Symlinked directories are followed, but each real directory is
        // walked once.
        if let Ok(real) = fs::canonicalize(&dir) {
            if !visited.insert(real) {
                continue;
            }
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if dir == root => return Err(err.into()),
            Err(err) => {
                tracing::warn!(?dir, %err, "skipping unreadable preset directory");
                continue;
            }
        };

        let mut subdirs = Vec::new();
        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(?dir, %err, "skipping unreadable preset entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
            } else if path.is_file() {
                files.push(entry.file_name());
            }
        }

        if !subdirs.is_empty() {
            pending.extend(subdirs);
            continue;
        }

        let Some((component, version)) = parse_version_dir(&dir) else {
            continue;
        };
        if known.map(|known| !known.contains(&component)).unwrap_or(false) {
            continue;
        }

        let entry = presets.entry(component).or_default();
        entry.extend(
            files
                .into_iter()
                .filter_map(|name| name.into_string().ok())
                .map(|name| (version, name)),
        );
    }

    presets.retain(|_, list| !list.is_empty());
    for list in presets.values_mut() {
        list.sort();
    }

    let index = PresetIndex { presets };
    tracing::debug!(?root, presets = index.len(), "scanned presets");
    Ok(index)
}

fn parse_version_dir(dir: &Path) -> Option<(String, u32)> {
    let version = dir.file_name()?.to_str()?.parse().ok()?;
    let component = dir.parent()?.file_name()?.to_str()?.to_string();
    Some((component, version))
}
