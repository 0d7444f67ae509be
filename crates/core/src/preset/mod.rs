//! File-backed preset management.
//!
//! Presets live at `root/<component>/<version>/<name>`. Every structural change
//! goes through a [`Confirm`] gate before touching an existing file and is
//! followed by a full re-scan of the directory tree.

mod index;

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

pub use index::{scan, validate_name, PresetIndex, PresetKey};

use crate::{
    component::{Component, PresetValues},
    Result, VisualizerError,
};

/// Filter value that matches every component.
pub const ALL_COMPONENTS: &str = "*";

/// Yes/no decision point consulted before destructive operations.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Document stored in each preset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetFile {
    pub component: String,
    pub version: u32,
    pub preset: String,
    #[serde(default)]
    pub values: PresetValues,
}

impl PresetFile {
    pub fn key(&self) -> PresetKey {
        PresetKey::new(self.component.clone(), self.version, self.preset.clone())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Outcome of copying a preset across the store boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Completed(PresetKey),
    /// The user kept the existing preset.
    Declined,
    Failed(String),
}

impl Transfer {
    pub fn succeeded(&self) -> bool {
        matches!(self, Transfer::Completed(_))
    }
}

/// Result of a rename. The move itself succeeded; `reload_failures` lists
/// components that could not pick up the renamed preset and were cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub key: PresetKey,
    pub reload_failures: Vec<String>,
}

#[derive(Debug)]
pub struct PresetStore {
    root: PathBuf,
    known: Option<BTreeSet<String>>,
    index: PresetIndex,
}

impl PresetStore {
    /// Opens the store rooted at `root` and indexes its contents.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            root: root.into(),
            known: None,
            index: PresetIndex::default(),
        };
        store.rescan()?;
        Ok(store)
    }

    /// Restricts the index to the given component names.
    pub fn with_known_components<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known = Some(names.into_iter().map(Into::into).collect());
        self.rescan()?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &PresetIndex {
        &self.index
    }

    pub fn path_of(&self, key: &PresetKey) -> PathBuf {
        key.path_in(&self.root)
    }

    pub fn rescan(&mut self) -> Result<()> {
        self.index = scan(&self.root, self.known.as_ref())?;
        Ok(())
    }

    /// Re-scan after a change that already reached the disk. A failure here
    /// leaves the previous index in place rather than undoing the outcome.
    fn refresh(&mut self) {
        if let Err(err) = self.rescan() {
            tracing::warn!(root = ?self.root, %err, "preset re-scan failed");
        }
    }

    /// Presets of `filter` (a component name or [`ALL_COMPONENTS`]) whose
    /// name contains `search`.
    pub fn list(&self, filter: &str, search: &str) -> Vec<PresetKey> {
        self.index
            .iter()
            .filter(|key| filter == ALL_COMPONENTS || key.component == filter)
            .filter(|key| search.is_empty() || key.name.contains(search))
            .collect()
    }

    /// Choices for the component filter, starting with [`ALL_COMPONENTS`].
    pub fn filter_names(&self) -> Vec<String> {
        std::iter::once(ALL_COMPONENTS)
            .chain(self.index.components())
            .map(str::to_string)
            .collect()
    }

    /// Distinct preset names under `filter`, for search completion.
    pub fn preset_names(&self, filter: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for key in self.list(filter, "") {
            if !names.contains(&key.name) {
                names.push(key.name);
            }
        }
        names
    }

    /// Writes a preset, asking before replacing an existing one.
    pub fn save(
        &mut self,
        component: &str,
        version: u32,
        name: &str,
        values: &PresetValues,
        confirm: &mut dyn Confirm,
    ) -> Result<PresetKey> {
        let key = PresetKey::new(component, version, name);
        key.validate()?;
        let path = self.path_of(&key);
        self.check_overwrite(&path, &key.name, confirm)?;

        let file = PresetFile {
            component: key.component.clone(),
            version,
            preset: key.name.clone(),
            values: values.clone(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&file)?)?;
        tracing::info!(preset = %key, "saved preset");

        self.refresh();
        Ok(key)
    }

    /// Saves the live parameters of `component` under `name` and makes that
    /// preset its active one.
    pub fn save_component(
        &mut self,
        component: &dyn Component,
        name: &str,
        confirm: &mut dyn Confirm,
    ) -> Result<PresetKey> {
        PresetKey::new(component.name(), component.version(), name).validate()?;
        let values = component.save_preset();
        let key = self.save(component.name(), component.version(), name, &values, confirm)?;
        component.load_preset(name, &values)?;
        Ok(key)
    }

    /// Reads a preset from disk.
    pub fn load(&self, key: &PresetKey) -> Result<PresetFile> {
        key.validate()?;
        let path = self.path_of(key);
        if !path.is_file() {
            return Err(not_found(key));
        }
        PresetFile::read(&path)
    }

    /// Applies the preset `name` for this component's type and version.
    pub fn open_preset(&self, component: &dyn Component, name: &str) -> Result<()> {
        let key = PresetKey::new(component.name(), component.version(), name);
        let file = self.load(&key)?;
        component.load_preset(name, &file.values)
    }

    /// Moves a preset to `new_name`; components showing the old preset are
    /// reloaded under the new one. A component that fails to reload is
    /// cleared and reported in [`Renamed::reload_failures`].
    pub fn rename(
        &mut self,
        key: &PresetKey,
        new_name: &str,
        components: &[Arc<dyn Component>],
        confirm: &mut dyn Confirm,
    ) -> Result<Renamed> {
        key.validate()?;
        validate_name(new_name)?;
        let renamed = PresetKey::new(key.component.clone(), key.version, new_name);
        if renamed == *key {
            return Ok(Renamed {
                key: renamed,
                reload_failures: Vec::new(),
            });
        }

        let old_path = self.path_of(key);
        if !old_path.is_file() {
            return Err(not_found(key));
        }
        let new_path = self.path_of(&renamed);
        self.check_overwrite(&new_path, new_name, confirm)?;
        if new_path.exists() {
            fs::remove_file(&new_path)?;
        }
        fs::rename(&old_path, &new_path)?;
        tracing::info!(from = %key, to = %renamed, "renamed preset");
        self.refresh();

        let loaded: Vec<&Arc<dyn Component>> = using_preset(components, key).collect();
        let mut reload_failures = Vec::new();
        if !loaded.is_empty() {
            let file = PresetFile::read(&new_path);
            for component in loaded {
                let reloaded = match &file {
                    Ok(file) => component.load_preset(new_name, &file.values),
                    Err(err) => Err(VisualizerError::msg(err.to_string())),
                };
                if let Err(err) = reloaded {
                    tracing::warn!(component = component.name(), %err, "could not reload renamed preset");
                    component.clear_preset();
                    reload_failures.push(format!("{}: {err}", component.name()));
                }
            }
        }

        Ok(Renamed {
            key: renamed,
            reload_failures,
        })
    }

    /// Renames whatever preset `component` currently has loaded.
    pub fn rename_active(
        &mut self,
        component: &dyn Component,
        new_name: &str,
        components: &[Arc<dyn Component>],
        confirm: &mut dyn Confirm,
    ) -> Result<Renamed> {
        let current = component
            .current_preset()
            .ok_or_else(|| VisualizerError::msg(format!("`{}` has no preset loaded", component.name())))?;
        let key = PresetKey::new(component.name(), component.version(), current);
        if !self.index.contains(&key) {
            return Err(not_found(&key));
        }
        self.rename(&key, new_name, components, confirm)
    }

    /// Removes a preset after confirmation and clears it from any component
    /// that has it loaded.
    pub fn delete(
        &mut self,
        key: &PresetKey,
        components: &[Arc<dyn Component>],
        confirm: &mut dyn Confirm,
    ) -> Result<()> {
        key.validate()?;
        if !confirm.confirm(&format!("Really delete {}?", key.name)) {
            return Err(VisualizerError::DeleteDeclined(key.name.clone()));
        }

        fs::remove_file(self.path_of(key))?;
        tracing::info!(preset = %key, "deleted preset");
        self.refresh();

        for component in using_preset(components, key) {
            component.clear_preset();
        }
        Ok(())
    }

    /// Installs an external preset file, asking before replacing an existing
    /// preset. The file is copied byte for byte.
    pub fn import(&mut self, source: &Path, confirm: &mut dyn Confirm) -> Transfer {
        match self.try_import(source, confirm) {
            Ok(Some(key)) => Transfer::Completed(key),
            Ok(None) => Transfer::Declined,
            Err(err) => {
                tracing::warn!(?source, %err, "preset import failed");
                Transfer::Failed(format!("Couldn't import {}: {err}", source.display()))
            }
        }
    }

    fn try_import(&mut self, source: &Path, confirm: &mut dyn Confirm) -> Result<Option<PresetKey>> {
        let bytes = fs::read(source)?;
        let header: PresetFile = serde_json::from_slice(&bytes)?;

        // The file name wins over the stored name so renamed exports keep
        // their new name.
        let mut key = header.key();
        if let Some(stem) = source.file_stem().and_then(|stem| stem.to_str()) {
            if validate_name(stem).is_ok() {
                key.name = stem.to_string();
            }
        }
        key.validate()?;

        let destination = self.path_of(&key);
        match self.check_overwrite(&destination, &key.name, confirm) {
            Ok(()) => {}
            Err(VisualizerError::OverwriteDeclined(_)) => return Ok(None),
            Err(err) => return Err(err),
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&destination, &bytes)?;
        tracing::info!(preset = %key, ?source, "imported preset");

        self.refresh();
        Ok(Some(key))
    }

    /// Copies a preset out of the store. Failures are reported, not raised.
    pub fn export(&self, key: &PresetKey, destination: &Path) -> Transfer {
        if let Err(err) = key.validate() {
            tracing::warn!(preset = %key, %err, "refusing to export");
            return Transfer::Failed(format!("Couldn't export {}: {err}", destination.display()));
        }
        match fs::copy(self.path_of(key), destination) {
            Ok(_) => {
                tracing::info!(preset = %key, ?destination, "exported preset");
                Transfer::Completed(key.clone())
            }
            Err(err) => {
                tracing::warn!(preset = %key, ?destination, %err, "preset export failed");
                Transfer::Failed(format!("Couldn't export {}: {err}", destination.display()))
            }
        }
    }

    fn check_overwrite(&self, path: &Path, name: &str, confirm: &mut dyn Confirm) -> Result<()> {
        if path.exists() && !confirm.confirm(&format!("{name} already exists! Overwrite it?")) {
            return Err(VisualizerError::OverwriteDeclined(path.to_path_buf()));
        }
        Ok(())
    }
}

fn not_found(key: &PresetKey) -> VisualizerError {
    VisualizerError::PresetNotFound {
        component: key.component.clone(),
        version: key.version,
        name: key.name.clone(),
    }
}

/// Components of the key's type and version that currently show its preset.
fn using_preset<'a>(
    components: &'a [Arc<dyn Component>],
    key: &'a PresetKey,
) -> impl Iterator<Item = &'a Arc<dyn Component>> + 'a {
    components.iter().filter(move |component| {
        component.name() == key.component
            && component.version() == key.version
            && component.current_preset().as_deref() == Some(key.name.as_str())
    })
}
