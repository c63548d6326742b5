use std::collections::BTreeMap;

use anyhow::{Context, Result};

use stylist_types::Processor;

const CATALOG: &str = include_str!("presets.yml");

/// The embedded preset catalog: ready-made processor definitions that
/// config entries may extend via `preset: <name>`.
pub struct PresetStore {
    presets: BTreeMap<String, Processor>,
}

impl PresetStore {
    pub fn load() -> Result<Self> {
        let presets: BTreeMap<String, Processor> =
            serde_yaml::from_str(CATALOG).context("preset catalog decode")?;
        Ok(Self { presets })
    }

    pub fn get(&self, name: &str) -> Option<&Processor> {
        self.presets.get(name)
    }

    /// All presets, sorted by name.
    pub fn all(&self) -> impl Iterator<Item = &Processor> {
        self.presets.values()
    }
}

/// Replaces each processor that names a preset with the preset deep-merged
/// under the user's definition.
pub fn resolve_presets(processors: Vec<Processor>) -> Result<Vec<Processor>> {
    let store = PresetStore::load()?;

    processors
        .into_iter()
        .map(|processor| match &processor.preset {
            Some(name) => {
                let preset = store
                    .get(name)
                    .with_context(|| format!("unknown preset: {name}"))?;
                Ok(preset.merge(&processor))
            }
            None => Ok(processor),
        })
        .collect()
}
