use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::block_state::FluidKind;
use crate::resource_location::ResourceLocation;
use crate::default_assets_root;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Model loading settings, read from a TOML file. Every field has a default so an empty file is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub assets_root: Option<PathBuf>,
    pub namespace: String,
    pub report_unreferenced: bool,
    pub worker_threads: Option<usize>,
    pub invisible_blocks: Vec<String>,
    pub fluid_blocks: BTreeMap<String, FluidKind>,
    /// Block id to the properties its tint depends on.
    pub coloring_properties: BTreeMap<String, Vec<String>>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            assets_root: None,
            namespace: crate::resource_location::DEFAULT_NAMESPACE.to_string(),
            report_unreferenced: true,
            worker_threads: None,
            invisible_blocks: [
                "minecraft:air",
                "minecraft:cave_air",
                "minecraft:void_air",
                "minecraft:barrier",
                "minecraft:structure_void",
                "minecraft:light",
                "minecraft:moving_piston",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            fluid_blocks: BTreeMap::from([
                ("minecraft:water".to_string(), FluidKind::Water),
                ("minecraft:lava".to_string(), FluidKind::Lava),
            ]),
            coloring_properties: BTreeMap::from([
                ("minecraft:redstone_wire".to_string(), vec!["power".to_string()]),
                ("minecraft:melon_stem".to_string(), vec!["age".to_string()]),
                ("minecraft:pumpkin_stem".to_string(), vec!["age".to_string()]),
            ]),
        }
    }
}

impl ModelSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn assets_root(&self) -> PathBuf {
        self.assets_root
            .clone()
            .unwrap_or_else(default_assets_root)
    }

    pub fn is_invisible(&self, block: &ResourceLocation) -> bool {
        self.invisible_blocks
            .iter()
            .any(|name| ResourceLocation::parse(name) == *block)
    }

    pub fn fluid_kind(&self, block: &ResourceLocation) -> Option<FluidKind> {
        self.fluid_blocks
            .iter()
            .find(|(name, _)| ResourceLocation::parse(name) == *block)
            .map(|(_, kind)| *kind)
    }

    pub fn coloring_properties_for(&self, block: &ResourceLocation) -> &[String] {
        self.coloring_properties
            .iter()
            .find(|(name, _)| ResourceLocation::parse(name) == *block)
            .map(|(_, props)| props.as_slice())
            .unwrap_or(&[])
    }
}
