use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rs_render::{
    AtlasSet, AtlasStitcher, BlockStateDefinition, GridAtlasStitcher, infer_block_definition,
};
use rs_utils::{BlockDefinition, BlockRegistry, ModelSettings, ResourceLocation};
use tracing::{debug, warn};

/// Raw definition files of one namespace, keyed by resource id.
pub struct AssetFiles {
    pub models: HashMap<ResourceLocation, String>,
    pub blockstates: HashMap<ResourceLocation, String>,
    pub items: HashMap<ResourceLocation, String>,
    pub textures: Vec<(ResourceLocation, PathBuf)>,
}

impl AssetFiles {
    pub fn read(namespace_root: &Path, namespace: &str) -> io::Result<Self> {
        Ok(Self {
            models: read_json_dir(&namespace_root.join("models"), namespace)?,
            blockstates: read_json_dir(&namespace_root.join("blockstates"), namespace)?,
            items: read_json_dir(&namespace_root.join("items"), namespace)?,
            textures: list_files(&namespace_root.join("textures"), "png")?
                .into_iter()
                .map(|(path, file)| (ResourceLocation::new(namespace, path), file))
                .collect(),
        })
    }
}

/// Every `*.json` under `dir`, keyed by its path relative to `dir` without the extension.
/// A missing directory reads as empty.
fn read_json_dir(dir: &Path, namespace: &str) -> io::Result<HashMap<ResourceLocation, String>> {
    let mut out = HashMap::new();
    for (id, path) in list_files(dir, "json")? {
        out.insert(ResourceLocation::new(namespace, id), fs::read_to_string(&path)?);
    }
    Ok(out)
}

fn list_files(dir: &Path, extension: &str) -> io::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        debug!("{} does not exist, skipping", dir.display());
        return Ok(out);
    }
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
                continue;
            }
            let Ok(relative) = path.with_extension("").strip_prefix(dir).map(Path::to_path_buf)
            else {
                continue;
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((id, path));
        }
    }
    out.sort();
    Ok(out)
}

/// Block registry for an asset set that ships none: one block per blockstate file with the
/// properties the file mentions, plus the invisible and fluid blocks named in the settings.
pub fn infer_registry(
    settings: &ModelSettings,
    blockstates: &HashMap<ResourceLocation, String>,
) -> BlockRegistry {
    let mut ids: Vec<&ResourceLocation> = blockstates.keys().collect();
    ids.sort();

    let mut definitions = Vec::with_capacity(ids.len());
    for id in ids {
        let mut def = match BlockStateDefinition::from_json(id, &blockstates[id]) {
            Ok(parsed) => infer_block_definition(id, &parsed),
            Err(err) => {
                warn!("Failed to read block properties: {}", err);
                BlockDefinition::new(id.clone())
            }
        };
        if settings.is_invisible(id) {
            def = def.invisible();
        }
        if let Some(kind) = settings.fluid_kind(id) {
            def = def
                .with_property("level", (0..16).map(|level| level.to_string()))
                .fluid(kind);
        }
        definitions.push(def);
    }
    for name in &settings.invisible_blocks {
        definitions.push(BlockDefinition::new(ResourceLocation::parse(name)).invisible());
    }
    for (name, kind) in &settings.fluid_blocks {
        definitions.push(
            BlockDefinition::new(ResourceLocation::parse(name))
                .with_property("level", (0..16).map(|level| level.to_string()))
                .fluid(*kind),
        );
    }
    // Blocks that have a blockstate file were pushed first; the registry keeps the first.
    BlockRegistry::new(definitions)
}

/// Stitches texture files that decode to a usable size into a grid atlas.
pub struct PngAtlasStitcher {
    textures: Vec<(ResourceLocation, PathBuf)>,
}

impl PngAtlasStitcher {
    pub fn new(textures: Vec<(ResourceLocation, PathBuf)>) -> Self {
        Self { textures }
    }
}

impl AtlasStitcher for PngAtlasStitcher {
    fn stitch(&self) -> AtlasSet {
        let usable = self.textures.iter().filter_map(|(id, path)| {
            match image::image_dimensions(path) {
                // Animated textures are vertical strips of square frames.
                Ok((width, height)) if width > 0 && height % width == 0 => Some(id.clone()),
                Ok((width, height)) => {
                    warn!("Skipping texture {} with size {}x{}", id, width, height);
                    None
                }
                Err(err) => {
                    warn!("Failed to read texture {}: {}", id, err);
                    None
                }
            }
        });
        GridAtlasStitcher::new(usable).stitch()
    }
}
