use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rs_utils::ResourceLocation;
use tracing::warn;

pub const ATLAS_COLUMNS: u32 = 64;
pub const ATLAS_ROWS: u32 = 64;
pub const ATLAS_TILE_CAPACITY: usize = (ATLAS_COLUMNS as usize) * (ATLAS_ROWS as usize);

pub const BLOCK_ATLAS: &str = "minecraft:textures/atlas/blocks.png";
pub const MISSING_TEXTURE: &str = "minecraft:missingno";

/// A texture reference inside a particular atlas, before it is resolved to a sprite.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Material {
    pub atlas: ResourceLocation,
    pub texture: ResourceLocation,
}

impl Material {
    pub fn new(atlas: ResourceLocation, texture: ResourceLocation) -> Self {
        Self { atlas, texture }
    }

    pub fn block(texture: ResourceLocation) -> Self {
        Self::new(ResourceLocation::parse(BLOCK_ATLAS), texture)
    }

    pub fn missing() -> Self {
        Self::block(ResourceLocation::parse(MISSING_TEXTURE))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sprite {
    pub name: ResourceLocation,
    pub atlas: ResourceLocation,
    pub tile: u16,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl Sprite {
    pub fn is_missing(&self) -> bool {
        self.name == ResourceLocation::parse(MISSING_TEXTURE)
    }

    /// Maps a model-space coordinate in `0..=16` onto the atlas.
    pub fn u(&self, u: f32) -> f32 {
        self.u0 + (self.u1 - self.u0) * u / 16.0
    }

    pub fn v(&self, v: f32) -> f32 {
        self.v0 + (self.v1 - self.v0) * v / 16.0
    }
}

pub fn atlas_tile_origin(index: u16) -> [f32; 2] {
    let idx = index as u32;
    let col = idx % ATLAS_COLUMNS;
    let row = idx / ATLAS_COLUMNS;
    [
        col as f32 / ATLAS_COLUMNS as f32,
        row as f32 / ATLAS_ROWS as f32,
    ]
}

fn grid_sprite(atlas: &ResourceLocation, name: ResourceLocation, tile: u16) -> Sprite {
    let [u0, v0] = atlas_tile_origin(tile);
    Sprite {
        name,
        atlas: atlas.clone(),
        tile,
        u0,
        v0,
        u1: u0 + 1.0 / ATLAS_COLUMNS as f32,
        v1: v0 + 1.0 / ATLAS_ROWS as f32,
    }
}

#[derive(Clone, Debug)]
pub struct TextureAtlas {
    id: ResourceLocation,
    sprites: HashMap<ResourceLocation, Arc<Sprite>>,
    missing: Arc<Sprite>,
}

impl TextureAtlas {
    pub fn missing_only(id: ResourceLocation) -> Self {
        let missing = Arc::new(grid_sprite(&id, ResourceLocation::parse(MISSING_TEXTURE), 0));
        Self {
            id,
            sprites: HashMap::new(),
            missing,
        }
    }

    pub fn id(&self) -> &ResourceLocation {
        &self.id
    }

    pub fn get(&self, texture: &ResourceLocation) -> Option<Arc<Sprite>> {
        if *texture == self.missing.name {
            return Some(self.missing.clone());
        }
        self.sprites.get(texture).cloned()
    }

    pub fn missing_sprite(&self) -> &Arc<Sprite> {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

/// Every stitched atlas for one reload.
#[derive(Clone, Debug)]
pub struct AtlasSet {
    atlases: HashMap<ResourceLocation, TextureAtlas>,
    missing: Arc<Sprite>,
}

impl Default for AtlasSet {
    fn default() -> Self {
        Self::missing_only()
    }
}

impl AtlasSet {
    /// An atlas set that resolves nothing. Used when stitching fails.
    pub fn missing_only() -> Self {
        let block_atlas = TextureAtlas::missing_only(ResourceLocation::parse(BLOCK_ATLAS));
        let missing = block_atlas.missing_sprite().clone();
        Self {
            atlases: HashMap::from([(block_atlas.id().clone(), block_atlas)]),
            missing,
        }
    }

    pub fn insert(&mut self, atlas: TextureAtlas) {
        if *atlas.id() == ResourceLocation::parse(BLOCK_ATLAS) {
            self.missing = atlas.missing_sprite().clone();
        }
        self.atlases.insert(atlas.id().clone(), atlas);
    }

    pub fn atlas(&self, id: &ResourceLocation) -> Option<&TextureAtlas> {
        self.atlases.get(id)
    }

    pub fn sprite(&self, material: &Material) -> Option<Arc<Sprite>> {
        self.atlases.get(&material.atlas)?.get(&material.texture)
    }

    pub fn missing_sprite(&self) -> &Arc<Sprite> {
        &self.missing
    }

    pub fn sprite_count(&self) -> usize {
        self.atlases.values().map(TextureAtlas::len).sum()
    }
}

/// Produces the atlases for a reload. Runs concurrently with model discovery.
pub trait AtlasStitcher: Send + Sync {
    fn stitch(&self) -> AtlasSet;
}

/// Lays textures out on a fixed 64x64 tile grid, one tile per texture. Tile 0 is always the
/// missing texture.
#[derive(Clone, Debug)]
pub struct GridAtlasStitcher {
    atlas: ResourceLocation,
    textures: Vec<ResourceLocation>,
}

impl GridAtlasStitcher {
    pub fn new(textures: impl IntoIterator<Item = ResourceLocation>) -> Self {
        Self::for_atlas(ResourceLocation::parse(BLOCK_ATLAS), textures)
    }

    pub fn for_atlas(
        atlas: ResourceLocation,
        textures: impl IntoIterator<Item = ResourceLocation>,
    ) -> Self {
        Self {
            atlas,
            textures: textures.into_iter().collect(),
        }
    }

    pub fn build_atlas(&self) -> TextureAtlas {
        let mut atlas = TextureAtlas::missing_only(self.atlas.clone());
        let mut names = self.textures.clone();
        names.sort();
        names.dedup();
        names.retain(|name| *name != atlas.missing.name);

        let mut next_tile = 1usize;
        for name in names {
            if next_tile >= ATLAS_TILE_CAPACITY {
                warn!("atlas {} is full, dropping texture {}", self.atlas, name);
                continue;
            }
            let sprite = grid_sprite(&self.atlas, name.clone(), next_tile as u16);
            atlas.sprites.insert(name, Arc::new(sprite));
            next_tile += 1;
        }
        atlas
    }
}

impl AtlasStitcher for GridAtlasStitcher {
    fn stitch(&self) -> AtlasSet {
        let mut set = AtlasSet::missing_only();
        set.insert(self.build_atlas());
        set
    }
}

/// Resolves materials to sprites during baking. Always returns a usable sprite.
pub trait SpriteGetter {
    fn get(&mut self, model: &str, material: &Material) -> Arc<Sprite>;

    /// Called when a texture slot has no binding anywhere in the parent chain.
    fn report_missing_reference(&mut self, model: &str, slot: &str) -> Arc<Sprite>;

    /// Drains the misses recorded so far, keyed by model.
    fn take_missing_textures(&mut self) -> MissingTextures {
        MissingTextures::new()
    }
}

pub type MissingTextures = BTreeMap<String, BTreeSet<String>>;

/// Sprite getter backed by an [`AtlasSet`] that records every miss per model so they can be
/// reported in one batch after baking.
pub struct AtlasSpriteGetter<'a> {
    atlases: &'a AtlasSet,
    missing: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> AtlasSpriteGetter<'a> {
    pub fn new(atlases: &'a AtlasSet) -> Self {
        Self {
            atlases,
            missing: BTreeMap::new(),
        }
    }

    pub fn missing_textures(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.missing
    }

    pub fn into_missing_textures(self) -> BTreeMap<String, BTreeSet<String>> {
        self.missing
    }
}

impl SpriteGetter for AtlasSpriteGetter<'_> {
    fn get(&mut self, model: &str, material: &Material) -> Arc<Sprite> {
        match self.atlases.sprite(material) {
            Some(sprite) if !sprite.is_missing() => sprite,
            _ => {
                if material.texture != ResourceLocation::parse(MISSING_TEXTURE) {
                    self.missing
                        .entry(model.to_string())
                        .or_default()
                        .insert(material.texture.to_string());
                }
                self.atlases.missing_sprite().clone()
            }
        }
    }

    fn report_missing_reference(&mut self, model: &str, slot: &str) -> Arc<Sprite> {
        self.missing
            .entry(model.to_string())
            .or_default()
            .insert(format!("#{slot}"));
        self.atlases.missing_sprite().clone()
    }

    fn take_missing_textures(&mut self) -> MissingTextures {
        std::mem::take(&mut self.missing)
    }
}

pub fn log_missing_textures(missing: &BTreeMap<String, BTreeSet<String>>) {
    for (model, textures) in missing {
        let list: Vec<&str> = textures.iter().map(String::as_str).collect();
        warn!("Missing textures in model {}:\n    {}", model, list.join("\n    "));
    }
}
