use std::collections::HashMap;
use std::sync::Arc;

use rs_utils::{ModelLocation, ResourceLocation};
use tracing::{debug, warn};

use crate::baked_model::{BlockStateModel, SimpleBakedModel, SimpleBakedModelBuilder, WeightedModel};
use crate::block_models::{MISSING_MODEL, PARTICLE_SLOT, ResolvedTextureSlots, missing_model};
use crate::block_states::UnbakedBlockStateModel;
use crate::block_textures::{Material, MissingTextures, Sprite, SpriteGetter};
use crate::discovery::ResolvedModels;
use crate::error::BakeError;
use crate::face_bakery::{ModelState, bake_face};
use crate::item_model::{ItemModel, UnbakedItemModel};
use crate::item_transforms::ItemTransforms;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BakeKey {
    pub id: ResourceLocation,
    pub state: ModelState,
}

/// Baked models by `(model id, transform)`. Owned by one reload; only successful bakes are kept.
#[derive(Debug, Default)]
pub struct BakeCache {
    entries: HashMap<BakeKey, Arc<SimpleBakedModel>>,
    hits: usize,
    misses: usize,
}

impl BakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BakeStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub unique_models: usize,
    pub failed_bindings: usize,
}

/// Bakes model ids through a [`BakeCache`].
pub struct ModelBaker<'a> {
    models: &'a ResolvedModels,
    sprites: &'a mut dyn SpriteGetter,
    cache: &'a mut BakeCache,
}

impl<'a> ModelBaker<'a> {
    pub fn new(
        models: &'a ResolvedModels,
        sprites: &'a mut dyn SpriteGetter,
        cache: &'a mut BakeCache,
    ) -> Self {
        Self {
            models,
            sprites,
            cache,
        }
    }

    pub fn bake(
        &mut self,
        id: &ResourceLocation,
        state: ModelState,
    ) -> Result<Arc<SimpleBakedModel>, BakeError> {
        let key = BakeKey {
            id: id.clone(),
            state,
        };
        if let Some(model) = self.cache.entries.get(&key) {
            self.cache.hits += 1;
            return Ok(model.clone());
        }
        self.cache.misses += 1;
        let model = Arc::new(bake_with_top_model_values(
            self.models,
            id,
            state,
            &mut *self.sprites,
        )?);
        self.cache.entries.insert(key, model.clone());
        Ok(model)
    }

    pub fn bake_block_state(
        &mut self,
        binding: &UnbakedBlockStateModel,
        name: &str,
    ) -> Result<BlockStateModel, BakeError> {
        match binding {
            UnbakedBlockStateModel::Single(variant) => Ok(BlockStateModel::Single(
                self.bake(&variant.model, variant.state)?,
            )),
            UnbakedBlockStateModel::Weighted(entries) => {
                let mut baked = Vec::with_capacity(entries.len());
                for entry in entries {
                    baked.push(WeightedModel {
                        weight: entry.weight,
                        model: self.bake(&entry.value.model, entry.value.state)?,
                    });
                }
                BlockStateModel::weighted(baked).ok_or_else(|| BakeError::EmptyWeightedList {
                    model: name.to_string(),
                })
            }
            UnbakedBlockStateModel::Composite(parts) => parts
                .iter()
                .map(|part| self.bake_block_state(part, name))
                .collect::<Result<Vec<_>, _>>()
                .map(|parts| BlockStateModel::Composite(parts.into())),
        }
    }

    pub fn bake_item(&mut self, item: &UnbakedItemModel) -> Result<ItemModel, BakeError> {
        match item {
            UnbakedItemModel::Model { model } => {
                Ok(ItemModel::Model(self.bake(model, ModelState::IDENTITY)?))
            }
            UnbakedItemModel::Empty => Ok(ItemModel::Empty),
        }
    }
}

/// Bakes `id` under `state` using the values its parent chain resolves to: the first slot binding
/// wins, the first declared ambient occlusion, gui light and element list win, and each display
/// context is taken from the most-derived model that declares it.
pub fn bake_with_top_model_values(
    models: &ResolvedModels,
    id: &ResourceLocation,
    state: ModelState,
    sprites: &mut dyn SpriteGetter,
) -> Result<SimpleBakedModel, BakeError> {
    let name = id.to_string();
    let chain = models.chain(id);
    let slots = ResolvedTextureSlots::resolve(chain.iter().copied());
    let ambient_occlusion = chain
        .iter()
        .find_map(|model| model.ambient_occlusion)
        .unwrap_or(true);
    let gui_light = chain
        .iter()
        .find_map(|model| model.gui_light)
        .unwrap_or_default();
    let transforms = ItemTransforms::resolve(chain.iter().map(|model| &model.transforms));
    let elements = chain
        .iter()
        .find_map(|model| model.elements.as_deref())
        .unwrap_or(&[]);

    let particle = resolve_sprite(&slots, &name, PARTICLE_SLOT, sprites);
    let mut builder = SimpleBakedModelBuilder::new(particle)
        .ambient_occlusion(ambient_occlusion)
        .gui_3d(true)
        .uses_block_light(gui_light.uses_block_light())
        .transforms(transforms);

    for element in elements {
        element.validate(&name)?;
        for (direction, face) in &element.faces {
            let slot = face.texture.strip_prefix('#').unwrap_or(&face.texture);
            let sprite = resolve_sprite(&slots, &name, slot, sprites);
            let quad = bake_face(element, face, sprite, *direction, state);
            match face.cullface {
                Some(cull) => builder.add_culled_face(state.rotation.rotate(cull), quad),
                None => builder.add_unculled_face(quad),
            }
        }
    }
    Ok(builder.build())
}

fn resolve_sprite(
    slots: &ResolvedTextureSlots,
    model: &str,
    slot: &str,
    sprites: &mut dyn SpriteGetter,
) -> Arc<Sprite> {
    match slots.get(slot) {
        Some(material) => sprites.get(model, material),
        None => sprites.report_missing_reference(model, slot),
    }
}

/// The missing model baked without validation or a cache. Used when baking could not run at all.
pub fn bake_missing_model(sprite: Arc<Sprite>) -> SimpleBakedModel {
    let model = missing_model();
    let mut builder = SimpleBakedModelBuilder::new(sprite.clone());
    for element in model.elements.iter().flatten() {
        for (direction, face) in &element.faces {
            let quad = bake_face(element, face, sprite.clone(), *direction, ModelState::IDENTITY);
            match face.cullface {
                Some(cull) => builder.add_culled_face(cull, quad),
                None => builder.add_unculled_face(quad),
            }
        }
    }
    builder.build()
}

pub struct BakingResult {
    pub missing_model: Arc<SimpleBakedModel>,
    pub block_state_models: HashMap<ModelLocation, BlockStateModel>,
    pub item_models: HashMap<ResourceLocation, ItemModel>,
    pub missing_textures: MissingTextures,
    pub stats: BakeStats,
}

impl BakingResult {
    /// Result containing only the missing model.
    pub fn missing_only(sprite: Arc<Sprite>) -> Self {
        Self {
            missing_model: Arc::new(bake_missing_model(sprite)),
            block_state_models: HashMap::new(),
            item_models: HashMap::new(),
            missing_textures: MissingTextures::new(),
            stats: BakeStats::default(),
        }
    }
}

/// Bakes every block state binding and item binding against one set of discovered models.
pub struct ModelBakery<'a> {
    models: &'a ResolvedModels,
    block_bindings: &'a HashMap<ModelLocation, UnbakedBlockStateModel>,
    item_bindings: &'a HashMap<ResourceLocation, UnbakedItemModel>,
}

impl<'a> ModelBakery<'a> {
    pub fn new(
        models: &'a ResolvedModels,
        block_bindings: &'a HashMap<ModelLocation, UnbakedBlockStateModel>,
        item_bindings: &'a HashMap<ResourceLocation, UnbakedItemModel>,
    ) -> Self {
        Self {
            models,
            block_bindings,
            item_bindings,
        }
    }

    pub fn bake_all(&self, sprites: &mut dyn SpriteGetter) -> BakingResult {
        let mut cache = BakeCache::new();
        let mut failed = 0usize;

        let (missing_model, block_state_models, item_models) = {
            let mut baker = ModelBaker::new(self.models, &mut *sprites, &mut cache);
            let missing_id = ResourceLocation::parse(MISSING_MODEL);
            let missing_model = match baker.bake(&missing_id, ModelState::IDENTITY) {
                Ok(model) => model,
                Err(err) => {
                    warn!("Unable to bake model: '{}': {}", missing_id, err);
                    let sprite = baker
                        .sprites
                        .get(MISSING_MODEL, &Material::missing());
                    Arc::new(bake_missing_model(sprite))
                }
            };

            let mut locations: Vec<&ModelLocation> = self.block_bindings.keys().collect();
            locations.sort();
            let mut block_state_models = HashMap::with_capacity(locations.len());
            for location in locations {
                let name = location.to_string();
                match baker.bake_block_state(&self.block_bindings[location], &name) {
                    Ok(model) => {
                        block_state_models.insert(location.clone(), model);
                    }
                    Err(err) => {
                        warn!("Unable to bake model: '{}': {}", location, err);
                        failed += 1;
                    }
                }
            }

            let mut items: Vec<&ResourceLocation> = self.item_bindings.keys().collect();
            items.sort();
            let mut item_models = HashMap::with_capacity(items.len());
            for id in items {
                match baker.bake_item(&self.item_bindings[id]) {
                    Ok(model) => {
                        item_models.insert(id.clone(), model);
                    }
                    Err(err) => {
                        warn!("Unable to bake item model: '{}': {}", id, err);
                        failed += 1;
                    }
                }
            }
            (missing_model, block_state_models, item_models)
        };

        let stats = BakeStats {
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            unique_models: cache.len(),
            failed_bindings: failed,
        };
        debug!(
            "Baked {} block state models and {} item models ({} unique, {} cache hits)",
            block_state_models.len(),
            item_models.len(),
            stats.unique_models,
            stats.cache_hits
        );
        BakingResult {
            missing_model,
            block_state_models,
            item_models,
            missing_textures: sprites.take_missing_textures(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use rs_utils::Direction;

    use super::*;
    use crate::block_states::{Variant, Weighted};
    use crate::block_models::UnbakedModel;
    use crate::block_textures::{AtlasSet, AtlasSpriteGetter, AtlasStitcher, GridAtlasStitcher};
    use crate::discovery::ModelDiscovery;
    use crate::face_bakery::BlockModelRotation;

    fn loc(s: &str) -> ResourceLocation {
        ResourceLocation::parse(s)
    }

    fn atlases(textures: &[&str]) -> AtlasSet {
        GridAtlasStitcher::new(textures.iter().map(|t| loc(t))).stitch()
    }

    fn resolve(entries: &[(&str, &str)], roots: &[&str]) -> ResolvedModels {
        let input = entries
            .iter()
            .map(|(id, json)| {
                let id = loc(id);
                let model = UnbakedModel::from_json(&id, json).unwrap();
                (id, Arc::new(model))
            })
            .collect();
        let mut discovery = ModelDiscovery::new(input, Arc::new(missing_model()));
        for root in roots {
            let binding = UnbakedBlockStateModel::Single(Variant {
                model: loc(root),
                state: ModelState::IDENTITY,
            });
            discovery.add_root(&binding);
        }
        discovery.into_resolved()
    }

    const CUBE: &str = r##"{
        "textures": {"particle": "#x"},
        "elements": [{"from": [0, 0, 0], "to": [16, 16, 16], "faces": {
            "north": {"texture": "#x", "cullface": "north"},
            "up": {"texture": "#y"}
        }}]
    }"##;

    #[test]
    fn first_binding_wins_over_parent() {
        let models = resolve(
            &[
                ("block/a", r#"{"parent": "block/b", "textures": {"x": "block/t1"}}"#),
                ("block/b", r#"{"parent": "block/cube", "textures": {"x": "block/t2", "y": "block/t3"}}"#),
                ("block/cube", CUBE),
            ],
            &["block/a"],
        );
        let atlases = atlases(&["block/t1", "block/t2", "block/t3"]);
        let mut sprites = AtlasSpriteGetter::new(&atlases);
        let baked =
            bake_with_top_model_values(&models, &loc("block/a"), ModelState::IDENTITY, &mut sprites)
                .unwrap();
        assert_eq!(baked.particle_icon().name, loc("block/t1"));
        assert_eq!(baked.quads(Some(Direction::North))[0].sprite.name, loc("block/t1"));
        assert_eq!(baked.quads(None)[0].sprite.name, loc("block/t3"));
        assert!(sprites.missing_textures().is_empty());
    }

    #[test]
    fn middle_of_chain_overrides_root_values() {
        let models = resolve(
            &[
                ("block/leaf", r#"{"parent": "block/middle"}"#),
                (
                    "block/middle",
                    r#"{"parent": "block/root", "ambientocclusion": false, "gui_light": "front", "textures": {"x": "block/mid"}}"#,
                ),
                (
                    "block/root",
                    r##"{"ambientocclusion": true, "textures": {"x": "block/root", "y": "block/root"},
                        "elements": [{"from": [0, 0, 0], "to": [16, 16, 16], "faces": {
                            "north": {"texture": "#x"}
                        }}]}"##,
                ),
            ],
            &["block/leaf"],
        );
        let atlases = atlases(&["block/mid", "block/root"]);
        let mut sprites = AtlasSpriteGetter::new(&atlases);
        let baked = bake_with_top_model_values(
            &models,
            &loc("block/leaf"),
            ModelState::IDENTITY,
            &mut sprites,
        )
        .unwrap();
        assert!(!baked.ambient_occlusion());
        assert!(!baked.uses_block_light());
        assert_eq!(baked.quad_count(), 1);
        // the middle's binding shadows the root's for a leaf that binds nothing
        assert_eq!(baked.quads(None)[0].sprite.name, loc("block/mid"));
        // particle is unbound anywhere in the chain
        assert_eq!(
            sprites.missing_textures()["minecraft:block/leaf"],
            ["#particle".to_string()].into()
        );
    }

    #[test]
    fn cache_returns_the_same_instance() {
        let models = resolve(&[("block/cube", CUBE)], &["block/cube"]);
        let atlases = AtlasSet::missing_only();
        let mut sprites = AtlasSpriteGetter::new(&atlases);
        let mut cache = BakeCache::new();
        let mut baker = ModelBaker::new(&models, &mut sprites, &mut cache);
        let rotated = ModelState::new(BlockModelRotation::from_degrees(0, 90).unwrap(), false);
        let first = baker.bake(&loc("block/cube"), ModelState::IDENTITY).unwrap();
        let second = baker.bake(&loc("block/cube"), ModelState::IDENTITY).unwrap();
        let turned = baker.bake(&loc("block/cube"), rotated).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &turned));
        assert_eq!(turned.quads(Some(Direction::East)).len(), 1);
        assert!(turned.quads(Some(Direction::North)).is_empty());
        assert_eq!((cache.hits(), cache.misses(), cache.len()), (1, 2, 2));
    }

    #[test]
    fn missing_texture_uses_missing_sprite_and_reports_once() {
        let models = resolve(
            &[("block/m", r#"{"parent": "block/cube", "textures": {"x": "block/absent", "y": "block/absent"}}"#), ("block/cube", CUBE)],
            &["block/m"],
        );
        let atlases = AtlasSet::missing_only();
        let bindings = HashMap::from([(
            ModelLocation::new(loc("stone"), ""),
            UnbakedBlockStateModel::Single(Variant {
                model: loc("block/m"),
                state: ModelState::IDENTITY,
            }),
        )]);
        let items = HashMap::new();
        let mut sprites = AtlasSpriteGetter::new(&atlases);
        let result = ModelBakery::new(&models, &bindings, &items).bake_all(&mut sprites);
        let model = &result.block_state_models[&ModelLocation::new(loc("stone"), "")];
        let baked = model.primary().unwrap();
        assert!(baked.quads(None)[0].sprite.is_missing());
        assert_eq!(result.missing_textures.len(), 1);
        assert_eq!(
            result.missing_textures["minecraft:block/m"],
            ["minecraft:block/absent".to_string()].into()
        );
        assert_eq!(result.missing_model.quad_count(), 6);
    }

    #[test]
    fn failed_bindings_are_skipped() {
        let models = resolve(
            &[
                ("block/bad", r##"{"elements": [{"from": [0, 0, 0], "to": [48, 16, 16], "faces": {}}]}"##),
                ("block/cube", CUBE),
            ],
            &["block/bad", "block/cube"],
        );
        let single = |model: &str| {
            UnbakedBlockStateModel::Single(Variant {
                model: loc(model),
                state: ModelState::IDENTITY,
            })
        };
        let bindings = HashMap::from([
            (ModelLocation::new(loc("bad"), ""), single("block/bad")),
            (ModelLocation::new(loc("good"), ""), single("block/cube")),
            (ModelLocation::new(loc("also_good"), ""), single("block/cube")),
            (
                ModelLocation::new(loc("empty"), ""),
                UnbakedBlockStateModel::Weighted(vec![]),
            ),
        ]);
        let items = HashMap::from([(loc("cube"), UnbakedItemModel::Model { model: loc("block/cube") })]);
        let atlases = AtlasSet::missing_only();
        let mut sprites = AtlasSpriteGetter::new(&atlases);
        let result = ModelBakery::new(&models, &bindings, &items).bake_all(&mut sprites);
        assert_eq!(result.block_state_models.len(), 2);
        assert_eq!(result.stats.failed_bindings, 2);
        assert_eq!(result.item_models.len(), 1);
        // the missing model, the cube and one failed attempt at block/bad
        assert_eq!(result.stats.cache_misses, 3);
        assert_eq!(result.stats.cache_hits, 2);
    }

    #[test]
    fn heavy_weighted_binding_bakes_beside_others() {
        let models = resolve(&[("block/cube", CUBE)], &["block/cube"]);
        let variant = || Variant {
            model: loc("block/cube"),
            state: ModelState::IDENTITY,
        };
        let heavy = UnbakedBlockStateModel::Weighted(vec![
            Weighted { weight: u32::MAX, value: variant() },
            Weighted { weight: u32::MAX, value: variant() },
        ]);
        let bindings = HashMap::from([
            (ModelLocation::new(loc("heavy"), ""), heavy),
            (ModelLocation::new(loc("stone"), ""), UnbakedBlockStateModel::Single(variant())),
        ]);
        let items = HashMap::new();
        let atlases = atlases(&["block/t1"]);
        let mut sprites = AtlasSpriteGetter::new(&atlases);
        let result = ModelBakery::new(&models, &bindings, &items).bake_all(&mut sprites);
        assert_eq!(result.stats.failed_bindings, 0);
        assert_eq!(result.block_state_models.len(), 2);
        let heavy = &result.block_state_models[&ModelLocation::new(loc("heavy"), "")];
        assert!(matches!(heavy, BlockStateModel::Weighted { .. }));
        let stone = &result.block_state_models[&ModelLocation::new(loc("stone"), "")];
        assert!(Arc::ptr_eq(stone.primary().unwrap(), heavy.primary().unwrap()));
    }
}
