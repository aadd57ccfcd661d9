use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bevy::prelude::Resource;
use rs_utils::{BlockRegistry, BlockStateId, ModelLocation, RenderShape, ResourceLocation};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::baked_model::{BlockStateModel, SimpleBakedModel};
use crate::bakery::{BakeStats, BakingResult, ModelBakery, bake_missing_model};
use crate::block_models::{UnbakedModel, missing_model};
use crate::block_states::UnbakedBlockStateModel;
use crate::block_textures::{
    AtlasSet, AtlasSpriteGetter, AtlasStitcher, MissingTextures, log_missing_textures,
};
use crate::discovery::{ModelDiscovery, ResolvedModels};
use crate::groups::{ColorSource, ModelGroupCollector, ModelGroups};
use crate::item_model::{ItemModel, UnbakedItemModel};
use crate::timing::Timing;

/// Everything one reload consumes.
#[derive(Clone)]
pub struct ReloadInputs {
    pub raw_models: HashMap<ResourceLocation, String>,
    pub registry: Arc<BlockRegistry>,
    pub block_bindings: Arc<HashMap<ModelLocation, UnbakedBlockStateModel>>,
    pub item_bindings: Arc<HashMap<ResourceLocation, UnbakedItemModel>>,
    pub color_source: Arc<dyn ColorSource>,
    pub stitcher: Arc<dyn AtlasStitcher>,
    pub report_unreferenced: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadStage {
    LoadRawDefinitions,
    DiscoverDependencies,
    ComputeGroups,
    StitchAtlases,
    BakeAll,
    BuildDispatchTable,
    Barrier,
    Apply,
}

impl fmt::Display for ReloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadRawDefinitions => "load raw definitions",
            Self::DiscoverDependencies => "discover dependencies",
            Self::ComputeGroups => "compute groups",
            Self::StitchAtlases => "stitch atlases",
            Self::BakeAll => "bake all",
            Self::BuildDispatchTable => "build dispatch table",
            Self::Barrier => "barrier",
            Self::Apply => "apply",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReloadStats {
    pub loaded_models: usize,
    pub failed_models: usize,
    pub referenced_models: usize,
    pub dispatch_misses: usize,
    pub bake: BakeStats,
}

/// One generation of baked models. Never mutated after it is built.
pub struct ModelSnapshot {
    registry: Arc<BlockRegistry>,
    dispatch: Vec<BlockStateModel>,
    item_models: HashMap<ResourceLocation, ItemModel>,
    missing_model: Arc<SimpleBakedModel>,
    missing_state_model: BlockStateModel,
    missing_item_model: ItemModel,
    groups: ModelGroups,
    atlases: Arc<AtlasSet>,
    missing_textures: MissingTextures,
    unreferenced: Vec<ResourceLocation>,
    stats: ReloadStats,
}

impl ModelSnapshot {
    /// The generation that is live before the first reload: every lookup yields the missing
    /// model.
    pub fn empty() -> Self {
        let atlases = Arc::new(AtlasSet::missing_only());
        let missing_model = Arc::new(bake_missing_model(atlases.missing_sprite().clone()));
        Self {
            registry: Arc::new(BlockRegistry::default()),
            dispatch: Vec::new(),
            item_models: HashMap::new(),
            missing_state_model: BlockStateModel::Single(missing_model.clone()),
            missing_item_model: ItemModel::Model(missing_model.clone()),
            missing_model,
            groups: ModelGroups::default(),
            atlases,
            missing_textures: MissingTextures::new(),
            unreferenced: Vec::new(),
            stats: ReloadStats::default(),
        }
    }

    pub fn model(&self, state: BlockStateId) -> &BlockStateModel {
        self.dispatch
            .get(state.index())
            .unwrap_or(&self.missing_state_model)
    }

    pub fn item_model(&self, id: &ResourceLocation) -> &ItemModel {
        self.item_models.get(id).unwrap_or(&self.missing_item_model)
    }

    pub fn requires_render(&self, old: BlockStateId, new: BlockStateId) -> bool {
        self.groups.requires_render(&self.registry, old, new)
    }

    pub fn missing_model(&self) -> &Arc<SimpleBakedModel> {
        &self.missing_model
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn groups(&self) -> &ModelGroups {
        &self.groups
    }

    pub fn atlases(&self) -> &Arc<AtlasSet> {
        &self.atlases
    }

    pub fn missing_textures(&self) -> &MissingTextures {
        &self.missing_textures
    }

    pub fn unreferenced(&self) -> &[ResourceLocation] {
        &self.unreferenced
    }

    pub fn item_model_count(&self) -> usize {
        self.item_models.len()
    }

    pub fn stats(&self) -> &ReloadStats {
        &self.stats
    }
}

/// A snapshot that passed the barrier and is ready to be published.
pub struct PreparedModels {
    snapshot: ModelSnapshot,
}

impl PreparedModels {
    pub fn snapshot(&self) -> &ModelSnapshot {
        &self.snapshot
    }
}

async fn load_raw_definitions(
    raw: HashMap<ResourceLocation, String>,
) -> (HashMap<ResourceLocation, Arc<UnbakedModel>>, usize) {
    let mut tasks = JoinSet::new();
    for (id, json) in raw {
        tasks.spawn_blocking(move || {
            let parsed = UnbakedModel::from_json(&id, &json);
            (id, parsed)
        });
    }

    let mut models = HashMap::new();
    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(model))) => {
                models.insert(id, Arc::new(model));
            }
            Ok((_, Err(err))) => {
                warn!("Failed to load model definition: {}", err);
                failed += 1;
            }
            Err(err) => {
                warn!("Model definition task failed: {}", err);
                failed += 1;
            }
        }
    }
    (models, failed)
}

fn discover_dependencies(
    models: HashMap<ResourceLocation, Arc<UnbakedModel>>,
    missing: Arc<UnbakedModel>,
    block_bindings: &HashMap<ModelLocation, UnbakedBlockStateModel>,
    item_bindings: &HashMap<ResourceLocation, UnbakedItemModel>,
    report_unreferenced: bool,
) -> (ResolvedModels, Vec<ResourceLocation>) {
    let mut discovery = ModelDiscovery::new(models, missing);
    let mut locations: Vec<&ModelLocation> = block_bindings.keys().collect();
    locations.sort();
    for location in locations {
        discovery.add_root(&block_bindings[location]);
    }
    let mut items: Vec<&ResourceLocation> = item_bindings.keys().collect();
    items.sort();
    for id in items {
        discovery.add_root(&item_bindings[id]);
    }
    if report_unreferenced {
        discovery.log_unreferenced();
    }
    let unreferenced = discovery.unreferenced();
    (discovery.into_resolved(), unreferenced)
}

/// Builds the dense per-state lookup. States without a baked model get the missing model.
fn build_dispatch_table(
    registry: &BlockRegistry,
    baked: &HashMap<ModelLocation, BlockStateModel>,
    missing: &BlockStateModel,
) -> (Vec<BlockStateModel>, usize) {
    let mut misses = 0usize;
    let dispatch = registry
        .states()
        .map(|state| {
            let location = registry.model_location(state);
            match baked.get(&location) {
                Some(model) => model.clone(),
                None => {
                    misses += 1;
                    if registry.render_shape(state) == RenderShape::Invisible {
                        debug!("No model for invisible state {}", location);
                    } else {
                        warn!("Missing model for variant: '{}'", location);
                    }
                    missing.clone()
                }
            }
        })
        .collect();
    (dispatch, misses)
}

/// Runs every stage up to and including the barrier. Nothing becomes visible to readers until
/// the returned value is applied, and if `barrier` never resolves nothing ever does.
pub async fn prepare_models<B>(inputs: ReloadInputs, barrier: B) -> PreparedModels
where
    B: Future<Output = ()>,
{
    let released = async {
        barrier.await;
        Ok::<(), Infallible>(())
    };
    match try_prepare_models(inputs, released).await {
        Ok(prepared) => prepared,
        Err(never) => match never {},
    }
}

/// Like [`prepare_models`], but a barrier that fails abandons the reload: the prepared
/// generation is dropped and the error is returned instead.
pub async fn try_prepare_models<B, E>(
    inputs: ReloadInputs,
    barrier: B,
) -> Result<PreparedModels, E>
where
    B: Future<Output = Result<(), E>>,
{
    let total = Timing::start();
    let ReloadInputs {
        raw_models,
        registry,
        block_bindings,
        item_bindings,
        color_source,
        stitcher,
        report_unreferenced,
    } = inputs;

    let timing = Timing::start();
    let (models, failed_models) = load_raw_definitions(raw_models).await;
    let loaded_models = models.len();
    timing.log(ReloadStage::LoadRawDefinitions);

    let missing = Arc::new(missing_model());
    let discover = {
        let missing = missing.clone();
        let block_bindings = block_bindings.clone();
        let item_bindings = item_bindings.clone();
        tokio::task::spawn_blocking(move || {
            let timing = Timing::start();
            let out = discover_dependencies(
                models,
                missing,
                &block_bindings,
                &item_bindings,
                report_unreferenced,
            );
            timing.log(ReloadStage::DiscoverDependencies);
            out
        })
    };
    let compute_groups = {
        let registry = registry.clone();
        let block_bindings = block_bindings.clone();
        tokio::task::spawn_blocking(move || {
            let timing = Timing::start();
            let groups = ModelGroupCollector::build(&*color_source, &registry, &block_bindings);
            timing.log(ReloadStage::ComputeGroups);
            groups
        })
    };
    let stitch = tokio::task::spawn_blocking(move || {
        let timing = Timing::start();
        let atlases = stitcher.stitch();
        timing.log(ReloadStage::StitchAtlases);
        atlases
    });

    let (discovered, groups, atlases) = tokio::join!(discover, compute_groups, stitch);
    let (resolved, unreferenced) = discovered.unwrap_or_else(|err| {
        warn!("Stage {} failed: {}", ReloadStage::DiscoverDependencies, err);
        (ResolvedModels::missing_only(missing), Vec::new())
    });
    let groups = groups.unwrap_or_else(|err| {
        warn!("Stage {} failed: {}", ReloadStage::ComputeGroups, err);
        ModelGroups::default()
    });
    let atlases = Arc::new(atlases.unwrap_or_else(|err| {
        warn!("Stage {} failed: {}", ReloadStage::StitchAtlases, err);
        AtlasSet::missing_only()
    }));
    let referenced_models = resolved.len();

    let baking = {
        let atlases = atlases.clone();
        let block_bindings = block_bindings.clone();
        let item_bindings = item_bindings.clone();
        tokio::task::spawn_blocking(move || {
            let timing = Timing::start();
            let mut sprites = AtlasSpriteGetter::new(&atlases);
            let result = ModelBakery::new(&resolved, &block_bindings, &item_bindings)
                .bake_all(&mut sprites);
            log_missing_textures(&result.missing_textures);
            timing.log(ReloadStage::BakeAll);
            result
        })
    };
    let baking = baking.await.unwrap_or_else(|err| {
        warn!("Stage {} failed: {}", ReloadStage::BakeAll, err);
        BakingResult::missing_only(atlases.missing_sprite().clone())
    });

    let timing = Timing::start();
    let missing_state_model = BlockStateModel::Single(baking.missing_model.clone());
    let (dispatch, dispatch_misses) =
        build_dispatch_table(&registry, &baking.block_state_models, &missing_state_model);
    timing.log(ReloadStage::BuildDispatchTable);

    let snapshot = ModelSnapshot {
        registry,
        dispatch,
        item_models: baking.item_models,
        missing_item_model: ItemModel::Model(baking.missing_model.clone()),
        missing_model: baking.missing_model,
        missing_state_model,
        groups,
        atlases,
        missing_textures: baking.missing_textures,
        unreferenced,
        stats: ReloadStats {
            loaded_models,
            failed_models,
            referenced_models,
            dispatch_misses,
            bake: baking.stats,
        },
    };

    let timing = Timing::start();
    barrier.await?;
    timing.log(ReloadStage::Barrier);
    total.log("model reload");
    Ok(PreparedModels { snapshot })
}

/// Owns the live snapshot. Readers clone the `Arc` and keep a consistent generation for as long
/// as they hold it.
#[derive(Resource)]
pub struct ModelManager {
    current: Arc<ModelSnapshot>,
    generation: u64,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self {
            current: Arc::new(ModelSnapshot::empty()),
            generation: 0,
        }
    }
}

impl ModelManager {
    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        self.current.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn apply(&mut self, prepared: PreparedModels) {
        let timing = Timing::start();
        self.current = Arc::new(prepared.snapshot);
        self.generation += 1;
        timing.log(ReloadStage::Apply);
        let stats = self.current.stats();
        info!(
            "Applied model generation {}: {} models loaded, {} referenced, {} baked, {} failed",
            self.generation,
            stats.loaded_models,
            stats.referenced_models,
            stats.bake.unique_models,
            stats.bake.failed_bindings
        );
    }

    pub async fn reload<B>(&mut self, inputs: ReloadInputs, barrier: B)
    where
        B: Future<Output = ()>,
    {
        let prepared = prepare_models(inputs, barrier).await;
        self.apply(prepared);
    }

    pub fn model(&self, state: BlockStateId) -> &BlockStateModel {
        self.current.model(state)
    }

    pub fn item_model(&self, id: &ResourceLocation) -> &ItemModel {
        self.current.item_model(id)
    }

    pub fn requires_render(&self, old: BlockStateId, new: BlockStateId) -> bool {
        self.current.requires_render(old, new)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use rs_utils::BlockDefinition;
    use tokio::sync::oneshot;

    use super::*;
    use crate::block_states::load_block_state_bindings;
    use crate::block_textures::GridAtlasStitcher;
    use crate::groups::StaticColorSource;

    fn loc(s: &str) -> ResourceLocation {
        ResourceLocation::parse(s)
    }

    fn inputs() -> ReloadInputs {
        let registry = Arc::new(BlockRegistry::new([
            BlockDefinition::new("minecraft:stone"),
            BlockDefinition::new("minecraft:dirt"),
        ]));
        let blockstates = HashMap::from([(
            loc("stone"),
            r#"{"variants": {"": {"model": "block/stone"}}}"#.to_string(),
        )]);
        let block_bindings = load_block_state_bindings(&registry, &blockstates);
        ReloadInputs {
            raw_models: HashMap::from([
                (
                    loc("block/stone"),
                    r#"{"parent": "block/cube_all", "textures": {"all": "block/stone"}}"#.to_string(),
                ),
                (
                    loc("block/cube_all"),
                    r##"{"textures": {"particle": "#all"}, "elements": [{"from": [0,0,0], "to": [16,16,16], "faces": {"up": {"texture": "#all", "cullface": "up"}}}]}"##
                        .to_string(),
                ),
                (loc("block/broken"), "{".to_string()),
            ]),
            registry,
            block_bindings: Arc::new(block_bindings),
            item_bindings: Arc::new(HashMap::from([(
                loc("stone"),
                UnbakedItemModel::Model { model: loc("block/stone") },
            )])),
            color_source: Arc::new(StaticColorSource::default()),
            stitcher: Arc::new(GridAtlasStitcher::new([loc("block/stone")])),
            report_unreferenced: true,
        }
    }

    #[test]
    fn empty_manager_serves_missing_model() {
        let manager = ModelManager::default();
        let registry = BlockRegistry::new([BlockDefinition::new("minecraft:stone")]);
        let model = manager.model(registry.default_state(registry.block_by_name(&loc("stone")).unwrap()));
        assert!(Arc::ptr_eq(
            model.primary().unwrap(),
            manager.snapshot().missing_model()
        ));
        assert!(matches!(manager.item_model(&loc("apple")), ItemModel::Model(_)));
    }

    #[tokio::test]
    async fn reload_publishes_a_complete_generation() {
        let inputs = inputs();
        let registry = inputs.registry.clone();
        let mut manager = ModelManager::default();
        manager.reload(inputs, async {}).await;
        assert_eq!(manager.generation(), 1);

        let stone = registry.default_state(registry.block_by_name(&loc("stone")).unwrap());
        let dirt = registry.default_state(registry.block_by_name(&loc("dirt")).unwrap());
        let snapshot = manager.snapshot();
        let stone_model = snapshot.model(stone).primary().unwrap();
        assert_eq!(stone_model.particle_icon().name, loc("block/stone"));
        assert!(Arc::ptr_eq(
            snapshot.model(dirt).primary().unwrap(),
            snapshot.missing_model()
        ));
        let ItemModel::Model(item) = snapshot.item_model(&loc("stone")) else {
            panic!("stone item should bake");
        };
        assert!(Arc::ptr_eq(item, stone_model));

        let stats = snapshot.stats();
        assert_eq!(stats.loaded_models, 2);
        assert_eq!(stats.failed_models, 1);
        assert_eq!(stats.dispatch_misses, 1);
        assert!(snapshot.missing_textures().is_empty());
        assert!(snapshot.unreferenced().is_empty());
        assert!(manager.requires_render(stone, dirt));
        assert!(!manager.requires_render(stone, stone));
    }

    #[tokio::test]
    async fn nothing_is_published_before_the_barrier() {
        let (release, gate) = oneshot::channel::<()>();
        let passed = Arc::new(AtomicBool::new(false));
        let flag = passed.clone();
        let barrier = async move {
            let _ = gate.await;
            flag.store(true, Ordering::SeqCst);
        };

        let pending = tokio::spawn(prepare_models(inputs(), barrier));
        tokio::task::yield_now().await;
        assert!(!passed.load(Ordering::SeqCst));
        release.send(()).unwrap();
        let prepared = pending.await.unwrap();
        assert!(passed.load(Ordering::SeqCst));

        let mut manager = ModelManager::default();
        let before = manager.snapshot();
        manager.apply(prepared);
        assert!(!Arc::ptr_eq(&before, &manager.snapshot()));
        // readers holding the old generation keep it intact
        assert_eq!(before.stats().loaded_models, 0);
    }

    #[tokio::test]
    async fn failed_barrier_abandons_the_reload() {
        let (release, gate) = oneshot::channel::<()>();
        drop(release);
        let outcome = try_prepare_models(inputs(), gate).await;
        assert!(outcome.is_err());
    }
}
