mod async_reload;
pub mod baked_model;
pub mod bakery;
pub mod block_models;
pub mod block_states;
pub mod block_textures;
pub mod discovery;
mod error;
pub mod face_bakery;
pub mod groups;
pub mod item_model;
pub mod item_transforms;
mod manager;
mod timing;

pub use async_reload::{
    ModelReloadInFlight, ModelReloadOutcome, ModelReloadPlugin, ModelReloadQueue,
    ModelReloadRequest, ModelReloadResources,
};
pub use baked_model::{BlockStateModel, SimpleBakedModel};
pub use bakery::{BakeStats, BakingResult, ModelBakery};
pub use block_models::{MISSING_MODEL, UnbakedModel};
pub use block_states::{
    BlockStateDefinition, UnbakedBlockStateModel, infer_block_definition,
    load_block_state_bindings,
};
pub use block_textures::{
    AtlasSet, AtlasSpriteGetter, AtlasStitcher, GridAtlasStitcher, MISSING_TEXTURE, Material,
    Sprite, SpriteGetter,
};
pub use discovery::{ModelDiscovery, ResolvableModel, ResolvedModels, Resolver};
pub use error::{BakeError, ModelError};
pub use face_bakery::{BakedQuad, BlockModelRotation, ModelState};
pub use groups::{
    ColorSource, INVISIBLE_GROUP, ModelGroupCollector, ModelGroups, SINGLETON_GROUP,
    StaticColorSource,
};
pub use item_model::{ItemModel, UnbakedItemModel, load_item_bindings};
pub use manager::{
    ModelManager, ModelSnapshot, PreparedModels, ReloadInputs, ReloadStage, ReloadStats,
    prepare_models, try_prepare_models,
};
pub use timing::Timing;
