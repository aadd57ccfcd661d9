use std::path::{Path, PathBuf};

pub mod block_state;
pub mod direction;
pub mod resource_location;
pub mod settings;

pub use block_state::{
    BlockDefinition, BlockId, BlockRegistry, BlockState, BlockStateId, FluidKind, FluidState,
    Property, RenderShape,
};
pub use direction::{Axis, Direction};
pub use resource_location::{DEFAULT_NAMESPACE, ModelLocation, ResourceLocation};
pub use settings::{ModelSettings, SettingsError};

pub const ASSETS_ROOT_ENV: &str = "RUSTSTONE_ASSETS_ROOT";

/// First existing candidate of: the `RUSTSTONE_ASSETS_ROOT` directory, `assets/` next to the
/// executable, the workspace `assets/`. Falls back to a relative `assets`.
pub fn default_assets_root() -> PathBuf {
    let from_env = std::env::var_os(ASSETS_ROOT_ENV).map(PathBuf::from);
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("assets")));
    let workspace = Some(Path::new(env!("CARGO_MANIFEST_DIR")).join("../assets"));

    [from_env, beside_exe, workspace]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.is_dir())
        .unwrap_or_else(|| PathBuf::from("assets"))
}

/// `<root>/<namespace>`, the directory holding `models/`, `blockstates/`, `items/` and
/// `textures/` for one namespace.
pub fn namespace_root(assets_root: &Path, namespace: &str) -> PathBuf {
    assets_root.join(namespace)
}
