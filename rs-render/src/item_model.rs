use std::collections::HashMap;
use std::sync::Arc;

use rs_utils::{DEFAULT_NAMESPACE, ResourceLocation};
use serde::Deserialize;
use tracing::warn;

use crate::baked_model::SimpleBakedModel;
use crate::discovery::{ResolvableModel, Resolver};
use crate::error::ModelError;

/// An `items/*.json` definition before baking.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnbakedItemModel {
    Model { model: ResourceLocation },
    Empty,
}

impl ResolvableModel for UnbakedItemModel {
    fn resolve_dependencies(&self, resolver: &mut dyn Resolver) {
        if let Self::Model { model } = self {
            resolver.mark_dependency(model);
        }
    }
}

#[derive(Clone, Debug)]
pub enum ItemModel {
    Model(Arc<SimpleBakedModel>),
    Empty,
}

impl ItemModel {
    pub fn baked(&self) -> Option<&Arc<SimpleBakedModel>> {
        match self {
            Self::Model(model) => Some(model),
            Self::Empty => None,
        }
    }
}

#[derive(Deserialize)]
struct ItemFile {
    model: ItemModelFile,
}

#[derive(Deserialize)]
struct ItemModelFile {
    #[serde(rename = "type")]
    kind: ResourceLocation,
    #[serde(default)]
    model: Option<ResourceLocation>,
}

pub fn parse_item_definition(id: &ResourceLocation, raw: &str) -> Result<UnbakedItemModel, ModelError> {
    let file: ItemFile = serde_json::from_str(raw).map_err(|source| ModelError::Json {
        id: id.clone(),
        source,
    })?;
    let ItemModelFile { kind, model } = file.model;
    if kind.namespace() != DEFAULT_NAMESPACE {
        return Err(ModelError::UnknownItemModelType {
            id: id.clone(),
            kind: kind.to_string(),
        });
    }
    match kind.path() {
        "model" => model
            .map(|model| UnbakedItemModel::Model { model })
            .ok_or_else(|| ModelError::MissingItemModel { id: id.clone() }),
        "empty" => Ok(UnbakedItemModel::Empty),
        _ => Err(ModelError::UnknownItemModelType {
            id: id.clone(),
            kind: kind.to_string(),
        }),
    }
}

/// Parses every item definition. Failures are reported and the item is left unbound, so lookups
/// fall back to the missing model.
pub fn load_item_bindings(
    raw: &HashMap<ResourceLocation, String>,
) -> HashMap<ResourceLocation, UnbakedItemModel> {
    raw.iter()
        .filter_map(|(id, json)| match parse_item_definition(id, json) {
            Ok(model) => Some((id.clone(), model)),
            Err(err) => {
                warn!("Failed to load item definition: {}", err);
                None
            }
        })
        .collect()
}
