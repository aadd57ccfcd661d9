use std::collections::{BTreeMap, HashMap};

use rs_utils::{BlockDefinition, BlockRegistry, BlockStateId, ModelLocation, ResourceLocation};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::discovery::{ResolvableModel, Resolver};
use crate::error::ModelError;
use crate::face_bakery::{BlockModelRotation, ModelState};

/// One model reference with the transform it is baked under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variant {
    pub model: ResourceLocation,
    pub state: ModelState,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Weighted<T> {
    pub weight: u32,
    pub value: T,
}

/// What a block state is bound to before baking. Two states with equal bindings bake to the same
/// geometry, which is what the visual grouping relies on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnbakedBlockStateModel {
    Single(Variant),
    Weighted(Vec<Weighted<Variant>>),
    Composite(Vec<UnbakedBlockStateModel>),
}

impl UnbakedBlockStateModel {
    pub fn for_each_variant(&self, f: &mut impl FnMut(&Variant)) {
        match self {
            Self::Single(variant) => f(variant),
            Self::Weighted(entries) => entries.iter().for_each(|e| f(&e.value)),
            Self::Composite(parts) => parts.iter().for_each(|p| p.for_each_variant(f)),
        }
    }
}

impl ResolvableModel for UnbakedBlockStateModel {
    fn resolve_dependencies(&self, resolver: &mut dyn Resolver) {
        self.for_each_variant(&mut |variant| resolver.mark_dependency(&variant.model));
    }
}

#[derive(Deserialize)]
struct BlockStateFile {
    #[serde(default)]
    variants: Option<BTreeMap<String, VariantValue>>,
    #[serde(default)]
    multipart: Option<Vec<MultipartFile>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VariantValue {
    One(VariantFile),
    Many(Vec<VariantFile>),
}

#[derive(Deserialize)]
struct VariantFile {
    model: ResourceLocation,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default)]
    uvlock: bool,
    #[serde(default = "default_weight")]
    weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Deserialize)]
struct MultipartFile {
    #[serde(default)]
    when: Option<Value>,
    apply: VariantValue,
}

impl VariantFile {
    fn to_variant(&self, id: &ResourceLocation) -> Result<Variant, ModelError> {
        let rotation = BlockModelRotation::from_degrees(self.x, self.y).ok_or_else(|| {
            ModelError::InvalidRotation {
                id: id.clone(),
                x: self.x,
                y: self.y,
            }
        })?;
        Ok(Variant {
            model: self.model.clone(),
            state: ModelState::new(rotation, self.uvlock),
        })
    }
}

impl VariantValue {
    fn to_model(&self, id: &ResourceLocation) -> Result<UnbakedBlockStateModel, ModelError> {
        match self {
            Self::One(file) => Ok(UnbakedBlockStateModel::Single(file.to_variant(id)?)),
            Self::Many(files) if files.len() == 1 => {
                Ok(UnbakedBlockStateModel::Single(files[0].to_variant(id)?))
            }
            Self::Many(files) => files
                .iter()
                .map(|file| {
                    Ok(Weighted {
                        weight: file.weight,
                        value: file.to_variant(id)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(UnbakedBlockStateModel::Weighted),
        }
    }
}

/// A multipart selector.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Always,
    Or(Vec<Condition>),
    And(Vec<Condition>),
    Property {
        name: String,
        values: Vec<String>,
        negate: bool,
    },
}

impl Condition {
    fn parse(id: &ResourceLocation, value: &Value) -> Result<Self, ModelError> {
        let Value::Object(map) = value else {
            return Err(ModelError::InvalidCondition {
                id: id.clone(),
                reason: format!("expected an object, found {value}"),
            });
        };
        if map.len() == 1
            && let Some((key, inner)) = map.iter().next()
            && (key == "OR" || key == "AND")
        {
            let Value::Array(items) = inner else {
                return Err(ModelError::InvalidCondition {
                    id: id.clone(),
                    reason: format!("{key} expects a list"),
                });
            };
            let terms = items
                .iter()
                .map(|item| Self::parse(id, item))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(if key == "OR" {
                Self::Or(terms)
            } else {
                Self::And(terms)
            });
        }

        let mut terms = Vec::with_capacity(map.len());
        for (name, raw) in map {
            let raw = match raw {
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) => raw.to_string(),
                other => {
                    return Err(ModelError::InvalidCondition {
                        id: id.clone(),
                        reason: format!("property {name} has value {other}"),
                    });
                }
            };
            let (negate, list) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.as_str()),
            };
            let values: Vec<String> = list.split('|').map(str::to_string).collect();
            if values.iter().any(String::is_empty) {
                return Err(ModelError::InvalidCondition {
                    id: id.clone(),
                    reason: format!("property {name} has an empty value in {raw}"),
                });
            }
            terms.push(Self::Property {
                name: name.clone(),
                values,
                negate,
            });
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Self::And(terms),
        })
    }

    pub fn test(&self, registry: &BlockRegistry, state: BlockStateId) -> bool {
        match self {
            Self::Always => true,
            Self::Or(terms) => terms.iter().any(|t| t.test(registry, state)),
            Self::And(terms) => terms.iter().all(|t| t.test(registry, state)),
            Self::Property {
                name,
                values,
                negate,
            } => match registry.value(state, name) {
                Some(actual) => values.iter().any(|v| v == actual) != *negate,
                None => false,
            },
        }
    }

    fn unknown_property<'a>(&'a self, block: &BlockDefinition) -> Option<&'a str> {
        match self {
            Self::Always => None,
            Self::Or(terms) | Self::And(terms) => {
                terms.iter().find_map(|t| t.unknown_property(block))
            }
            Self::Property { name, .. } => {
                block.property_index(name).is_none().then_some(name.as_str())
            }
        }
    }

    fn collect_values(&self, out: &mut BTreeMap<String, Vec<String>>) {
        match self {
            Self::Always => {}
            Self::Or(terms) | Self::And(terms) => terms.iter().for_each(|t| t.collect_values(out)),
            Self::Property { name, values, .. } => {
                out.entry(name.clone())
                    .or_default()
                    .extend(values.iter().cloned());
            }
        }
    }
}

/// `facing=east,half=top` as property/value pairs. `""` and `"normal"` select every state.
fn parse_variant_key(id: &ResourceLocation, key: &str) -> Result<Vec<(String, String)>, ModelError> {
    if key.is_empty() || key == "normal" {
        return Ok(Vec::new());
    }
    key.split(',')
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() && !value.is_empty() => {
                Ok((name.to_string(), value.to_string()))
            }
            _ => Err(ModelError::InvalidCondition {
                id: id.clone(),
                reason: format!("malformed variant key {key}"),
            }),
        })
        .collect()
}

/// A parsed `blockstates/*.json` file.
#[derive(Clone, Debug)]
pub struct BlockStateDefinition {
    variants: Vec<(String, Vec<(String, String)>, UnbakedBlockStateModel)>,
    multipart: Vec<(Condition, UnbakedBlockStateModel)>,
}

impl BlockStateDefinition {
    pub fn from_json(id: &ResourceLocation, raw: &str) -> Result<Self, ModelError> {
        let file: BlockStateFile = serde_json::from_str(raw).map_err(|source| ModelError::Json {
            id: id.clone(),
            source,
        })?;
        if file.variants.is_none() && file.multipart.is_none() {
            return Err(ModelError::EmptyBlockState { id: id.clone() });
        }

        let mut variants = Vec::new();
        for (key, value) in file.variants.iter().flatten() {
            variants.push((key.clone(), parse_variant_key(id, key)?, value.to_model(id)?));
        }
        let mut multipart = Vec::new();
        for part in file.multipart.iter().flatten() {
            let condition = match &part.when {
                Some(when) => Condition::parse(id, when)?,
                None => Condition::Always,
            };
            multipart.push((condition, part.apply.to_model(id)?));
        }
        Ok(Self {
            variants,
            multipart,
        })
    }

    /// Binds every state of `block`. Variant keys are tried in sorted order and the first match
    /// wins; states no variant matches take every multipart entry whose condition holds.
    pub fn bind(
        &self,
        id: &ResourceLocation,
        registry: &BlockRegistry,
        block: &BlockDefinition,
        states: impl Iterator<Item = BlockStateId>,
    ) -> Vec<(BlockStateId, UnbakedBlockStateModel)> {
        let variants: Vec<_> = self
            .variants
            .iter()
            .filter(|(key, pairs, _)| {
                let unknown = pairs
                    .iter()
                    .find(|(name, _)| block.property_index(name).is_none());
                if let Some((name, _)) = unknown {
                    warn!("Unknown property '{}' in variant '{}' of {}", name, key, id);
                }
                unknown.is_none()
            })
            .collect();
        let multipart: Vec<_> = self
            .multipart
            .iter()
            .filter(|(condition, _)| match condition.unknown_property(block) {
                Some(name) => {
                    warn!("Unknown property '{}' in multipart condition of {}", name, id);
                    false
                }
                None => true,
            })
            .collect();

        let mut out = Vec::new();
        for state in states {
            let matched = variants.iter().find(|(_, pairs, _)| {
                pairs
                    .iter()
                    .all(|(name, value)| registry.value(state, name) == Some(value.as_str()))
            });
            if let Some((_, _, model)) = matched {
                out.push((state, model.clone()));
                continue;
            }
            if multipart.is_empty() {
                continue;
            }
            let parts: Vec<UnbakedBlockStateModel> = multipart
                .iter()
                .filter(|(condition, _)| condition.test(registry, state))
                .map(|(_, model)| model.clone())
                .collect();
            out.push((state, UnbakedBlockStateModel::Composite(parts)));
        }
        out
    }

    /// Every property and value this file mentions.
    pub fn mentioned_properties(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (_, pairs, _) in &self.variants {
            for (name, value) in pairs {
                out.entry(name.clone()).or_default().push(value.clone());
            }
        }
        for (condition, _) in &self.multipart {
            condition.collect_values(&mut out);
        }
        for values in out.values_mut() {
            values.sort();
            values.dedup();
        }
        out
    }
}

/// Builds a block definition from the properties a blockstate file mentions, for asset sets
/// that ship no block registry of their own.
pub fn infer_block_definition(
    id: &ResourceLocation,
    definition: &BlockStateDefinition,
) -> BlockDefinition {
    definition
        .mentioned_properties()
        .into_iter()
        .fold(BlockDefinition::new(id.clone()), |def, (name, values)| {
            def.with_property(&name, values)
        })
}

/// Parses every blockstate file and binds each registered state to its unbaked model. Files that
/// fail to parse are reported and skipped; their states fall back to the missing model.
pub fn load_block_state_bindings(
    registry: &BlockRegistry,
    raw: &HashMap<ResourceLocation, String>,
) -> HashMap<ModelLocation, UnbakedBlockStateModel> {
    let mut ids: Vec<&ResourceLocation> = raw.keys().collect();
    ids.sort();

    let mut bindings = HashMap::new();
    for id in ids {
        let Some(block_id) = registry.block_by_name(id) else {
            debug!("Skipping blockstate for unregistered block {}", id);
            continue;
        };
        let definition = match BlockStateDefinition::from_json(id, &raw[id]) {
            Ok(definition) => definition,
            Err(err) => {
                warn!("Failed to load blockstate definition: {}", err);
                continue;
            }
        };
        let block = registry.block(block_id);
        for (state, model) in definition.bind(id, registry, block, registry.states_of(block_id)) {
            bindings.insert(registry.model_location(state), model);
        }
    }
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> ResourceLocation {
        ResourceLocation::parse(s)
    }

    fn registry() -> BlockRegistry {
        BlockRegistry::new([
            BlockDefinition::new("minecraft:stone"),
            BlockDefinition::new("minecraft:furnace")
                .with_property("facing", ["north", "east", "south", "west"])
                .with_property("lit", ["false", "true"]),
            BlockDefinition::new("minecraft:oak_fence")
                .with_property("north", ["false", "true"])
                .with_property("east", ["false", "true"]),
        ])
    }

    fn single(model: &str, x: i32, y: i32, uv_lock: bool) -> UnbakedBlockStateModel {
        UnbakedBlockStateModel::Single(Variant {
            model: loc(model),
            state: ModelState::new(BlockModelRotation::from_degrees(x, y).unwrap(), uv_lock),
        })
    }

    fn bindings(files: &[(&str, &str)]) -> (BlockRegistry, HashMap<ModelLocation, UnbakedBlockStateModel>) {
        let registry = registry();
        let raw: HashMap<ResourceLocation, String> = files
            .iter()
            .map(|(id, json)| (loc(id), json.to_string()))
            .collect();
        let bindings = load_block_state_bindings(&registry, &raw);
        (registry, bindings)
    }

    #[test]
    fn normal_variant_binds_every_state() {
        let (registry, bound) = bindings(&[(
            "minecraft:stone",
            r#"{"variants": {"": [{"model": "block/stone"}, {"model": "block/stone_mirrored", "weight": 3}]}}"#,
        )]);
        let stone = registry.block_by_name(&loc("stone")).unwrap();
        let binding = &bound[&registry.model_location(registry.default_state(stone))];
        let UnbakedBlockStateModel::Weighted(entries) = binding else {
            panic!("expected a weighted binding, got {binding:?}");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].weight, 3);
    }

    #[test]
    fn keyed_variants_carry_rotation() {
        let (registry, bound) = bindings(&[(
            "minecraft:furnace",
            r#"{"variants": {
                "facing=east,lit=false": {"model": "block/furnace", "y": 90},
                "facing=east,lit=true": {"model": "block/furnace_on", "y": 90, "uvlock": true},
                "facing=north": {"model": "block/furnace"}
            }}"#,
        )]);
        let furnace = registry.block_by_name(&loc("furnace")).unwrap();
        let state = registry
            .states_of(furnace)
            .find(|s| registry.variant_key(*s) == "facing=east,lit=true")
            .unwrap();
        assert_eq!(bound[&registry.model_location(state)], single("block/furnace_on", 0, 90, true));
        // south and west have no variant.
        assert_eq!(bound.len(), 4);
    }

    #[test]
    fn multipart_collects_matching_parts() {
        let (registry, bound) = bindings(&[(
            "minecraft:oak_fence",
            r#"{"multipart": [
                {"apply": {"model": "block/oak_fence_post"}},
                {"when": {"north": "true"}, "apply": {"model": "block/oak_fence_side", "uvlock": true}},
                {"when": {"OR": [{"east": "true"}, {"north": "true"}]}, "apply": {"model": "block/extra"}}
            ]}"#,
        )]);
        let fence = registry.block_by_name(&loc("oak_fence")).unwrap();
        let state = registry
            .states_of(fence)
            .find(|s| registry.variant_key(*s) == "east=false,north=true")
            .unwrap();
        let UnbakedBlockStateModel::Composite(parts) = &bound[&registry.model_location(state)] else {
            panic!("expected a composite binding");
        };
        assert_eq!(parts.len(), 3);
        let bare = registry.default_state(fence);
        let UnbakedBlockStateModel::Composite(parts) = &bound[&registry.model_location(bare)] else {
            panic!("expected a composite binding");
        };
        assert_eq!(parts, &vec![single("block/oak_fence_post", 0, 0, false)]);
    }

    #[test]
    fn condition_alternatives_and_negation() {
        let id = loc("test");
        let registry = registry();
        let furnace = registry.block_by_name(&loc("furnace")).unwrap();
        let east = registry
            .states_of(furnace)
            .find(|s| registry.variant_key(*s) == "facing=east,lit=false")
            .unwrap();
        let any = Condition::parse(&id, &serde_json::json!({"facing": "east|west"})).unwrap();
        assert!(any.test(&registry, east));
        let not = Condition::parse(&id, &serde_json::json!({"facing": "!east"})).unwrap();
        assert!(!not.test(&registry, east));
        let both = Condition::parse(&id, &serde_json::json!({"facing": "east", "lit": false})).unwrap();
        assert!(both.test(&registry, east));
        assert!(Condition::parse(&id, &serde_json::json!({"OR": {"facing": "east"}})).is_err());
    }

    #[test]
    fn bad_files_are_skipped() {
        let (_, bound) = bindings(&[
            ("minecraft:stone", r#"{"variants": {"": {"model": "block/stone", "x": 45}}}"#),
            ("minecraft:furnace", r#"{}"#),
            ("minecraft:not_a_block", r#"{"variants": {"": {"model": "block/x"}}}"#),
        ]);
        assert!(bound.is_empty());
    }

    #[test]
    fn infers_properties_from_file() {
        let id = loc("minecraft:redstone_wire");
        let definition = BlockStateDefinition::from_json(
            &id,
            r#"{"multipart": [
                {"when": {"OR": [{"north": "side|up"}, {"power": "0"}]}, "apply": {"model": "block/dot"}},
                {"when": {"power": "15"}, "apply": {"model": "block/hot"}}
            ]}"#,
        )
        .unwrap();
        let registry = BlockRegistry::new([infer_block_definition(&id, &definition)]);
        assert_eq!(registry.state_count(), 4);
        let block = registry.block_by_name(&id).unwrap();
        assert_eq!(registry.block(block).properties[0].name, "north");
    }
}
