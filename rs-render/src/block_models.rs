use std::collections::{BTreeMap, HashMap, HashSet};

use rs_utils::{Axis, Direction, ResourceLocation};
use serde::{Deserialize, Deserializer};

use crate::block_textures::Material;
use crate::error::{BakeError, ModelError};
use crate::item_transforms::PartialItemTransforms;

pub const MISSING_MODEL: &str = "minecraft:builtin/missing";
pub const PARTICLE_SLOT: &str = "particle";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuiLight {
    #[default]
    Side,
    Front,
}

impl GuiLight {
    pub fn uses_block_light(self) -> bool {
        self == Self::Side
    }
}

/// A texture slot binding: either a material or `#name`, a reference to another slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotValue {
    Material(Material),
    Reference(String),
}

impl SlotValue {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('#') {
            Some(slot) => Self::Reference(slot.to_string()),
            None => Self::Material(Material::block(ResourceLocation::parse(raw))),
        }
    }
}

fn deserialize_slots<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<HashMap<String, SlotValue>, D::Error> {
    let raw = Option::<HashMap<String, String>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(slot, value)| (slot, SlotValue::parse(&value)))
        .collect())
}

/// A model definition as written on disk. Nothing here is resolved against the parent chain;
/// that happens when the model is baked.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UnbakedModel {
    #[serde(default)]
    pub parent: Option<ResourceLocation>,
    #[serde(default, deserialize_with = "deserialize_slots")]
    pub textures: HashMap<String, SlotValue>,
    #[serde(default, rename = "ambientocclusion")]
    pub ambient_occlusion: Option<bool>,
    #[serde(default)]
    pub gui_light: Option<GuiLight>,
    #[serde(default, rename = "display")]
    pub transforms: PartialItemTransforms,
    #[serde(default)]
    pub elements: Option<Vec<BlockElement>>,
}

impl UnbakedModel {
    pub fn from_json(id: &ResourceLocation, raw: &str) -> Result<Self, ModelError> {
        serde_json::from_str(raw).map_err(|source| ModelError::Json {
            id: id.clone(),
            source,
        })
    }
}

/// Placeholder used wherever a model is missing or part of a reference cycle.
pub fn missing_model() -> UnbakedModel {
    let faces = Direction::ALL
        .into_iter()
        .map(|dir| {
            (
                dir,
                BlockElementFace {
                    texture: "#missing".to_string(),
                    cullface: Some(dir),
                    uv: None,
                    rotation: 0,
                    tint_index: -1,
                },
            )
        })
        .collect();
    UnbakedModel {
        parent: None,
        textures: HashMap::from([
            (PARTICLE_SLOT.to_string(), SlotValue::Material(Material::missing())),
            ("missing".to_string(), SlotValue::Material(Material::missing())),
        ]),
        ambient_occlusion: None,
        gui_light: None,
        transforms: PartialItemTransforms::default(),
        elements: Some(vec![BlockElement {
            from: [0.0; 3],
            to: [16.0; 3],
            rotation: None,
            shade: true,
            faces,
        }]),
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BlockElement {
    pub from: [f32; 3],
    pub to: [f32; 3],
    #[serde(default)]
    pub rotation: Option<ElementRotation>,
    #[serde(default = "default_true")]
    pub shade: bool,
    #[serde(default)]
    pub faces: BTreeMap<Direction, BlockElementFace>,
}

fn default_true() -> bool {
    true
}

impl BlockElement {
    pub fn validate(&self, model: &str) -> Result<(), BakeError> {
        let in_bounds = |v: &[f32; 3]| v.iter().all(|c| (-16.0..=32.0).contains(c));
        if !in_bounds(&self.from) || !in_bounds(&self.to) {
            return Err(BakeError::ElementBounds {
                model: model.to_string(),
                from: self.from,
                to: self.to,
            });
        }
        if let Some(rotation) = &self.rotation
            && ![-45.0, -22.5, 0.0, 22.5, 45.0].contains(&rotation.angle)
        {
            return Err(BakeError::ElementRotation {
                model: model.to_string(),
                angle: rotation.angle,
            });
        }
        for (dir, face) in &self.faces {
            if face.rotation.rem_euclid(90) != 0 || !(0..360).contains(&face.rotation) {
                return Err(BakeError::FaceRotation {
                    model: model.to_string(),
                    face: dir.name(),
                    rotation: face.rotation,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ElementRotation {
    pub origin: [f32; 3],
    pub axis: Axis,
    pub angle: f32,
    #[serde(default)]
    pub rescale: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BlockElementFace {
    pub texture: String,
    #[serde(default)]
    pub cullface: Option<Direction>,
    #[serde(default)]
    pub uv: Option<[f32; 4]>,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default = "no_tint", rename = "tintindex")]
    pub tint_index: i32,
}

fn no_tint() -> i32 {
    -1
}

/// Texture slots flattened over a parent chain, with `#` references followed.
#[derive(Clone, Debug, Default)]
pub struct ResolvedTextureSlots {
    materials: HashMap<String, Material>,
}

impl ResolvedTextureSlots {
    /// `chain` runs from the most-derived model to the root. The first binding seen for a slot
    /// wins.
    pub fn resolve<'a>(chain: impl IntoIterator<Item = &'a UnbakedModel>) -> Self {
        let mut flat: HashMap<&str, &SlotValue> = HashMap::new();
        for model in chain {
            for (slot, value) in &model.textures {
                flat.entry(slot.as_str()).or_insert(value);
            }
        }

        let mut materials = HashMap::with_capacity(flat.len());
        for slot in flat.keys() {
            if let Some(material) = follow_reference(&flat, slot) {
                materials.insert(slot.to_string(), material.clone());
            }
        }
        Self { materials }
    }

    pub fn get(&self, slot: &str) -> Option<&Material> {
        self.materials.get(slot.strip_prefix('#').unwrap_or(slot))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

fn follow_reference<'a>(flat: &HashMap<&str, &'a SlotValue>, start: &str) -> Option<&'a Material> {
    let mut seen = HashSet::new();
    let mut current = start;
    loop {
        if !seen.insert(current) {
            return None;
        }
        match flat.get(current)? {
            SlotValue::Material(material) => return Some(material),
            SlotValue::Reference(next) => current = next.as_str(),
        }
    }
}
