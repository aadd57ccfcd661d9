use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::resource_location::{ModelLocation, ResourceLocation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle into a [`BlockRegistry`]. Two handles are the same state only if they are equal,
/// regardless of how the states' property values compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockStateId(u32);

impl BlockStateId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RenderShape {
    Invisible,
    #[default]
    Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FluidKind {
    Water,
    Lava,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FluidState {
    #[default]
    Empty,
    Source(FluidKind),
    Flowing {
        fluid: FluidKind,
        amount: u8,
        falling: bool,
    },
}

impl FluidState {
    fn from_level(fluid: FluidKind, level: u8) -> Self {
        match level {
            0 => Self::Source(fluid),
            1..=7 => Self::Flowing {
                fluid,
                amount: 8 - level,
                falling: false,
            },
            _ => Self::Flowing {
                fluid,
                amount: 8,
                falling: true,
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct Property {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct BlockDefinition {
    pub id: ResourceLocation,
    pub properties: Vec<Property>,
    pub render_shape: RenderShape,
    pub fluid: Option<FluidKind>,
}

impl BlockDefinition {
    pub fn new(id: impl Into<ResourceLocation>) -> Self {
        Self {
            id: id.into(),
            properties: Vec::new(),
            render_shape: RenderShape::Model,
            fluid: None,
        }
    }

    pub fn with_property<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if let Some(existing) = self.properties.iter_mut().find(|p| p.name == name) {
            for value in values {
                if !existing.values.contains(&value) {
                    existing.values.push(value);
                }
            }
        } else {
            self.properties.push(Property {
                name: name.to_string(),
                values,
            });
        }
        self
    }

    pub fn invisible(mut self) -> Self {
        self.render_shape = RenderShape::Invisible;
        self
    }

    /// Fluid blocks are drawn by the fluid renderer, so their block model shape is invisible.
    pub fn fluid(mut self, kind: FluidKind) -> Self {
        self.fluid = Some(kind);
        self.render_shape = RenderShape::Invisible;
        self
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct BlockState {
    pub block: BlockId,
    values: Box<[u16]>,
    fluid: FluidState,
}

/// Arena of every block and every block state. States are enumerated once at construction and
/// addressed by [`BlockStateId`] afterwards.
#[derive(Clone, Debug, Default)]
pub struct BlockRegistry {
    blocks: Vec<BlockDefinition>,
    block_states: Vec<Range<u32>>,
    states: Vec<BlockState>,
    by_name: HashMap<ResourceLocation, BlockId>,
}

impl BlockRegistry {
    pub fn new(definitions: impl IntoIterator<Item = BlockDefinition>) -> Self {
        let mut registry = Self::default();
        for mut def in definitions {
            if registry.by_name.contains_key(&def.id) {
                warn!("duplicate block definition {}, keeping the first", def.id);
                continue;
            }
            def.properties.retain(|p| !p.values.is_empty());
            def.properties.sort_by(|a, b| a.name.cmp(&b.name));

            let block = BlockId(registry.blocks.len() as u32);
            let start = registry.states.len() as u32;
            for values in enumerate_values(&def.properties) {
                let fluid = fluid_state_for(&def, &values);
                registry.states.push(BlockState {
                    block,
                    values: values.into_boxed_slice(),
                    fluid,
                });
            }
            let end = registry.states.len() as u32;
            registry.by_name.insert(def.id.clone(), block);
            registry.block_states.push(start..end);
            registry.blocks.push(def);
        }
        registry
    }

    pub fn block(&self, id: BlockId) -> &BlockDefinition {
        &self.blocks[id.index()]
    }

    pub fn block_by_name(&self, name: &ResourceLocation) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BlockDefinition)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, def)| (BlockId(i as u32), def))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> impl Iterator<Item = BlockStateId> + use<> {
        (0..self.states.len() as u32).map(BlockStateId)
    }

    pub fn states_of(&self, block: BlockId) -> impl Iterator<Item = BlockStateId> + use<> {
        self.block_states[block.index()].clone().map(BlockStateId)
    }

    pub fn default_state(&self, block: BlockId) -> BlockStateId {
        BlockStateId(self.block_states[block.index()].start)
    }

    pub fn state(&self, id: BlockStateId) -> &BlockState {
        &self.states[id.index()]
    }

    pub fn block_of(&self, state: BlockStateId) -> &BlockDefinition {
        self.block(self.state(state).block)
    }

    pub fn value(&self, state: BlockStateId, property: &str) -> Option<&str> {
        let st = self.state(state);
        let def = self.block(st.block);
        let idx = def.property_index(property)?;
        Some(def.properties[idx].values[st.values[idx] as usize].as_str())
    }

    pub fn value_at(&self, state: BlockStateId, property_index: usize) -> Option<&str> {
        let st = self.state(state);
        let def = self.block(st.block);
        let prop = def.properties.get(property_index)?;
        Some(prop.values[st.values[property_index] as usize].as_str())
    }

    /// Finds the state of `block` with one property changed.
    pub fn with_value(&self, state: BlockStateId, property: &str, value: &str) -> Option<BlockStateId> {
        let st = self.state(state);
        let def = self.block(st.block);
        let idx = def.property_index(property)?;
        let value_idx = def.properties[idx].values.iter().position(|v| v == value)? as u16;
        self.states_of(st.block).find(|candidate| {
            let other = &self.state(*candidate).values;
            other
                .iter()
                .enumerate()
                .all(|(i, v)| if i == idx { *v == value_idx } else { *v == st.values[i] })
        })
    }

    pub fn render_shape(&self, state: BlockStateId) -> RenderShape {
        self.block_of(state).render_shape
    }

    pub fn fluid_state(&self, state: BlockStateId) -> FluidState {
        self.state(state).fluid
    }

    /// Property values joined as `name=value` pairs in property-name order.
    pub fn variant_key(&self, state: BlockStateId) -> String {
        let st = self.state(state);
        let def = self.block(st.block);
        def.properties
            .iter()
            .zip(st.values.iter())
            .map(|(p, v)| format!("{}={}", p.name, p.values[*v as usize]))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn model_location(&self, state: BlockStateId) -> ModelLocation {
        ModelLocation::new(self.block_of(state).id.clone(), self.variant_key(state))
    }
}

fn enumerate_values(properties: &[Property]) -> Vec<Vec<u16>> {
    let mut out = vec![Vec::with_capacity(properties.len())];
    for prop in properties {
        let mut next = Vec::with_capacity(out.len() * prop.values.len());
        for prefix in &out {
            for i in 0..prop.values.len() {
                let mut values = prefix.clone();
                values.push(i as u16);
                next.push(values);
            }
        }
        out = next;
    }
    out
}

fn fluid_state_for(def: &BlockDefinition, values: &[u16]) -> FluidState {
    let lookup = |name: &str| {
        def.property_index(name)
            .map(|idx| def.properties[idx].values[values[idx] as usize].as_str())
    };
    if let Some(kind) = def.fluid {
        let level = lookup("level")
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(0);
        return FluidState::from_level(kind, level);
    }
    if lookup("waterlogged") == Some("true") {
        return FluidState::Source(FluidKind::Water);
    }
    FluidState::Empty
}
