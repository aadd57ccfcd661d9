use std::collections::HashMap;

use rs_utils::{
    BlockDefinition, BlockId, BlockRegistry, BlockStateId, ModelLocation, ModelSettings,
    RenderShape, ResourceLocation,
};
use tracing::debug;

use crate::block_states::UnbakedBlockStateModel;

pub const INVISIBLE_GROUP: i32 = 0;
pub const SINGLETON_GROUP: i32 = -1;

/// Names the block properties a block's tint depends on.
pub trait ColorSource: Send + Sync {
    fn coloring_properties(&self, block: &BlockDefinition) -> Vec<String>;
}

/// A fixed table of coloring properties per block.
#[derive(Clone, Debug, Default)]
pub struct StaticColorSource {
    by_block: HashMap<ResourceLocation, Vec<String>>,
}

impl StaticColorSource {
    pub fn new(entries: impl IntoIterator<Item = (ResourceLocation, Vec<String>)>) -> Self {
        Self {
            by_block: entries.into_iter().collect(),
        }
    }

    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self::new(
            settings
                .coloring_properties
                .iter()
                .map(|(block, props)| (ResourceLocation::parse(block), props.clone())),
        )
    }
}

impl ColorSource for StaticColorSource {
    fn coloring_properties(&self, block: &BlockDefinition) -> Vec<String> {
        self.by_block.get(&block.id).cloned().unwrap_or_default()
    }
}

/// Group id per block state. States sharing a positive id look identical, so replacing one with
/// another needs no re-render.
#[derive(Clone, Debug, Default)]
pub struct ModelGroups {
    groups: Vec<i32>,
    group_count: usize,
}

impl ModelGroups {
    pub fn group(&self, state: BlockStateId) -> i32 {
        self.groups
            .get(state.index())
            .copied()
            .unwrap_or(SINGLETON_GROUP)
    }

    /// Number of groups with at least two members.
    pub fn group_count(&self) -> usize {
        self.group_count
    }

    pub fn requires_render(
        &self,
        registry: &BlockRegistry,
        old: BlockStateId,
        new: BlockStateId,
    ) -> bool {
        if old == new {
            return false;
        }
        let group = self.group(old);
        group == SINGLETON_GROUP
            || group != self.group(new)
            || registry.fluid_state(old) != registry.fluid_state(new)
    }
}

type GroupKey<'a> = (&'a UnbakedBlockStateModel, Vec<&'a str>);

pub struct ModelGroupCollector;

impl ModelGroupCollector {
    /// Buckets every bound state by its binding and the values of its coloring properties.
    /// States without a binding stay singletons. States are visited in handle order and buckets
    /// are numbered as first seen, so numbering only changes when the inputs do.
    pub fn build(
        color_source: &dyn ColorSource,
        registry: &BlockRegistry,
        bindings: &HashMap<ModelLocation, UnbakedBlockStateModel>,
    ) -> ModelGroups {
        let mut coloring: HashMap<BlockId, Vec<usize>> = HashMap::new();
        let mut bucket_index: HashMap<GroupKey<'_>, usize> = HashMap::new();
        let mut buckets: Vec<Vec<BlockStateId>> = Vec::new();
        let mut groups = vec![SINGLETON_GROUP; registry.state_count()];

        for state in registry.states() {
            if registry.render_shape(state) == RenderShape::Invisible {
                groups[state.index()] = INVISIBLE_GROUP;
                continue;
            }
            let block_id = registry.state(state).block;
            let properties = coloring.entry(block_id).or_insert_with(|| {
                let block = registry.block(block_id);
                color_source
                    .coloring_properties(block)
                    .iter()
                    .filter_map(|name| block.property_index(name))
                    .collect()
            });
            let values: Vec<&str> = properties
                .iter()
                .filter_map(|idx| registry.value_at(state, *idx))
                .collect();
            // Unbound states dispatch to the missing model; grouping them would hide real changes.
            let Some(token) = bindings.get(&registry.model_location(state)) else {
                continue;
            };
            let next = buckets.len();
            let index = *bucket_index.entry((token, values)).or_insert(next);
            if index == next {
                buckets.push(Vec::new());
            }
            buckets[index].push(state);
        }

        let mut group_count = 0usize;
        for bucket in buckets.iter().filter(|bucket| bucket.len() > 1) {
            group_count += 1;
            for state in bucket {
                groups[state.index()] = group_count as i32;
            }
        }
        debug!(
            "Collected {} model groups over {} states",
            group_count,
            registry.state_count()
        );
        ModelGroups {
            groups,
            group_count,
        }
    }
}
