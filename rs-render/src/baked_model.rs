use std::sync::Arc;

use rand::Rng;
use rs_utils::Direction;

use crate::block_textures::Sprite;
use crate::face_bakery::BakedQuad;
use crate::item_transforms::ItemTransforms;

/// Immutable, render-ready geometry for one model and transform.
#[derive(Debug)]
pub struct SimpleBakedModel {
    unculled: Vec<BakedQuad>,
    culled: [Vec<BakedQuad>; 6],
    ambient_occlusion: bool,
    gui_3d: bool,
    uses_block_light: bool,
    particle: Arc<Sprite>,
    transforms: ItemTransforms,
}

impl SimpleBakedModel {
    /// `None` yields the quads that are always drawn; `Some(dir)` yields the quads that may be
    /// skipped when the neighbour in `dir` occludes them.
    pub fn quads(&self, direction: Option<Direction>) -> &[BakedQuad] {
        match direction {
            None => &self.unculled,
            Some(dir) => &self.culled[dir.index()],
        }
    }

    pub fn quad_count(&self) -> usize {
        self.unculled.len() + self.culled.iter().map(Vec::len).sum::<usize>()
    }

    pub fn ambient_occlusion(&self) -> bool {
        self.ambient_occlusion
    }

    pub fn is_gui_3d(&self) -> bool {
        self.gui_3d
    }

    pub fn uses_block_light(&self) -> bool {
        self.uses_block_light
    }

    pub fn particle_icon(&self) -> &Arc<Sprite> {
        &self.particle
    }

    pub fn transforms(&self) -> &ItemTransforms {
        &self.transforms
    }
}

pub struct SimpleBakedModelBuilder {
    unculled: Vec<BakedQuad>,
    culled: [Vec<BakedQuad>; 6],
    ambient_occlusion: bool,
    gui_3d: bool,
    uses_block_light: bool,
    particle: Arc<Sprite>,
    transforms: ItemTransforms,
}

impl SimpleBakedModelBuilder {
    pub fn new(particle: Arc<Sprite>) -> Self {
        Self {
            unculled: Vec::new(),
            culled: Default::default(),
            ambient_occlusion: true,
            gui_3d: true,
            uses_block_light: true,
            particle,
            transforms: ItemTransforms::NONE,
        }
    }

    pub fn ambient_occlusion(mut self, value: bool) -> Self {
        self.ambient_occlusion = value;
        self
    }

    pub fn gui_3d(mut self, value: bool) -> Self {
        self.gui_3d = value;
        self
    }

    pub fn uses_block_light(mut self, value: bool) -> Self {
        self.uses_block_light = value;
        self
    }

    pub fn transforms(mut self, transforms: ItemTransforms) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn add_unculled_face(&mut self, quad: BakedQuad) {
        self.unculled.push(quad);
    }

    pub fn add_culled_face(&mut self, direction: Direction, quad: BakedQuad) {
        self.culled[direction.index()].push(quad);
    }

    pub fn build(self) -> SimpleBakedModel {
        SimpleBakedModel {
            unculled: self.unculled,
            culled: self.culled,
            ambient_occlusion: self.ambient_occlusion,
            gui_3d: self.gui_3d,
            uses_block_light: self.uses_block_light,
            particle: self.particle,
            transforms: self.transforms,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WeightedModel {
    pub weight: u32,
    pub model: Arc<SimpleBakedModel>,
}

/// What a block state renders: one baked model, a weighted random choice, or several parts drawn
/// together.
#[derive(Clone, Debug)]
pub enum BlockStateModel {
    Single(Arc<SimpleBakedModel>),
    Weighted {
        entries: Arc<[WeightedModel]>,
        /// Summed wide so that any number of `u32` weights fits.
        total_weight: u64,
    },
    Composite(Arc<[BlockStateModel]>),
}

impl BlockStateModel {
    pub fn weighted(entries: Vec<WeightedModel>) -> Option<Self> {
        let entries: Vec<WeightedModel> = entries.into_iter().filter(|e| e.weight > 0).collect();
        let total_weight = entries.iter().map(|e| u64::from(e.weight)).sum();
        match entries.len() {
            0 => None,
            1 => Some(Self::Single(entries[0].model.clone())),
            _ => Some(Self::Weighted {
                entries: entries.into(),
                total_weight,
            }),
        }
    }

    pub fn collect_parts<'a, R: Rng>(
        &'a self,
        rng: &mut R,
        out: &mut Vec<&'a Arc<SimpleBakedModel>>,
    ) {
        match self {
            Self::Single(model) => out.push(model),
            Self::Weighted {
                entries,
                total_weight,
            } => {
                let mut pick = rng.gen_range(0..*total_weight);
                for entry in entries.iter() {
                    let weight = u64::from(entry.weight);
                    if pick < weight {
                        out.push(&entry.model);
                        return;
                    }
                    pick -= weight;
                }
            }
            Self::Composite(parts) => {
                for part in parts.iter() {
                    part.collect_parts(rng, out);
                }
            }
        }
    }

    pub fn quads<'a, R: Rng>(
        &'a self,
        direction: Option<Direction>,
        rng: &mut R,
    ) -> Vec<&'a BakedQuad> {
        let mut parts = Vec::new();
        self.collect_parts(rng, &mut parts);
        parts
            .into_iter()
            .flat_map(|model| model.quads(direction).iter())
            .collect()
    }

    /// The model whose flags and particle stand for the whole state.
    pub fn primary(&self) -> Option<&Arc<SimpleBakedModel>> {
        match self {
            Self::Single(model) => Some(model),
            Self::Weighted { entries, .. } => entries.first().map(|e| &e.model),
            Self::Composite(parts) => parts.iter().find_map(Self::primary),
        }
    }

    pub fn particle_icon(&self) -> Option<&Arc<Sprite>> {
        self.primary().map(|model| model.particle_icon())
    }
}
