use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rs_utils::ResourceLocation;
use tracing::{debug, warn};

use crate::block_models::{MISSING_MODEL, UnbakedModel};

/// Receives the model ids a root depends on.
pub trait Resolver {
    fn mark_dependency(&mut self, id: &ResourceLocation);
}

/// Anything that names models: model definitions themselves, block state bindings, item
/// definitions.
pub trait ResolvableModel {
    fn resolve_dependencies(&self, resolver: &mut dyn Resolver);
}

impl ResolvableModel for UnbakedModel {
    fn resolve_dependencies(&self, resolver: &mut dyn Resolver) {
        if let Some(parent) = &self.parent {
            resolver.mark_dependency(parent);
        }
    }
}

struct DependencyCollector(Vec<ResourceLocation>);

impl Resolver for DependencyCollector {
    fn mark_dependency(&mut self, id: &ResourceLocation) {
        self.0.push(id.clone());
    }
}

struct Frame {
    id: ResourceLocation,
    model: Arc<UnbakedModel>,
    pending: Vec<ResourceLocation>,
    in_cycle: bool,
}

/// Computes the set of models reachable from a group of roots.
///
/// The walk is depth first over an explicit stack. A reference to an id that is still on the
/// stack is a cycle: it is reported with its full path, not followed, and every id on the cycle
/// resolves to the missing model. Missing ids also resolve to the missing model.
pub struct ModelDiscovery {
    input: HashMap<ResourceLocation, Arc<UnbakedModel>>,
    missing: Arc<UnbakedModel>,
    referenced: HashMap<ResourceLocation, Arc<UnbakedModel>>,
}

impl ModelDiscovery {
    pub fn new(
        input: HashMap<ResourceLocation, Arc<UnbakedModel>>,
        missing: Arc<UnbakedModel>,
    ) -> Self {
        let mut referenced = HashMap::new();
        referenced.insert(ResourceLocation::parse(MISSING_MODEL), missing.clone());
        Self {
            input,
            missing,
            referenced,
        }
    }

    pub fn add_root(&mut self, root: &dyn ResolvableModel) {
        root.resolve_dependencies(self);
    }

    pub fn referenced_models(&self) -> &HashMap<ResourceLocation, Arc<UnbakedModel>> {
        &self.referenced
    }

    /// Loaded models no root reaches, sorted by id.
    pub fn unreferenced(&self) -> Vec<ResourceLocation> {
        let mut out: Vec<ResourceLocation> = self
            .input
            .keys()
            .filter(|id| !self.referenced.contains_key(*id))
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn log_unreferenced(&self) {
        let unreferenced = self.unreferenced();
        if unreferenced.is_empty() {
            return;
        }
        let list: Vec<String> = unreferenced.iter().map(ToString::to_string).collect();
        debug!("Unreferenced models:\n    {}", list.join("\n    "));
    }

    pub fn into_resolved(self) -> ResolvedModels {
        ResolvedModels {
            models: self.referenced,
            missing: self.missing,
        }
    }

    fn fetch(&self, id: &ResourceLocation) -> Arc<UnbakedModel> {
        match self.input.get(id) {
            Some(model) => model.clone(),
            None => {
                warn!("Missing block model: '{}'", id);
                self.missing.clone()
            }
        }
    }

    fn frame(&self, id: ResourceLocation) -> Frame {
        let model = self.fetch(&id);
        let mut deps = DependencyCollector(Vec::new());
        model.resolve_dependencies(&mut deps);
        // Popped from the back, so reverse to visit in declaration order.
        deps.0.reverse();
        Frame {
            id,
            model,
            pending: deps.0,
            in_cycle: false,
        }
    }

    fn resolve(&mut self, root: &ResourceLocation) {
        if self.referenced.contains_key(root) {
            return;
        }
        let mut stack = vec![self.frame(root.clone())];
        let mut on_stack: HashSet<ResourceLocation> = HashSet::from([root.clone()]);

        while let Some(top) = stack.last_mut() {
            let Some(dep) = top.pending.pop() else {
                let Some(done) = stack.pop() else {
                    break;
                };
                on_stack.remove(&done.id);
                let model = if done.in_cycle {
                    self.missing.clone()
                } else {
                    done.model
                };
                self.referenced.insert(done.id, model);
                continue;
            };

            if self.referenced.contains_key(&dep) {
                continue;
            }
            if on_stack.contains(&dep) {
                let start = stack.iter().position(|f| f.id == dep).unwrap_or(0);
                let path: Vec<String> = stack[start..]
                    .iter()
                    .map(|f| f.id.to_string())
                    .chain(std::iter::once(dep.to_string()))
                    .collect();
                warn!("Detected model loading loop: {}", path.join("->"));
                for frame in &mut stack[start..] {
                    frame.in_cycle = true;
                }
                continue;
            }

            on_stack.insert(dep.clone());
            let next = self.frame(dep);
            stack.push(next);
        }
    }
}

impl Resolver for ModelDiscovery {
    fn mark_dependency(&mut self, id: &ResourceLocation) {
        self.resolve(id);
    }
}

/// Output of discovery: every referenced model, closed under parent links and free of cycles.
#[derive(Clone, Debug)]
pub struct ResolvedModels {
    models: HashMap<ResourceLocation, Arc<UnbakedModel>>,
    missing: Arc<UnbakedModel>,
}

impl ResolvedModels {
    /// A model set containing only the missing model.
    pub fn missing_only(missing: Arc<UnbakedModel>) -> Self {
        ModelDiscovery::new(HashMap::new(), missing).into_resolved()
    }

    pub fn get(&self, id: &ResourceLocation) -> &Arc<UnbakedModel> {
        self.models.get(id).unwrap_or(&self.missing)
    }

    pub fn contains(&self, id: &ResourceLocation) -> bool {
        self.models.contains_key(id)
    }

    pub fn missing(&self) -> &Arc<UnbakedModel> {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn is_missing(&self, id: &ResourceLocation) -> bool {
        Arc::ptr_eq(self.get(id), &self.missing)
    }

    /// Walks from `id` to its root parent, most-derived first.
    pub fn chain<'a>(&'a self, id: &ResourceLocation) -> Vec<&'a UnbakedModel> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);
        loop {
            if !seen.insert(Arc::as_ptr(current)) {
                // Discovery removes cycles; this only guards hand-built model sets.
                break;
            }
            out.push(current.as_ref());
            match &current.parent {
                Some(parent) => current = self.get(parent),
                None => break,
            }
        }
        out
    }
}
