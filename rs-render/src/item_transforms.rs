use std::collections::{BTreeMap, HashMap};

use bevy::math::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Deserializer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemDisplayContext {
    ThirdPersonRightHand,
    ThirdPersonLeftHand,
    FirstPersonRightHand,
    FirstPersonLeftHand,
    Head,
    Gui,
    Ground,
    Fixed,
}

impl ItemDisplayContext {
    pub const ALL: [ItemDisplayContext; 8] = [
        Self::ThirdPersonRightHand,
        Self::ThirdPersonLeftHand,
        Self::FirstPersonRightHand,
        Self::FirstPersonLeftHand,
        Self::Head,
        Self::Gui,
        Self::Ground,
        Self::Fixed,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "thirdperson_righthand" => Some(Self::ThirdPersonRightHand),
            "thirdperson_lefthand" => Some(Self::ThirdPersonLeftHand),
            "firstperson_righthand" => Some(Self::FirstPersonRightHand),
            "firstperson_lefthand" => Some(Self::FirstPersonLeftHand),
            "head" => Some(Self::Head),
            "gui" => Some(Self::Gui),
            "ground" => Some(Self::Ground),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }

    /// The right-hand context a left-hand context inherits from when unset.
    pub const fn right_hand_counterpart(self) -> Option<Self> {
        match self {
            Self::ThirdPersonLeftHand => Some(Self::ThirdPersonRightHand),
            Self::FirstPersonLeftHand => Some(Self::FirstPersonRightHand),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemTransform {
    pub rotation: Vec3,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl ItemTransform {
    pub const IDENTITY: ItemTransform = ItemTransform {
        rotation: Vec3::ZERO,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }
}

impl Default for ItemTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Deserialize)]
struct ItemTransformFile {
    #[serde(default)]
    rotation: [f32; 3],
    #[serde(default)]
    translation: [f32; 3],
    #[serde(default = "unit_scale")]
    scale: [f32; 3],
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

impl<'de> Deserialize<'de> for ItemTransform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = ItemTransformFile::deserialize(deserializer)?;
        let translation = Vec3::from_array(raw.translation).clamp(Vec3::splat(-80.0), Vec3::splat(80.0));
        Ok(Self {
            rotation: Vec3::from_array(raw.rotation),
            translation: translation / 16.0,
            scale: Vec3::from_array(raw.scale).clamp(Vec3::splat(-4.0), Vec3::splat(4.0)),
        })
    }
}

/// Display transforms declared by a single model file. Contexts it does not mention are
/// inherited from its parent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialItemTransforms(BTreeMap<ItemDisplayContext, ItemTransform>);

impl PartialItemTransforms {
    pub fn get(&self, context: ItemDisplayContext) -> Option<&ItemTransform> {
        self.0.get(&context)
    }

    pub fn insert(&mut self, context: ItemDisplayContext, transform: ItemTransform) {
        self.0.insert(context, transform);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for PartialItemTransforms {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, ItemTransform>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .filter_map(|(name, transform)| {
                    ItemDisplayContext::from_name(&name).map(|ctx| (ctx, transform))
                })
                .collect(),
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemTransforms {
    transforms: [ItemTransform; 8],
}

impl Default for ItemTransforms {
    fn default() -> Self {
        Self::NONE
    }
}

impl ItemTransforms {
    pub const NONE: ItemTransforms = ItemTransforms {
        transforms: [ItemTransform::IDENTITY; 8],
    };

    /// Takes each context from the most-derived model that declares it. Left-hand contexts that
    /// no model declares fall back to the resolved right-hand transform.
    pub fn resolve<'a>(chain: impl IntoIterator<Item = &'a PartialItemTransforms> + Clone) -> Self {
        let mut out = Self::NONE;
        let mut declared = [false; 8];
        for ctx in ItemDisplayContext::ALL {
            if let Some(found) = chain.clone().into_iter().find_map(|partial| partial.get(ctx)) {
                out.transforms[ctx.index()] = *found;
                declared[ctx.index()] = true;
            }
        }
        for ctx in ItemDisplayContext::ALL {
            if let Some(right) = ctx.right_hand_counterpart()
                && !declared[ctx.index()]
            {
                out.transforms[ctx.index()] = out.transforms[right.index()];
            }
        }
        out
    }

    pub fn get(&self, context: ItemDisplayContext) -> &ItemTransform {
        &self.transforms[context.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(json: &str) -> PartialItemTransforms {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn translation_is_clamped_and_scaled() {
        let p = partial(r#"{"gui": {"translation": [160, 8, -16], "scale": [5, 0.5, 1]}}"#);
        let gui = p.get(ItemDisplayContext::Gui).unwrap();
        assert_eq!(gui.translation, Vec3::new(5.0, 0.5, -1.0));
        assert_eq!(gui.scale, Vec3::new(4.0, 0.5, 1.0));
        assert_eq!(gui.rotation, Vec3::ZERO);
    }

    #[test]
    fn unknown_contexts_are_ignored() {
        let p = partial(r#"{"on_shelf": {"scale": [2, 2, 2]}, "head": {}}"#);
        assert!(p.get(ItemDisplayContext::Head).is_some());
        assert_eq!(*p.get(ItemDisplayContext::Head).unwrap(), ItemTransform::IDENTITY);
    }

    #[test]
    fn child_shadows_parent_per_context() {
        let child = partial(r#"{"gui": {"rotation": [30, 45, 0]}}"#);
        let parent = partial(
            r#"{"gui": {"rotation": [0, 0, 0]}, "thirdperson_righthand": {"rotation": [75, 45, 0]}}"#,
        );
        let resolved = ItemTransforms::resolve([&child, &parent]);
        assert_eq!(resolved.get(ItemDisplayContext::Gui).rotation, Vec3::new(30.0, 45.0, 0.0));
        let right = resolved.get(ItemDisplayContext::ThirdPersonRightHand);
        assert_eq!(right.rotation, Vec3::new(75.0, 45.0, 0.0));
        assert_eq!(resolved.get(ItemDisplayContext::ThirdPersonLeftHand), right);
        assert_eq!(*resolved.get(ItemDisplayContext::Fixed), ItemTransform::IDENTITY);
    }
}
