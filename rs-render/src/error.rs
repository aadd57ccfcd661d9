use rs_utils::ResourceLocation;

/// Failures while reading model, block state or item definition files.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to parse {id}: {source}")]
    Json {
        id: ResourceLocation,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid rotation x={x} y={y} in {id}, expected multiples of 90")]
    InvalidRotation { id: ResourceLocation, x: i32, y: i32 },
    #[error("invalid multipart condition in {id}: {reason}")]
    InvalidCondition { id: ResourceLocation, reason: String },
    #[error("unknown item model type {kind} in {id}")]
    UnknownItemModelType { id: ResourceLocation, kind: String },
    #[error("item definition {id} has type minecraft:model but names no model")]
    MissingItemModel { id: ResourceLocation },
    #[error("blockstate {id} has neither variants nor multipart")]
    EmptyBlockState { id: ResourceLocation },
}

/// Failures while baking one model. These never abort a reload; the affected binding falls back
/// to the missing model.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("element in {model} is out of bounds: from {from:?} to {to:?}")]
    ElementBounds {
        model: String,
        from: [f32; 3],
        to: [f32; 3],
    },
    #[error("element in {model} has rotation angle {angle}, expected one of -45, -22.5, 0, 22.5, 45")]
    ElementRotation { model: String, angle: f32 },
    #[error("face {face} in {model} has uv rotation {rotation}, expected 0, 90, 180 or 270")]
    FaceRotation {
        model: String,
        face: &'static str,
        rotation: i32,
    },
    #[error("weighted model {model} has no entries with positive weight")]
    EmptyWeightedList { model: String },
}
