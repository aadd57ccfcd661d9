use std::sync::Arc;

use bevy::math::{Quat, Vec3};
use rs_utils::{Axis, Direction};

use crate::block_models::{BlockElement, BlockElementFace};
use crate::block_textures::Sprite;

/// Whole-model rotation in quarter turns, applied around the block centre (X first, then Y).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BlockModelRotation {
    x_turns: u8,
    y_turns: u8,
}

impl BlockModelRotation {
    pub const IDENTITY: BlockModelRotation = BlockModelRotation {
        x_turns: 0,
        y_turns: 0,
    };

    pub fn from_degrees(x: i32, y: i32) -> Option<Self> {
        if x % 90 != 0 || y % 90 != 0 {
            return None;
        }
        Some(Self {
            x_turns: (x / 90).rem_euclid(4) as u8,
            y_turns: (y / 90).rem_euclid(4) as u8,
        })
    }

    pub fn x_degrees(self) -> i32 {
        self.x_turns as i32 * 90
    }

    pub fn y_degrees(self) -> i32 {
        self.y_turns as i32 * 90
    }

    pub fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }

    pub fn quat(self) -> Quat {
        Quat::from_rotation_y(-(self.y_degrees() as f32).to_radians())
            * Quat::from_rotation_x(-(self.x_degrees() as f32).to_radians())
    }

    pub fn rotate(self, dir: Direction) -> Direction {
        if self.is_identity() {
            return dir;
        }
        Direction::nearest(self.quat() * dir.normal().as_vec3())
    }
}

/// The transform half of a bake request. Together with a model id this is the bake cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ModelState {
    pub rotation: BlockModelRotation,
    pub uv_lock: bool,
}

impl ModelState {
    pub const IDENTITY: ModelState = ModelState {
        rotation: BlockModelRotation::IDENTITY,
        uv_lock: false,
    };

    pub fn new(rotation: BlockModelRotation, uv_lock: bool) -> Self {
        Self { rotation, uv_lock }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BakedQuad {
    /// Block-space positions in `0..=1`.
    pub vertices: [[f32; 3]; 4],
    /// Atlas-space texture coordinates.
    pub uvs: [[f32; 2]; 4],
    pub direction: Direction,
    pub tint_index: i32,
    pub shade: bool,
    pub sprite: Arc<Sprite>,
}

impl BakedQuad {
    pub fn is_tinted(&self) -> bool {
        self.tint_index != -1
    }
}

/// Bakes one element face into a quad. Pure: depends only on its arguments.
pub fn bake_face(
    element: &BlockElement,
    face: &BlockElementFace,
    sprite: Arc<Sprite>,
    direction: Direction,
    state: ModelState,
) -> BakedQuad {
    let mut positions = face_positions(element.from, element.to, direction);
    if let Some(rotation) = &element.rotation {
        let origin = Vec3::from_array(rotation.origin);
        let (axis, others) = match rotation.axis {
            Axis::X => (Vec3::X, Vec3::new(0.0, 1.0, 1.0)),
            Axis::Y => (Vec3::Y, Vec3::new(1.0, 0.0, 1.0)),
            Axis::Z => (Vec3::Z, Vec3::new(1.0, 1.0, 0.0)),
        };
        let quat = Quat::from_axis_angle(axis, rotation.angle.to_radians());
        let rescale = if rotation.rescale && rotation.angle != 0.0 {
            Vec3::ONE + others * (1.0 / rotation.angle.to_radians().cos() - 1.0)
        } else {
            Vec3::ONE
        };
        for p in positions.iter_mut() {
            *p = origin + (quat * (*p - origin)) * rescale;
        }
    }

    let world_direction = state.rotation.rotate(direction);
    let block_quat = state.rotation.quat();
    let centre = Vec3::splat(0.5);
    let mut vertices = [[0.0f32; 3]; 4];
    for (out, p) in vertices.iter_mut().zip(positions.iter()) {
        let v = if state.rotation.is_identity() {
            *p / 16.0
        } else {
            centre + block_quat * (*p / 16.0 - centre)
        };
        *out = v.to_array();
    }

    let model_uvs = if state.uv_lock && !state.rotation.is_identity() {
        locked_uvs(&vertices, world_direction)
    } else {
        let mut uv = corner_uvs(face.uv.unwrap_or_else(|| default_uv(element, direction)));
        rotate_uvs(&mut uv, face.rotation);
        uv
    };
    let uvs = model_uvs.map(|[u, v]| [sprite.u(u), sprite.v(v)]);

    BakedQuad {
        vertices,
        uvs,
        direction: world_direction,
        tint_index: face.tint_index,
        shade: element.shade,
        sprite,
    }
}

/// Corners in the order (u0,v0), (u1,v0), (u1,v1), (u0,v1) of the face's default UV mapping.
fn face_positions(from: [f32; 3], to: [f32; 3], dir: Direction) -> [Vec3; 4] {
    let [x0, y0, z0] = from;
    let [x1, y1, z1] = to;
    let corners = match dir {
        Direction::Down => [[x0, y0, z1], [x1, y0, z1], [x1, y0, z0], [x0, y0, z0]],
        Direction::Up => [[x0, y1, z0], [x1, y1, z0], [x1, y1, z1], [x0, y1, z1]],
        Direction::North => [[x1, y1, z0], [x0, y1, z0], [x0, y0, z0], [x1, y0, z0]],
        Direction::South => [[x0, y1, z1], [x1, y1, z1], [x1, y0, z1], [x0, y0, z1]],
        Direction::West => [[x0, y1, z0], [x0, y1, z1], [x0, y0, z1], [x0, y0, z0]],
        Direction::East => [[x1, y1, z1], [x1, y1, z0], [x1, y0, z0], [x1, y0, z1]],
    };
    corners.map(Vec3::from_array)
}

fn default_uv(element: &BlockElement, dir: Direction) -> [f32; 4] {
    let [x0, y0, z0] = element.from;
    let [x1, y1, z1] = element.to;
    match dir {
        Direction::Down => [x0, 16.0 - z1, x1, 16.0 - z0],
        Direction::Up => [x0, z0, x1, z1],
        Direction::North => [16.0 - x1, 16.0 - y1, 16.0 - x0, 16.0 - y0],
        Direction::South => [x0, 16.0 - y1, x1, 16.0 - y0],
        Direction::West => [z0, 16.0 - y1, z1, 16.0 - y0],
        Direction::East => [16.0 - z1, 16.0 - y1, 16.0 - z0, 16.0 - y0],
    }
}

fn corner_uvs([u0, v0, u1, v1]: [f32; 4]) -> [[f32; 2]; 4] {
    [[u0, v0], [u1, v0], [u1, v1], [u0, v1]]
}

fn rotate_uvs(uv: &mut [[f32; 2]; 4], rotation: i32) {
    let turns = ((rotation / 90) % 4 + 4) % 4;
    for _ in 0..turns {
        let old = *uv;
        uv[0] = old[3];
        uv[1] = old[0];
        uv[2] = old[1];
        uv[3] = old[2];
    }
}

/// Projects the rotated vertices back onto the face plane so the texture stays aligned with the
/// world axes instead of turning with the model.
fn locked_uvs(vertices: &[[f32; 3]; 4], dir: Direction) -> [[f32; 2]; 4] {
    vertices.map(|[x, y, z]| {
        let (u, v) = match dir {
            Direction::Down => (x, 1.0 - z),
            Direction::Up => (x, z),
            Direction::North => (1.0 - x, 1.0 - y),
            Direction::South => (x, 1.0 - y),
            Direction::West => (z, 1.0 - y),
            Direction::East => (1.0 - z, 1.0 - y),
        };
        [u * 16.0, v * 16.0]
    })
}
