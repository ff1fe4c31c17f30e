//! Geometry.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Quat, Vec3};

use super::{material::Material, mesh::Mesh};
use crate::fbx_transform::GeometricOffset;
use crate::mapping::{JointRole, HUMANIK_JOINTS};
use crate::utils::bbox::Extents;

define_index_type! {
    /// Index into [`Geometry::joints`].
    JointIndex;
}

/// 14-DOP of the vertices bound to a joint, in joint space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeInfo {
    pub avg_point: Vec3,
    /// Max then min support point for each direction.
    pub points: Vec<Vec3>,
    /// Max then negated min projection for each direction.
    pub dots: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    /// `None` for roots. Always lower than the joint's own index.
    pub parent_index: Option<JointIndex>,
    pub is_free: bool,
    /// Self, then ancestors up to the last free one.
    pub free_lineage: Vec<JointIndex>,
    pub distance_to_parent: f32,

    pub translation: Vec3,
    pub pre_transform: Mat4,
    pub pre_rotation: Quat,
    pub rotation: Quat,
    pub post_rotation: Quat,
    pub post_transform: Mat4,
    /// Model space, offset included.
    pub transform: Mat4,
    pub rotation_min: Vec3,
    pub rotation_max: Vec3,

    pub inverse_default_rotation: Quat,
    pub inverse_bind_rotation: Quat,
    pub bind_transform: Mat4,
    pub bind_transform_found_in_cluster: bool,

    pub is_skeleton_joint: bool,
    pub geometric_offset: Option<GeometricOffset>,
    pub shape_info: ShapeInfo,
}

/// Per joint rotation and translation of one animation frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationFrame {
    pub rotations: Vec<Quat>,
    pub translations: Vec<Vec3>,
}

/// Joints the client looks up by role, `None` when the model has none.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpecialJoints {
    pub left_eye: Option<JointIndex>,
    pub right_eye: Option<JointIndex>,
    pub neck: Option<JointIndex>,
    pub root: Option<JointIndex>,
    pub lean: Option<JointIndex>,
    pub head: Option<JointIndex>,
    pub left_hand: Option<JointIndex>,
    pub right_hand: Option<JointIndex>,
    pub left_toe: Option<JointIndex>,
    pub right_toe: Option<JointIndex>,
}

impl SpecialJoints {
    pub fn get(&self, role: JointRole) -> Option<JointIndex> {
        match role {
            JointRole::EyeLeft => self.left_eye,
            JointRole::EyeRight => self.right_eye,
            JointRole::Neck => self.neck,
            JointRole::Root => self.root,
            JointRole::Lean => self.lean,
            JointRole::Head => self.head,
            JointRole::LeftHand => self.left_hand,
            JointRole::RightHand => self.right_hand,
            JointRole::LeftToe => self.left_toe,
            JointRole::RightToe => self.right_toe,
        }
    }

    pub(crate) fn set(&mut self, role: JointRole, index: Option<JointIndex>) {
        let slot = match role {
            JointRole::EyeLeft => &mut self.left_eye,
            JointRole::EyeRight => &mut self.right_eye,
            JointRole::Neck => &mut self.neck,
            JointRole::Root => &mut self.root,
            JointRole::Lean => &mut self.lean,
            JointRole::Head => &mut self.head,
            JointRole::LeftHand => &mut self.left_hand,
            JointRole::RightHand => &mut self.right_hand,
            JointRole::LeftToe => &mut self.left_toe,
            JointRole::RightToe => &mut self.right_toe,
        };
        *slot = index;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightmapSettings {
    pub load_lightmaps: bool,
    pub level: f32,
    pub offset: f32,
}

impl Default for LightmapSettings {
    fn default() -> Self {
        LightmapSettings {
            load_lightmaps: true,
            level: 1.0,
            offset: 0.0,
        }
    }
}

/// Everything the client needs from an FBX model.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub original_url: String,
    pub author: String,
    pub application_name: String,
    /// `GlobalSettings` ambient color.
    pub ambient_color: Vec3,

    /// Depth-first order.
    pub joints: Vec<Joint>,
    pub joint_indices: HashMap<String, JointIndex>,
    pub has_skeleton_joints: bool,

    pub meshes: Vec<Mesh>,
    pub materials: BTreeMap<String, Material>,
    pub animation_frames: Vec<AnimationFrame>,
    pub blendshape_channel_names: Vec<String>,

    /// Scale, rotation and translation from the mapping, centimeters to meters.
    pub offset: Mat4,
    pub bind_extents: Extents,
    pub mesh_extents: Extents,

    pub special_joints: SpecialJoints,
    /// Same order as [`HUMANIK_JOINTS`].
    pub humanik_joints: [Option<JointIndex>; HUMANIK_JOINTS.len()],
    pub neck_pivot: Vec3,
    pub palm_direction: Vec3,

    pub lightmaps: LightmapSettings,
    pub mesh_indices_to_model_names: HashMap<usize, String>,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            original_url: String::new(),
            author: String::new(),
            application_name: String::new(),
            ambient_color: Vec3::ZERO,
            joints: Vec::new(),
            joint_indices: HashMap::new(),
            has_skeleton_joints: false,
            meshes: Vec::new(),
            materials: BTreeMap::new(),
            animation_frames: Vec::new(),
            blendshape_channel_names: Vec::new(),
            offset: Mat4::IDENTITY,
            bind_extents: Extents::new(),
            mesh_extents: Extents::new(),
            special_joints: SpecialJoints::default(),
            humanik_joints: [None; HUMANIK_JOINTS.len()],
            neck_pivot: Vec3::ZERO,
            palm_direction: Vec3::new(0.0, -1.0, 0.0),
            lightmaps: LightmapSettings::default(),
            mesh_indices_to_model_names: HashMap::new(),
        }
    }
}

impl Geometry {
    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|joint| joint.name.as_str())
    }

    pub fn joint_index(&self, name: &str) -> Option<JointIndex> {
        self.joint_indices.get(name).copied()
    }

    pub fn joint(&self, index: JointIndex) -> Option<&Joint> {
        self.joints.get(index.to_usize())
    }

    pub fn has_blended_meshes(&self) -> bool {
        self.meshes.iter().any(|mesh| !mesh.blendshapes.is_empty())
    }

    /// Mesh extents with the mapping offset applied (but no model scale).
    pub fn unscaled_mesh_extents(&self) -> Extents {
        self.mesh_extents.transformed_corners(self.offset)
    }

    /// Whether `point` is inside at least one mesh, treating each mesh as convex.
    pub fn convex_hull_contains(&self, point: Vec3) -> bool {
        if !self.unscaled_mesh_extents().contains_point(point) {
            return false;
        }
        self.meshes
            .iter()
            .any(|mesh| mesh.is_behind_all_primitives(point))
    }

    pub fn model_name_of_mesh(&self, mesh_index: usize) -> Option<&str> {
        self.mesh_indices_to_model_names
            .get(&mesh_index)
            .map(String::as_str)
    }

    /// HumanIK joint by rig name, see [`HUMANIK_JOINTS`].
    pub fn humanik_joint(&self, name: &str) -> Option<JointIndex> {
        let i = HUMANIK_JOINTS.iter().position(|&j| j == name)?;
        self.humanik_joints[i]
    }
}
