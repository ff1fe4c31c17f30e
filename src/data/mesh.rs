//! Mesh.

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3};

use super::geometry::JointIndex;
use crate::utils::bbox::Extents;

/// Number of (cluster index, weight) slots per vertex of a skinned mesh.
pub const WEIGHTS_PER_VERTEX: usize = 4;

/// A subset of a mesh's polygons sharing one material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshPart {
    pub triangle_indices: Vec<u32>,
    pub quad_indices: Vec<u32>,
    /// Id of the assigned material, empty if none.
    pub material_id: String,
}

/// A joint a mesh is bound to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub joint_index: JointIndex,
    /// `inverse(transformLink) · modelTransform`; identity for rigid binding.
    pub inverse_bind_matrix: Mat4,
}

/// Sparse morph target, deltas relative to the owning mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blendshape {
    pub indices: Vec<u32>,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub parts: Vec<MeshPart>,

    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub colors: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub tex_coords1: Vec<Vec2>,
    /// UV set name → channel (`0` is `tex_coords`, `1` is `tex_coords1`).
    pub texcoord_set_map: HashMap<String, usize>,

    pub clusters: Vec<Cluster>,
    /// [`WEIGHTS_PER_VERTEX`] indices into `clusters` per vertex, only for
    /// meshes skinned to several clusters.
    pub cluster_indices: Vec<u16>,
    /// [`WEIGHTS_PER_VERTEX`] weights per vertex, summing to `u16::MAX`.
    pub cluster_weights: Vec<u16>,

    /// Indexed by blendshape channel.
    pub blendshapes: Vec<Blendshape>,

    pub mesh_extents: Extents,
    pub model_transform: Mat4,

    pub mesh_index: usize,
    pub display_name: String,
    pub model_name: String,
}

impl Default for Mesh {
    fn default() -> Self {
        Mesh {
            parts: Vec::new(),
            vertices: Vec::new(),
            normals: Vec::new(),
            tangents: Vec::new(),
            colors: Vec::new(),
            tex_coords: Vec::new(),
            tex_coords1: Vec::new(),
            texcoord_set_map: HashMap::new(),
            clusters: Vec::new(),
            cluster_indices: Vec::new(),
            cluster_weights: Vec::new(),
            blendshapes: Vec::new(),
            mesh_extents: Extents::new(),
            model_transform: Mat4::IDENTITY,
            mesh_index: 0,
            display_name: String::new(),
            model_name: String::new(),
        }
    }
}

impl Mesh {
    /// Cluster indices and weights of vertex `i`, if skinned to several clusters.
    pub fn vertex_weights(&self, i: usize) -> Option<(&[u16], &[u16])> {
        let range = i * WEIGHTS_PER_VERTEX..(i + 1) * WEIGHTS_PER_VERTEX;
        Some((
            self.cluster_indices.get(range.clone())?,
            self.cluster_weights.get(range)?,
        ))
    }

    /// Whether `point` lies behind every primitive of the mesh.
    ///
    /// Primitives with out of range indices are skipped.
    pub(crate) fn is_behind_all_primitives(&self, point: Vec3) -> bool {
        let behind = |indices: &[u32], stride: usize| {
            indices.chunks(stride).filter(|c| c.len() >= 3).all(|c| {
                let at = |k: usize| self.vertices.get(c[k] as usize).copied();
                match (at(0), at(1), at(2)) {
                    (Some(p0), Some(p1), Some(p2)) => is_point_behind_triangle_plane(point, p0, p1, p2),
                    _ => true,
                }
            })
        };
        self.parts
            .iter()
            .all(|part| behind(&part.triangle_indices, 3) && behind(&part.quad_indices, 4))
    }
}

/// Counter-clockwise triangles face outward.
fn is_point_behind_triangle_plane(point: Vec3, p0: Vec3, p1: Vec3, p2: Vec3) -> bool {
    let normal = (p1 - p0).cross(p2 - p0);
    normal.dot(point - p0) <= 0.0
}
