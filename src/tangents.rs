//! Per-vertex tangents for normal mapping.

use glam::{Quat, Vec2, Vec3};

use crate::data::{Blendshape, Mesh};
use crate::diagnostics::{Diagnostic, Diagnostics};

const EPSILON: f32 = 1e-6;

/// Calls `f(first, second)` for every edge of every triangle and quad.
///
/// Trailing triangle indices that don't make a full triangle are skipped.
fn for_each_edge(mesh: &Mesh, mut f: impl FnMut(usize, usize)) {
    for part in &mesh.parts {
        for quad in part.quad_indices.chunks_exact(4) {
            for k in 0..4 {
                f(quad[k] as usize, quad[(k + 1) % 4] as usize);
            }
        }
        for triangle in part.triangle_indices.chunks_exact(3) {
            for k in 0..3 {
                f(triangle[k] as usize, triangle[(k + 1) % 3] as usize);
            }
        }
    }
}

/// Tangent contribution of the edge `v0 → v1`.
fn edge_tangent(v0: Vec3, v1: Vec3, normal: Vec3, delta_uv: Vec2) -> Option<Vec3> {
    let bitangent = normal.cross(v1 - v0);
    if bitangent.length() < EPSILON {
        return None;
    }
    let normal = normal.normalize();
    let angle = -(-delta_uv.y).atan2(delta_uv.x);
    let rotated = Quat::from_axis_angle(normal, angle) * bitangent.normalize();
    Some(rotated.cross(normal))
}

/// Fills `mesh.tangents` when `generate` is set and the mesh has UVs.
pub(crate) fn create_mesh_tangents(mesh: &mut Mesh, generate: bool, diagnostics: &mut Diagnostics) {
    if !generate || mesh.tex_coords.is_empty() {
        return;
    }
    if mesh.parts.iter().any(|part| part.triangle_indices.len() % 3 != 0) {
        diagnostics.report(Diagnostic::MalformedTriangles(mesh.display_name.clone()));
    }
    let mut tangents = vec![Vec3::ZERO; mesh.vertices.len()];
    let m = &*mesh;
    for_each_edge(m, |first, second| {
        let (Some(&v0), Some(&v1), Some(&n0)) =
            (m.vertices.get(first), m.vertices.get(second), m.normals.get(first))
        else {
            return;
        };
        let (Some(&uv0), Some(&uv1)) = (m.tex_coords.get(first), m.tex_coords.get(second)) else {
            return;
        };
        if let Some(tangent) = edge_tangent(v0, v1, n0, uv1 - uv0) {
            tangents[first] += tangent;
        }
    });
    mesh.tangents = tangents;
}

/// Same as [`create_mesh_tangents`], for every blendshape of the mesh.
///
/// Edges are walked on the base mesh; wherever a blendshape moves a vertex
/// its own position and normal are used.
pub(crate) fn create_blendshape_tangents(mesh: &mut Mesh, generate: bool) {
    if !generate || mesh.tex_coords.is_empty() {
        return;
    }
    let mut blendshapes = std::mem::take(&mut mesh.blendshapes);
    for blendshape in &mut blendshapes {
        blendshape_tangents(mesh, blendshape);
    }
    mesh.blendshapes = blendshapes;
}

fn blendshape_tangents(mesh: &Mesh, blendshape: &mut Blendshape) {
    // Mesh vertex → blendshape slot.
    let mut reverse = vec![None; mesh.vertices.len()];
    for (slot, &index) in blendshape.indices.iter().enumerate() {
        if let Some(r) = reverse.get_mut(index as usize) {
            *r = Some(slot);
        }
    }
    let mut tangents = vec![Vec3::ZERO; blendshape.vertices.len()];
    for_each_edge(mesh, |first, second| {
        let Some(Some(slot)) = reverse.get(first).copied() else {
            return;
        };
        let v1 = match reverse.get(second).copied().flatten() {
            Some(other) => blendshape.vertices.get(other),
            None => mesh.vertices.get(second),
        };
        let (Some(&v0), Some(&v1), Some(&n0)) =
            (blendshape.vertices.get(slot), v1, blendshape.normals.get(slot))
        else {
            return;
        };
        let (Some(&uv0), Some(&uv1)) = (mesh.tex_coords.get(first), mesh.tex_coords.get(second)) else {
            return;
        };
        if let Some(tangent) = edge_tangent(v0, v1, n0, uv1 - uv0) {
            tangents[slot] += tangent;
        }
    });
    blendshape.tangents = tangents;
}
