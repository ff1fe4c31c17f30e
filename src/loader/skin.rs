//! Meshes in model space: materials, tangents, clusters and skin weights.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec3};
use tracing::debug;

use super::connections::global_transform;
use super::joints::BindOverride;
use crate::data::scene::{RawCluster, SceneObjects};
use crate::data::mesh::WEIGHTS_PER_VERTEX;
use crate::data::{Cluster, Joint, JointIndex, Material, Mesh};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::fbx_transform::extract_translation;
use crate::mesh::ExtractedMesh;
use crate::tangents::{create_blendshape_tangents, create_mesh_tangents};
use crate::utils::bbox::Extents;

/// Vertices bound with at least this weight shape their joint's k-DOP.
const EXPANSION_WEIGHT_THRESHOLD: f32 = 0.25;
const ALMOST_HALF: f32 = 0.499;

/// Skin clusters of a mesh: cluster children of its deformers, in
/// connection order.
fn mesh_clusters<'a>(scene: &'a SceneObjects, mesh_id: &str) -> Vec<(&'a str, &'a RawCluster)> {
    scene
        .child_map
        .values(mesh_id)
        .flat_map(|deformer| scene.child_map.values(deformer))
        .filter_map(|id| Some((id, scene.clusters.get(id)?)))
        .collect()
}

/// Bind pose overrides from every cluster, meshes in id order.
pub(crate) fn collect_bind_overrides<'a>(
    scene: &SceneObjects,
    mesh_ids: impl IntoIterator<Item = &'a String>,
    model_indices: &HashMap<&str, JointIndex>,
) -> Vec<BindOverride> {
    let mut overrides = Vec::new();
    for mesh_id in mesh_ids {
        for (cluster_id, cluster) in mesh_clusters(scene, mesh_id) {
            let joint = scene
                .child_map
                .value(cluster_id)
                .and_then(|id| model_indices.get(id))
                .copied()
                .unwrap_or(JointIndex::new(0));
            overrides.push(BindOverride {
                joint,
                transform_link: cluster.transform_link,
            });
        }
    }
    overrides
}

/// Puts `weight` in a free slot (zero accumulated weight), or in place of the
/// lowest one if it's strictly heavier.
fn assign_weight(accumulators: &mut [f32], indices: &mut [u16], cluster: u16, weight: f32) {
    if let Some(free) = accumulators.iter().position(|&w| w == 0.0) {
        accumulators[free] = weight;
        indices[free] = cluster;
        return;
    }
    let (lowest, lowest_weight) = accumulators
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MAX), |lowest, (k, w)| if w < lowest.1 { (k, w) } else { lowest });
    if weight > lowest_weight {
        accumulators[lowest] = weight;
        indices[lowest] = cluster;
    }
}

/// Quantizes each vertex's accumulated weights so they sum to `u16::MAX`,
/// vertices without any weight stay at zero.
///
/// Rounds by adding [`ALMOST_HALF`] rather than 0.5, matching the weights
/// older importers produced for the same files.
fn normalize_weights(accumulators: &[f32]) -> Vec<u16> {
    accumulators
        .chunks(WEIGHTS_PER_VERTEX)
        .flat_map(|slots| {
            let mut weights = [0u16; WEIGHTS_PER_VERTEX];
            let total: f32 = slots.iter().sum();
            if total > 0.0 {
                let scale = f32::from(u16::MAX) / total;
                for (weight, &slot) in weights.iter_mut().zip(slots) {
                    *weight = (scale * slot + ALMOST_HALF) as u16;
                }
                // Rounding leftovers go to the heaviest slot.
                let sum: i64 = weights.iter().map(|&w| i64::from(w)).sum();
                let heaviest = (0..WEIGHTS_PER_VERTEX)
                    .max_by_key(|&k| weights[k])
                    .unwrap_or(0);
                let fixed = i64::from(weights[heaviest]) + i64::from(u16::MAX) - sum;
                weights[heaviest] = fixed.clamp(0, i64::from(u16::MAX)) as u16;
            }
            weights
        })
        .collect()
}

/// Meshes attached to the skeleton, with what they contribute to the
/// geometry's extents and the joints' k-DOPs.
#[derive(Debug, Default)]
pub(crate) struct SkinnedMeshes {
    pub meshes: Vec<Mesh>,
    pub mesh_indices_to_model_names: HashMap<usize, String>,
    /// Joint space vertices, per joint.
    pub shape_points: Vec<Vec<Vec3>>,
    pub mesh_extents: Extents,
    pub bind_extents: Extents,
}

pub(crate) struct Skinning<'a> {
    pub scene: &'a SceneObjects,
    pub model_indices: &'a HashMap<&'a str, JointIndex>,
    /// Bind overrides already applied.
    pub joints: &'a [Joint],
    pub materials: &'a BTreeMap<String, Material>,
    pub offset: Mat4,
    pub mixamo_hack: bool,
    pub url: &'a str,
}

impl Skinning<'_> {
    pub(crate) fn build(
        &self,
        meshes: BTreeMap<String, ExtractedMesh>,
        diagnostics: &mut Diagnostics,
    ) -> SkinnedMeshes {
        #[cfg(feature = "profile")]
        let _skinning_span = tracing::info_span!("skinning").entered();

        let mut skinned = SkinnedMeshes {
            shape_points: vec![Vec::new(); self.joints.len().max(1)],
            ..Default::default()
        };
        for (mesh_id, extracted) in meshes {
            self.build_mesh(&mesh_id, extracted, &mut skinned, diagnostics);
        }
        skinned
    }

    fn joint_bind_transform(&self, index: JointIndex) -> Mat4 {
        self.joints
            .get(index.to_usize())
            .map_or(Mat4::IDENTITY, |joint| joint.bind_transform)
    }

    fn build_mesh(
        &self,
        mesh_id: &str,
        extracted: ExtractedMesh,
        skinned: &mut SkinnedMeshes,
        diagnostics: &mut Diagnostics,
    ) {
        let scene = self.scene;
        let ExtractedMesh {
            mut mesh,
            new_indices,
            part_material_textures,
            ..
        } = extracted;

        let model_id = if scene.models.contains_key(mesh_id) {
            mesh_id
        } else {
            scene.parent_map.value(mesh_id).unwrap_or_default()
        };
        let model_transform = global_transform(scene, model_id, self.mixamo_hack, diagnostics);
        mesh.model_transform = model_transform;
        for &vertex in &mesh.vertices {
            let point = model_transform.transform_point3(vertex);
            mesh.mesh_extents.add_point(point);
            skinned.mesh_extents.add_point(point);
        }

        // Materials attached to the model, in connection order, match the
        // part material layer values.
        let mut generate_tangents = false;
        let materials = scene
            .child_map
            .values(model_id)
            .filter_map(|child| self.materials.get(child));
        for (material_index, material) in materials.enumerate() {
            let parts = mesh.parts.iter_mut().zip(&part_material_textures);
            for (part, &(part_material, _)) in parts {
                if usize::try_from(part_material) == Ok(material_index) {
                    part.material_id = material.material_id.clone();
                    generate_tangents |= material.need_tangent_space();
                }
            }
        }
        create_mesh_tangents(&mut mesh, generate_tangents, diagnostics);
        create_blendshape_tangents(&mut mesh, generate_tangents);

        let clusters = mesh_clusters(scene, mesh_id);
        for &(cluster_id, cluster) in &clusters {
            let joint_index = match scene
                .child_map
                .value(cluster_id)
                .and_then(|id| self.model_indices.get(id))
            {
                Some(&index) => index,
                None => {
                    let joint_id = scene.child_map.value(cluster_id).unwrap_or_default();
                    diagnostics.report(Diagnostic::JointNotInModelList(joint_id.to_owned()));
                    JointIndex::new(0)
                }
            };
            let mut inverse_bind_matrix = cluster.transform_link.inverse() * model_transform;
            // Not a projection, drop the floating point fuzz of the inverse.
            inverse_bind_matrix.x_axis.w = 0.0;
            inverse_bind_matrix.y_axis.w = 0.0;
            inverse_bind_matrix.z_axis.w = 0.0;
            inverse_bind_matrix.w_axis.w = 1.0;
            mesh.clusters.push(Cluster {
                joint_index,
                inverse_bind_matrix,
            });
            let bind_translation = extract_translation(self.offset * cluster.transform_link);
            skinned.bind_extents.add_point(bind_translation);
        }

        // Rigid: bound to the model itself.
        if mesh.clusters.is_empty() {
            let joint_index = match self.model_indices.get(model_id) {
                Some(&index) => index,
                None => {
                    diagnostics.report(Diagnostic::ModelNotInModelList(model_id.to_owned()));
                    JointIndex::new(0)
                }
            };
            mesh.clusters.push(Cluster {
                joint_index,
                inverse_bind_matrix: Mat4::IDENTITY,
            });
        }

        if clusters.len() > 1 {
            let slot_count = mesh.vertices.len() * WEIGHTS_PER_VERTEX;
            let mut accumulators = vec![0.0f32; slot_count];
            mesh.cluster_indices = vec![0; slot_count];
            for (i, (&(_, cluster), bound)) in clusters.iter().zip(&mesh.clusters).enumerate() {
                let joint = bound.joint_index;
                let mesh_to_joint = self.joint_bind_transform(joint).inverse() * model_transform;
                let mut points = skinned.shape_points.get_mut(joint.to_usize());
                for (&old_index, &weight) in cluster.indices.iter().zip(&cluster.weights) {
                    let duplicates = usize::try_from(old_index)
                        .ok()
                        .and_then(|old_index| new_indices.get(&old_index));
                    for &new_index in duplicates.into_iter().flatten() {
                        let new_index = new_index as usize;
                        let Some(&vertex) = mesh.vertices.get(new_index) else {
                            continue;
                        };
                        if weight >= EXPANSION_WEIGHT_THRESHOLD {
                            if let Some(points) = points.as_deref_mut() {
                                points.push(mesh_to_joint.transform_point3(vertex));
                            }
                        }
                        let slots = new_index * WEIGHTS_PER_VERTEX..(new_index + 1) * WEIGHTS_PER_VERTEX;
                        assign_weight(
                            &mut accumulators[slots.clone()],
                            &mut mesh.cluster_indices[slots],
                            i as u16,
                            weight,
                        );
                    }
                }
            }
            mesh.cluster_weights = normalize_weights(&accumulators);
        } else if let Some(first) = mesh.clusters.first() {
            let joint = first.joint_index;
            let mesh_to_joint = self.joint_bind_transform(joint).inverse() * model_transform;
            if let Some(points) = skinned.shape_points.get_mut(joint.to_usize()) {
                points.extend(mesh.vertices.iter().map(|&v| mesh_to_joint.transform_point3(v)));
            }
            let geometric_offset = self
                .joints
                .get(joint.to_usize())
                .and_then(|joint| joint.geometric_offset);
            if let Some(offset) = geometric_offset {
                let offset = offset.mat();
                for vertex in &mut mesh.vertices {
                    *vertex = offset.transform_point3(*vertex);
                }
            }
        }

        let mesh_index = skinned.meshes.len();
        mesh.display_name = format!("{}#/mesh/{mesh_index}", self.url);
        mesh.model_name = scene.model_names.get(model_id).cloned().unwrap_or_default();
        let named_model = scene
            .oo_child_to_parent
            .get(mesh_id)
            .and_then(|parent| scene.model_names.get(parent));
        if let Some(name) = named_model {
            mesh.model_name = name.clone();
            skinned
                .mesh_indices_to_model_names
                .insert(mesh_index, name.clone());
        }
        debug!(
            "Mesh {mesh_id} ({:?}): {} vertices, {} clusters",
            mesh.model_name,
            mesh.vertices.len(),
            mesh.clusters.len(),
        );
        skinned.meshes.push(mesh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowest_weight_is_evicted_by_a_heavier_one() {
        let mut accumulators = [0.0; 4];
        let mut indices = [0; 4];
        for (cluster, weight) in [0.4, 0.1, 0.3, 0.2].into_iter().enumerate() {
            assign_weight(&mut accumulators, &mut indices, cluster as u16, weight);
        }
        assign_weight(&mut accumulators, &mut indices, 4, 0.05);
        assert_eq!(indices, [0, 1, 2, 3]);
        assign_weight(&mut accumulators, &mut indices, 5, 0.15);
        assert_eq!(indices, [0, 5, 2, 3]);
        assert_eq!(accumulators, [0.4, 0.15, 0.3, 0.2]);
    }

    #[test]
    fn uninfluenced_vertices_stay_at_zero() {
        let weights = normalize_weights(&[0.0; 8]);
        assert_eq!(weights, [0; 8]);
        let weights = normalize_weights(&[0.5, 0.5, 0.0, 0.0]);
        assert_eq!(weights.iter().map(|&w| u32::from(w)).sum::<u32>(), 65535);
    }

    proptest! {
        #[test]
        fn quantized_weights_sum_to_max(slots in prop::collection::vec(0.0f32..1.0, 4)) {
            let weights = normalize_weights(&slots);
            let sum: u32 = weights.iter().map(|&w| u32::from(w)).sum();
            if slots.iter().sum::<f32>() > 0.0 {
                prop_assert_eq!(sum, 65535);
            } else {
                prop_assert_eq!(sum, 0);
            }
        }
    }
}
