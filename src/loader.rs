use std::collections::BTreeMap;
use std::io::{Read, Seek};

use anyhow::Context;
use glam::Vec3;
use tracing::{debug, info, trace};

use crate::{
    data::{scene::SceneObjects, Geometry, JointIndex},
    diagnostics::{Diagnostic, Diagnostics},
    fbx_transform::extract_translation,
    mapping::Mapping,
    material_loader::consolidate_materials,
    mesh::{add_blendshapes, ExtractedMesh},
    node::Node,
    utils::{fbx_extend::load_node_tree, kdop::compute_shape_info},
};

use self::{
    connections::{link_model_parents, order_models, read_connection, reparent_skinned_models},
    joints::{
        animation_frames, apply_bind_overrides, build_joints, humanik_joints, model_indices,
        special_joints,
    },
    objects::{lightmap_settings, ObjectReader},
    skin::{collect_bind_overrides, Skinning},
};

mod connections;
mod joints;
mod objects;
mod skin;

/// Files exported by mixamo.com get only their own model transform for meshes.
const MIXAMO_APPLICATION: &str = "mixamo.com";

/// Builds a [`Geometry`] out of an FBX node tree.
#[derive(Debug, Clone, Copy)]
pub struct Loader {
    load_lightmaps: bool,
    lightmap_level: f32,
}

impl Default for Loader {
    fn default() -> Self {
        Loader {
            load_lightmaps: true,
            lightmap_level: 1.0,
        }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial lightmap settings, lights in the file may override them.
    pub fn with_lightmaps(mut self, load_lightmaps: bool, level: f32) -> Self {
        self.load_lightmaps = load_lightmaps;
        self.lightmap_level = level;
        self
    }

    /// Reads a binary FBX file and imports it.
    pub fn read<R: Read + Seek>(
        &self,
        reader: R,
        mapping: &Mapping,
        url: &str,
    ) -> anyhow::Result<(Geometry, Diagnostics)> {
        let root = load_node_tree(reader).with_context(|| format!("Failed to read {url}"))?;
        let mut diagnostics = Diagnostics::new(url);
        let geometry = self.load(&root, mapping, url, &mut diagnostics);
        Ok((geometry, diagnostics))
    }

    /// Imports a node tree. Never fails: whatever had to be worked around is
    /// reported to `diagnostics`.
    pub fn load(
        &self,
        root: &Node,
        mapping: &Mapping,
        url: &str,
        diagnostics: &mut Diagnostics,
    ) -> Geometry {
        #[cfg(feature = "profile")]
        let _load_span = tracing::info_span!("load", url).entered();

        info!("Reading FBX: {url}");
        let mut scene = SceneObjects::new();
        let mut reader = ObjectReader::new(mapping);
        for child in &root.children {
            match child.name.as_str() {
                "FBXHeaderExtension" => reader.read_header(child, &mut scene),
                "GlobalSettings" => reader.read_global_settings(child, &mut scene),
                "Objects" => {
                    #[cfg(feature = "profile")]
                    let _objects_span = tracing::info_span!("objects").entered();

                    for object in &child.children {
                        reader.read_object(object, &mut scene, diagnostics);
                    }
                }
                "Connections" => {
                    let connections = child
                        .children
                        .iter()
                        .filter(|c| c.name == "C" || c.name == "Connect");
                    for connection in connections {
                        read_connection(connection, &mut scene, diagnostics);
                    }
                }
                other => trace!("Skipping top level node {other}"),
            }
        }
        debug!(
            "{} models, {} meshes, {} materials, {} unclassified links",
            scene.models.len(),
            scene.meshes.len(),
            scene.materials.len(),
            diagnostics.unclassified_links(),
        );

        let lightmaps = lightmap_settings(&scene, self.load_lightmaps, self.lightmap_level);
        let mut meshes = std::mem::take(&mut scene.meshes);
        assign_blendshapes(&scene, &mut meshes, diagnostics);
        let offset = mapping.offset(scene.unit_scale_factor);

        reparent_skinned_models(&mut scene, diagnostics);
        link_model_parents(&mut scene);

        let order = order_models(&scene, diagnostics);
        let model_indices = model_indices(&order);
        let joints = build_joints(&scene, &order, mapping, offset);
        let animation_frames = animation_frames(&scene, &order, &joints);
        let special_joints = special_joints(&scene, &model_indices);
        let humanik_joints = humanik_joints(&scene, &model_indices);
        let neck_pivot = special_joints
            .neck
            .and_then(|neck| joints.get(neck.to_usize()))
            .map_or(Vec3::ZERO, |neck| extract_translation(neck.transform));

        let materials = consolidate_materials(&scene, lightmaps.load_lightmaps);
        let overrides = collect_bind_overrides(&scene, meshes.keys(), &model_indices);
        let mut joints = apply_bind_overrides(joints, &overrides);
        let skinned = Skinning {
            scene: &scene,
            model_indices: &model_indices,
            joints: &joints,
            materials: &materials,
            offset,
            mixamo_hack: scene.application_name == MIXAMO_APPLICATION,
            url,
        }
        .build(meshes, diagnostics);

        for (joint, points) in joints.iter_mut().zip(&skinned.shape_points) {
            joint.shape_info = compute_shape_info(points);
        }
        let joint_indices = joints
            .iter()
            .enumerate()
            .map(|(i, joint)| (joint.name.clone(), JointIndex::new(i)))
            .collect();
        let has_skeleton_joints = joints.iter().any(|joint| joint.is_skeleton_joint);

        info!(
            "Loaded {url}: {} joints, {} meshes, {} animation frames",
            joints.len(),
            skinned.meshes.len(),
            animation_frames.len(),
        );
        Geometry {
            original_url: url.to_owned(),
            author: scene.author.clone(),
            application_name: scene.application_name.clone(),
            ambient_color: scene.ambient_color,
            joints,
            joint_indices,
            has_skeleton_joints,
            meshes: skinned.meshes,
            materials,
            animation_frames,
            blendshape_channel_names: scene.blendshape_channel_names.clone(),
            offset,
            bind_extents: skinned.bind_extents,
            mesh_extents: skinned.mesh_extents,
            special_joints,
            humanik_joints,
            neck_pivot,
            palm_direction: mapping.palm_direction(),
            lightmaps,
            mesh_indices_to_model_names: skinned.mesh_indices_to_model_names,
        }
    }
}

/// Routes each extracted shape to its mesh: shape → channel → blend
/// deformer → mesh.
fn assign_blendshapes(
    scene: &SceneObjects,
    meshes: &mut BTreeMap<String, ExtractedMesh>,
    diagnostics: &mut Diagnostics,
) {
    for shape in &scene.blendshapes {
        let parent = |id: Option<&str>| id.and_then(|id| scene.parent_map.value(id));
        let channel = parent(Some(shape.id.as_str()));
        let mesh = meshes.get_mut(parent(parent(channel)).unwrap_or_default());
        let Some(mesh) = mesh else {
            diagnostics.report(Diagnostic::OrphanBlendshape(shape.id.clone()));
            continue;
        };
        let channels = channel.and_then(|channel| scene.blendshape_channel_indices.get(channel));
        add_blendshapes(shape, channels.map(Vec::as_slice).unwrap_or_default(), mesh);
    }
}

/// Imports `root` with the default lightmap settings.
pub fn read_fbx(root: &Node, mapping: &Mapping, url: &str, diagnostics: &mut Diagnostics) -> Geometry {
    Loader::default().load(root, mapping, url, diagnostics)
}
