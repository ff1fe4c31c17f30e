//! The object pass: header, global settings and every record of `Objects`.

use std::collections::HashMap;

use glam::Mat4;
use tracing::{debug, trace};

use crate::data::scene::{ExtractedBlendshape, Light, RawCluster, SceneObjects};
use crate::data::LightmapSettings;
use crate::diagnostics::Diagnostics;
use crate::fbx_transform::ModelTransformBuilder;
use crate::mapping::{JointRole, Mapping, HUMANIK_JOINTS};
use crate::material_loader::extract_material;
use crate::mesh::{add_blendshapes, extract_blendshape, extract_mesh};
use crate::node::{get_id, get_name, property_entries, Node};
use crate::texture::{extract_texture, extract_video};

/// Reads objects into a [`SceneObjects`], resolving names through a mapping.
pub(crate) struct ObjectReader {
    blendshape_indices: HashMap<String, Vec<(usize, f32)>>,
    /// Names matching each role, in [`JointRole::ALL`] order.
    role_names: Vec<(JointRole, Vec<String>)>,
    humanik_names: Vec<String>,
    mesh_index: usize,
}

impl ObjectReader {
    pub(crate) fn new(mapping: &Mapping) -> Self {
        let role_names = JointRole::ALL
            .iter()
            .map(|&role| {
                let mapped = role.mapping_key().map(|key| mapping.joint_name(key));
                let aliases = role.aliases().iter().map(|&a| a.to_owned());
                (role, mapped.into_iter().chain(aliases).collect())
            })
            .collect();
        ObjectReader {
            blendshape_indices: mapping.blendshape_indices(),
            role_names,
            humanik_names: HUMANIK_JOINTS.iter().map(|j| mapping.joint_name(j)).collect(),
            mesh_index: 0,
        }
    }

    /// Author and exporting application.
    pub(crate) fn read_header(&self, header: &Node, scene: &mut SceneObjects) {
        for scene_info in header.children_by_name("SceneInfo") {
            for child in &scene_info.children {
                if child.name == "MetaData" {
                    if let Some(author) = child.first_child_by_name("Author") {
                        scene.author = author.property(0).map(|p| p.to_text()).unwrap_or_default();
                    }
                    continue;
                }
                for entry in property_entries(child) {
                    if let ("Original|ApplicationName", Some(value)) = (entry.name, entry.value()) {
                        scene.application_name = value.to_text();
                    }
                }
            }
        }
    }

    pub(crate) fn read_global_settings(&self, settings: &Node, scene: &mut SceneObjects) {
        for block in settings.children_by_name("Properties70") {
            for entry in property_entries(block) {
                match entry.name {
                    "UnitScaleFactor" => scene.unit_scale_factor = entry.f32(),
                    "AmbientColor" => scene.ambient_color = entry.vec3(),
                    _ => {}
                }
            }
        }
    }

    pub(crate) fn read_object(
        &mut self,
        object: &Node,
        scene: &mut SceneObjects,
        diagnostics: &mut Diagnostics,
    ) {
        let id = get_id(&object.properties, 0);
        match object.name.as_str() {
            "Geometry" => {
                let is_mesh = object.property(2).map_or(false, |p| p.to_text() == "Mesh");
                if is_mesh {
                    let mesh = extract_mesh(object, self.next_mesh_index());
                    scene.meshes.insert(id, mesh);
                } else {
                    let blendshape = extract_blendshape(object);
                    scene.blendshapes.push(ExtractedBlendshape { id, blendshape });
                }
            }
            "Model" => self.read_model(object, id, scene, diagnostics),
            "Texture" => {
                scene.textures.insert(id, extract_texture(object));
            }
            "Video" => {
                if let Some((filepath, content)) = extract_video(object) {
                    scene.texture_content.insert(filepath, content);
                }
            }
            "Material" => {
                scene.materials.insert(id, extract_material(object));
            }
            "NodeAttribute" => read_node_attribute(object, id, scene),
            "Deformer" => self.read_deformer(object, id, scene),
            "AnimationCurve" => {
                let values = object
                    .first_child_by_name("KeyValueFloat")
                    .map(Node::f32_values)
                    .unwrap_or_default();
                scene.animation_curves.insert(id, values);
            }
            other => trace!("Skipping object {other}"),
        }
    }

    fn next_mesh_index(&mut self) -> usize {
        let index = self.mesh_index;
        self.mesh_index += 1;
        index
    }

    fn read_model(
        &mut self,
        object: &Node,
        id: String,
        scene: &mut SceneObjects,
        diagnostics: &mut Diagnostics,
    ) {
        let name = get_name(&object.properties);
        scene.model_names.insert(id.clone(), name.clone());
        if name.to_lowercase().starts_with("hifi") {
            scene.hifi_global_node = Some(id.clone());
        }
        let role = self
            .role_names
            .iter()
            .find(|(_, names)| names.contains(&name))
            .map(|(role, _)| *role);
        if let Some(role) = role {
            scene.special_joint_ids.insert(role, id.clone());
        }
        if let Some(i) = self.humanik_names.iter().position(|n| *n == name) {
            scene.humanik_ids[i] = Some(id.clone());
        }

        let mut builder = ModelTransformBuilder::default();
        let mut mesh = None;
        let mut shapes = Vec::new();
        for child in &object.children {
            match child.name.as_str() {
                // 6.x: the model holds its own mesh and shapes
                "Vertices" => mesh = Some(extract_mesh(object, self.next_mesh_index())),
                "Shape" => shapes.push(ExtractedBlendshape {
                    id: child.property(0).map(|p| p.to_text()).unwrap_or_default(),
                    blendshape: extract_blendshape(child),
                }),
                _ => {
                    for entry in property_entries(child) {
                        builder.apply(&entry, diagnostics);
                    }
                }
            }
        }
        if let Some(mut mesh) = mesh {
            for shape in &shapes {
                let channels = self.blendshape_indices.get(&shape.id);
                let channels = channels.map(Vec::as_slice).unwrap_or_default();
                add_blendshapes(shape, channels, &mut mesh);
            }
            scene.meshes.insert(id.clone(), mesh);
        }
        debug!("Model {name:?} ({id})");
        scene.models.insert(id, builder.build(name));
    }

    fn read_deformer(&self, object: &Node, id: String, scene: &mut SceneObjects) {
        let kind = object.properties.last().map(|p| p.to_text()).unwrap_or_default();
        match kind.as_str() {
            "Cluster" => {
                let mut cluster = RawCluster::default();
                for child in &object.children {
                    match child.name.as_str() {
                        "Indexes" => cluster.indices = child.i32_values(),
                        "Weights" => cluster.weights = child.f32_values(),
                        "TransformLink" => {
                            let values = child.f32_values();
                            if values.len() >= 16 {
                                cluster.transform_link = Mat4::from_cols_slice(&values[..16]);
                            }
                        }
                        _ => {}
                    }
                }
                scene.clusters.insert(id, cluster);
            }
            "BlendShapeChannel" => {
                let raw = object.property(1).map(|p| p.to_text()).unwrap_or_default();
                let mut name = raw.split('\0').next().unwrap_or_default();
                if !self.blendshape_indices.contains_key(name) {
                    // Exporters prefix the channel with the blendshape name.
                    name = name.rsplit('.').next().unwrap_or(name);
                }
                scene.blendshape_channel_names.push(name.to_owned());
                if let Some(indices) = self.blendshape_indices.get(name) {
                    scene.blendshape_channel_indices.insert(id, indices.clone());
                }
            }
            other => trace!("Skipping deformer {other}"),
        }
    }
}

fn read_node_attribute(object: &Node, id: String, scene: &mut SceneObjects) {
    let Some(flags) = object.first_child_by_name("TypeFlags") else {
        return;
    };
    let type_flags = flags.property(0).map(|p| p.to_text()).unwrap_or_default();
    if type_flags == "Light" {
        scene.lights.insert(id.clone(), extract_light(object));
    }
    scene.type_flags.insert(id, type_flags);
}

fn extract_light(object: &Node) -> Light {
    let mut light = Light::default();
    for block in object.children_by_name("Properties70") {
        for entry in property_entries(block) {
            match entry.name {
                "Intensity" => light.intensity = 0.01 * entry.f32(),
                "Color" => light.color = entry.vec3(),
                _ => {}
            }
        }
    }
    light
}

/// Lightmap level and offset from the lights under the `hifi` global node,
/// or the first light's intensity when there's no such node.
pub(crate) fn lightmap_settings(
    scene: &SceneObjects,
    load_lightmaps: bool,
    level: f32,
) -> LightmapSettings {
    let mut settings = LightmapSettings {
        load_lightmaps,
        level,
        offset: 0.0,
    };
    match &scene.hifi_global_node {
        Some(hifi) => {
            let hifi_lights = scene
                .lights
                .iter()
                .filter(|(id, _)| scene.oo_child_to_parent.get(*id) == Some(hifi));
            for (_, light) in hifi_lights {
                settings.level = light.intensity;
                if settings.level <= 0.0 {
                    settings.load_lightmaps = false;
                }
                settings.offset = light.color.x.clamp(0.0, 1.0);
            }
        }
        None => {
            if let Some(light) = scene.lights.values().next() {
                settings.level = light.intensity;
            }
        }
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Property;
    use glam::Vec3;

    fn p70(entries: impl IntoIterator<Item = Node>) -> Node {
        Node::new("Properties70").with_children(entries)
    }

    fn p(name: &str, values: &[f64]) -> Node {
        Node::new("P")
            .with_properties([name, "", "", ""])
            .with_properties(values.iter().copied())
    }

    fn object(kind: &str, id: i64, name: &str, sub: &str) -> Node {
        Node::new(kind).with_properties([
            Property::I64(id),
            format!("{name}\0\u{1}{kind}").into(),
            sub.into(),
        ])
    }

    #[test]
    fn header_and_settings() {
        let reader = ObjectReader::new(&Mapping::default());
        let mut scene = SceneObjects::new();
        let header = Node::new("FBXHeaderExtension").with_child(
            Node::new("SceneInfo")
                .with_child(
                    Node::new("MetaData").with_child(Node::new("Author").with_property("someone")),
                )
                .with_child(p70([Node::new("P").with_properties([
                    "Original|ApplicationName",
                    "KString",
                    "",
                    "",
                    "mixamo.com",
                ])])),
        );
        let settings = Node::new("GlobalSettings").with_child(p70([
            p("UnitScaleFactor", &[2.54]),
            p("AmbientColor", &[0.1, 0.2, 0.3]),
        ]));
        reader.read_header(&header, &mut scene);
        reader.read_global_settings(&settings, &mut scene);
        assert_eq!(scene.author, "someone");
        assert_eq!(scene.application_name, "mixamo.com");
        assert!((scene.unit_scale_factor - 2.54).abs() < 1e-6);
        assert!(scene.ambient_color.abs_diff_eq(Vec3::new(0.1, 0.2, 0.3), 1e-6));
    }

    #[test]
    fn models_get_roles() {
        let mut mapping = Mapping::default();
        mapping.joint.insert("jointNeck".into(), "Neck".into());
        mapping.joint.insert("Hips".into(), "pelvis".into());
        let mut reader = ObjectReader::new(&mapping);
        let mut scene = SceneObjects::new();
        let mut diagnostics = Diagnostics::default();
        for (id, name) in [(1, "Neck"), (2, "pelvis"), (3, "LeftToe_End"), (4, "hifi_lights")] {
            reader.read_object(&object("Model", id, name, "LimbNode"), &mut scene, &mut diagnostics);
        }
        assert_eq!(scene.special_joint_ids[&JointRole::Neck], "1");
        assert_eq!(scene.special_joint_ids[&JointRole::LeftToe], "3");
        assert_eq!(scene.humanik_ids[9].as_deref(), Some("2"));
        assert_eq!(scene.hifi_global_node.as_deref(), Some("4"));
        assert_eq!(scene.model_names["2"], "pelvis");
        assert_eq!(scene.models.len(), 4);
    }

    #[test]
    fn deformers_and_curves() {
        let mut reader = ObjectReader::new(&Mapping::default());
        let mut scene = SceneObjects::new();
        let mut diagnostics = Diagnostics::default();
        let mut link: Vec<f64> = Mat4::IDENTITY.to_cols_array().iter().map(|&v| v.into()).collect();
        link[12] = 5.0;
        let cluster = object("Deformer", 10, "Cluster Hips", "Cluster")
            .with_child(Node::new("Indexes").with_property(vec![0, 2]))
            .with_child(Node::new("Weights").with_property(vec![1.0, 0.5]))
            .with_child(Node::new("TransformLink").with_property(link));
        let channel = object("Deformer", 11, "Face.EyeBlink_L", "BlendShapeChannel");
        let curve = Node::new("AnimationCurve")
            .with_property(12i64)
            .with_child(Node::new("KeyValueFloat").with_properties([1.0f32, 2.0]));
        for node in [&cluster, &channel, &curve] {
            reader.read_object(node, &mut scene, &mut diagnostics);
        }
        let cluster = &scene.clusters["10"];
        assert_eq!(cluster.indices, [0, 2]);
        assert_eq!(cluster.weights, [1.0, 0.5]);
        assert_eq!(cluster.transform_link.w_axis.x, 5.0);
        assert_eq!(scene.blendshape_channel_names, ["EyeBlink_L"]);
        assert_eq!(scene.blendshape_channel_indices["11"], [(0, 1.0)]);
        assert_eq!(scene.animation_curves["12"], [1.0, 2.0]);
    }

    #[test]
    fn lights_drive_lightmaps() {
        let mut reader = ObjectReader::new(&Mapping::default());
        let mut scene = SceneObjects::new();
        let mut diagnostics = Diagnostics::default();
        let light = object("NodeAttribute", 20, "", "Light")
            .with_child(Node::new("TypeFlags").with_property("Light"))
            .with_child(p70([p("Intensity", &[50.0]), p("Color", &[2.0, 0.0, 0.0])]));
        reader.read_object(&light, &mut scene, &mut diagnostics);
        assert_eq!(scene.type_flags["20"], "Light");

        let settings = lightmap_settings(&scene, true, 1.0);
        assert!((settings.level - 0.5).abs() < 1e-6);
        assert_eq!(settings.offset, 0.0);

        scene.hifi_global_node = Some("30".into());
        scene.oo_child_to_parent.insert("20".into(), "30".into());
        let settings = lightmap_settings(&scene, true, 1.0);
        assert_eq!(settings.offset, 1.0);
        assert!(settings.load_lightmaps);

        if let Some(light) = scene.lights.get_mut("20") {
            light.intensity = 0.0;
        }
        assert!(!lightmap_settings(&scene, true, 1.0).load_lightmaps);
    }

    #[test]
    fn geometry_kinds() {
        let mut reader = ObjectReader::new(&Mapping::default());
        let mut scene = SceneObjects::new();
        let mut diagnostics = Diagnostics::default();
        let mesh = object("Geometry", 1, "Body", "Mesh")
            .with_child(Node::new("Vertices").with_property(vec![0.0; 9]))
            .with_child(Node::new("PolygonVertexIndex").with_property(vec![0, 1, -3]));
        let shape = object("Geometry", 2, "Smile", "Shape");
        reader.read_object(&mesh, &mut scene, &mut diagnostics);
        reader.read_object(&mesh, &mut scene, &mut diagnostics);
        reader.read_object(&shape, &mut scene, &mut diagnostics);
        assert_eq!(scene.meshes["1"].mesh.mesh_index, 1);
        assert_eq!(scene.blendshapes[0].id, "2");
    }
}
