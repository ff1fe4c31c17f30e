//! Scene objects.
//!
//! Typed tables filled by the single pass over the `Objects` and
//! `Connections` nodes. Everything here is keyed by object id and only lives
//! for the duration of one import.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec3};

use super::{material::Material, material::Texture, mesh::Blendshape};
use crate::fbx_transform::FbxModel;
use crate::mapping::{JointRole, HUMANIK_JOINTS};
use crate::mesh::ExtractedMesh;

/// Multi-map from object id to object ids, keeping insertion order per key.
#[derive(Debug, Default, Clone)]
pub(crate) struct ConnectionMap {
    map: HashMap<String, Vec<String>>,
}

impl ConnectionMap {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.entry(key.into()).or_default().push(value.into());
    }

    /// All values of `key`, oldest first.
    pub fn values<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.map
            .get(key)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// First value inserted for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values(key).next()
    }

    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.values(key).any(|v| v == value)
    }

    /// Removes every `(key, value)` pair.
    pub fn remove(&mut self, key: &str, value: &str) {
        if let Some(values) = self.map.get_mut(key) {
            values.retain(|v| v != value);
            if values.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// Replaces the first value of `key`, returning the old one.
    pub fn replace_first(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        let values = self.map.entry(key.to_owned()).or_default();
        match values.first_mut() {
            Some(first) => Some(std::mem::replace(first, value.into())),
            None => {
                values.push(value.into());
                None
            }
        }
    }
}

/// A `Geometry` node of type `Shape`, still indexed by control point.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExtractedBlendshape {
    pub id: String,
    pub blendshape: Blendshape,
}

/// Skin cluster deformer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawCluster {
    /// Control points of the deformed mesh.
    pub indices: Vec<i32>,
    pub weights: Vec<f32>,
    /// Bind pose of the joint in model space.
    pub transform_link: Mat4,
}

impl Default for RawCluster {
    fn default() -> Self {
        RawCluster {
            indices: Vec::new(),
            weights: Vec::new(),
            transform_link: Mat4::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Light {
    pub intensity: f32,
    pub color: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Light {
            intensity: 1.0,
            color: Vec3::ONE,
        }
    }
}

/// Material property a texture is linked to, from the `OP` connection role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TextureRole {
    Diffuse,
    Transparent,
    Bump,
    Normal,
    Specular,
    Metallic,
    Shininess,
    Roughness,
    Emissive,
    Ambient,
    AmbientFactor,
    Occlusion,
}

impl TextureRole {
    /// Classifies a lower-cased connection role; first match wins.
    pub fn classify(role: &str) -> Option<Self> {
        let has = |s: &str| role.contains(s);
        Some(match () {
            () if (has("diffuse") && !has("tex_global_diffuse")) || has("tex_color_map") => {
                TextureRole::Diffuse
            }
            () if has("transparentcolor") || has("transparencyfactor") => TextureRole::Transparent,
            () if has("bump") => TextureRole::Bump,
            () if has("normal") || has("tex_normal_map") => TextureRole::Normal,
            () if (has("specular") && !has("tex_global_specular")) || has("reflection") => {
                TextureRole::Specular
            }
            () if has("tex_metallic_map") => TextureRole::Metallic,
            () if has("shininess") => TextureRole::Shininess,
            () if has("tex_roughness_map") => TextureRole::Roughness,
            () if has("emissive") || has("tex_emissive_map") => TextureRole::Emissive,
            () if has("ambientcolor") => TextureRole::Ambient,
            () if has("ambientfactor") => TextureRole::AmbientFactor,
            () if has("tex_ao_map") => TextureRole::Occlusion,
            () => return None,
        })
    }
}

/// Animated channel of a model, from the `OP` connection role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CurveLink {
    /// Model → curve node.
    LocalRotation,
    LocalTranslation,
    /// Curve node → curve, for one axis.
    Component(usize),
}

impl CurveLink {
    pub fn classify(role: &str) -> Option<Self> {
        Some(match role {
            "lcl rotation" => CurveLink::LocalRotation,
            "lcl translation" => CurveLink::LocalTranslation,
            "d|x" => CurveLink::Component(0),
            "d|y" => CurveLink::Component(1),
            "d|z" => CurveLink::Component(2),
            _ => return None,
        })
    }
}

/// Everything the object pass collected.
#[derive(Debug, Default)]
pub(crate) struct SceneObjects {
    pub author: String,
    pub application_name: String,
    pub unit_scale_factor: f32,
    pub ambient_color: Vec3,

    pub meshes: BTreeMap<String, ExtractedMesh>,
    pub blendshapes: Vec<ExtractedBlendshape>,
    pub models: HashMap<String, FbxModel>,
    pub model_names: HashMap<String, String>,
    /// Last model matching each role.
    pub special_joint_ids: HashMap<JointRole, String>,
    /// Same order as [`HUMANIK_JOINTS`].
    pub humanik_ids: Vec<Option<String>>,
    pub hifi_global_node: Option<String>,

    pub clusters: HashMap<String, RawCluster>,
    pub animation_curves: HashMap<String, Vec<f32>>,
    pub type_flags: HashMap<String, String>,
    pub lights: BTreeMap<String, Light>,

    pub materials: BTreeMap<String, Material>,
    pub textures: HashMap<String, Texture>,
    /// Embedded `Video` content by file path.
    pub texture_content: HashMap<String, Vec<u8>>,

    pub blendshape_channel_names: Vec<String>,
    /// Blendshape channel deformer id → `(channel index, weight)`.
    pub blendshape_channel_indices: HashMap<String, Vec<(usize, f32)>>,

    /// `OO` links only.
    pub oo_child_to_parent: HashMap<String, String>,
    /// Every link, child → parents.
    pub parent_map: ConnectionMap,
    /// Every link, parent → children.
    pub child_map: ConnectionMap,
    /// Material id → texture id, per role.
    pub texture_links: HashMap<(TextureRole, String), String>,
    /// Model → curve node, per channel.
    pub rotation_curve_nodes: HashMap<String, String>,
    pub translation_curve_nodes: HashMap<String, String>,
    /// Curve node → curve, per axis.
    pub curve_components: [HashMap<String, String>; 3],
}

impl SceneObjects {
    pub fn new() -> Self {
        SceneObjects {
            unit_scale_factor: 1.0,
            humanik_ids: vec![None; HUMANIK_JOINTS.len()],
            ..Default::default()
        }
    }

    /// The first parent of `id` that is a model.
    pub fn parent_model(&self, id: &str) -> Option<&str> {
        self.parent_map
            .values(id)
            .find(|parent| self.models.contains_key(*parent))
    }

    /// Curve values animating one axis of a model's channel, empty if none.
    pub fn curve(&self, curve_node: Option<&String>, axis: usize) -> &[f32] {
        curve_node
            .and_then(|node| self.curve_components[axis].get(node))
            .and_then(|curve| self.animation_curves.get(curve))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn texture_for(&self, role: TextureRole, material_id: &str) -> Option<&str> {
        self.texture_links
            .get(&(role, material_id.to_owned()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_map_keeps_insertion_order() {
        let mut map = ConnectionMap::default();
        map.insert("a", "2");
        map.insert("a", "1");
        map.insert("a", "3");
        assert_eq!(map.value("a"), Some("2"));
        map.remove("a", "2");
        assert_eq!(map.values("a").collect::<Vec<_>>(), ["1", "3"]);
        assert!(map.contains("a", "3"));
        assert_eq!(map.replace_first("a", "4").as_deref(), Some("1"));
        assert_eq!(map.values("a").collect::<Vec<_>>(), ["4", "3"]);
        assert_eq!(map.replace_first("b", "5"), None);
        assert_eq!(map.value("b"), Some("5"));
    }

    #[test]
    fn texture_roles_first_match_wins() {
        assert_eq!(TextureRole::classify("diffusecolor"), Some(TextureRole::Diffuse));
        assert_eq!(TextureRole::classify("diffusefactor"), Some(TextureRole::Diffuse));
        assert_eq!(TextureRole::classify("tex_global_diffuse"), None);
        assert_eq!(TextureRole::classify("normalmap"), Some(TextureRole::Normal));
        assert_eq!(TextureRole::classify("bump"), Some(TextureRole::Bump));
        assert_eq!(TextureRole::classify("specularfactor"), Some(TextureRole::Specular));
        assert_eq!(TextureRole::classify("maya|tex_ao_map"), Some(TextureRole::Occlusion));
        assert_eq!(TextureRole::classify("ambientfactor"), Some(TextureRole::AmbientFactor));
        assert_eq!(CurveLink::classify("d|y"), Some(CurveLink::Component(1)));
        assert_eq!(CurveLink::classify("lcl scaling"), None);
    }
}
