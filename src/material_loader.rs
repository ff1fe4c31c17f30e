//! Materials: property tables and texture consolidation.

use std::collections::BTreeMap;

use glam::Vec3;
use rgb::RGB;
use tracing::{debug, trace};

use crate::data::scene::{SceneObjects, TextureRole};
use crate::data::{Material, Texture};
use crate::node::{get_id, get_name, property_entries, Node, PropertyEntry};

/// Material properties we know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MaterialProperty {
    DiffuseColor,
    DiffuseFactor,
    SpecularColor,
    SpecularFactor,
    EmissiveColor,
    EmissiveFactor,
    AmbientFactor,
    Shininess,
    Opacity,
    /// Maya Stingray PBS properties, their presence makes a PBS material.
    Maya(MayaProperty),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MayaProperty {
    UseNormalMap,
    BaseColor,
    UseColorMap,
    Roughness,
    UseRoughnessMap,
    Metallic,
    UseMetallicMap,
    Emissive,
    EmissiveIntensity,
    UseEmissiveMap,
    UseAoMap,
}

impl MaterialProperty {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        use MayaProperty as Maya;
        Some(match name {
            "DiffuseColor" => Self::DiffuseColor,
            "DiffuseFactor" => Self::DiffuseFactor,
            "SpecularColor" => Self::SpecularColor,
            "SpecularFactor" => Self::SpecularFactor,
            "EmissiveColor" => Self::EmissiveColor,
            "EmissiveFactor" => Self::EmissiveFactor,
            "AmbientFactor" => Self::AmbientFactor,
            "Shininess" => Self::Shininess,
            "Opacity" => Self::Opacity,
            "Maya|use_normal_map" => Self::Maya(Maya::UseNormalMap),
            "Maya|base_color" => Self::Maya(Maya::BaseColor),
            "Maya|use_color_map" => Self::Maya(Maya::UseColorMap),
            "Maya|roughness" => Self::Maya(Maya::Roughness),
            "Maya|use_roughness_map" => Self::Maya(Maya::UseRoughnessMap),
            "Maya|metallic" => Self::Maya(Maya::Metallic),
            "Maya|use_metallic_map" => Self::Maya(Maya::UseMetallicMap),
            "Maya|emissive" => Self::Maya(Maya::Emissive),
            "Maya|emissive_intensity" => Self::Maya(Maya::EmissiveIntensity),
            "Maya|use_emissive_map" => Self::Maya(Maya::UseEmissiveMap),
            "Maya|use_ao_map" => Self::Maya(Maya::UseAoMap),
            _ => return None,
        })
    }
}

struct ColorAdapter(Vec3);
impl From<ColorAdapter> for RGB<f32> {
    fn from(ColorAdapter(c): ColorAdapter) -> Self {
        RGB::new(c.x, c.y, c.z)
    }
}

fn apply(material: &mut Material, entry: &PropertyEntry) {
    let Some(property) = MaterialProperty::from_name(entry.name) else {
        trace!("Unknown material property {:?}", entry.name);
        return;
    };
    let color = || ColorAdapter(entry.vec3()).into();
    match property {
        MaterialProperty::DiffuseColor => material.diffuse_color = color(),
        MaterialProperty::DiffuseFactor => material.diffuse_factor = entry.f32(),
        MaterialProperty::SpecularColor => material.specular_color = color(),
        MaterialProperty::SpecularFactor => material.specular_factor = entry.f32(),
        MaterialProperty::EmissiveColor => material.emissive_color = color(),
        MaterialProperty::EmissiveFactor => material.emissive_factor = entry.f32(),
        MaterialProperty::AmbientFactor => material.ambient_factor = entry.f32(),
        MaterialProperty::Shininess => material.shininess = entry.f32(),
        MaterialProperty::Opacity => material.opacity = entry.f32(),
        MaterialProperty::Maya(maya) => {
            material.is_pbs_material = true;
            match maya {
                MayaProperty::UseNormalMap => material.use_normal_map = entry.bool(),
                MayaProperty::BaseColor => material.diffuse_color = color(),
                MayaProperty::UseColorMap => material.use_albedo_map = entry.bool(),
                MayaProperty::Roughness => material.roughness = entry.f32(),
                MayaProperty::UseRoughnessMap => material.use_roughness_map = entry.bool(),
                MayaProperty::Metallic => material.metallic = entry.f32(),
                MayaProperty::UseMetallicMap => material.use_metallic_map = entry.bool(),
                MayaProperty::Emissive => material.emissive_color = color(),
                MayaProperty::EmissiveIntensity => material.emissive_intensity = entry.f32(),
                MayaProperty::UseEmissiveMap => material.use_emissive_map = entry.bool(),
                MayaProperty::UseAoMap => material.use_occlusion_map = entry.bool(),
            }
        }
    }
}

/// Reads a `Material` object, without its textures.
pub(crate) fn extract_material(object: &Node) -> Material {
    let mut material = Material {
        material_id: get_id(&object.properties, 0),
        name: get_name(&object.properties),
        ..Default::default()
    };
    for child in &object.children {
        if child.name == "ShadingModel" {
            material.shading_model = child.property(0).map(|p| p.to_text()).unwrap_or_default();
            continue;
        }
        for entry in property_entries(child) {
            apply(&mut material, &entry);
        }
    }
    material
}

/// Attaches the textures linked to each material.
///
/// Ambient textures are lightmaps and only attached when `load_lightmaps` is set.
pub(crate) fn consolidate_materials(
    scene: &SceneObjects,
    load_lightmaps: bool,
) -> BTreeMap<String, Material> {
    #[cfg(feature = "profile")]
    let _consolidate_materials_span = tracing::info_span!("consolidate_materials").entered();

    let mut materials = scene.materials.clone();
    for (id, material) in materials.iter_mut() {
        let texture = |role| -> Option<Texture> {
            let texture_id = scene.texture_for(role, id)?;
            let mut texture = scene.textures.get(texture_id)?.clone();
            if let Some(content) = scene.texture_content.get(&texture.filepath) {
                texture.content = content.clone();
            }
            Some(texture)
        };
        let textures = &mut material.textures;
        textures.diffuse = texture(TextureRole::Diffuse);
        textures.transparent = texture(TextureRole::Transparent);
        textures.normal = texture(TextureRole::Normal);
        textures.bump = texture(TextureRole::Bump);
        textures.specular = texture(TextureRole::Specular);
        textures.metallic = texture(TextureRole::Metallic);
        textures.shininess = texture(TextureRole::Shininess);
        textures.roughness = texture(TextureRole::Roughness);
        textures.emissive = texture(TextureRole::Emissive);
        textures.occlusion = texture(TextureRole::Occlusion);
        if load_lightmaps {
            let lightmap = texture(TextureRole::AmbientFactor);
            material.is_lightmap = lightmap.is_some();
            textures.ambient = lightmap.or_else(|| texture(TextureRole::Ambient));
        }
        debug!(
            "Material {:?} ({id}) uses {} textures",
            material.name,
            material.texture_filenames().count(),
        );
    }
    materials
}
