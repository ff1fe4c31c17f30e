//! `Texture` and `Video` objects.

use glam::{Vec2, Vec3, Vec4};
use tracing::trace;

use crate::data::Texture;
use crate::node::{get_id, property_entries, Node, PropertyEntry};

/// `Properties70` entries of a texture we know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureProperty {
    UvSet,
    BlendMode,
    UseMaterial,
    Translation,
    Rotation,
    Scaling,
}

impl TextureProperty {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "UVSet" => Self::UvSet,
            "CurrentTextureBlendMode" => Self::BlendMode,
            "UseMaterial" => Self::UseMaterial,
            "Translation" => Self::Translation,
            "Rotation" => Self::Rotation,
            "Scaling" => Self::Scaling,
            _ => return None,
        })
    }
}

/// Zero scale components mean "unset".
fn non_zero_scale<const N: usize>(mut v: [f32; N]) -> [f32; N] {
    for c in v.iter_mut().filter(|c| **c == 0.0) {
        *c = 1.0;
    }
    v
}

fn apply(texture: &mut Texture, entry: &PropertyEntry) {
    let Some(property) = TextureProperty::from_name(entry.name) else {
        trace!("Unknown texture property {:?}", entry.name);
        return;
    };
    let transform = &mut texture.transform;
    match property {
        TextureProperty::UvSet => texture.texcoord_set = entry.text(),
        TextureProperty::BlendMode => transform.blend_mode = entry.i32() as u8,
        TextureProperty::UseMaterial => transform.use_material = entry.bool(),
        TextureProperty::Translation => transform.translation = entry.vec3(),
        TextureProperty::Rotation => transform.rotation = entry.vec3(),
        TextureProperty::Scaling => {
            transform.scaling = Vec3::from(non_zero_scale(entry.vec3().to_array()))
        }
    }
}

/// Reads a `Texture` object. The embedded content is attached later from
/// the `Video` objects.
pub(crate) fn extract_texture(object: &Node) -> Texture {
    let mut texture = Texture {
        id: get_id(&object.properties, 0),
        ..Default::default()
    };
    for child in &object.children {
        let props = &child.properties;
        let f32_at = |i: usize| props.get(i).and_then(|p| p.as_f32()).unwrap_or(0.0);
        let transform = &mut texture.transform;
        match child.name.as_str() {
            "RelativeFilename" if !props.is_empty() => {
                texture.filepath = props[0].to_text().replace('\\', "/");
                texture.filename = match texture.filepath.rfind('/') {
                    Some(i) => texture.filepath[i + 1..].to_owned(),
                    None => texture.filepath.clone(),
                };
            }
            "TextureName" if !props.is_empty() => {
                // Drop the timestamp.
                let name = props[0].to_text();
                texture.name = name.split('[').next().unwrap_or_default().to_owned();
            }
            "Texture_Alpha_Source" if !props.is_empty() => {
                transform.alpha_source = f32_at(0) as u8;
            }
            "ModelUVTranslation" if props.len() >= 2 => {
                transform.uv_translation = Vec2::new(f32_at(0), f32_at(1));
            }
            "ModelUVScaling" if props.len() >= 2 => {
                transform.uv_scaling = Vec2::from(non_zero_scale([f32_at(0), f32_at(1)]));
            }
            "Cropping" if props.len() >= 4 => {
                transform.cropping = Vec4::new(f32_at(0), f32_at(1), f32_at(2), f32_at(3));
            }
            _ => {
                for entry in property_entries(child) {
                    apply(&mut texture, &entry);
                }
            }
        }
    }
    texture
}

/// Embedded file of a `Video` object as `(path, content)`, if it has any.
pub(crate) fn extract_video(object: &Node) -> Option<(String, Vec<u8>)> {
    let mut filepath = String::new();
    let mut content = Vec::new();
    for child in &object.children {
        match (child.name.as_str(), child.property(0)) {
            ("RelativeFilename", Some(p)) => filepath = p.to_text().replace('\\', "/"),
            ("Content", Some(p)) => content = p.to_bytes(),
            _ => {}
        }
    }
    (!content.is_empty()).then_some((filepath, content))
}
