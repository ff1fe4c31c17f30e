//! Materials and textures.

use glam::{Vec2, Vec3, Vec4};
use rgb::RGB;

/// UV transform and sampling parameters of a texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scaling: Vec3,
    pub uv_translation: Vec2,
    pub uv_scaling: Vec2,
    pub cropping: Vec4,
    pub alpha_source: u8,
    pub blend_mode: u8,
    pub use_material: bool,
}

impl Default for TextureTransform {
    fn default() -> Self {
        TextureTransform {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scaling: Vec3::ONE,
            uv_translation: Vec2::ZERO,
            uv_scaling: Vec2::ONE,
            cropping: Vec4::ZERO,
            alpha_source: 0,
            blend_mode: 0,
            use_material: true,
        }
    }
}

/// A texture referenced by a material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Texture {
    pub id: String,
    pub name: String,
    /// Path as stored in the file, with forward slashes.
    pub filepath: String,
    /// Last path component; textures are looked up next to the model.
    pub filename: String,
    /// Embedded image bytes, empty when the texture is external.
    pub content: Vec<u8>,
    /// UV set the texture samples, empty for the first one.
    pub texcoord_set: String,
    pub transform: TextureTransform,
}

/// One optional texture per material role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTextures {
    pub diffuse: Option<Texture>,
    pub transparent: Option<Texture>,
    pub normal: Option<Texture>,
    pub bump: Option<Texture>,
    pub specular: Option<Texture>,
    pub metallic: Option<Texture>,
    pub shininess: Option<Texture>,
    pub roughness: Option<Texture>,
    pub emissive: Option<Texture>,
    /// Also the lightmap.
    pub ambient: Option<Texture>,
    pub occlusion: Option<Texture>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub material_id: String,
    pub name: String,
    pub shading_model: String,

    pub diffuse_color: RGB<f32>,
    pub diffuse_factor: f32,
    pub specular_color: RGB<f32>,
    pub specular_factor: f32,
    pub emissive_color: RGB<f32>,
    pub emissive_factor: f32,
    pub emissive_intensity: f32,
    pub ambient_factor: f32,
    pub shininess: f32,
    pub opacity: f32,
    pub metallic: f32,
    pub roughness: f32,

    /// Maya Stingray PBS material.
    pub is_pbs_material: bool,
    pub use_normal_map: bool,
    pub use_albedo_map: bool,
    pub use_roughness_map: bool,
    pub use_metallic_map: bool,
    pub use_emissive_map: bool,
    pub use_occlusion_map: bool,

    pub textures: MaterialTextures,
    /// The ambient texture came from an `AmbientFactor` link.
    pub is_lightmap: bool,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            material_id: String::new(),
            name: String::new(),
            shading_model: String::new(),
            diffuse_color: RGB::new(1.0, 1.0, 1.0),
            diffuse_factor: 1.0,
            specular_color: RGB::new(0.02, 0.02, 0.02),
            specular_factor: 1.0,
            emissive_color: RGB::new(0.0, 0.0, 0.0),
            emissive_factor: 0.0,
            emissive_intensity: 1.0,
            ambient_factor: 0.0,
            shininess: 23.0,
            opacity: 1.0,
            metallic: 0.0,
            roughness: 1.0,
            is_pbs_material: false,
            use_normal_map: false,
            use_albedo_map: false,
            use_roughness_map: false,
            use_metallic_map: false,
            use_emissive_map: false,
            use_occlusion_map: false,
            textures: MaterialTextures::default(),
            is_lightmap: false,
        }
    }
}

impl Material {
    /// Normal and bump maps need per-vertex tangents.
    pub fn need_tangent_space(&self) -> bool {
        self.textures.normal.is_some() || self.textures.bump.is_some()
    }

    /// File names of all textures, for cache warm-up.
    pub fn texture_filenames(&self) -> impl Iterator<Item = &str> {
        let t = &self.textures;
        [
            &t.diffuse,
            &t.transparent,
            &t.normal,
            &t.bump,
            &t.specular,
            &t.metallic,
            &t.shininess,
            &t.roughness,
            &t.emissive,
            &t.ambient,
            &t.occlusion,
        ]
        .into_iter()
        .flatten()
        .map(|texture| texture.filename.as_str())
    }
}
