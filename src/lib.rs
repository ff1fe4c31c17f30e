//! Imports skeletons, skinned meshes, blendshapes and materials out of
//! Autodesk Filmbox (*.fbx) files into a flat [`Geometry`].
//!
//! ```no_run
//! use fbx_geometry::{Loader, Mapping};
//!
//! # fn main() -> anyhow::Result<()> {
//! let file = std::io::BufReader::new(std::fs::File::open("avatar.fbx")?);
//! let (geometry, diagnostics) = Loader::new().read(file, &Mapping::default(), "avatar.fbx")?;
//! println!("{} joints, {} diagnostics", geometry.joints.len(), diagnostics.entries().len());
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod diagnostics;
pub mod fbx_transform;
mod loader;
pub mod mapping;
mod material_loader;
mod mesh;
pub mod node;
mod tangents;
mod texture;
pub mod utils;

pub use data::{
    AnimationFrame, Blendshape, Cluster, Geometry, Joint, JointIndex, LightmapSettings, Material,
    MaterialTextures, Mesh, MeshPart, ShapeInfo, SpecialJoints, Texture, TextureTransform,
};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use loader::{read_fbx, Loader};
pub use mapping::Mapping;
pub use node::{Node, Property};
pub use utils::fbx_extend::load_node_tree;
