//! The importer's output records, and the lookup tables built on the way.

macro_rules! define_index_type {
    ($(
        $(#[$meta:meta])*
        $ty:ident;
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $ty(u32);

            impl $ty {
                /// Creates a new index.
                ///
                /// # Panics
                ///
                /// Panics if the given index is larger than `std::u32::MAX`.
                pub(crate) fn new(i: usize) -> Self {
                    assert!(i <= std::u32::MAX as usize);
                    Self(i as u32)
                }

                /// Retuns `usize` value.
                pub fn to_usize(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

pub(crate) mod geometry;
pub(crate) mod material;
pub(crate) mod mesh;
pub(crate) mod scene;

pub use geometry::{
    AnimationFrame, Geometry, Joint, JointIndex, LightmapSettings, ShapeInfo, SpecialJoints,
};
pub use material::{Material, MaterialTextures, Texture, TextureTransform};
pub use mesh::{Blendshape, Cluster, Mesh, MeshPart};
