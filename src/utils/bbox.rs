//! Axis-aligned extents.

use glam::{Mat4, Vec3};
use std::iter::FromIterator;

/// 3D bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox3d {
    /// Minimum.
    pub min: Vec3,
    /// Maximum.
    pub max: Vec3,
}

impl BoundingBox3d {
    /// Extends the bounding box to contain the given point.
    pub fn insert(&self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    /// Merges the bounding boxes.
    pub fn union(&self, o: &BoundingBox3d) -> Self {
        Self {
            min: self.min.min(o.min),
            max: self.max.max(o.max),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

impl From<Vec3> for BoundingBox3d {
    fn from(p: Vec3) -> Self {
        Self { min: p, max: p }
    }
}

/// Extents that start out empty and grow with every added point.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Extents {
    bbox: Option<BoundingBox3d>,
}

impl Extents {
    /// Creates empty extents.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, p: Vec3) {
        self.bbox = Some(match self.bbox {
            Some(bbox) => bbox.insert(p),
            None => p.into(),
        });
    }

    /// Merges the extents.
    pub fn union(&self, o: &Extents) -> Self {
        match (&self.bbox, &o.bbox) {
            (Some(b), Some(o)) => b.union(o).into(),
            (Some(v), None) | (None, Some(v)) => (*v).into(),
            (None, None) => Self::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_none()
    }

    pub fn bbox(&self) -> Option<BoundingBox3d> {
        self.bbox
    }

    pub fn minimum(&self) -> Option<Vec3> {
        self.bbox.map(|b| b.min)
    }

    pub fn maximum(&self) -> Option<Vec3> {
        self.bbox.map(|b| b.max)
    }

    /// Empty extents contain nothing.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.bbox.map_or(false, |b| b.contains(p))
    }

    /// Extents of the two corners mapped through `transform`.
    pub fn transformed_corners(&self, transform: Mat4) -> Self {
        match self.bbox {
            Some(b) => [b.min, b.max]
                .into_iter()
                .map(|p| transform.transform_point3(p))
                .collect(),
            None => Self::new(),
        }
    }
}

impl From<BoundingBox3d> for Extents {
    fn from(bbox: BoundingBox3d) -> Self {
        Self { bbox: Some(bbox) }
    }
}

impl FromIterator<Vec3> for Extents {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Vec3>,
    {
        let mut extents = Self::new();
        iter.into_iter().for_each(|p| extents.add_point(p));
        extents
    }
}

impl<'a> FromIterator<&'a Vec3> for Extents {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = &'a Vec3>,
    {
        iter.into_iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_from_empty() {
        let mut extents = Extents::new();
        assert!(extents.is_empty());
        assert!(!extents.contains_point(Vec3::ZERO));
        extents.add_point(Vec3::new(1.0, -1.0, 0.0));
        extents.add_point(Vec3::new(-1.0, 2.0, 0.5));
        assert_eq!(extents.minimum(), Some(Vec3::new(-1.0, -1.0, 0.0)));
        assert_eq!(extents.maximum(), Some(Vec3::new(1.0, 2.0, 0.5)));
        assert!(extents.contains_point(Vec3::new(0.0, 0.0, 0.25)));
    }

    #[test]
    fn union_with_empty() {
        let a: Extents = [Vec3::ZERO, Vec3::ONE].iter().collect();
        assert_eq!(a.union(&Extents::new()), a);
        let scaled = a.transformed_corners(Mat4::from_scale(Vec3::splat(-2.0)));
        assert_eq!(scaled.minimum(), Some(Vec3::splat(-2.0)));
        assert_eq!(scaled.maximum(), Some(Vec3::ZERO));
    }
}
