//! 14-DOP bounding volumes.

use glam::Vec3;

use crate::data::ShapeInfo;

const INV_SQRT_3: f32 = 0.577_350_26;

/// The 7 axes of a 14-DOP: the cardinal directions and four cube diagonals.
pub const CARDINAL_DIRECTIONS: [Vec3; 7] = [
    Vec3::X,
    Vec3::Y,
    Vec3::Z,
    Vec3::new(INV_SQRT_3, INV_SQRT_3, INV_SQRT_3),
    Vec3::new(INV_SQRT_3, -INV_SQRT_3, INV_SQRT_3),
    Vec3::new(INV_SQRT_3, INV_SQRT_3, -INV_SQRT_3),
    Vec3::new(INV_SQRT_3, -INV_SQRT_3, -INV_SQRT_3),
];

/// k-DOP of `points` around their centroid, empty when there are no points.
pub fn compute_shape_info(points: &[Vec3]) -> ShapeInfo {
    if points.is_empty() {
        return ShapeInfo::default();
    }
    let avg_point = points.iter().sum::<Vec3>() / points.len() as f32;
    let mut shape = ShapeInfo {
        avg_point,
        points: Vec::with_capacity(2 * CARDINAL_DIRECTIONS.len()),
        dots: Vec::with_capacity(2 * CARDINAL_DIRECTIONS.len()),
    };
    for direction in CARDINAL_DIRECTIONS {
        let (min_dot, max_dot) = points
            .iter()
            .map(|&p| direction.dot(p - avg_point))
            .fold((f32::MAX, f32::MIN), |(min, max), d| (min.min(d), max.max(d)));
        shape.points.push(avg_point + max_dot * direction);
        shape.dots.push(max_dot);
        shape.points.push(avg_point + min_dot * direction);
        shape.dots.push(-min_dot);
    }
    shape
}
