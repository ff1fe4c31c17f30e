//! Triangulator.

use glam::{DVec2, DVec3, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

/// Returns smallest direction.
fn smallest_direction(v: &DVec3) -> Axis {
    match () {
        () if v.x < v.y && v.z < v.x => Axis::Z,
        () if v.x < v.y => Axis::X,
        () if v.z < v.y => Axis::Z,
        () => Axis::Y,
    }
}

/// Splits a polygon into triangles of corner indices (`0..points.len()`).
///
/// Polygons with at most one concave corner are fanned around a convex
/// corner; anything worse falls back to a fan around the first corner.
/// Degenerate polygons (less than three corners) yield nothing.
pub fn triangulate(points: &[Vec3]) -> Vec<[usize; 3]> {
    let n = points.len();
    match n {
        0..=2 => return Vec::new(),
        3 => return vec![[0, 1, 2]],
        _ => {}
    }
    let fan = |center: usize| -> Vec<[usize; 3]> {
        (1..n - 1)
            .map(|k| [center, (center + k) % n, (center + k + 1) % n])
            .collect()
    };

    let points: Vec<DVec3> = points.iter().map(|p| p.as_dvec3()).collect();
    let points_2d: Vec<DVec2> = {
        // Reduce dimensions for faster computation.
        // This helps treat points which are not on a single plane.
        let (min, max) = bounding_box(&points);
        match smallest_direction(&(max - min)) {
            Axis::X => points.iter().map(|v| DVec2::new(v.y, v.z)).collect(),
            Axis::Y => points.iter().map(|v| DVec2::new(v.x, v.z)).collect(),
            Axis::Z => points.iter().map(|v| DVec2::new(v.x, v.y)).collect(),
        }
    };
    // Normal directions.
    let normal_directions: Vec<bool> = (0..n)
        .map(|cur| {
            let prev = points_2d[(cur + n - 1) % n];
            let next = points_2d[(cur + 1) % n];
            let cur = points_2d[cur];
            (prev - cur).perp_dot(cur - next) > 0.0
        })
        .collect();

    let dirs_true_count = normal_directions.iter().filter(|&&v| v).count();

    if dirs_true_count <= 1 || dirs_true_count >= n - 1 {
        // Zero or one angles are concave.
        let minor_sign = dirs_true_count <= 1;

        // If there are no concave angles, use 0 as center.
        let convex_index = normal_directions
            .iter()
            .position(|&sign| sign == minor_sign)
            .unwrap_or(0);
        fan(convex_index)
    } else {
        fan(0)
    }
}

/// Returns bounding box as `(min, max)`.
fn bounding_box(points: &[DVec3]) -> (DVec3, DVec3) {
    points.iter().fold(
        (DVec3::splat(f64::MAX), DVec3::splat(f64::MIN)),
        |(min, max), p| (min.min(*p), max.max(*p)),
    )
}
