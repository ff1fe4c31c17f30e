//! FBX model transforms: property parsing, rotation orders and matrix composition.

// a bit of trivia on how transform is encoded in FBX:
// rotation: Euler in degrees, three steps: PreRotation, Lcl Rotation, PostRotation,
// each in the node's RotationOrder (XYZ unless told otherwise).
// https://forums.autodesk.com/t5/fbx-forum/maya-quot-rotate-axis-quot-vs-fbx-quot-postrotation-quot/td-p/4168814
// http://docs.autodesk.com/FBX/2014/ENU/FBX-SDK-Documentation/cpp_ref/class_fbx_node.html
// (see "Pivot Management" section for the pivot and offset composition)
//
// Local transform, right to left:
//   T * Roff * Rp * Rpre * R * Rpost⁻¹ * Rp⁻¹ * Soff * Sp * S * Sp⁻¹
// Geometric{Translation,Rotation,Scaling} only apply to the attached geometry,
// never to child nodes.
use glam::{DMat3, DQuat, DVec3, Mat4, Quat, Vec3};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::node::PropertyEntry;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct Translation(Vec3);
impl Translation {
    fn mat(self) -> Mat4 {
        Mat4::from_translation(self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Scale(Vec3);
impl Scale {
    fn mat(self) -> Mat4 {
        Mat4::from_scale(self.0)
    }
    const IDENTITY: Self = Self(Vec3::ONE);
}

/// Quaternion of XYZ Euler angles in degrees, applied X first then Y then Z.
pub fn quat_from_euler_degrees(degrees: Vec3) -> Quat {
    let Vec3 { x, y, z } = degrees;
    Quat::from_rotation_z(z.to_radians())
        * Quat::from_rotation_y(y.to_radians())
        * Quat::from_rotation_x(x.to_radians())
}

/// Inverse of [`quat_from_euler_degrees`].
pub fn euler_degrees_from_quat(rotation: Quat) -> Vec3 {
    let q = DQuat::from_xyzw(
        rotation.x.into(),
        rotation.y.into(),
        rotation.z.into(),
        rotation.w.into(),
    );
    euler_from_dquat(q).as_vec3()
}

fn euler_from_dquat(q: DQuat) -> DVec3 {
    let m = DMat3::from_quat(q.normalize());
    let cos_y = m.x_axis.x.hypot(m.x_axis.y);
    let y = (-m.x_axis.z).atan2(cos_y);
    let (x, z) = if cos_y > 1e-9 {
        (m.y_axis.z.atan2(m.z_axis.z), m.x_axis.y.atan2(m.x_axis.x))
    } else {
        // gimbal lock: only x ± z is defined, put everything in z
        (0.0, (-m.y_axis.x).atan2(m.y_axis.y))
    };
    DVec3::new(x, y, z) * (180.0 / std::f64::consts::PI)
}

/// `RotationOrder` values of FBX models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOrder {
    Xyz,
    Xzy,
    Yzx,
    Yxz,
    Zxy,
    Zyx,
    SphericXyz,
}

impl RotationOrder {
    pub fn from_fbx(value: i32) -> Option<Self> {
        use RotationOrder::*;
        Some(match value {
            0 => Xyz,
            1 => Xzy,
            2 => Yzx,
            3 => Yxz,
            4 => Zxy,
            5 => Zyx,
            6 => SphericXyz,
            _ => return None,
        })
    }

    /// Net rotation of angles (radians) applied in this order.
    ///
    /// Spheric XYZ has no simple composition and returns `None`.
    fn compose(self, radians: DVec3) -> Option<DQuat> {
        use RotationOrder::*;
        let qx = DQuat::from_rotation_x(radians.x);
        let qy = DQuat::from_rotation_y(radians.y);
        let qz = DQuat::from_rotation_z(radians.z);
        match self {
            Xyz => Some(qz * (qy * qx)),
            Xzy => Some(qy * (qz * qx)),
            Yzx => Some(qx * (qz * qy)),
            Yxz => Some(qz * (qx * qy)),
            Zxy => Some(qy * (qx * qz)),
            Zyx => Some(qx * (qy * qz)),
            SphericXyz => None,
        }
    }
}

/// Converts Euler degrees given in FBX rotation order `order` to XYZ order.
///
/// Spheric XYZ and unknown orders are passed through unchanged, reported once
/// per import.
pub fn convert_rotation_to_xyz(order: i32, rotation: Vec3, diagnostics: &mut Diagnostics) -> Vec3 {
    let composed = match RotationOrder::from_fbx(order) {
        Some(RotationOrder::Xyz) => return rotation,
        Some(order) => order.compose(rotation.as_dvec3() * (std::f64::consts::PI / 180.0)),
        None => None,
    };
    match composed {
        Some(q) => euler_from_dquat(q).as_vec3(),
        None => {
            diagnostics.report_once(Diagnostic::UnhandledRotationOrder(order));
            rotation
        }
    }
}

/// Transform properties of a `Model` we know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModelProperty {
    Translation,
    RotationOrder,
    RotationOffset,
    RotationPivot,
    PreRotation,
    Rotation,
    PostRotation,
    ScalingPivot,
    Scaling,
    ScalingOffset,
    RotationMin,
    RotationMax,
    /// `RotationMin{X,Y,Z}` / `RotationMax{X,Y,Z}` enable flags.
    LimitEnabled { max: bool, axis: usize },
    GeometricTranslation,
    GeometricRotation,
    GeometricScaling,
}

impl ModelProperty {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            // if you were wondering: "Lcl" stands for "Local"
            "Lcl Translation" => Self::Translation,
            "RotationOrder" => Self::RotationOrder,
            "RotationOffset" => Self::RotationOffset,
            "RotationPivot" => Self::RotationPivot,
            "PreRotation" => Self::PreRotation,
            "Lcl Rotation" => Self::Rotation,
            "PostRotation" => Self::PostRotation,
            "ScalingPivot" => Self::ScalingPivot,
            "Lcl Scaling" => Self::Scaling,
            "ScalingOffset" => Self::ScalingOffset,
            "RotationMin" => Self::RotationMin,
            "RotationMax" => Self::RotationMax,
            "RotationMinX" => Self::LimitEnabled { max: false, axis: 0 },
            "RotationMinY" => Self::LimitEnabled { max: false, axis: 1 },
            "RotationMinZ" => Self::LimitEnabled { max: false, axis: 2 },
            "RotationMaxX" => Self::LimitEnabled { max: true, axis: 0 },
            "RotationMaxY" => Self::LimitEnabled { max: true, axis: 1 },
            "RotationMaxZ" => Self::LimitEnabled { max: true, axis: 2 },
            "GeometricTranslation" => Self::GeometricTranslation,
            "GeometricRotation" => Self::GeometricRotation,
            "GeometricScaling" => Self::GeometricScaling,
            _ => return None,
        })
    }
}

/// Transform applied to a model's geometry only (3ds Max "object offset").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricOffset {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scaling: Vec3,
}

impl GeometricOffset {
    pub fn mat(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scaling, self.rotation, self.translation)
    }
}

/// Local transform decomposition of an FBX model.
#[derive(Debug, Clone, PartialEq)]
pub struct FbxModel {
    pub name: String,
    /// Usually in centimeters.
    pub translation: Vec3,
    pub pre_transform: Mat4,
    pub pre_rotation: Quat,
    pub rotation: Quat,
    /// Already inverted.
    pub post_rotation: Quat,
    pub post_transform: Mat4,
    /// Radians.
    pub rotation_min: Vec3,
    /// Radians.
    pub rotation_max: Vec3,
    pub geometric_offset: Option<GeometricOffset>,
}

impl FbxModel {
    pub fn combined_rotation(&self) -> Quat {
        self.pre_rotation * self.rotation * self.post_rotation
    }

    /// `T · preTransform · R(pre · local · post) · postTransform`
    pub fn local_transform(&self) -> Mat4 {
        Translation(self.translation).mat()
            * self.pre_transform
            * Mat4::from_quat(self.combined_rotation())
            * self.post_transform
    }
}

/// Raw property values of a model, as read from its property blocks.
#[derive(Debug, Clone)]
pub(crate) struct ModelTransformBuilder {
    translation: Translation,
    rotation_order: i32,
    rotation_offset: Translation,
    rotation_pivot: Translation,
    // XYZ Euler degrees, already converted from `rotation_order`
    pre_rotation: Vec3,
    rotation: Vec3,
    post_rotation: Vec3,
    scaling_pivot: Translation,
    scaling: Scale,
    scaling_offset: Translation,
    // degrees
    rotation_min: Vec3,
    rotation_max: Vec3,
    min_enabled: [bool; 3],
    max_enabled: [bool; 3],
    has_geometric_offset: bool,
    geometric_translation: Vec3,
    geometric_rotation: Vec3,
    geometric_scaling: Vec3,
}

impl Default for ModelTransformBuilder {
    fn default() -> Self {
        ModelTransformBuilder {
            translation: Translation::default(),
            rotation_order: 0,
            rotation_offset: Translation::default(),
            rotation_pivot: Translation::default(),
            pre_rotation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            post_rotation: Vec3::ZERO,
            scaling_pivot: Translation::default(),
            scaling: Scale::IDENTITY,
            scaling_offset: Translation::default(),
            rotation_min: Vec3::ZERO,
            rotation_max: Vec3::ZERO,
            min_enabled: [false; 3],
            max_enabled: [false; 3],
            has_geometric_offset: false,
            geometric_translation: Vec3::ZERO,
            geometric_rotation: Vec3::ZERO,
            geometric_scaling: Vec3::ONE,
        }
    }
}

impl ModelTransformBuilder {
    /// Applies one property block entry; unknown names are ignored.
    ///
    /// Rotations are converted with the rotation order read so far, so the
    /// order of entries in the block matters.
    pub(crate) fn apply(&mut self, entry: &PropertyEntry, diagnostics: &mut Diagnostics) {
        let Some(property) = ModelProperty::from_name(entry.name) else {
            return;
        };
        let order = self.rotation_order;
        let to_xyz = |v, d: &mut Diagnostics| convert_rotation_to_xyz(order, v, d);
        match property {
            ModelProperty::Translation => self.translation = Translation(entry.vec3()),
            ModelProperty::RotationOrder => self.rotation_order = entry.i32(),
            ModelProperty::RotationOffset => self.rotation_offset = Translation(entry.vec3()),
            ModelProperty::RotationPivot => self.rotation_pivot = Translation(entry.vec3()),
            ModelProperty::PreRotation => self.pre_rotation = to_xyz(entry.vec3(), diagnostics),
            ModelProperty::Rotation => self.rotation = to_xyz(entry.vec3(), diagnostics),
            ModelProperty::PostRotation => self.post_rotation = to_xyz(entry.vec3(), diagnostics),
            ModelProperty::ScalingPivot => self.scaling_pivot = Translation(entry.vec3()),
            ModelProperty::Scaling => self.scaling = Scale(entry.vec3()),
            ModelProperty::ScalingOffset => self.scaling_offset = Translation(entry.vec3()),
            ModelProperty::RotationMin => self.rotation_min = entry.vec3(),
            ModelProperty::RotationMax => self.rotation_max = entry.vec3(),
            ModelProperty::LimitEnabled { max: false, axis } => self.min_enabled[axis] = entry.bool(),
            ModelProperty::LimitEnabled { max: true, axis } => self.max_enabled[axis] = entry.bool(),
            ModelProperty::GeometricTranslation => {
                self.geometric_translation = entry.vec3();
                self.has_geometric_offset = true;
            }
            ModelProperty::GeometricRotation => {
                self.geometric_rotation = entry.vec3();
                self.has_geometric_offset = true;
            }
            ModelProperty::GeometricScaling => {
                self.geometric_scaling = entry.vec3();
                self.has_geometric_offset = true;
            }
        }
    }

    pub(crate) fn build(self, name: String) -> FbxModel {
        let limit = |values: Vec3, enabled: [bool; 3], default: f32| {
            let pick = |axis: usize| {
                let v = if enabled[axis] { values[axis] } else { default };
                v.to_radians()
            };
            Vec3::new(pick(0), pick(1), pick(2))
        };
        let rotation_pivot = self.rotation_pivot;
        let scaling_pivot = self.scaling_pivot;
        let geometric_offset = self.has_geometric_offset.then(|| GeometricOffset {
            translation: self.geometric_translation,
            rotation: quat_from_euler_degrees(self.geometric_rotation),
            scaling: self.geometric_scaling,
        });
        FbxModel {
            name,
            translation: self.translation.0,
            pre_transform: self.rotation_offset.mat() * rotation_pivot.mat(),
            pre_rotation: quat_from_euler_degrees(self.pre_rotation),
            rotation: quat_from_euler_degrees(self.rotation),
            post_rotation: quat_from_euler_degrees(self.post_rotation).inverse(),
            post_transform: rotation_pivot.mat().inverse()
                * self.scaling_offset.mat()
                * scaling_pivot.mat()
                * self.scaling.mat()
                * scaling_pivot.mat().inverse(),
            rotation_min: limit(self.rotation_min, self.min_enabled, -180.0),
            rotation_max: limit(self.rotation_max, self.max_enabled, 180.0),
            geometric_offset,
        }
    }
}

/// Translation component of an affine matrix.
pub fn extract_translation(m: Mat4) -> Vec3 {
    m.w_axis.truncate()
}

/// Rotation component of an affine matrix, ignoring scale.
pub fn extract_rotation(m: Mat4) -> Quat {
    m.to_scale_rotation_translation().1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{property_entries, Node};
    use proptest::prelude::*;

    fn mat_close(a: Quat, b: Quat, eps: f32) -> bool {
        let (a, b) = (Mat4::from_quat(a), Mat4::from_quat(b));
        a.abs_diff_eq(b, eps)
    }

    #[test]
    fn zyx_single_axis_is_order_invariant() {
        let mut diagnostics = Diagnostics::new("test.fbx");
        let xyz = convert_rotation_to_xyz(5, Vec3::new(30.0, 0.0, 0.0), &mut diagnostics);
        assert!(xyz.abs_diff_eq(Vec3::new(30.0, 0.0, 0.0), 1e-4));
        assert!(mat_close(
            quat_from_euler_degrees(xyz),
            Quat::from_rotation_x(30f32.to_radians()),
            1e-6
        ));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn spheric_xyz_passes_through_once() {
        let mut diagnostics = Diagnostics::new("test.fbx");
        let rotation = Vec3::new(10.0, 20.0, 30.0);
        assert_eq!(convert_rotation_to_xyz(6, rotation, &mut diagnostics), rotation);
        assert_eq!(convert_rotation_to_xyz(6, rotation, &mut diagnostics), rotation);
        assert_eq!(diagnostics.entries(), &[Diagnostic::UnhandledRotationOrder(6)]);
    }

    #[test]
    fn euler_roundtrip_through_gimbal_lock() {
        let euler = Vec3::new(25.0, 90.0, -40.0);
        let q = quat_from_euler_degrees(euler);
        assert!(mat_close(quat_from_euler_degrees(euler_degrees_from_quat(q)), q, 1e-5));
    }

    #[test]
    fn builds_model_from_properties70() {
        let p = |name: &str, values: [f64; 3]| {
            Node::new("P")
                .with_properties([name, "", "", "A"])
                .with_properties(values)
        };
        let block = Node::new("Properties70").with_children([
            p("Lcl Translation", [0.0, 10.0, 0.0]),
            Node::new("P")
                .with_properties(["RotationOrder", "enum", "", ""])
                .with_property(5),
            p("Lcl Rotation", [0.0, 0.0, 90.0]),
            p("Lcl Scaling", [2.0, 2.0, 2.0]),
            Node::new("P")
                .with_properties(["RotationMaxX", "bool", "", ""])
                .with_property(1),
            p("RotationMax", [45.0, 10.0, 10.0]),
            p("GeometricTranslation", [1.0, 0.0, 0.0]),
            p("Unknown Thing", [1.0, 1.0, 1.0]),
        ]);
        let mut diagnostics = Diagnostics::new("test.fbx");
        let mut builder = ModelTransformBuilder::default();
        for entry in property_entries(&block) {
            builder.apply(&entry, &mut diagnostics);
        }
        let model = builder.build("Spine".into());

        assert_eq!(model.translation, Vec3::new(0.0, 10.0, 0.0));
        let expected = Quat::from_rotation_z(90f32.to_radians());
        assert!(mat_close(model.rotation, expected, 1e-5));
        assert!(model
            .rotation_max
            .abs_diff_eq(Vec3::new(45f32.to_radians(), 180f32.to_radians(), 180f32.to_radians()), 1e-6));
        assert!(model.rotation_min.abs_diff_eq(Vec3::splat(-180f32.to_radians()), 1e-6));
        let offset = model.geometric_offset.expect("geometric offset");
        assert_eq!(offset.translation, Vec3::X);
        assert_eq!(offset.scaling, Vec3::ONE);

        let p = model.local_transform().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 12.0, 0.0), 1e-5));
    }

    #[test]
    fn pivots_cancel_for_identity_rotation() {
        let mut builder = ModelTransformBuilder::default();
        builder.rotation_pivot = Translation(Vec3::new(3.0, 4.0, 5.0));
        let model = builder.build(String::new());
        assert!(model.local_transform().abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    proptest! {
        #[test]
        fn converted_orders_keep_net_rotation(
            order in 0i32..6,
            x in -180f32..180.0,
            y in -180f32..180.0,
            z in -180f32..180.0,
        ) {
            let mut diagnostics = Diagnostics::new("prop.fbx");
            let angles = Vec3::new(x, y, z);
            let xyz = convert_rotation_to_xyz(order, angles, &mut diagnostics);
            let [qx, qy, qz] = [
                Quat::from_rotation_x(x.to_radians()),
                Quat::from_rotation_y(y.to_radians()),
                Quat::from_rotation_z(z.to_radians()),
            ];
            let direct = match order {
                0 => qz * qy * qx,
                1 => qy * qz * qx,
                2 => qx * qz * qy,
                3 => qz * qx * qy,
                4 => qy * qx * qz,
                _ => qx * qy * qz,
            };
            prop_assert!(mat_close(quat_from_euler_degrees(xyz), direct, 1e-5));
            prop_assert!(diagnostics.is_empty());
        }
    }
}
