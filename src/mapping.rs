//! Name-mapping configuration supplied alongside a model.
//!
//! Usually this comes from the `.fst` file next to an avatar; it can also be
//! deserialized with serde from any self-describing format.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;

use crate::fbx_transform::quat_from_euler_degrees;
use crate::node::process_id;

/// FBX files store lengths in centimeters.
pub const METERS_PER_CENTIMETER: f32 = 0.01;

/// The names of the joints in the Maya HumanIK rig.
pub const HUMANIK_JOINTS: [&str; 16] = [
    "RightHand",
    "RightForeArm",
    "RightArm",
    "Head",
    "LeftArm",
    "LeftForeArm",
    "LeftHand",
    "Neck",
    "Spine",
    "Hips",
    "RightUpLeg",
    "LeftUpLeg",
    "RightLeg",
    "LeftLeg",
    "RightFoot",
    "LeftFoot",
];

/// Facial blendshape channels, in channel-index order.
pub const BLENDSHAPE_CHANNELS: &[&str] = &[
    "EyeBlink_L",
    "EyeBlink_R",
    "EyeSquint_L",
    "EyeSquint_R",
    "EyeDown_L",
    "EyeDown_R",
    "EyeIn_L",
    "EyeIn_R",
    "EyeOpen_L",
    "EyeOpen_R",
    "EyeOut_L",
    "EyeOut_R",
    "EyeUp_L",
    "EyeUp_R",
    "BrowsD_L",
    "BrowsD_R",
    "BrowsU_C",
    "BrowsU_L",
    "BrowsU_R",
    "JawFwd",
    "JawLeft",
    "JawOpen",
    "JawChew",
    "JawRight",
    "MouthLeft",
    "MouthRight",
    "MouthFrown_L",
    "MouthFrown_R",
    "MouthSmile_L",
    "MouthSmile_R",
    "MouthDimple_L",
    "MouthDimple_R",
    "LipsStretch_L",
    "LipsStretch_R",
    "LipsUpperClose",
    "LipsLowerClose",
    "LipsUpperUp",
    "LipsLowerDown",
    "LipsUpperOpen",
    "LipsLowerOpen",
    "LipsFunnel",
    "LipsPucker",
    "ChinLowerRaise",
    "ChinUpperRaise",
    "Sneer",
    "Puff",
    "CheekSquint_L",
    "CheekSquint_R",
];

/// Joints the rest of the client looks up by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointRole {
    EyeLeft,
    EyeRight,
    Neck,
    Root,
    Lean,
    Head,
    LeftHand,
    RightHand,
    LeftToe,
    RightToe,
}

impl JointRole {
    /// In matching priority order: a model takes the first role it matches.
    pub const ALL: [JointRole; 10] = [
        JointRole::EyeLeft,
        JointRole::EyeRight,
        JointRole::Neck,
        JointRole::Root,
        JointRole::Lean,
        JointRole::Head,
        JointRole::LeftHand,
        JointRole::RightHand,
        JointRole::LeftToe,
        JointRole::RightToe,
    ];

    /// Key of the `joint` table in the mapping, for roles that can be remapped.
    pub fn mapping_key(self) -> Option<&'static str> {
        match self {
            JointRole::EyeLeft => Some("jointEyeLeft"),
            JointRole::EyeRight => Some("jointEyeRight"),
            JointRole::Neck => Some("jointNeck"),
            JointRole::Root => Some("jointRoot"),
            JointRole::Lean => Some("jointLean"),
            JointRole::Head => Some("jointHead"),
            JointRole::LeftHand => Some("jointLeftHand"),
            JointRole::RightHand => Some("jointRightHand"),
            JointRole::LeftToe | JointRole::RightToe => None,
        }
    }

    /// Conventional names exporters use for this role.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            JointRole::EyeLeft => &["EyeL", "joint_Leye"],
            JointRole::EyeRight => &["EyeR", "joint_Reye"],
            JointRole::Neck => &["NeckRot", "joint_neck"],
            JointRole::Root | JointRole::Lean | JointRole::Head => &[],
            JointRole::LeftHand => &["LeftHand", "joint_L_hand"],
            JointRole::RightHand => &["RightHand", "joint_R_hand"],
            JointRole::LeftToe => &["LeftToe", "joint_L_toe", "LeftToe_End"],
            JointRole::RightToe => &["RightToe", "joint_R_toe", "RightToe_End"],
        }
    }
}

/// One `bs` entry: the FBX blendshape name and the weight it contributes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlendshapeMapping(pub String, pub f32);

/// Name mapping and global offset of a model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Mapping {
    pub scale: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
    pub tx: f32,
    pub ty: f32,
    pub tz: f32,
    /// Role (`jointRoot`, `jointNeck`, ..., or a HumanIK name) → joint name.
    pub joint: HashMap<String, String>,
    pub free_joint: Vec<String>,
    /// Blendshape channel → FBX blendshapes feeding it.
    pub bs: HashMap<String, Vec<BlendshapeMapping>>,
    pub palm_direction: [f32; 3],
}

impl Default for Mapping {
    fn default() -> Self {
        Mapping {
            scale: 1.0,
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            tx: 0.0,
            ty: 0.0,
            tz: 0.0,
            joint: HashMap::new(),
            free_joint: Vec::new(),
            bs: HashMap::new(),
            palm_direction: [0.0, -1.0, 0.0],
        }
    }
}

impl Mapping {
    /// Parses the line-based FST format.
    ///
    /// ```text
    /// scale = 1.5
    /// joint = jointRoot = Hips
    /// freeJoint = LeftArm
    /// bs = EyeBlink_L = Blink_Left = 1
    /// palmDirection = 0, -1, 0
    /// ```
    ///
    /// Unknown keys and malformed values are skipped.
    pub fn from_fst(text: &str) -> Self {
        let mut mapping = Mapping::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('=').map(str::trim).collect();
            let float = |s: &str| s.parse::<f32>().ok();
            match parts.as_slice() {
                ["joint", role, name, ..] => {
                    mapping.joint.insert((*role).to_owned(), (*name).to_owned());
                }
                ["bs", channel, name, weight, ..] => {
                    let weight = float(*weight).unwrap_or(1.0);
                    mapping
                        .bs
                        .entry((*channel).to_owned())
                        .or_default()
                        .push(BlendshapeMapping((*name).to_owned(), weight));
                }
                ["freeJoint", name] => mapping.free_joint.push((*name).to_owned()),
                ["palmDirection", value] => mapping.palm_direction = parse_vec3(*value).into(),
                [key, value] => {
                    let slot = match *key {
                        "scale" => &mut mapping.scale,
                        "rx" => &mut mapping.rx,
                        "ry" => &mut mapping.ry,
                        "rz" => &mut mapping.rz,
                        "tx" => &mut mapping.tx,
                        "ty" => &mut mapping.ty,
                        "tz" => &mut mapping.tz,
                        _ => continue,
                    };
                    if let Some(v) = float(*value) {
                        *slot = v;
                    }
                }
                _ => {}
            }
        }
        mapping
    }

    /// Joint name configured for `key`, or `key` itself.
    pub fn joint_name(&self, key: &str) -> String {
        let name = self.joint.get(key).map_or(key, String::as_str);
        process_id(name).to_owned()
    }

    pub fn is_free_joint(&self, name: &str) -> bool {
        self.free_joint.iter().any(|j| j == name)
    }

    pub fn palm_direction(&self) -> Vec3 {
        Vec3::from(self.palm_direction)
    }

    /// Global offset: `T(tx,ty,tz) · R(rx,ry,rz) · S(scale · unit_scale · cm→m)`.
    pub fn offset(&self, unit_scale_factor: f32) -> Mat4 {
        let scale = self.scale * unit_scale_factor * METERS_PER_CENTIMETER;
        let rotation: Quat = quat_from_euler_degrees(Vec3::new(self.rx, self.ry, self.rz));
        Mat4::from_translation(Vec3::new(self.tx, self.ty, self.tz))
            * Mat4::from_quat(rotation)
            * Mat4::from_scale(Vec3::splat(scale))
    }

    /// FBX blendshape name → `(channel index, weight)` pairs.
    ///
    /// Unmapped channels are fed by the blendshape of the same name.
    pub fn blendshape_indices(&self) -> HashMap<String, Vec<(usize, f32)>> {
        let mut indices: HashMap<String, Vec<(usize, f32)>> = HashMap::new();
        for (i, &channel) in BLENDSHAPE_CHANNELS.iter().enumerate() {
            match self.bs.get(channel) {
                Some(mappings) if !mappings.is_empty() => {
                    for BlendshapeMapping(name, weight) in mappings {
                        indices.entry(name.clone()).or_default().push((i, *weight));
                    }
                }
                _ => indices.entry(channel.to_owned()).or_default().push((i, 1.0)),
            }
        }
        indices
    }
}

/// Parses `"x, y, z"`, repeating the last element when fewer than three are given.
pub(crate) fn parse_vec3(s: &str) -> Vec3 {
    let elements: Vec<f32> = s
        .split(',')
        .map(|e| e.trim().parse().unwrap_or(0.0))
        .collect();
    match elements.as_slice() {
        [] => Vec3::ZERO,
        els => {
            let at = |i: usize| els[i.min(els.len() - 1)];
            Vec3::new(at(0), at(1), at(2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fst() {
        let mapping = Mapping::from_fst(
            "name = avatar\n\
             scale = 2\n\
             ty = 0.5\n\
             joint = jointRoot = Hips\n\
             joint = jointNeck = Model::Neck\n\
             freeJoint = LeftArm\n\
             freeJoint = RightArm\n\
             bs = EyeBlink_L = Blink_Left = 0.5\n\
             palmDirection = 0, 0\n",
        );
        assert_eq!(mapping.scale, 2.0);
        assert_eq!(mapping.ty, 0.5);
        assert_eq!(mapping.joint_name("jointRoot"), "Hips");
        assert_eq!(mapping.joint_name("jointNeck"), "Neck");
        assert_eq!(mapping.joint_name("jointHead"), "jointHead");
        assert!(mapping.is_free_joint("RightArm"));
        assert_eq!(mapping.palm_direction(), Vec3::ZERO);
        assert_eq!(
            mapping.bs["EyeBlink_L"],
            vec![BlendshapeMapping("Blink_Left".into(), 0.5)]
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let mapping: Mapping =
            serde_json::from_str(r#"{"scale": 3.0, "freeJoint": ["Head"], "bs": {"JawOpen": [["MouthOpen", 0.7]]}}"#)
                .unwrap();
        assert_eq!(mapping.scale, 3.0);
        assert_eq!(mapping.palm_direction, [0.0, -1.0, 0.0]);
        assert_eq!(mapping.free_joint, vec!["Head".to_owned()]);
        let indices = mapping.blendshape_indices();
        let jaw_open = BLENDSHAPE_CHANNELS.iter().position(|&c| c == "JawOpen").unwrap();
        assert_eq!(indices["MouthOpen"], vec![(jaw_open, 0.7)]);
        assert!(!indices.contains_key("JawOpen"));
        assert_eq!(indices["EyeBlink_L"], vec![(0, 1.0)]);
    }

    #[test]
    fn offset_scales_centimeters_to_meters() {
        let offset = Mapping::default().offset(1.0);
        let p = offset.transform_point3(Vec3::new(0.0, 100.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-6));
    }
}
