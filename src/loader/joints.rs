//! Joint hierarchy, animation frames and bind overrides.

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use super::connections::OrderedModel;
use crate::data::scene::SceneObjects;
use crate::data::{AnimationFrame, Joint, JointIndex, ShapeInfo, SpecialJoints};
use crate::fbx_transform::{
    euler_degrees_from_quat, extract_rotation, extract_translation, quat_from_euler_degrees,
};
use crate::mapping::{Mapping, HUMANIK_JOINTS};

/// Joint index of each ordered model id.
pub(crate) fn model_indices<'a>(order: &[OrderedModel<'a>]) -> HashMap<&'a str, JointIndex> {
    order
        .iter()
        .enumerate()
        .map(|(i, ordered)| (ordered.id, JointIndex::new(i)))
        .collect()
}

fn is_skeleton_joint(scene: &SceneObjects, model_id: &str) -> bool {
    scene
        .child_map
        .values(model_id)
        .find_map(|child| scene.type_flags.get(child).filter(|flags| !flags.is_empty()))
        .map_or(false, |flags| flags.to_lowercase().contains("skeleton"))
}

/// One joint per ordered model, in the same order.
///
/// `offset` is applied to root transforms only, children inherit it.
pub(crate) fn build_joints(
    scene: &SceneObjects,
    order: &[OrderedModel],
    mapping: &Mapping,
    offset: Mat4,
) -> Vec<Joint> {
    #[cfg(feature = "profile")]
    let _build_joints_span = tracing::info_span!("build_joints").entered();

    let mut joints: Vec<Joint> = Vec::with_capacity(order.len());
    for ordered in order {
        let model = ordered.model;
        let is_free = mapping.is_free_joint(&model.name);

        let mut free_lineage = vec![JointIndex::new(joints.len())];
        let mut last_free = is_free.then_some(0);
        let mut ancestor = ordered.parent_index;
        while let Some(i) = ancestor {
            let Some(joint) = joints.get(i) else {
                break;
            };
            if joint.is_free {
                last_free = Some(free_lineage.len());
            }
            free_lineage.push(JointIndex::new(i));
            ancestor = joint.parent_index.map(JointIndex::to_usize);
        }
        free_lineage.truncate(last_free.map_or(1, |i| i + 1));

        let local = model.local_transform();
        let combined = model.combined_rotation();
        let parent = ordered.parent_index.and_then(|i| joints.get(i));
        let (transform, inverse_default_rotation, distance_to_parent) = match parent {
            None => (offset * local, combined.inverse(), 0.0),
            Some(parent) => {
                let transform = parent.transform * local;
                let distance = extract_translation(parent.transform)
                    .distance(extract_translation(transform));
                (
                    transform,
                    combined.inverse() * parent.inverse_default_rotation,
                    distance,
                )
            }
        };

        joints.push(Joint {
            name: model.name.clone(),
            parent_index: ordered.parent_index.map(JointIndex::new),
            is_free,
            free_lineage,
            distance_to_parent,
            translation: model.translation,
            pre_transform: model.pre_transform,
            pre_rotation: model.pre_rotation,
            rotation: model.rotation,
            post_rotation: model.post_rotation,
            post_transform: model.post_transform,
            transform,
            rotation_min: model.rotation_min,
            rotation_max: model.rotation_max,
            inverse_default_rotation,
            inverse_bind_rotation: inverse_default_rotation,
            bind_transform: Mat4::IDENTITY,
            bind_transform_found_in_cluster: false,
            is_skeleton_joint: is_skeleton_joint(scene, ordered.id),
            geometric_offset: model.geometric_offset,
            shape_info: ShapeInfo::default(),
        });
    }
    joints
}

/// Samples every joint's curves, one frame per key of the longest curve.
///
/// Missing curves leave the joint at its default rotation and translation.
pub(crate) fn animation_frames(
    scene: &SceneObjects,
    order: &[OrderedModel],
    joints: &[Joint],
) -> Vec<AnimationFrame> {
    let frame_count = scene
        .animation_curves
        .values()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .max(1);
    let mut frames = vec![AnimationFrame::default(); frame_count];
    for (ordered, joint) in order.iter().zip(joints) {
        let rotation_node = scene.rotation_curve_nodes.get(ordered.id);
        let translation_node = scene.translation_curve_nodes.get(ordered.id);
        let rotation_curves = [0, 1, 2].map(|axis| scene.curve(rotation_node, axis));
        let translation_curves = [0, 1, 2].map(|axis| scene.curve(translation_node, axis));
        let default_rotation = euler_degrees_from_quat(joint.rotation);

        let sample = |curves: &[&[f32]; 3], default: Vec3, frame: usize| {
            let axis = |i: usize| match curves[i] {
                [] => default[i],
                curve => curve[frame % curve.len()],
            };
            Vec3::new(axis(0), axis(1), axis(2))
        };
        for (i, frame) in frames.iter_mut().enumerate() {
            let degrees = sample(&rotation_curves, default_rotation, i);
            frame.rotations.push(quat_from_euler_degrees(degrees));
            frame
                .translations
                .push(sample(&translation_curves, joint.translation, i));
        }
    }
    frames
}

pub(crate) fn special_joints(
    scene: &SceneObjects,
    model_indices: &HashMap<&str, JointIndex>,
) -> SpecialJoints {
    let mut special = SpecialJoints::default();
    for (&role, id) in &scene.special_joint_ids {
        special.set(role, model_indices.get(id.as_str()).copied());
    }
    special
}

pub(crate) fn humanik_joints(
    scene: &SceneObjects,
    model_indices: &HashMap<&str, JointIndex>,
) -> [Option<JointIndex>; HUMANIK_JOINTS.len()] {
    std::array::from_fn(|i| {
        let id = scene.humanik_ids.get(i)?.as_deref()?;
        model_indices.get(id).copied()
    })
}

/// A cluster's transform link, overriding its joint's bind pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BindOverride {
    pub joint: JointIndex,
    pub transform_link: Mat4,
}

/// Applies bind overrides in order, the last one for a joint wins.
pub(crate) fn apply_bind_overrides(mut joints: Vec<Joint>, overrides: &[BindOverride]) -> Vec<Joint> {
    for bind in overrides {
        let Some(joint) = joints.get_mut(bind.joint.to_usize()) else {
            continue;
        };
        joint.inverse_bind_rotation = extract_rotation(bind.transform_link).inverse();
        joint.bind_transform = bind.transform_link;
        joint.bind_transform_found_in_cluster = true;
    }
    joints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fbx_transform::{FbxModel, ModelTransformBuilder};
    use glam::Quat;

    fn model(name: &str, translation: Vec3, rotation: Quat) -> FbxModel {
        FbxModel {
            translation,
            rotation,
            ..ModelTransformBuilder::default().build(name.to_owned())
        }
    }

    fn chain<'a>(ids: &[&'a str], models: &'a [FbxModel]) -> Vec<OrderedModel<'a>> {
        ids.iter()
            .zip(models)
            .enumerate()
            .map(|(i, (&id, model))| OrderedModel {
                id,
                model,
                parent_index: i.checked_sub(1),
            })
            .collect()
    }

    #[test]
    fn chain_transforms_compose() {
        let models = [
            model("Hips", Vec3::new(0.0, 100.0, 0.0), Quat::IDENTITY),
            model("Spine", Vec3::new(0.0, 10.0, 0.0), Quat::from_rotation_z(0.5)),
        ];
        let order = chain(&["1", "2"], &models);
        let mapping = Mapping::default();
        let offset = mapping.offset(1.0);
        let joints = build_joints(&SceneObjects::new(), &order, &mapping, offset);

        let hips = extract_translation(joints[0].transform);
        let spine = extract_translation(joints[1].transform);
        assert!(hips.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
        assert!(spine.abs_diff_eq(Vec3::new(0.0, 1.1, 0.0), 1e-5));
        assert!((joints[1].distance_to_parent - 0.1).abs() < 1e-5);
        assert_eq!(joints[1].parent_index, Some(JointIndex::new(0)));
        let expected = Quat::from_rotation_z(0.5).inverse();
        assert!(joints[1].inverse_default_rotation.abs_diff_eq(expected, 1e-6));
        assert_eq!(joints[1].inverse_bind_rotation, joints[1].inverse_default_rotation);
    }

    #[test]
    fn free_lineage_stops_at_last_free_ancestor() {
        let models = [
            model("Root", Vec3::ZERO, Quat::IDENTITY),
            model("Arm", Vec3::ZERO, Quat::IDENTITY),
            model("ForeArm", Vec3::ZERO, Quat::IDENTITY),
            model("Hand", Vec3::ZERO, Quat::IDENTITY),
        ];
        let order = chain(&["1", "2", "3", "4"], &models);
        let mapping = Mapping {
            free_joint: vec!["Arm".into()],
            ..Default::default()
        };
        let joints = build_joints(&SceneObjects::new(), &order, &mapping, Mat4::IDENTITY);
        let lineage: Vec<usize> = joints[3].free_lineage.iter().map(|i| i.to_usize()).collect();
        assert_eq!(lineage, [3, 2, 1]);
        assert_eq!(joints[0].free_lineage, [JointIndex::new(0)]);
        assert_eq!(joints[1].free_lineage.len(), 1);
        assert!(joints[1].is_free);
    }

    #[test]
    fn frames_sample_curves_modulo_length() {
        let models = [model("Hips", Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY)];
        let order = chain(&["1"], &models);
        let mut scene = SceneObjects::new();
        scene.translation_curve_nodes.insert("1".into(), "node".into());
        scene.curve_components[0].insert("node".into(), "curve_x".into());
        scene.animation_curves.insert("curve_x".into(), vec![5.0, 6.0]);
        scene.animation_curves.insert("unlinked".into(), vec![0.0; 3]);
        let joints = build_joints(&scene, &order, &Mapping::default(), Mat4::IDENTITY);
        let frames = animation_frames(&scene, &order, &joints);
        assert_eq!(frames.len(), 3);
        let xs: Vec<f32> = frames.iter().map(|f| f.translations[0].x).collect();
        assert_eq!(xs, [5.0, 6.0, 5.0]);
        assert_eq!(frames[2].translations[0].z, 3.0);
        assert!(frames[0].rotations[0].abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn last_override_wins() {
        let models = [model("Hips", Vec3::ZERO, Quat::IDENTITY)];
        let order = chain(&["1"], &models);
        let joints = build_joints(&SceneObjects::new(), &order, &Mapping::default(), Mat4::IDENTITY);
        let first = Mat4::from_translation(Vec3::X);
        let last = Mat4::from_rotation_y(1.0);
        let joint = JointIndex::new(0);
        let joints = apply_bind_overrides(
            joints,
            &[
                BindOverride { joint, transform_link: first },
                BindOverride { joint, transform_link: last },
                BindOverride { joint: JointIndex::new(7), transform_link: first },
            ],
        );
        assert_eq!(joints[0].bind_transform, last);
        assert!(joints[0].bind_transform_found_in_cluster);
        let expected = Quat::from_rotation_y(1.0).inverse();
        assert!(joints[0].inverse_bind_rotation.abs_diff_eq(expected, 1e-5));
    }
}
