use std::collections::HashSet;

use fbx_geometry::{
    fbx_transform::extract_translation, read_fbx, Diagnostic, Diagnostics, Geometry, JointIndex,
    Loader, Mapping, Node, Property,
};
use glam::{Mat4, Quat, Vec3};
use proptest::prelude::*;

fn p(name: &str, value: impl IntoIterator<Item = Property>) -> Node {
    Node::new("P")
        .with_properties([name, "", "", ""])
        .with_properties(value)
}

fn p_vec3(name: &str, v: Vec3) -> Node {
    p(name, [v.x, v.y, v.z].map(|c| Property::F64(c.into())))
}

fn object(kind: &str, id: i64, name: &str, sub: &str) -> Node {
    Node::new(kind).with_properties([
        Property::I64(id),
        format!("{name}\0\u{1}{kind}").into(),
        sub.into(),
    ])
}

fn limb(id: i64, name: &str, properties: Vec<Node>) -> Node {
    object("Model", id, name, "LimbNode")
        .with_child(Node::new("Properties70").with_children(properties))
}

fn mat(m: Mat4) -> Vec<f64> {
    m.to_cols_array().iter().map(|&v| v.into()).collect()
}

fn cluster(id: i64, name: &str, indices: Vec<i32>, weights: Vec<f64>, link: Mat4) -> Node {
    object("Deformer", id, name, "Cluster")
        .with_child(Node::new("Indexes").with_property(indices))
        .with_child(Node::new("Weights").with_property(weights))
        .with_child(Node::new("TransformLink").with_property(mat(link)))
}

fn triangle_geometry(id: i64, name: &str) -> Node {
    object("Geometry", id, name, "Mesh")
        .with_child(
            Node::new("Vertices").with_property(vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0, 0.0]),
        )
        .with_child(Node::new("PolygonVertexIndex").with_property(vec![0, 1, -3]))
}

fn oo(child: i64, parent: i64) -> Node {
    Node::new("C").with_properties([Property::from("OO"), child.into(), parent.into()])
}

fn document(objects: Vec<Node>, connections: Vec<Node>) -> Node {
    Node::new("").with_children([
        Node::new("GlobalSettings").with_child(
            Node::new("Properties70")
                .with_child(p("UnitScaleFactor", [Property::F64(1.0)])),
        ),
        Node::new("Objects").with_children(objects),
        Node::new("Connections").with_children(connections),
    ])
}

/// Hips → Spine, with a body triangle skinned to both.
fn skinned_document() -> Node {
    let objects = vec![
        limb(1, "Hips", vec![p_vec3("Lcl Translation", Vec3::new(0.0, 100.0, 0.0))]),
        limb(2, "Spine", vec![p_vec3("Lcl Translation", Vec3::new(0.0, 10.0, 0.0))]),
        object("Model", 3, "Body", "Mesh"),
        triangle_geometry(10, "Body"),
        object("Deformer", 20, "Skin", "Skin"),
        cluster(
            21,
            "Cluster Hips",
            vec![0, 1, 2],
            vec![1.0, 0.5, 0.25],
            Mat4::from_translation(Vec3::new(0.0, 100.0, 0.0)),
        ),
        cluster(
            22,
            "Cluster Spine",
            vec![1, 2],
            vec![0.5, 0.75],
            Mat4::from_translation(Vec3::new(0.0, 110.0, 0.0)),
        ),
    ];
    let connections = vec![
        oo(1, 0),
        oo(2, 1),
        oo(3, 0),
        oo(10, 3),
        oo(20, 10),
        oo(21, 20),
        oo(22, 20),
        oo(1, 21),
        oo(2, 22),
    ];
    document(objects, connections)
}

fn index(joint: Option<JointIndex>) -> Option<usize> {
    joint.map(JointIndex::to_usize)
}

fn assert_same_rotation(actual: Quat, expected: Quat) {
    let (actual, expected) = (Mat4::from_quat(actual), Mat4::from_quat(expected));
    assert!(actual.abs_diff_eq(expected, 1e-5), "{actual:?} != {expected:?}");
}

fn load(root: &Node, mapping: &Mapping) -> (Geometry, Diagnostics) {
    let mut diagnostics = Diagnostics::new("test.fbx");
    let geometry = read_fbx(root, mapping, "test.fbx", &mut diagnostics);
    (geometry, diagnostics)
}

#[test]
fn skeleton_is_ordered_and_scaled() {
    let (geometry, diagnostics) = load(&skinned_document(), &Mapping::default());
    let names: Vec<_> = geometry.joint_names().collect();
    assert_eq!(names, ["Hips", "Spine", "Body"]);

    let hips = extract_translation(geometry.joints[0].transform);
    let spine = extract_translation(geometry.joints[1].transform);
    assert!(hips.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    assert!(spine.abs_diff_eq(Vec3::new(0.0, 1.1, 0.0), 1e-5));
    assert_eq!(index(geometry.joints[1].parent_index), Some(0));
    assert!((geometry.joints[1].distance_to_parent - 0.1).abs() < 1e-5);
    assert_eq!(index(geometry.joint_index("Spine")), Some(1));

    assert!(geometry.joints[0].bind_transform_found_in_cluster);
    assert!(geometry.joints[1].bind_transform_found_in_cluster);
    assert!(!geometry.joints[2].bind_transform_found_in_cluster);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.entries());
}

#[test]
fn multi_cluster_weights_are_quantized() {
    let (geometry, _) = load(&skinned_document(), &Mapping::default());
    assert_eq!(geometry.meshes.len(), 1);
    let mesh = &geometry.meshes[0];
    assert_eq!(mesh.vertices.len(), 3);
    let joints: Vec<_> = mesh.clusters.iter().map(|c| c.joint_index.to_usize()).collect();
    assert_eq!(joints, [0, 1]);
    assert_eq!(mesh.cluster_weights.len(), 3 * 4);
    for weights in mesh.cluster_weights.chunks(4) {
        let sum: u32 = weights.iter().map(|&w| u32::from(w)).sum();
        assert_eq!(sum, u32::from(u16::MAX));
    }
    assert_eq!(mesh.display_name, "test.fbx#/mesh/0");
    assert_eq!(geometry.model_name_of_mesh(0), Some("Body"));
    assert!(!geometry.mesh_extents.is_empty());
    assert!(!geometry.bind_extents.is_empty());
}

#[test]
fn rigid_mesh_binds_to_its_model() {
    let objects = vec![
        limb(1, "Root", vec![]),
        object("Model", 2, "Box", "Mesh").with_child(
            Node::new("Properties70")
                .with_child(p_vec3("Lcl Translation", Vec3::new(5.0, 0.0, 0.0))),
        ),
        triangle_geometry(10, "Box"),
    ];
    let connections = vec![oo(1, 0), oo(2, 1), oo(10, 2)];
    let (geometry, diagnostics) = load(&document(objects, connections), &Mapping::default());
    let mesh = &geometry.meshes[0];
    assert_eq!(mesh.clusters.len(), 1);
    assert_eq!(mesh.clusters[0].joint_index.to_usize(), 1);
    assert_eq!(mesh.clusters[0].inverse_bind_matrix, Mat4::IDENTITY);
    assert!(mesh.cluster_weights.is_empty());
    assert_eq!(extract_translation(mesh.model_transform), Vec3::new(5.0, 0.0, 0.0));
    assert!(diagnostics.is_empty());
}

#[test]
fn mapping_drives_offset_and_special_joints() {
    let mapping = Mapping::from_fst("scale = 2\njoint = jointNeck = Spine\n");
    let (geometry, _) = load(&skinned_document(), &mapping);
    let hips = extract_translation(geometry.joints[0].transform);
    assert!(hips.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
    assert_eq!(index(geometry.special_joints.neck), Some(1));
    assert!(geometry.neck_pivot.abs_diff_eq(Vec3::new(0.0, 2.2, 0.0), 1e-5));
}

#[test]
fn mapped_root_joint_gets_the_offset_once() {
    let mapping = Mapping::from_fst("joint = jointRoot = Hips\n");
    let (geometry, _) = load(&skinned_document(), &mapping);
    assert_eq!(index(geometry.special_joints.root), Some(0));
    // The offset scales the root, the child inherits it through its parent.
    let hips = extract_translation(geometry.joints[0].transform);
    let spine = extract_translation(geometry.joints[1].transform);
    assert!(hips.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    assert!(spine.abs_diff_eq(Vec3::new(0.0, 1.1, 0.0), 1e-5));
}

/// Six joints all skinning one triangle: vertex 0 has six rising weights,
/// vertex 1 six equal ones, vertex 2 none.
fn crowded_skin_document() -> Node {
    let mut objects = Vec::new();
    let mut connections = Vec::new();
    for k in 0..6i64 {
        objects.push(limb(1 + k, &format!("Bone{k}"), vec![]));
        objects.push(cluster(
            21 + k,
            &format!("Cluster Bone{k}"),
            vec![0, 1],
            vec![0.1 * (k + 1) as f64, 0.5],
            Mat4::IDENTITY,
        ));
        connections.push(oo(1 + k, 0));
    }
    objects.push(object("Model", 7, "Body", "Mesh"));
    objects.push(triangle_geometry(10, "Body"));
    objects.push(object("Deformer", 20, "Skin", "Skin"));
    connections.extend([oo(7, 0), oo(10, 7), oo(20, 10)]);
    for k in 0..6 {
        connections.push(oo(21 + k, 20));
        connections.push(oo(1 + k, 21 + k));
    }
    document(objects, connections)
}

#[test]
fn crowded_vertices_keep_the_four_heaviest_influences() {
    let (geometry, _) = load(&crowded_skin_document(), &Mapping::default());
    let mesh = &geometry.meshes[0];
    assert_eq!(mesh.clusters.len(), 6);
    let rows: Vec<(&[u16], &[u16])> = mesh
        .cluster_indices
        .chunks(4)
        .zip(mesh.cluster_weights.chunks(4))
        .collect();
    assert_eq!(rows.len(), 3);

    // The two lightest are evicted, in place.
    assert_eq!(rows[0].0, [4, 5, 2, 3]);
    assert_eq!(rows[0].1, [18204, 21846, 10922, 14563]);
    // Ties never evict: the first four clusters stay.
    assert_eq!(rows[1].0, [0, 1, 2, 3]);
    assert_eq!(rows[1].1, [16384, 16384, 16384, 16383]);
    // Uninfluenced vertices sum to 0, not 65535.
    assert_eq!(rows[2].0, [0, 0, 0, 0]);
    assert_eq!(rows[2].1, [0, 0, 0, 0]);
}

#[test]
fn zyx_single_axis_rotation() {
    let objects = vec![limb(
        1,
        "Head",
        vec![
            p("RotationOrder", [Property::I32(5)]),
            p_vec3("Lcl Rotation", Vec3::new(0.0, 0.0, 90.0)),
        ],
    )];
    let (geometry, diagnostics) = load(&document(objects, vec![oo(1, 0)]), &Mapping::default());
    let expected = Quat::from_rotation_z(90f32.to_radians());
    assert_same_rotation(geometry.joints[0].rotation, expected);
    assert!(diagnostics.is_empty());
}

#[test]
fn spheric_rotation_order_is_reported_once() {
    let spheric = |id, name| {
        limb(
            id,
            name,
            vec![
                p("RotationOrder", [Property::I32(6)]),
                p_vec3("Lcl Rotation", Vec3::new(10.0, 0.0, 0.0)),
            ],
        )
    };
    let objects = vec![spheric(1, "A"), spheric(2, "B")];
    let (geometry, diagnostics) =
        load(&document(objects, vec![oo(1, 0), oo(2, 1)]), &Mapping::default());
    let expected = Quat::from_rotation_x(10f32.to_radians());
    assert_same_rotation(geometry.joints[0].rotation, expected);
    let reported = diagnostics
        .entries()
        .iter()
        .filter(|d| matches!(d, Diagnostic::UnhandledRotationOrder(6)))
        .count();
    assert_eq!(reported, 1);
}

#[test]
fn connection_cycles_terminate() {
    let objects = vec![limb(1, "A", vec![]), limb(2, "B", vec![])];
    let (geometry, diagnostics) = load(&document(objects, vec![oo(1, 2), oo(2, 1)]), &Mapping::default());
    assert_eq!(geometry.joints.len(), 2);
    assert!(diagnostics
        .entries()
        .iter()
        .any(|d| matches!(d, Diagnostic::ConnectionCycle(_))));
}

#[test]
fn loading_is_deterministic() {
    let root = skinned_document();
    let loader = Loader::new().with_lightmaps(false, 0.5);
    let mut first_diagnostics = Diagnostics::new("a.fbx");
    let first = loader.load(&root, &Mapping::default(), "a.fbx", &mut first_diagnostics);
    for _ in 0..4 {
        let mut diagnostics = Diagnostics::new("a.fbx");
        let again = loader.load(&root, &Mapping::default(), "a.fbx", &mut diagnostics);
        assert_eq!(again, first);
        assert_eq!(diagnostics.entries(), first_diagnostics.entries());
    }
    assert!(!first.lightmaps.load_lightmaps);
    assert_eq!(first.lightmaps.level, 0.5);
}

#[test]
fn orphan_blendshape_is_reported() {
    let shape = object("Geometry", 30, "Smile", "Shape")
        .with_child(Node::new("Indexes").with_property(vec![0]))
        .with_child(Node::new("Vertices").with_property(vec![0.0, 1.0, 0.0]));
    let (_, diagnostics) = load(&document(vec![shape], vec![]), &Mapping::default());
    assert_eq!(
        diagnostics.entries(),
        [Diagnostic::OrphanBlendshape("30".to_owned())]
    );
}

proptest! {
    #[test]
    fn every_model_once_with_parents_first(parents in prop::collection::vec(0usize..12, 1..12)) {
        let count = parents.len();
        let objects = (0..count)
            .map(|i| limb(100 + i as i64, &format!("joint{i}"), vec![]))
            .collect();
        // 0 is the scene root, anything else is another model (possibly
        // itself, or a later one, making cycles)
        let connections = parents
            .iter()
            .enumerate()
            .map(|(i, &parent)| {
                let parent = if parent == 0 || parent > count { 0 } else { 99 + parent as i64 };
                oo(100 + i as i64, parent)
            })
            .collect();
        let (geometry, _) = load(&document(objects, connections), &Mapping::default());

        prop_assert_eq!(geometry.joints.len(), count);
        let names: HashSet<_> = geometry.joint_names().collect();
        prop_assert_eq!(names.len(), count);
        for (i, joint) in geometry.joints.iter().enumerate() {
            if let Some(parent) = joint.parent_index {
                prop_assert!(parent.to_usize() < i);
            }
        }
    }
}
