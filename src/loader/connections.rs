//! Connection graph: links, cluster reparenting, model ordering and
//! global transforms.

use std::collections::{BTreeMap, HashSet};

use glam::Mat4;
use tracing::{debug, trace};

use crate::data::scene::{CurveLink, SceneObjects, TextureRole};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::fbx_transform::FbxModel;
use crate::node::{get_id, Node};

/// A model in depth-first order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OrderedModel<'a> {
    pub id: &'a str,
    pub model: &'a FbxModel,
    /// Position of the parent in the order, always before this one.
    pub parent_index: Option<usize>,
}

/// Reads one `C` (7.x) or `Connect` (6.x) record.
pub(crate) fn read_connection(connection: &Node, scene: &mut SceneObjects, diagnostics: &mut Diagnostics) {
    let props = &connection.properties;
    let kind = props.first().map(|p| p.to_text()).unwrap_or_default();
    let child_id = get_id(props, 1);
    let parent_id = get_id(props, 2);
    match kind.as_str() {
        "OO" => {
            scene
                .oo_child_to_parent
                .insert(child_id.clone(), parent_id.clone());
        }
        "OP" => {
            let role = props
                .get(3)
                .map(|p| p.to_text().to_lowercase())
                .unwrap_or_default();
            if let Some(texture_role) = TextureRole::classify(&role) {
                // Material ← texture.
                scene
                    .texture_links
                    .insert((texture_role, parent_id.clone()), child_id.clone());
            } else {
                match CurveLink::classify(&role) {
                    Some(CurveLink::LocalRotation) => {
                        scene
                            .rotation_curve_nodes
                            .insert(parent_id.clone(), child_id.clone());
                    }
                    Some(CurveLink::LocalTranslation) => {
                        scene
                            .translation_curve_nodes
                            .insert(parent_id.clone(), child_id.clone());
                    }
                    Some(CurveLink::Component(axis)) => {
                        scene.curve_components[axis].insert(parent_id.clone(), child_id.clone());
                    }
                    None => diagnostics.unclassified_link(&role),
                }
            }
        }
        _ => trace!("Connection of kind {kind:?}"),
    }
    scene.parent_map.insert(child_id.clone(), parent_id.clone());
    scene.child_map.insert(parent_id, child_id);
}

/// Climbs model parents from `id` as far as possible.
pub(crate) fn top_model_id(scene: &SceneObjects, id: &str, diagnostics: &mut Diagnostics) -> String {
    let mut top = id.to_owned();
    let mut visited = HashSet::new();
    'climb: loop {
        visited.insert(top.clone());
        for parent in scene.parent_map.values(&top) {
            if visited.contains(parent) {
                diagnostics.report(Diagnostic::ConnectionCycle(parent.to_owned()));
                continue;
            }
            if scene.models.contains_key(parent) {
                top = parent.to_owned();
                continue 'climb;
            }
        }
        return top;
    }
}

/// Composes the local transforms of `id` and its model ancestors.
///
/// Mixamo files only get the transform of the model itself.
pub(crate) fn global_transform(
    scene: &SceneObjects,
    id: &str,
    mixamo_hack: bool,
    diagnostics: &mut Diagnostics,
) -> Mat4 {
    let mut transform = Mat4::IDENTITY;
    let mut visited = HashSet::new();
    let mut current = Some(id.to_owned());
    while let Some(id) = current.take() {
        if let Some(model) = scene.models.get(&id) {
            transform = model.local_transform() * transform;
            if let Some(offset) = &model.geometric_offset {
                transform *= offset.mat();
            }
        }
        if mixamo_hack {
            break;
        }
        for parent in scene.parent_map.values(&id) {
            if visited.contains(parent) || parent == id {
                diagnostics.report(Diagnostic::ConnectionCycle(parent.to_owned()));
                continue;
            }
            if scene.models.contains_key(parent) {
                current = Some(parent.to_owned());
                break;
            }
        }
        visited.insert(id);
    }
    transform
}

/// Models whose mesh is skinned are moved under the top of the skeleton
/// they're skinned to, unless they're roots already.
pub(crate) fn reparent_skinned_models(scene: &mut SceneObjects, diagnostics: &mut Diagnostics) {
    let mut model_ids: Vec<String> = scene.models.keys().cloned().collect();
    model_ids.sort();
    for model_id in model_ids {
        if scene.parent_model(&model_id).is_none() {
            continue;
        }
        let link = scene.child_map.values(&model_id).find_map(|deformer| {
            scene
                .child_map
                .values(deformer)
                .find(|cluster| scene.clusters.contains_key(*cluster))
                .and_then(|cluster| scene.child_map.value(cluster))
        });
        let Some(link) = link.map(str::to_owned) else {
            continue;
        };
        let top = top_model_id(scene, &link, diagnostics);
        debug!("Reparenting skinned model {model_id} to {top}");
        if let Some(old_parent) = scene.parent_map.replace_first(&model_id, top.clone()) {
            scene.child_map.remove(&old_parent, &model_id);
        }
        scene.child_map.insert(top, model_id);
    }
}

/// Makes sure each model is a child of its first parent, orphans included
/// (under the empty id).
pub(crate) fn link_model_parents(scene: &mut SceneObjects) {
    let mut model_ids: Vec<String> = scene.models.keys().cloned().collect();
    model_ids.sort();
    for model_id in model_ids {
        let parent = scene.parent_map.value(&model_id).unwrap_or_default().to_owned();
        if !scene.child_map.contains(&parent, &model_id) {
            scene.child_map.insert(parent, model_id);
        }
    }
}

struct Ordering<'a> {
    scene: &'a SceneObjects,
    remaining: BTreeMap<&'a str, &'a FbxModel>,
    order: Vec<OrderedModel<'a>>,
}

impl<'a> Ordering<'a> {
    fn visit(&mut self, id: &'a str, parent_index: Option<usize>) {
        let Some(model) = self.remaining.remove(id) else {
            return;
        };
        self.order.push(OrderedModel {
            id,
            model,
            parent_index,
        });
        let index = Some(self.order.len() - 1);
        let scene = self.scene;
        for child in scene.child_map.values(id) {
            if self.remaining.contains_key(child) {
                self.visit(child, index);
            }
        }
    }
}

/// Every model exactly once, parents before their children.
///
/// Starting from the smallest remaining id, climb to its top model and add
/// everything hanging from that top's parent.
pub(crate) fn order_models<'a>(
    scene: &'a SceneObjects,
    diagnostics: &mut Diagnostics,
) -> Vec<OrderedModel<'a>> {
    #[cfg(feature = "profile")]
    let _order_models_span = tracing::info_span!("order_models").entered();

    let mut ordering = Ordering {
        scene,
        remaining: scene
            .models
            .iter()
            .map(|(id, model)| (id.as_str(), model))
            .collect(),
        order: Vec::with_capacity(scene.models.len()),
    };
    while let Some(&first) = ordering.remaining.keys().next() {
        let top = top_model_id(scene, first, diagnostics);
        let top_parent = scene.parent_map.value(&top).unwrap_or_default();
        for child in scene.child_map.values(top_parent) {
            if ordering.remaining.contains_key(child) {
                ordering.visit(child, None);
            }
        }
        // Can only happen when the climb went through a model that isn't
        // its child's first parent.
        if ordering.remaining.contains_key(first) {
            ordering.visit(first, None);
        }
    }
    ordering.order
}
