//! Bridge from the `fbxcel-dom` document tree to our own [`Node`] tree.

use std::io::{Read, Seek};

use anyhow::{bail, Context};
use fbxcel_dom::{
    any::AnyDocument,
    fbxcel::{low::v7400::AttributeValue, tree::v7400::NodeHandle},
};
use tracing::{debug, info};

use crate::node::{Node, Property};

impl From<&AttributeValue> for Property {
    fn from(att: &AttributeValue) -> Self {
        match att {
            AttributeValue::Bool(v) => Property::Bool(*v),
            AttributeValue::I16(v) => Property::I16(*v),
            AttributeValue::I32(v) => Property::I32(*v),
            AttributeValue::I64(v) => Property::I64(*v),
            AttributeValue::F32(v) => Property::F32(*v),
            AttributeValue::F64(v) => Property::F64(*v),
            AttributeValue::ArrBool(v) => Property::ArrBool(v.clone()),
            AttributeValue::ArrI32(v) => Property::ArrI32(v.clone()),
            AttributeValue::ArrI64(v) => Property::ArrI64(v.clone()),
            AttributeValue::ArrF32(v) => Property::ArrF32(v.clone()),
            AttributeValue::ArrF64(v) => Property::ArrF64(v.clone()),
            AttributeValue::String(s) => Property::String(s.clone()),
            AttributeValue::Binary(b) => Property::Binary(b.clone()),
        }
    }
}

fn convert_node(handle: NodeHandle) -> Node {
    Node {
        name: handle.name().to_owned(),
        properties: handle.attributes().iter().map(Property::from).collect(),
        children: handle.children().map(convert_node).collect(),
    }
}

/// Parses a binary FBX (7.4 and later) into a [`Node`] tree.
///
/// The returned root is nameless; its children are the top level records
/// (`FBXHeaderExtension`, `GlobalSettings`, `Objects`, `Connections`, ...).
pub fn load_node_tree<R: Read + Seek>(reader: R) -> anyhow::Result<Node> {
    #[cfg(feature = "profile")]
    let _load_node_tree_span = tracing::info_span!("load_node_tree").entered();

    let document =
        AnyDocument::from_seekable_reader(reader).context("Failed to load FBX document")?;
    let root = if let AnyDocument::V7400(version, doc) = document {
        info!("Loaded FBX with version = {version:?}");
        convert_node(doc.tree().root())
    } else {
        bail!("FBX version unsupported by this loader")
    };
    debug!("FBX tree has {} top level nodes", root.children.len());
    Ok(root)
}
