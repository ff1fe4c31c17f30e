//! Generic FBX node tree.
//!
//! This is what the tokenizer hands over to the importer: every FBX record,
//! binary or ASCII, is a named node with a list of typed properties and
//! nested child nodes. The importer never mutates it.

use std::fmt::Write as _;

/// A single typed property of a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
    ArrBool(Vec<bool>),
    ArrI32(Vec<i32>),
    ArrI64(Vec<i64>),
    ArrF32(Vec<f32>),
    ArrF64(Vec<f64>),
}

impl Property {
    /// Returns the string payload, if this is a string property.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of a scalar property.
    ///
    /// Strings are parsed, so that ASCII files where numbers ended up quoted
    /// still load.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Property::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            Property::I16(v) => Some(v.into()),
            Property::I32(v) => Some(v.into()),
            Property::I64(v) => Some(v as f64),
            Property::F32(v) => Some(v.into()),
            Property::F64(v) => Some(v),
            Property::String(ref s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Property::Bool(v) => Some(v.into()),
            Property::I16(v) => Some(v.into()),
            Property::I32(v) => Some(v.into()),
            Property::I64(v) => Some(v),
            Property::F32(v) => Some(v as i64),
            Property::F64(v) => Some(v as i64),
            Property::String(ref s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_f64().map(|v| v != 0.0)
    }

    /// Textual rendering used for object identifiers and names.
    ///
    /// Integers are rendered in decimal, binary blobs are decoded lossily.
    pub fn to_text(&self) -> String {
        match self {
            Property::Bool(v) => v.to_string(),
            Property::I16(v) => v.to_string(),
            Property::I32(v) => v.to_string(),
            Property::I64(v) => v.to_string(),
            Property::F32(v) => v.to_string(),
            Property::F64(v) => v.to_string(),
            Property::String(s) => s.clone(),
            Property::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            _ => String::new(),
        }
    }

    /// Raw bytes of a binary or string property.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Property::Binary(b) => b.clone(),
            Property::String(s) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for Property {
    fn from(s: &str) -> Self {
        Property::String(s.to_owned())
    }
}
impl From<String> for Property {
    fn from(s: String) -> Self {
        Property::String(s)
    }
}
impl From<i32> for Property {
    fn from(v: i32) -> Self {
        Property::I32(v)
    }
}
impl From<i64> for Property {
    fn from(v: i64) -> Self {
        Property::I64(v)
    }
}
impl From<f32> for Property {
    fn from(v: f32) -> Self {
        Property::F32(v)
    }
}
impl From<f64> for Property {
    fn from(v: f64) -> Self {
        Property::F64(v)
    }
}
impl From<bool> for Property {
    fn from(v: bool) -> Self {
        Property::Bool(v)
    }
}
impl From<Vec<f64>> for Property {
    fn from(v: Vec<f64>) -> Self {
        Property::ArrF64(v)
    }
}
impl From<Vec<i32>> for Property {
    fn from(v: Vec<i32>) -> Self {
        Property::ArrI32(v)
    }
}

/// A node of the FBX tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_properties<P: Into<Property>>(mut self, props: impl IntoIterator<Item = P>) -> Self {
        self.properties.extend(props.into_iter().map(Into::into));
        self
    }

    pub fn with_property(mut self, prop: impl Into<Property>) -> Self {
        self.properties.push(prop.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// First direct child with the given name.
    pub fn first_child_by_name(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// Reads three consecutive scalar properties starting at `index`.
    ///
    /// Missing or non-numeric values are read as zero.
    pub fn vec3_at(&self, index: usize) -> glam::Vec3 {
        let at = |i| {
            self.properties
                .get(index + i)
                .and_then(Property::as_f32)
                .unwrap_or(0.0)
        };
        glam::Vec3::new(at(0), at(1), at(2))
    }

    /// Flattens the numeric payload of this node.
    ///
    /// Binary files store a single array property, ASCII 6.x files store
    /// one scalar per property and ASCII 7.x files nest the values in an
    /// `a` child.
    pub fn f64_values(&self) -> Vec<f64> {
        match self.properties.as_slice() {
            [Property::ArrF64(v)] => v.clone(),
            [Property::ArrF32(v)] => v.iter().map(|&x| x.into()).collect(),
            [Property::ArrI32(v)] => v.iter().map(|&x| x.into()).collect(),
            [Property::ArrI64(v)] => v.iter().map(|&x| x as f64).collect(),
            [] => self
                .first_child_by_name("a")
                .map(Node::f64_values)
                .unwrap_or_default(),
            props => props.iter().filter_map(Property::as_f64).collect(),
        }
    }

    pub fn f32_values(&self) -> Vec<f32> {
        self.f64_values().into_iter().map(|v| v as f32).collect()
    }

    pub fn i32_values(&self) -> Vec<i32> {
        match self.properties.as_slice() {
            [Property::ArrI32(v)] => v.clone(),
            [Property::ArrI64(v)] => v.iter().map(|&x| x as i32).collect(),
            [Property::ArrF64(v)] => v.iter().map(|&x| x as i32).collect(),
            [Property::ArrF32(v)] => v.iter().map(|&x| x as i32).collect(),
            [] => self
                .first_child_by_name("a")
                .map(Node::i32_values)
                .unwrap_or_default(),
            props => props
                .iter()
                .filter_map(Property::as_i64)
                .map(|v| v as i32)
                .collect(),
        }
    }

    /// Pretty-prints the subtree, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_children(&mut out, 0, std::slice::from_ref(self));
        out
    }
}

fn dump_children(out: &mut String, depth: usize, children: &[Node]) {
    let show_depth = depth * 3;
    for child in children {
        let _ = write!(out, "{space:>depth$}", space = "", depth = show_depth);
        if !child.name.is_empty() {
            let _ = write!(out, "{name} ", name = child.name);
        }
        let attr_display = |att: &Property| match att {
            Property::ArrBool(v) => format!("[bool; {}]", v.len()),
            Property::ArrI32(v) => format!("[i32; {}]", v.len()),
            Property::ArrI64(v) => format!("[i64; {}]", v.len()),
            Property::ArrF32(v) => format!("[f32; {}]", v.len()),
            Property::ArrF64(v) => format!("[f64; {}]", v.len()),
            Property::Binary(v) => format!("[u8; {}]", v.len()),
            Property::String(s) => format!("{s:?}"),
            other => other.to_text(),
        };
        let attrs: Vec<_> = child.properties.iter().map(attr_display).collect();
        let _ = writeln!(out, "[{}]", attrs.join(", "));
        if !child.children.is_empty() {
            let _ = writeln!(out, "{:>depth$}{{", "", depth = show_depth);
            dump_children(out, depth + 1, &child.children);
            let _ = writeln!(out, "{:>depth$}}}", "", depth = show_depth);
        }
    }
}

/// One entry of a `Properties60` / `Properties70` block.
///
/// Both layouts put the property name first; the value starts at index 3
/// (`Property` records, 6.x) or 4 (`P` records, 7.x).
#[derive(Debug, Clone, Copy)]
pub(crate) struct PropertyEntry<'a> {
    pub name: &'a str,
    node: &'a Node,
    index: usize,
}

impl<'a> PropertyEntry<'a> {
    pub fn value(&self) -> Option<&'a Property> {
        self.node.properties.get(self.index)
    }

    pub fn vec3(&self) -> glam::Vec3 {
        self.node.vec3_at(self.index)
    }

    pub fn f32(&self) -> f32 {
        self.value().and_then(Property::as_f32).unwrap_or(0.0)
    }

    pub fn i32(&self) -> i32 {
        self.value().and_then(Property::as_i64).unwrap_or(0) as i32
    }

    pub fn bool(&self) -> bool {
        self.value().and_then(Property::as_bool).unwrap_or(false)
    }

    pub fn text(&self) -> String {
        self.value().map(Property::to_text).unwrap_or_default()
    }
}

/// Entries of a property block, or nothing if `block` isn't one.
pub(crate) fn property_entries(block: &Node) -> Vec<PropertyEntry<'_>> {
    let (record, index) = match block.name.as_str() {
        "Properties60" => ("Property", 3),
        "Properties70" => ("P", 4),
        _ => return Vec::new(),
    };
    block
        .children_by_name(record)
        .filter_map(|node| {
            let name = node.properties.first()?.as_str()?;
            Some(PropertyEntry { name, node, index })
        })
        .collect()
}

/// Strips the type prefix some exporters (Blender at least) prepend to ids.
pub(crate) fn process_id(id: &str) -> &str {
    match id.rfind(':') {
        Some(i) => &id[i + 1..],
        None => id,
    }
}

/// Object id found at property `index`.
pub(crate) fn get_id(properties: &[Property], index: usize) -> String {
    properties
        .get(index)
        .map(|p| process_id(&p.to_text()).to_owned())
        .unwrap_or_default()
}

/// Object name: the `Name\0\x01Class` property of 7.x objects, or the
/// `Class::Name` id of 6.x objects.
pub(crate) fn get_name(properties: &[Property]) -> String {
    if properties.len() == 3 {
        let raw = properties[1].to_text();
        let name = raw.split('\0').next().unwrap_or_default();
        process_id(name).to_owned()
    } else {
        get_id(properties, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strip_type_prefix() {
        assert_eq!(process_id("Model::Hips"), "Hips");
        assert_eq!(process_id("12345"), "12345");
        let props = vec![Property::I64(42), "Hips\0\u{1}Model".into(), "LimbNode".into()];
        assert_eq!(get_id(&props, 0), "42");
        assert_eq!(get_name(&props), "Hips");
        let legacy = vec![Property::from("Model::Spine"), "Limb".into()];
        assert_eq!(get_name(&legacy), "Spine");
    }

    #[test]
    fn numeric_payload_layouts() {
        let binary = Node::new("Vertices").with_property(vec![1.0, 2.0, 3.0]);
        let legacy = Node::new("Vertices").with_properties([1.0, 2.0, 3.0]);
        let ascii = Node::new("Vertices").with_child(Node::new("a").with_properties([1, 2, 3]));
        assert_eq!(binary.f64_values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(legacy.f64_values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(ascii.f64_values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(ascii.i32_values(), vec![1, 2, 3]);
    }

    #[test]
    fn vec3_defaults_missing_components() {
        let p = Node::new("P").with_properties(["Lcl Translation", "", "", "A"]).with_property(2.5);
        assert_eq!(p.vec3_at(4), glam::Vec3::new(2.5, 0.0, 0.0));
    }

    #[test]
    fn property_block_layouts() {
        let p70 = Node::new("Properties70").with_child(
            Node::new("P")
                .with_properties(["UnitScaleFactor", "double", "Number", ""])
                .with_property(2.54),
        );
        let p60 = Node::new("Properties60").with_child(
            Node::new("Property")
                .with_properties(["Lcl Translation", "Lcl Translation", "A"])
                .with_properties([1.0, 2.0, 3.0]),
        );
        let entries = property_entries(&p70);
        assert_eq!(entries[0].name, "UnitScaleFactor");
        assert!((entries[0].f32() - 2.54).abs() < 1e-6);
        assert_eq!(property_entries(&p60)[0].vec3(), glam::Vec3::new(1.0, 2.0, 3.0));
        assert!(property_entries(&Node::new("Vertices")).is_empty());
    }

    #[test]
    fn dump_lists_nested_nodes() {
        let tree = Node::new("Objects").with_child(Node::new("Model").with_property(7i64));
        let text = tree.dump();
        assert!(text.contains("Objects []"));
        assert!(text.contains("Model [7]"));
    }
}
