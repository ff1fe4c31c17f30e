//! Create meshes from FBX `Geometry` nodes.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use tracing::{debug, trace};

use crate::data::scene::ExtractedBlendshape;
use crate::data::{Blendshape, Mesh, MeshPart};
use crate::node::Node;
use crate::utils::triangulate;

/// A mesh straight out of the file, before it's attached to the skeleton.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExtractedMesh {
    pub mesh: Mesh,
    /// Control point → the de-duplicated vertices made from it, oldest first.
    pub new_indices: HashMap<usize, Vec<u32>>,
    /// Per blendshape channel: mesh vertex → slot in that blendshape.
    blendshape_index_maps: Vec<HashMap<u32, usize>>,
    /// `(material, texture)` layer values of each part.
    pub part_material_textures: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MappingMode {
    ByPolygonVertex,
    ByVertex,
    ByPolygon,
    AllSame,
}

impl MappingMode {
    fn parse(name: &str) -> Self {
        match name {
            "ByVertice" | "ByVertex" | "ByControlPoint" => MappingMode::ByVertex,
            "ByPolygon" => MappingMode::ByPolygon,
            "AllSame" => MappingMode::AllSame,
            _ => MappingMode::ByPolygonVertex,
        }
    }
}

/// Where a polygon corner sits, for layer element lookups.
#[derive(Debug, Clone, Copy)]
struct Corner {
    polygon_vertex: usize,
    control_point: usize,
    polygon: usize,
}

/// A `LayerElement*` node: values plus how to find the one for a corner.
#[derive(Debug, Clone)]
struct LayerElement<T> {
    values: Vec<T>,
    indices: Vec<i32>,
    mode: MappingMode,
    indexed: bool,
}

impl<T> Default for LayerElement<T> {
    fn default() -> Self {
        LayerElement {
            values: Vec::new(),
            indices: Vec::new(),
            mode: MappingMode::ByPolygonVertex,
            indexed: false,
        }
    }
}

impl<T: Copy> LayerElement<T> {
    fn read(
        element: &Node,
        values_name: &str,
        index_name: Option<&str>,
        convert: impl Fn(&Node) -> Vec<T>,
    ) -> Self {
        let mut layer = LayerElement::default();
        for child in &element.children {
            let text = || child.property(0).map(|p| p.to_text()).unwrap_or_default();
            match child.name.as_str() {
                name if name == values_name => layer.values = convert(child),
                name if Some(name) == index_name => layer.indices = child.i32_values(),
                "MappingInformationType" => layer.mode = MappingMode::parse(&text()),
                "ReferenceInformationType" => {
                    layer.indexed = matches!(text().as_str(), "IndexToDirect" | "Index")
                }
                _ => {}
            }
        }
        layer
    }

    fn get(&self, corner: Corner) -> Option<T> {
        let i = match self.mode {
            MappingMode::ByPolygonVertex => corner.polygon_vertex,
            MappingMode::ByVertex => corner.control_point,
            MappingMode::ByPolygon => corner.polygon,
            MappingMode::AllSame => 0,
        };
        // Some exporters claim `IndexToDirect` without writing the index array.
        let i = if self.indexed && !self.indices.is_empty() {
            usize::try_from(*self.indices.get(i)?).ok()?
        } else {
            i
        };
        self.values.get(i).copied()
    }
}

pub(crate) fn vec3s(values: &[f64]) -> Vec<Vec3> {
    values
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
        .collect()
}

fn uvs(node: &Node) -> Vec<Vec2> {
    node.f64_values()
        .chunks_exact(2)
        // FBX has V going up, we have it going down.
        .map(|c| Vec2::new(c[0] as f32, 1.0 - c[1] as f32))
        .collect()
}

fn rgb_of_rgba(node: &Node) -> Vec<Vec3> {
    node.f64_values()
        .chunks_exact(4)
        .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
        .collect()
}

#[derive(PartialEq, Eq, Hash)]
struct VertexKey {
    control_point: usize,
    attributes: [u32; 10],
}

struct Vertex {
    position: Vec3,
    normal: Option<Vec3>,
    tex_coord: Option<Vec2>,
    tex_coord1: Option<Vec2>,
    color: Option<Vec3>,
}

impl Vertex {
    fn key(&self, control_point: usize) -> VertexKey {
        let n = self.normal.unwrap_or_default();
        let t0 = self.tex_coord.unwrap_or_default();
        let t1 = self.tex_coord1.unwrap_or_default();
        let c = self.color.unwrap_or_default();
        let attributes = [n.x, n.y, n.z, t0.x, t0.y, t1.x, t1.y, c.x, c.y, c.z].map(f32::to_bits);
        VertexKey {
            control_point,
            attributes,
        }
    }
}

struct MeshData {
    control_points: Vec<Vec3>,
    polygon_indices: Vec<i32>,
    normals: Option<LayerElement<Vec3>>,
    colors: Option<LayerElement<Vec3>>,
    tex_coords: [Option<LayerElement<Vec2>>; 2],
    materials: LayerElement<i32>,
    textures: LayerElement<i32>,
    dedup: HashMap<VertexKey, u32>,
    extracted: ExtractedMesh,
}

impl MeshData {
    fn vertex(&self, corner: Corner) -> Vertex {
        let get3 = |layer: &Option<LayerElement<Vec3>>| {
            layer.as_ref().map(|l| l.get(corner).unwrap_or_default())
        };
        let get2 = |layer: &Option<LayerElement<Vec2>>| {
            layer.as_ref().map(|l| l.get(corner).unwrap_or_default())
        };
        Vertex {
            position: self
                .control_points
                .get(corner.control_point)
                .copied()
                .unwrap_or_default(),
            normal: get3(&self.normals),
            tex_coord: get2(&self.tex_coords[0]),
            tex_coord1: get2(&self.tex_coords[1]),
            color: get3(&self.colors),
        }
    }

    /// Index of the de-duplicated vertex for this corner.
    fn append_index(&mut self, corner: Corner) -> u32 {
        let vertex = self.vertex(corner);
        let key = vertex.key(corner.control_point);
        if let Some(&index) = self.dedup.get(&key) {
            return index;
        }
        let mesh = &mut self.extracted.mesh;
        let index = mesh.vertices.len() as u32;
        mesh.vertices.push(vertex.position);
        if let Some(normal) = vertex.normal {
            mesh.normals.push(normal);
        }
        if let Some(uv) = vertex.tex_coord {
            mesh.tex_coords.push(uv);
        }
        if let Some(uv) = vertex.tex_coord1 {
            mesh.tex_coords1.push(uv);
        }
        if let Some(color) = vertex.color {
            mesh.colors.push(color);
        }
        self.dedup.insert(key, index);
        self.extracted
            .new_indices
            .entry(corner.control_point)
            .or_default()
            .push(index);
        index
    }

    fn part(&mut self, material_texture: (i32, i32), parts: &mut HashMap<(i32, i32), usize>) -> usize {
        let extracted = &mut self.extracted;
        *parts.entry(material_texture).or_insert_with(|| {
            extracted.part_material_textures.push(material_texture);
            extracted.mesh.parts.push(MeshPart::default());
            extracted.mesh.parts.len() - 1
        })
    }
}

/// Reads the UV layers, in layer order, skipping sets whose name is taken.
fn read_uv_layers(object: &Node) -> (Vec<LayerElement<Vec2>>, HashMap<String, usize>) {
    let mut layers: Vec<(i64, &Node)> = object
        .children_by_name("LayerElementUV")
        .map(|node| {
            let index = node.property(0).and_then(|p| p.as_i64()).unwrap_or(0);
            (index, node)
        })
        .collect();
    layers.sort_by_key(|(index, _)| *index);

    let mut set_map = HashMap::new();
    let mut elements = Vec::new();
    for (_, node) in layers {
        let name = node
            .first_child_by_name("Name")
            .and_then(|n| n.property(0))
            .map(|p| p.to_text())
            .unwrap_or_default();
        if set_map.contains_key(&name) {
            continue;
        }
        set_map.insert(name, elements.len());
        elements.push(LayerElement::read(node, "UV", Some("UVIndex"), uvs));
    }
    (elements, set_map)
}

/// Extracts the mesh of a `Geometry` node (or of a 6.x `Model` with vertices).
pub(crate) fn extract_mesh(object: &Node, mesh_index: usize) -> ExtractedMesh {
    #[cfg(feature = "profile")]
    let _extract_mesh_span = tracing::info_span!("extract_mesh").entered();

    let (uv_layers, texcoord_set_map) = read_uv_layers(object);
    let mut uv_layers = uv_layers.into_iter();
    let first_child = |name| object.first_child_by_name(name);

    let mut data = MeshData {
        control_points: first_child("Vertices")
            .map(|n| vec3s(&n.f64_values()))
            .unwrap_or_default(),
        polygon_indices: first_child("PolygonVertexIndex")
            .map(Node::i32_values)
            .unwrap_or_default(),
        normals: first_child("LayerElementNormal").map(|n| {
            LayerElement::read(n, "Normals", Some("NormalsIndex"), |v| vec3s(&v.f64_values()))
        }),
        colors: first_child("LayerElementColor")
            .map(|n| LayerElement::read(n, "Colors", Some("ColorIndex"), rgb_of_rgba)),
        tex_coords: [uv_layers.next(), uv_layers.next()],
        materials: first_child("LayerElementMaterial")
            .map(|n| LayerElement::read(n, "Materials", None, Node::i32_values))
            .unwrap_or_default(),
        textures: first_child("LayerElementTexture")
            .map(|n| LayerElement::read(n, "TextureId", None, Node::i32_values))
            .unwrap_or_default(),
        dedup: HashMap::new(),
        extracted: ExtractedMesh::default(),
    };
    data.extracted.mesh.mesh_index = mesh_index;
    data.extracted.mesh.texcoord_set_map = texcoord_set_map;

    let polygon_indices = std::mem::take(&mut data.polygon_indices);
    let mut parts = HashMap::new();
    let mut begin = 0;
    let mut polygon = 0;
    while begin < polygon_indices.len() {
        // A negative index (bitwise not) closes the polygon.
        let end = polygon_indices[begin..]
            .iter()
            .position(|&i| i < 0)
            .map_or(polygon_indices.len(), |p| begin + p + 1);
        let corners: Vec<Corner> = (begin..end)
            .map(|polygon_vertex| {
                let raw = polygon_indices[polygon_vertex];
                Corner {
                    polygon_vertex,
                    control_point: (if raw < 0 { !raw } else { raw }) as usize,
                    polygon,
                }
            })
            .collect();
        begin = end;
        polygon += 1;

        let material_texture = (
            data.materials.get(corners[0]).unwrap_or(0),
            data.textures.get(corners[0]).unwrap_or(0),
        );
        let part = data.part(material_texture, &mut parts);
        let indices: Vec<u32> = corners.iter().map(|&c| data.append_index(c)).collect();
        let part = &mut data.extracted.mesh.parts[part];
        match indices.len() {
            0..=2 => trace!("Skipping degenerate polygon {}", polygon - 1),
            3 => part.triangle_indices.extend(&indices),
            4 => part.quad_indices.extend(&indices),
            _ => {
                let points: Vec<Vec3> = corners
                    .iter()
                    .map(|c| data.control_points.get(c.control_point).copied().unwrap_or_default())
                    .collect();
                for triangle in triangulate::triangulate(&points) {
                    part.triangle_indices.extend(triangle.map(|k| indices[k]));
                }
            }
        }
    }

    debug!(
        "Mesh {mesh_index} with {} vertices in {} parts",
        data.extracted.mesh.vertices.len(),
        data.extracted.mesh.parts.len(),
    );
    data.extracted
}

/// Extracts a `Shape`: sparse control point offsets.
pub(crate) fn extract_blendshape(object: &Node) -> Blendshape {
    let mut indices = Vec::new();
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    for child in &object.children {
        match child.name.as_str() {
            "Indexes" => indices = child.i32_values(),
            "Vertices" => vertices = vec3s(&child.f64_values()),
            "Normals" => normals = vec3s(&child.f64_values()),
            _ => {}
        }
    }
    // Negative indexes don't address a vertex, their slot is dropped whole.
    let kept = |slot: &usize| indices.get(*slot).map_or(true, |&i| i >= 0);
    let keep_slots = |values: Vec<Vec3>| -> Vec<Vec3> {
        values
            .into_iter()
            .enumerate()
            .filter(|(slot, _)| kept(slot))
            .map(|(_, value)| value)
            .collect()
    };
    Blendshape {
        vertices: keep_slots(vertices),
        normals: keep_slots(normals),
        indices: indices.iter().filter_map(|&i| u32::try_from(i).ok()).collect(),
        tangents: Vec::new(),
    }
}

/// Accumulates an extracted blendshape into the mesh blendshape of every
/// `(channel, weight)` it feeds.
pub(crate) fn add_blendshapes(
    extracted: &ExtractedBlendshape,
    channels: &[(usize, f32)],
    mesh: &mut ExtractedMesh,
) {
    let source = &extracted.blendshape;
    for &(channel, weight) in channels {
        if mesh.mesh.blendshapes.len() <= channel {
            mesh.mesh.blendshapes.resize(channel + 1, Blendshape::default());
            mesh.blendshape_index_maps.resize(channel + 1, HashMap::new());
        }
        let blendshape = &mut mesh.mesh.blendshapes[channel];
        let index_map = &mut mesh.blendshape_index_maps[channel];
        for (i, &old_index) in source.indices.iter().enumerate() {
            let vertex = source.vertices.get(i).copied().unwrap_or_default() * weight;
            let normal = source.normals.get(i).copied().unwrap_or_default() * weight;
            let new_indices = mesh.new_indices.get(&(old_index as usize));
            for &new_index in new_indices.into_iter().flatten() {
                match index_map.get(&new_index) {
                    Some(&slot) => {
                        blendshape.vertices[slot] += vertex;
                        blendshape.normals[slot] += normal;
                    }
                    None => {
                        index_map.insert(new_index, blendshape.indices.len());
                        blendshape.indices.push(new_index);
                        blendshape.vertices.push(vertex);
                        blendshape.normals.push(normal);
                    }
                }
            }
        }
    }
}
