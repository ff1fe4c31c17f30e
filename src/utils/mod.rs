pub mod bbox;
pub mod fbx_extend;
pub mod kdop;
pub mod triangulate;
