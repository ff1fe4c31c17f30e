// Import the given fbx file and print what came out of it.

use std::{fs, io::BufReader, path::PathBuf};

use anyhow::Context;
use fbx_geometry::{load_node_tree, Diagnostics, Loader, Mapping};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut dump = false;
    let mut paths = Vec::new();
    for arg in std::env::args_os().skip(1) {
        if arg == "--dump" {
            dump = true;
        } else {
            paths.push(PathBuf::from(arg));
        }
    }
    let (path, mapping_path) = match paths.as_slice() {
        [path] => (path, None),
        [path, mapping] => (path, Some(mapping)),
        _ => {
            eprintln!("Usage: check_fbx [--dump] <FBX_FILE> [MAPPING_FST]");

            std::process::exit(1);
        }
    };

    let mapping = match mapping_path {
        Some(mapping_path) => {
            let text = fs::read_to_string(mapping_path)
                .with_context(|| format!("Failed to read {}", mapping_path.display()))?;
            Mapping::from_fst(&text)
        }
        None => Mapping::default(),
    };
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let root = load_node_tree(BufReader::new(file))?;
    if dump {
        print!("{}", root.dump());
        return Ok(());
    }

    let url = path.display().to_string();
    let mut diagnostics = Diagnostics::new(&url);
    let geometry = Loader::new().load(&root, &mapping, &url, &mut diagnostics);

    println!("Author: {:?}", geometry.author);
    println!("Application: {:?}", geometry.application_name);
    println!("Joints ({}):", geometry.joints.len());
    for (i, joint) in geometry.joints.iter().enumerate() {
        let parent = joint
            .parent_index
            .and_then(|parent| geometry.joint(parent))
            .map_or("-", |parent| parent.name.as_str());
        println!("  {i:>3} {:<32} parent: {parent}", joint.name);
    }
    println!("Meshes ({}):", geometry.meshes.len());
    for mesh in &geometry.meshes {
        println!(
            "  {} {:?}: {} vertices, {} parts, {} clusters, {} blendshapes",
            mesh.display_name,
            mesh.model_name,
            mesh.vertices.len(),
            mesh.parts.len(),
            mesh.clusters.len(),
            mesh.blendshapes.len(),
        );
    }
    println!("Materials ({}):", geometry.materials.len());
    for (id, material) in &geometry.materials {
        let textures: Vec<_> = material.texture_filenames().collect();
        println!("  {id} {:?} {textures:?}", material.name);
    }
    println!("Animation frames: {}", geometry.animation_frames.len());
    println!("Special joints: {:?}", geometry.special_joints);
    println!("Diagnostics ({}):", diagnostics.entries().len());
    for diagnostic in diagnostics.entries() {
        println!("  {diagnostic}");
    }
    Ok(())
}
