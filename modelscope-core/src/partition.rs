/// Split a mesh into submeshes addressable with 16-bit indices
use std::collections::HashMap;

use crate::geometry::{Mesh, Submesh};

/// Number of index-list positions consumed per submesh. Also the largest
/// number of distinct vertices a window can introduce.
pub const MAX_INDEX_WINDOW: usize = 65535;

/// Partition every material group of `mesh` into submeshes.
///
/// Each group is walked in windows of [`MAX_INDEX_WINDOW`] index positions
/// (not distinct vertices). Within a window, vertices are compacted in
/// first-seen order; the remap restarts with each window, so a vertex shared
/// across a window boundary is duplicated. Empty groups yield nothing.
pub fn partition_mesh(mesh: &Mesh) -> Vec<Submesh> {
    let with_texcoords = mesh.has_texcoords();
    let mut submeshes = Vec::new();

    for (group, indices) in mesh.indices_per_material.iter().enumerate() {
        let material_name = mesh.material_names.get(group).cloned().unwrap_or_default();

        for window in indices.chunks(MAX_INDEX_WINDOW) {
            submeshes.push(build_submesh(mesh, window, &material_name, with_texcoords));
        }
    }

    log::debug!(
        "Partitioned {} groups into {} submeshes",
        mesh.indices_per_material.len(),
        submeshes.len()
    );
    submeshes
}

fn build_submesh(mesh: &Mesh, window: &[u32], material_name: &str, with_texcoords: bool) -> Submesh {
    let mut remap: HashMap<u32, u16> = HashMap::new();
    let mut sub = Submesh {
        indices: Vec::with_capacity(window.len()),
        material_name: material_name.to_string(),
        ..Submesh::default()
    };

    for &original in window {
        let compact = *remap.entry(original).or_insert_with(|| {
            let i = original as usize;
            sub.vertices.extend_from_slice(&mesh.vertices[i * 3..i * 3 + 3]);
            sub.vertex_normals
                .extend_from_slice(&mesh.vertex_normals[i * 3..i * 3 + 3]);
            if with_texcoords {
                sub.textures.extend_from_slice(&mesh.textures[i * 2..i * 2 + 2]);
            }
            // A window holds at most 65535 positions, so this always fits.
            (sub.vertices.len() / 3 - 1) as u16
        });
        sub.indices.push(compact);
    }

    sub
}
