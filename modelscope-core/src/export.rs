/// Binary STL serialization of the displayed model
use nalgebra::{Matrix4, Vector3};

use crate::geometry::Submesh;
use crate::math::{transform_direction, transform_point};
use crate::stl::{swap_yz, FACET_LEN, HEADER_LEN, PREAMBLE_LEN};

/// File name offered for downloads.
pub const DEFAULT_EXPORT_FILE_NAME: &str = "ModelScope_model.stl";

fn push_vec3(buf: &mut Vec<u8>, v: &Vector3<f32>) {
    for c in swap_yz([v.x, v.y, v.z]) {
        buf.extend_from_slice(&c.to_le_bytes());
    }
}

/// Serialize `submeshes` as a binary STL, transformed the way they are shown.
///
/// Positions go through `model`; each facet normal is the equal-weight
/// average of its vertex normals transformed by `normal`. Axes are written in
/// STL order (y and z swapped back), so importing the result undoes the
/// swap. Import-time normalization is not undone.
pub fn export_stl(submeshes: &[Submesh], model: &Matrix4<f32>, normal: &Matrix4<f32>) -> Vec<u8> {
    let triangle_count: usize = submeshes.iter().map(Submesh::triangle_count).sum();
    let mut buf = Vec::with_capacity(PREAMBLE_LEN + triangle_count * FACET_LEN);

    buf.extend_from_slice(&[0u8; HEADER_LEN]);
    buf.extend_from_slice(&(triangle_count as u32).to_le_bytes());

    for triangle in submeshes.iter().flat_map(Submesh::triangles) {
        push_vec3(&mut buf, &transform_direction(normal, &triangle.average_normal()));
        for vertex in &triangle.vertices {
            push_vec3(&mut buf, &transform_point(model, &vertex.position));
        }
        // Attribute byte count
        buf.extend_from_slice(&0u16.to_le_bytes());
    }

    log::info!("Exported {} triangles as binary STL ({} bytes)", triangle_count, buf.len());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Mesh;
    use crate::partition::partition_mesh;
    use crate::stl::parse_stl;

    #[test]
    fn test_layout() {
        let submeshes = partition_mesh(&Mesh::cube(1.0));
        let data = export_stl(&submeshes, &Matrix4::identity(), &Matrix4::identity());
        assert_eq!(data.len(), 84 + 12 * 50);
        assert!(data[..80].iter().all(|&b| b == 0));
        assert_eq!(u32::from_le_bytes([data[80], data[81], data[82], data[83]]), 12);
    }

    #[test]
    fn test_axes_swapped_on_write() {
        let mut mesh = Mesh::single_group(3);
        mesh.push_vertex([1.0, 2.0, 3.0], [0.0, 1.0, 0.0]);
        mesh.push_vertex([4.0, 5.0, 6.0], [0.0, 1.0, 0.0]);
        mesh.push_vertex([7.0, 8.0, 9.0], [0.0, 1.0, 0.0]);
        mesh.indices_per_material[0] = vec![0, 1, 2];
        let data = export_stl(&partition_mesh(&mesh), &Matrix4::identity(), &Matrix4::identity());

        let f = |offset: usize| f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
        // normal (0, 1, 0) is written as (0, 0, 1)
        assert_eq!([f(84), f(88), f(92)], [0.0, 0.0, 1.0]);
        assert_eq!([f(96), f(100), f(104)], [1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_round_trip_reproduces_positions() {
        let original = Mesh::cube(1.0);
        let data = export_stl(&partition_mesh(&original), &Matrix4::identity(), &Matrix4::identity());
        let reimported = parse_stl(&data).unwrap();

        assert_eq!(reimported.triangle_count(), original.triangle_count());
        let expected: Vec<f32> = original
            .indices_per_material[0]
            .iter()
            .flat_map(|&i| original.position(i as usize).as_slice().to_vec())
            .collect();
        assert_eq!(reimported.vertices, expected);
    }

    #[test]
    fn test_model_matrix_applied() {
        let model = Matrix4::new_translation(&Vector3::new(0.0, 10.0, 0.0));
        let data = export_stl(&partition_mesh(&Mesh::cube(1.0)), &model, &Matrix4::identity());
        let reimported = parse_stl(&data).unwrap();
        let (min, _) = reimported.bounds().unwrap();
        assert!((min.y - 9.5).abs() < 1e-5);
    }
}
