/// In-memory triangle mesh representation shared by the parsers,
/// the normalizer, the partitioner and the exporter
use nalgebra::Vector3;

/// Texture coordinate value marking "this vertex has no UV".
pub const TEXCOORD_ABSENT: f32 = f32::NAN;

/// A vertex read out of the flat attribute arrays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32, nx: f32, ny: f32, nz: f32) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            normal: Vector3::new(nx, ny, nz),
        }
    }
}

/// A triangle face defined by three vertices
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Face normal from the winding of the positions (zero if degenerate).
    pub fn calculate_normal(&self) -> Vector3<f32> {
        crate::math::face_normal(
            &self.vertices[0].position,
            &self.vertices[1].position,
            &self.vertices[2].position,
        )
    }

    /// Equal-weight average of the three vertex normals.
    pub fn average_normal(&self) -> Vector3<f32> {
        self.vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.normal / 3.0)
    }
}

/// A triangle mesh stored as flat attribute arrays plus one index list per
/// material.
///
/// `vertices` and `vertex_normals` hold xyz triplets and always have the same
/// length. `textures` holds uv pairs for every vertex, or is empty when the
/// source had no texture coordinates at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<f32>,
    pub vertex_normals: Vec<f32>,
    pub textures: Vec<f32>,
    pub indices_per_material: Vec<Vec<u32>>,
    pub material_names: Vec<String>,
    /// Material library file names referenced by the source (`mtllib`).
    pub material_libraries: Vec<String>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mesh with a single, unnamed index group, as produced for STL.
    pub fn single_group(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity * 3),
            vertex_normals: Vec::with_capacity(capacity * 3),
            indices_per_material: vec![Vec::with_capacity(capacity)],
            material_names: vec![String::new()],
            ..Self::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices_per_material.iter().map(|g| g.len() / 3).sum()
    }

    pub fn has_texcoords(&self) -> bool {
        !self.textures.is_empty()
    }

    pub fn position(&self, index: usize) -> Vector3<f32> {
        Vector3::new(
            self.vertices[index * 3],
            self.vertices[index * 3 + 1],
            self.vertices[index * 3 + 2],
        )
    }

    pub fn normal(&self, index: usize) -> Vector3<f32> {
        Vector3::new(
            self.vertex_normals[index * 3],
            self.vertex_normals[index * 3 + 1],
            self.vertex_normals[index * 3 + 2],
        )
    }

    pub fn vertex(&self, index: usize) -> Vertex {
        Vertex {
            position: self.position(index),
            normal: self.normal(index),
        }
    }

    /// Append a vertex and return its index.
    pub fn push_vertex(&mut self, position: [f32; 3], normal: [f32; 3]) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&position);
        self.vertex_normals.extend_from_slice(&normal);
        index
    }

    /// Every triangle of every material group, in group order.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.indices_per_material.iter().flat_map(move |group| {
            group.chunks_exact(3).map(move |tri| {
                Triangle::new(
                    self.vertex(tri[0] as usize),
                    self.vertex(tri[1] as usize),
                    self.vertex(tri[2] as usize),
                )
            })
        })
    }

    /// Per-axis (min, max) of all vertex positions, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let mut points = self.vertices.chunks_exact(3);
        let first = points.next()?;
        let mut min = Vector3::new(first[0], first[1], first[2]);
        let mut max = min;
        for p in points {
            let p = Vector3::new(p[0], p[1], p[2]);
            min = min.inf(&p);
            max = max.sup(&p);
        }
        Some((min, max))
    }

    /// Smooth vertex normals: every face normal is added into its three
    /// vertices, then each sum is normalized. Sums of ~zero stay zero.
    pub fn compute_vertex_normals(&mut self) {
        let mut accumulated = vec![Vector3::<f32>::zeros(); self.vertex_count()];

        for group in &self.indices_per_material {
            for tri in group.chunks_exact(3) {
                let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
                let normal = crate::math::face_normal(
                    &self.position(a),
                    &self.position(b),
                    &self.position(c),
                );
                accumulated[a] += normal;
                accumulated[b] += normal;
                accumulated[c] += normal;
            }
        }

        self.vertex_normals.clear();
        self.vertex_normals.reserve(accumulated.len() * 3);
        for normal in accumulated {
            let normal = crate::math::normalize_or_zero(&normal);
            self.vertex_normals.extend_from_slice(normal.as_slice());
        }
    }

    /// Axis-aligned cube centered at the origin, flat-shaded, one group.
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        // (normal, four corners counter-clockwise seen from outside)
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]]),
            ([0.0, 0.0, -1.0], [[h, -h, -h], [-h, -h, -h], [-h, h, -h], [h, h, -h]]),
            ([0.0, 1.0, 0.0], [[-h, h, h], [h, h, h], [h, h, -h], [-h, h, -h]]),
            ([0.0, -1.0, 0.0], [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]]),
            ([1.0, 0.0, 0.0], [[h, -h, h], [h, -h, -h], [h, h, -h], [h, h, h]]),
            ([-1.0, 0.0, 0.0], [[-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]]),
        ];

        let mut mesh = Self::single_group(36);
        for (normal, corners) in faces {
            let base = mesh.vertex_count() as u32;
            for corner in corners {
                mesh.push_vertex(corner, normal);
            }
            mesh.indices_per_material[0]
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }
}

/// A mesh partition small enough for 16-bit indices, tagged with exactly
/// one material. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submesh {
    pub vertices: Vec<f32>,
    pub vertex_normals: Vec<f32>,
    pub textures: Vec<f32>,
    pub indices: Vec<u16>,
    pub material_name: String,
}

impl Submesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex(&self, index: usize) -> Vertex {
        Vertex::new(
            self.vertices[index * 3],
            self.vertices[index * 3 + 1],
            self.vertices[index * 3 + 2],
            self.vertex_normals[index * 3],
            self.vertex_normals[index * 3 + 1],
            self.vertex_normals[index * 3 + 2],
        )
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.indices.chunks_exact(3).map(move |tri| {
            Triangle::new(
                self.vertex(tri[0] as usize),
                self.vertex(tri[1] as usize),
                self.vertex(tri[2] as usize),
            )
        })
    }

    /// Texture coordinates ready for upload: absent or sentinel entries
    /// become 0.0.
    pub fn upload_texcoords(&self) -> Vec<f32> {
        if self.textures.is_empty() {
            return vec![0.0; self.vertex_count() * 2];
        }
        self.textures
            .iter()
            .map(|&t| if t.is_nan() { 0.0 } else { t })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.vertices.len(), cube.vertex_normals.len());
    }

    #[test]
    fn test_cube_winding_matches_normals() {
        let cube = Mesh::cube(2.0);
        for triangle in cube.triangles() {
            let winding = triangle.calculate_normal();
            let stored = triangle.vertices[0].normal;
            assert!((winding - stored).norm() < 1e-6);
        }
    }

    #[test]
    fn test_bounds() {
        let cube = Mesh::cube(2.0);
        let (min, max) = cube.bounds().unwrap();
        assert_eq!(min, Vector3::new(-1.0, -1.0, -1.0));
        assert_eq!(max, Vector3::new(1.0, 1.0, 1.0));
        assert!(Mesh::new().bounds().is_none());
    }

    #[test]
    fn test_vertex_normals_are_unit() {
        let mut cube = Mesh::cube(1.0);
        cube.compute_vertex_normals();
        for n in cube.vertex_normals.chunks_exact(3) {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_shared_vertex_normal_is_sum_of_faces() {
        // Two triangles folded along the x axis share vertices 0 and 1.
        let mut mesh = Mesh::single_group(4);
        mesh.push_vertex([0.0, 0.0, 0.0], [0.0; 3]);
        mesh.push_vertex([1.0, 0.0, 0.0], [0.0; 3]);
        mesh.push_vertex([0.0, 1.0, 0.0], [0.0; 3]);
        mesh.push_vertex([0.0, 0.0, -1.0], [0.0; 3]);
        mesh.indices_per_material[0] = vec![0, 1, 2, 0, 1, 3];
        mesh.compute_vertex_normals();

        let shared = mesh.normal(0);
        let expected = Vector3::new(0.0, 1.0, 1.0).normalize();
        assert!((shared - expected).norm() < 1e-5);
        assert!((mesh.normal(2) - Vector3::z()).norm() < 1e-5);
    }

    #[test]
    fn test_degenerate_triangle_leaves_zero_normal() {
        let mut mesh = Mesh::single_group(3);
        mesh.push_vertex([1.0, 1.0, 1.0], [0.0; 3]);
        mesh.push_vertex([1.0, 1.0, 1.0], [0.0; 3]);
        mesh.push_vertex([1.0, 1.0, 1.0], [0.0; 3]);
        mesh.indices_per_material[0] = vec![0, 1, 2];
        mesh.compute_vertex_normals();
        assert!(mesh.vertex_normals.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_upload_texcoords_replaces_sentinel() {
        let sub = Submesh {
            vertices: vec![0.0; 6],
            vertex_normals: vec![0.0; 6],
            textures: vec![0.5, 0.25, TEXCOORD_ABSENT, TEXCOORD_ABSENT],
            indices: vec![],
            material_name: String::new(),
        };
        assert_eq!(sub.upload_texcoords(), vec![0.5, 0.25, 0.0, 0.0]);

        let bare = Submesh {
            textures: vec![],
            ..sub
        };
        assert_eq!(bare.upload_texcoords(), vec![0.0; 4]);
    }
}
