/// Contract between the renderer and a graphics backend, plus the GPU-side
/// counterparts of the pure mesh and material types
use std::collections::HashMap;

use crate::error::GpuError;
use crate::geometry::Submesh;
use crate::mtl::MaterialLibrary;
use crate::uniforms::{ShaderProgram, UniformValue};

/// Data for a new vertex attribute or index buffer.
#[derive(Debug, Clone, Copy)]
pub enum BufferData<'a> {
    Floats(&'a [f32]),
    Indices(&'a [u16]),
}

impl BufferData<'_> {
    pub fn len(&self) -> usize {
        match self {
            BufferData::Floats(data) => data.len(),
            BufferData::Indices(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One indexed triangle draw with the lit program.
pub struct MeshDraw<'a, B: GpuBackend + ?Sized> {
    pub positions: &'a B::Buffer,
    pub normals: &'a B::Buffer,
    pub texcoords: &'a B::Buffer,
    pub indices: &'a B::Buffer,
    pub index_count: usize,
    pub texture: &'a B::Texture,
}

/// One line-list draw with the line program.
pub struct LineDraw<'a, B: GpuBackend + ?Sized> {
    pub positions: &'a B::Buffer,
    pub colors: &'a B::Buffer,
    pub vertex_count: usize,
    /// Overlays (the axis tripod) are drawn without depth testing.
    pub depth_test: bool,
}

/// Graphics API operations the renderer relies on.
///
/// Implementations own all "currently bound" state; every draw receives the
/// resources it needs explicitly.
pub trait GpuBackend {
    type Buffer;
    type Texture;
    /// A decoded image as the platform delivers it.
    type Image;

    fn create_buffer(&mut self, data: BufferData<'_>) -> Result<Self::Buffer, GpuError>;
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    fn create_texture(&mut self) -> Result<Self::Texture, GpuError>;
    fn delete_texture(&mut self, texture: Self::Texture);
    fn upload_texture_rgba(
        &mut self,
        texture: &Self::Texture,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), GpuError>;
    fn upload_texture_image(&mut self, texture: &Self::Texture, image: &Self::Image) -> Result<(), GpuError>;

    fn set_uniform(&mut self, program: ShaderProgram, name: &str, value: &UniformValue);
    fn set_viewport(&mut self, width: u32, height: u32);

    fn begin_frame(&mut self, clear_color: [f32; 4]);
    fn draw_mesh(&mut self, draw: MeshDraw<'_, Self>);
    fn draw_lines(&mut self, draw: LineDraw<'_, Self>);
}

/// Buffers for one uploaded [`Submesh`].
pub struct GpuMesh<B: GpuBackend> {
    pub positions: B::Buffer,
    pub normals: B::Buffer,
    pub texcoords: B::Buffer,
    pub indices: B::Buffer,
    pub index_count: usize,
    pub material_name: String,
}

impl<B: GpuBackend> GpuMesh<B> {
    /// Upload all four buffers. On failure the buffers created so far are
    /// released again.
    pub fn upload(backend: &mut B, submesh: &Submesh) -> Result<Self, GpuError> {
        let texcoords = submesh.upload_texcoords();
        let sources = [
            BufferData::Floats(&submesh.vertices),
            BufferData::Floats(&submesh.vertex_normals),
            BufferData::Floats(&texcoords),
            BufferData::Indices(&submesh.indices),
        ];

        let mut created = Vec::with_capacity(sources.len());
        for data in sources {
            match backend.create_buffer(data) {
                Ok(buffer) => created.push(buffer),
                Err(err) => {
                    for buffer in created {
                        backend.delete_buffer(buffer);
                    }
                    return Err(err);
                }
            }
        }

        let mut buffers = created.into_iter();
        match (buffers.next(), buffers.next(), buffers.next(), buffers.next()) {
            (Some(positions), Some(normals), Some(texcoords), Some(indices)) => Ok(Self {
                positions,
                normals,
                texcoords,
                indices,
                index_count: submesh.indices.len(),
                material_name: submesh.material_name.clone(),
            }),
            _ => Err(GpuError::ResourceCreation("mesh buffers")),
        }
    }

    pub fn release(self, backend: &mut B) {
        backend.delete_buffer(self.positions);
        backend.delete_buffer(self.normals);
        backend.delete_buffer(self.texcoords);
        backend.delete_buffer(self.indices);
    }
}

/// Upload every submesh, all or nothing.
pub fn upload_meshes<B: GpuBackend>(backend: &mut B, submeshes: &[Submesh]) -> Result<Vec<GpuMesh<B>>, GpuError> {
    let mut meshes = Vec::with_capacity(submeshes.len());
    for submesh in submeshes {
        match GpuMesh::upload(backend, submesh) {
            Ok(mesh) => meshes.push(mesh),
            Err(err) => {
                release_meshes(backend, meshes);
                return Err(err);
            }
        }
    }
    Ok(meshes)
}

pub fn release_meshes<B: GpuBackend>(backend: &mut B, meshes: Vec<GpuMesh<B>>) {
    for mesh in meshes {
        mesh.release(backend);
    }
}

/// A material library plus the textures uploaded for it so far, keyed by
/// image file name. Materials sharing a diffuse map share the texture.
pub struct GpuMaterials<B: GpuBackend> {
    pub library: MaterialLibrary,
    textures: HashMap<String, B::Texture>,
}

impl<B: GpuBackend> GpuMaterials<B> {
    pub fn new(library: MaterialLibrary) -> Self {
        Self {
            library,
            textures: HashMap::new(),
        }
    }

    /// Diffuse texture of a material, if its map has been uploaded.
    pub fn texture(&self, material_name: &str) -> Option<&B::Texture> {
        let file_name = self.library.get(material_name)?.diffuse_map.as_deref()?;
        self.textures.get(file_name)
    }

    /// Store the texture for `file_name`, returning the one it replaces.
    pub fn insert_texture(&mut self, file_name: &str, texture: B::Texture) -> Option<B::Texture> {
        self.textures.insert(file_name.to_string(), texture)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn release(self, backend: &mut B) {
        for (_, texture) in self.textures {
            backend.delete_texture(texture);
        }
    }
}

impl<B: GpuBackend> Default for GpuMaterials<B> {
    fn default() -> Self {
        Self::new(MaterialLibrary::new())
    }
}

#[cfg(test)]
pub(crate) mod recording {
    //! In-memory backend that records every call, for renderer tests.
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        CreateBuffer { id: u32, len: usize, indices: bool },
        DeleteBuffer(u32),
        CreateTexture(u32),
        DeleteTexture(u32),
        UploadRgba { texture: u32, width: u32, height: u32, pixels: Vec<u8> },
        UploadImage { texture: u32, image: String },
        SetUniform { program: ShaderProgram, name: String, value: UniformValue },
        Viewport(u32, u32),
        BeginFrame,
        DrawMesh { index_count: usize, texture: u32 },
        DrawLines { vertex_count: usize, depth_test: bool },
    }

    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        pub calls: Vec<Call>,
        next_id: u32,
        /// Fail buffer creation once this many buffers exist.
        pub buffer_limit: Option<usize>,
        live_buffers: usize,
        /// Live buffers plus textures, readable after the backend is gone.
        pub live_resources: Rc<Cell<usize>>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        fn next(&mut self) -> u32 {
            self.next_id += 1;
            self.next_id
        }

        pub fn live_buffers(&self) -> usize {
            self.live_buffers
        }

        pub fn uniform_names(&self) -> Vec<&str> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::SetUniform { name, .. } => Some(name.as_str()),
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&mut self) {
            self.calls.clear();
        }
    }

    impl GpuBackend for RecordingBackend {
        type Buffer = u32;
        type Texture = u32;
        type Image = String;

        fn create_buffer(&mut self, data: BufferData<'_>) -> Result<u32, GpuError> {
            if self.buffer_limit.is_some_and(|limit| self.live_buffers >= limit) {
                return Err(GpuError::ResourceCreation("buffer"));
            }
            let id = self.next();
            self.live_buffers += 1;
            self.live_resources.set(self.live_resources.get() + 1);
            self.calls.push(Call::CreateBuffer {
                id,
                len: data.len(),
                indices: matches!(data, BufferData::Indices(_)),
            });
            Ok(id)
        }

        fn delete_buffer(&mut self, buffer: u32) {
            self.live_buffers -= 1;
            self.live_resources.set(self.live_resources.get() - 1);
            self.calls.push(Call::DeleteBuffer(buffer));
        }

        fn create_texture(&mut self) -> Result<u32, GpuError> {
            let id = self.next();
            self.live_resources.set(self.live_resources.get() + 1);
            self.calls.push(Call::CreateTexture(id));
            Ok(id)
        }

        fn delete_texture(&mut self, texture: u32) {
            self.live_resources.set(self.live_resources.get() - 1);
            self.calls.push(Call::DeleteTexture(texture));
        }

        fn upload_texture_rgba(&mut self, texture: &u32, width: u32, height: u32, pixels: &[u8]) -> Result<(), GpuError> {
            self.calls.push(Call::UploadRgba {
                texture: *texture,
                width,
                height,
                pixels: pixels.to_vec(),
            });
            Ok(())
        }

        fn upload_texture_image(&mut self, texture: &u32, image: &String) -> Result<(), GpuError> {
            self.calls.push(Call::UploadImage {
                texture: *texture,
                image: image.clone(),
            });
            Ok(())
        }

        fn set_uniform(&mut self, program: ShaderProgram, name: &str, value: &UniformValue) {
            self.calls.push(Call::SetUniform {
                program,
                name: name.to_string(),
                value: *value,
            });
        }

        fn set_viewport(&mut self, width: u32, height: u32) {
            self.calls.push(Call::Viewport(width, height));
        }

        fn begin_frame(&mut self, _clear_color: [f32; 4]) {
            self.calls.push(Call::BeginFrame);
        }

        fn draw_mesh(&mut self, draw: MeshDraw<'_, Self>) {
            self.calls.push(Call::DrawMesh {
                index_count: draw.index_count,
                texture: *draw.texture,
            });
        }

        fn draw_lines(&mut self, draw: LineDraw<'_, Self>) {
            self.calls.push(Call::DrawLines {
                vertex_count: draw.vertex_count,
                depth_test: draw.depth_test,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingBackend;
    use super::*;
    use crate::geometry::Mesh;
    use crate::partition::partition_mesh;

    #[test]
    fn test_upload_creates_four_buffers() {
        let mut backend = RecordingBackend::new();
        let submeshes = partition_mesh(&Mesh::cube(1.0));
        let meshes = upload_meshes(&mut backend, &submeshes).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].index_count, 36);
        assert_eq!(backend.live_buffers(), 4);

        release_meshes(&mut backend, meshes);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_failed_upload_releases_partial_buffers() {
        let mut backend = RecordingBackend::new();
        backend.buffer_limit = Some(6);
        let mut mesh = Mesh::cube(1.0);
        mesh.indices_per_material.push(mesh.indices_per_material[0].clone());
        mesh.material_names.push("second".into());
        let submeshes = partition_mesh(&mesh);
        assert_eq!(submeshes.len(), 2);

        assert!(upload_meshes(&mut backend, &submeshes).is_err());
        assert_eq!(backend.live_buffers(), 0);
    }
}
