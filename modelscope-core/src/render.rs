/// Renderer: owns the GPU resources of the current scene and drives a backend
use std::collections::BTreeSet;

use nalgebra::Matrix4;

use crate::config::ViewerConfig;
use crate::error::GpuError;
use crate::export;
use crate::geometry::Submesh;
use crate::gpu::{release_meshes, upload_meshes, BufferData, GpuBackend, GpuMaterials, GpuMesh, LineDraw, MeshDraw};
use crate::guides::{axis_lines, grid_lines, LineSet};
use crate::import::ImportedModel;
use crate::mtl::MaterialLibrary;
use crate::uniforms::{
    default_texture_pixel, group_writes, ParameterGroup, SceneParameters, ShaderProgram, UniformCache, UniformValue,
};

/// Ask the platform to decode `file_name` and hand the image back through
/// [`Renderer::complete_texture`]. Requests from an older material library
/// are ignored when they complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRequest {
    pub generation: u64,
    pub file_name: String,
}

/// Uploaded line list.
struct GuideLines<B: GpuBackend> {
    positions: B::Buffer,
    colors: B::Buffer,
    vertex_count: usize,
}

impl<B: GpuBackend> GuideLines<B> {
    fn upload(backend: &mut B, lines: &LineSet) -> Result<Self, GpuError> {
        let positions = backend.create_buffer(BufferData::Floats(&lines.points))?;
        let colors = match backend.create_buffer(BufferData::Floats(&lines.colors)) {
            Ok(colors) => colors,
            Err(err) => {
                backend.delete_buffer(positions);
                return Err(err);
            }
        };
        Ok(Self {
            positions,
            colors,
            vertex_count: lines.vertex_count(),
        })
    }

    fn release(self, backend: &mut B) {
        backend.delete_buffer(self.positions);
        backend.delete_buffer(self.colors);
    }
}

/// Statistics of the model currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelStats {
    pub submeshes: usize,
    pub vertices: usize,
    pub triangles: usize,
}

pub struct Renderer<B: GpuBackend> {
    backend: B,
    config: ViewerConfig,
    params: SceneParameters,
    cache: UniformCache,
    submeshes: Vec<Submesh>,
    meshes: Vec<GpuMesh<B>>,
    materials: GpuMaterials<B>,
    material_generation: u64,
    default_texture: B::Texture,
    grid: GuideLines<B>,
    axes: GuideLines<B>,
    model_matrix: Matrix4<f32>,
    normal_matrix: Matrix4<f32>,
}

impl<B: GpuBackend> Renderer<B> {
    /// Create the fallback texture and guide buffers, then push every
    /// parameter group of `config.scene`. On failure everything created so
    /// far is released through the backend.
    pub fn new(mut backend: B, config: ViewerConfig) -> Result<Self, GpuError> {
        let default_texture = backend.create_texture()?;
        let grid = match GuideLines::upload(&mut backend, &grid_lines()) {
            Ok(grid) => grid,
            Err(err) => {
                backend.delete_texture(default_texture);
                return Err(err);
            }
        };
        let axes = match GuideLines::upload(&mut backend, &axis_lines()) {
            Ok(axes) => axes,
            Err(err) => {
                grid.release(&mut backend);
                backend.delete_texture(default_texture);
                return Err(err);
            }
        };
        let params = config.scene;

        let mut renderer = Self {
            backend,
            config,
            params,
            cache: UniformCache::new(),
            submeshes: Vec::new(),
            meshes: Vec::new(),
            materials: GpuMaterials::default(),
            material_generation: 0,
            default_texture,
            grid,
            axes,
            model_matrix: Matrix4::identity(),
            normal_matrix: Matrix4::identity(),
        };
        if let Err(err) = renderer.apply_parameters(params) {
            renderer.shutdown();
            return Err(err);
        }
        Ok(renderer)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn params(&self) -> &SceneParameters {
        &self.params
    }

    pub fn model_matrix(&self) -> &Matrix4<f32> {
        &self.model_matrix
    }

    pub fn normal_matrix(&self) -> &Matrix4<f32> {
        &self.normal_matrix
    }

    pub fn has_model(&self) -> bool {
        !self.meshes.is_empty()
    }

    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    pub fn model_stats(&self) -> ModelStats {
        ModelStats {
            submeshes: self.submeshes.len(),
            vertices: self.submeshes.iter().map(Submesh::vertex_count).sum(),
            triangles: self.submeshes.iter().map(Submesh::triangle_count).sum(),
        }
    }

    /// Upload `model` and make it the displayed model.
    ///
    /// The previous model stays on screen until every buffer of the new one
    /// exists; on failure nothing changes.
    pub fn replace_model(&mut self, model: ImportedModel) -> Result<(), GpuError> {
        let meshes = upload_meshes(&mut self.backend, &model.submeshes)?;
        let previous = std::mem::replace(&mut self.meshes, meshes);
        release_meshes(&mut self.backend, previous);
        self.submeshes = model.submeshes;
        log::info!("Displaying {} ({} submeshes)", model.file_name, self.submeshes.len());
        Ok(())
    }

    /// Install a new material library and drop the textures of the old one.
    ///
    /// Returns a request for each distinct diffuse map whose file name is in
    /// `available_images` (exact, case-sensitive match). Materials whose map
    /// is missing keep rendering with the fallback texture.
    pub fn set_material_library<'a>(
        &mut self,
        library: MaterialLibrary,
        available_images: impl IntoIterator<Item = &'a str>,
    ) -> Vec<TextureRequest> {
        self.material_generation += 1;
        let previous = std::mem::replace(&mut self.materials, GpuMaterials::new(library));
        previous.release(&mut self.backend);
        self.texture_requests(available_images)
    }

    /// Generation of the installed material library; texture requests
    /// carry it.
    pub fn material_generation(&self) -> u64 {
        self.material_generation
    }

    /// Requests for the current library's diffuse maps found among
    /// `available_images`, e.g. after more image files became available.
    pub fn texture_requests<'a>(&self, available_images: impl IntoIterator<Item = &'a str>) -> Vec<TextureRequest> {
        let available: BTreeSet<&str> = available_images.into_iter().collect();
        let mut wanted = BTreeSet::new();
        for material in self.materials.library.iter() {
            let Some(map) = material.diffuse_map.as_deref() else {
                continue;
            };
            if available.contains(map) {
                wanted.insert(map);
            } else {
                log::warn!(
                    "Texture '{}' for material '{}' not found, using base color",
                    map,
                    material.name
                );
            }
        }

        wanted
            .into_iter()
            .map(|file_name| TextureRequest {
                generation: self.material_generation,
                file_name: file_name.to_string(),
            })
            .collect()
    }

    /// Upload a decoded image for `request`.
    ///
    /// Returns `Ok(false)` without touching the GPU when the library the
    /// request was made for has since been replaced.
    pub fn complete_texture(&mut self, request: &TextureRequest, image: &B::Image) -> Result<bool, GpuError> {
        if request.generation != self.material_generation {
            log::warn!(
                "Ignoring stale texture '{}' (generation {}, current {})",
                request.file_name,
                request.generation,
                self.material_generation
            );
            return Ok(false);
        }

        let texture = self.backend.create_texture()?;
        if let Err(err) = self.backend.upload_texture_image(&texture, image) {
            self.backend.delete_texture(texture);
            return Err(err);
        }
        if let Some(replaced) = self.materials.insert_texture(&request.file_name, texture) {
            self.backend.delete_texture(replaced);
        }
        log::debug!("Uploaded texture '{}'", request.file_name);
        Ok(true)
    }

    /// Push the parameter groups that differ from what the backend has.
    /// Returns the groups that were pushed.
    pub fn apply_parameters(&mut self, params: SceneParameters) -> Result<Vec<ParameterGroup>, GpuError> {
        let groups = self.cache.stale_groups(&params);

        for &group in &groups {
            for write in group_writes(group, &params, self.config.inverse_epsilon) {
                self.backend.set_uniform(write.program, write.name, &write.value);
            }

            match group {
                ParameterGroup::Material => {
                    let pixel = default_texture_pixel(params.material.albedo);
                    self.backend
                        .upload_texture_rgba(&self.default_texture, 1, 1, &pixel)?;
                }
                ParameterGroup::Model => {
                    self.model_matrix = params.transform.model_matrix();
                    self.normal_matrix =
                        crate::transform::normal_matrix(&self.model_matrix, self.config.inverse_epsilon);
                }
                ParameterGroup::Projection => {
                    self.backend
                        .set_viewport(params.projection.width, params.projection.height);
                }
                _ => {}
            }
        }

        if !groups.is_empty() {
            log::debug!("Pushed parameter groups {:?}", groups);
        }
        self.cache.mark_pushed(params);
        self.params = params;
        Ok(groups)
    }

    /// Draw the model, then the floor grid and the axis tripod if enabled.
    pub fn draw_frame(&mut self) {
        self.backend.begin_frame(self.config.clear_color);

        for mesh in &self.meshes {
            let texture = self
                .materials
                .texture(&mesh.material_name)
                .unwrap_or(&self.default_texture);
            self.backend.draw_mesh(MeshDraw {
                positions: &mesh.positions,
                normals: &mesh.normals,
                texcoords: &mesh.texcoords,
                indices: &mesh.indices,
                index_count: mesh.index_count,
                texture,
            });
        }

        let guides = self.params.guides;
        if guides.show_grid {
            let identity = UniformValue::mat4(&Matrix4::identity());
            self.backend.set_uniform(ShaderProgram::Lines, "uModel", &identity);
            self.backend
                .set_uniform(ShaderProgram::Lines, "uScale", &UniformValue::Vec3([1.0; 3]));
            self.backend.draw_lines(LineDraw {
                positions: &self.grid.positions,
                colors: &self.grid.colors,
                vertex_count: self.grid.vertex_count,
                depth_test: true,
            });
        }

        if guides.show_axes && self.has_model() {
            let scale = self
                .params
                .transform
                .axis_guide_scale(self.params.camera.distance);
            self.backend
                .set_uniform(ShaderProgram::Lines, "uModel", &UniformValue::mat4(&self.model_matrix));
            self.backend
                .set_uniform(ShaderProgram::Lines, "uScale", &UniformValue::Vec3([scale.x, scale.y, scale.z]));
            self.backend.draw_lines(LineDraw {
                positions: &self.axes.positions,
                colors: &self.axes.colors,
                vertex_count: self.axes.vertex_count,
                depth_test: false,
            });
        }
    }

    /// Binary STL of the displayed model with the current transform applied.
    pub fn export_stl(&self) -> Vec<u8> {
        export::export_stl(&self.submeshes, &self.model_matrix, &self.normal_matrix)
    }

    pub fn export_file_name(&self) -> &str {
        &self.config.export_file_name
    }

    /// Release every GPU resource and hand the backend back.
    pub fn shutdown(mut self) -> B {
        release_meshes(&mut self.backend, std::mem::take(&mut self.meshes));
        self.materials.release(&mut self.backend);
        self.grid.release(&mut self.backend);
        self.axes.release(&mut self.backend);
        self.backend.delete_texture(self.default_texture);
        self.backend
    }
}
