/// ASCII rasterizer that plays the part of a GPU for the terminal viewer
use crossterm::{
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    QueueableCommand,
};
use modelscope_core::gpu::{BufferData, GpuBackend, LineDraw, MeshDraw};
use modelscope_core::math::{normalize_or_zero, transform_direction, transform_point};
use modelscope_core::projection::project_to_viewport;
use modelscope_core::{GpuError, ShaderProgram, UniformValue};
use image::RgbaImage;
use nalgebra::{Matrix4, Vector3};
use std::collections::HashMap;
use std::io::Write;

/// Character luminosity ramp for depth/shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// A terminal cell is roughly twice as tall as it is wide, so one cell
/// covers two rows of viewport pixels.
pub const CELL_ASPECT: u32 = 2;

/// Nearest-texel lookup with repeat wrapping. `v = 0` is the bottom row.
fn sample(image: &RgbaImage, u: f32, v: f32) -> [f32; 3] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || !u.is_finite() || !v.is_finite() {
        return [1.0; 3];
    }
    let x = ((u.rem_euclid(1.0) * width as f32) as u32).min(width - 1);
    let y = (((1.0 - v.rem_euclid(1.0)) * height as f32) as u32).min(height - 1);
    let [r, g, b, _] = image.get_pixel(x, y).0;
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(usize);

/// Vec-backed storage whose released slots are handed out again.
struct Slots<T> {
    entries: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(value);
                index
            }
            None => {
                self.entries.push(Some(value));
                self.entries.len() - 1
            }
        }
    }

    fn remove(&mut self, index: usize) {
        if let Some(slot) = self.entries.get_mut(index) {
            if slot.take().is_some() {
                self.free.push(index);
            }
        }
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).and_then(Option::as_mut)
    }

    fn live(&self) -> usize {
        self.entries.len() - self.free.len()
    }
}

enum StoredBuffer {
    Floats(Vec<f32>),
    Indices(Vec<u16>),
}

/// A triangle after projection and shading, ready to rasterize.
struct ShadedTriangle {
    screen: [(f32, f32, f32); 3],
    character: char,
    color: Color,
}

/// Software backend: keeps buffers, textures and uniforms in memory and
/// rasterizes draws into a character grid.
pub struct AsciiBackend {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
    char_buffer: Vec<char>,
    color_buffer: Vec<Color>,
    background: Color,
    buffers: Slots<StoredBuffer>,
    textures: Slots<RgbaImage>,
    uniforms: HashMap<(ShaderProgram, String), UniformValue>,
}

impl AsciiBackend {
    /// A backend drawing into `width` x `height` terminal cells.
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; size],
            char_buffer: vec![' '; size],
            color_buffer: vec![Color::Reset; size],
            background: Color::Reset,
            buffers: Slots::new(),
            textures: Slots::new(),
            uniforms: HashMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn char_at(&self, x: usize, y: usize) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.char_buffer[y * self.width + x])
    }

    /// Number of cells that are not blank.
    pub fn covered_cells(&self) -> usize {
        self.char_buffer.iter().filter(|&&c| c != ' ').count()
    }

    /// Number of cells written with a depth value (surfaces and depth-tested lines).
    pub fn drawn_cells(&self) -> usize {
        self.depth_buffer.iter().filter(|d| d.is_finite()).count()
    }

    /// Live buffers and textures, for leak checks.
    pub fn live_resources(&self) -> (usize, usize) {
        (self.buffers.live(), self.textures.live())
    }

    fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        let size = width * height;
        self.width = width;
        self.height = height;
        self.depth_buffer = vec![f32::INFINITY; size];
        self.char_buffer = vec![' '; size];
        self.color_buffer = vec![Color::Reset; size];
    }

    fn floats(&self, buffer: &BufferId) -> &[f32] {
        match self.buffers.get(buffer.0) {
            Some(StoredBuffer::Floats(data)) => data,
            _ => &[],
        }
    }

    fn indices(&self, buffer: &BufferId) -> &[u16] {
        match self.buffers.get(buffer.0) {
            Some(StoredBuffer::Indices(data)) => data,
            _ => &[],
        }
    }

    fn uniform(&self, program: ShaderProgram, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(&(program, name.to_string()))
    }

    fn mat4(&self, program: ShaderProgram, name: &str) -> Matrix4<f32> {
        match self.uniform(program, name) {
            Some(UniformValue::Mat4(m)) => Matrix4::from_column_slice(m),
            _ => Matrix4::identity(),
        }
    }

    fn vec3(&self, program: ShaderProgram, name: &str) -> Vector3<f32> {
        match self.uniform(program, name) {
            Some(UniformValue::Vec3(v)) => Vector3::from(*v),
            _ => Vector3::zeros(),
        }
    }

    fn float(&self, program: ShaderProgram, name: &str) -> f32 {
        match self.uniform(program, name) {
            Some(UniformValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    fn position(data: &[f32], index: usize) -> Option<Vector3<f32>> {
        let p = data.get(index * 3..index * 3 + 3)?;
        Some(Vector3::new(p[0], p[1], p[2]))
    }

    /// Lambert term for both lights plus the material's ambient level.
    fn brightness(&self, world_position: &Vector3<f32>, world_normal: &Vector3<f32>) -> f32 {
        let ambient = self.float(ShaderProgram::Pbr, "material.ao");

        let to_sun = normalize_or_zero(&-self.vec3(ShaderProgram::Pbr, "dirLight.direction"));
        let sun = self.vec3(ShaderProgram::Pbr, "dirLight.color").max();
        let to_lamp = normalize_or_zero(&(self.vec3(ShaderProgram::Pbr, "pointLight.position") - world_position));
        let lamp = self.vec3(ShaderProgram::Pbr, "pointLight.color").max();

        let diffuse = world_normal.dot(&to_sun).max(0.0) * sun + world_normal.dot(&to_lamp).max(0.0) * lamp;
        (ambient + diffuse).clamp(0.0, 1.0)
    }

    fn rasterize_triangle(&mut self, triangle: &ShadedTriangle) {
        let [v0, v1, v2] = triangle.screen;

        // Bounding box
        let min_x = v0.0.min(v1.0).min(v2.0).floor() as i32;
        let max_x = v0.0.max(v1.0).max(v2.0).ceil() as i32;
        let min_y = v0.1.min(v1.1).min(v2.1).floor() as i32;
        let max_y = v0.1.max(v1.1).max(v2.1).ceil() as i32;

        // Clip to screen bounds
        let min_x = min_x.max(0);
        let max_x = max_x.min(self.width as i32 - 1);
        let min_y = min_y.max(0);
        let max_y = max_y.min(self.height as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                if let Some((w0, w1, w2)) = barycentric((v0.0, v0.1), (v1.0, v1.1), (v2.0, v2.1), (px, py)) {
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        let depth = w0 * v0.2 + w1 * v1.2 + w2 * v2.2;
                        self.plot(x as usize, y as usize, depth, true, triangle.character, triangle.color);
                    }
                }
            }
        }
    }

    fn plot(&mut self, x: usize, y: usize, depth: f32, depth_test: bool, character: char, color: Color) {
        let idx = y * self.width + x;
        if depth_test {
            if depth >= self.depth_buffer[idx] {
                return;
            }
            self.depth_buffer[idx] = depth;
        }
        self.char_buffer[idx] = character;
        self.color_buffer[idx] = color;
    }

    /// Walk from `a` to `b` one cell at a time.
    fn rasterize_line(&mut self, a: (f32, f32, f32), b: (f32, f32, f32), depth_test: bool, color: Color) {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let character = line_char(dx, dy);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;

        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let x = a.0 + dx * t;
            let y = a.1 + dy * t;
            if x < 0.0 || y < 0.0 || x >= self.width as f32 || y >= self.height as f32 {
                continue;
            }
            let depth = a.2 + (b.2 - a.2) * t;
            self.plot(x as usize, y as usize, depth, depth_test, character, color);
        }
    }

    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.queue(SetBackgroundColor(self.background))?;
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = y * self.width + x;
                writer.queue(SetForegroundColor(self.color_buffer[idx]))?;
                writer.queue(Print(self.char_buffer[idx]))?;
            }
            if y + 1 < self.height {
                writer.queue(Print("\r\n"))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

impl GpuBackend for AsciiBackend {
    type Buffer = BufferId;
    type Texture = TextureId;
    type Image = RgbaImage;

    fn create_buffer(&mut self, data: BufferData<'_>) -> Result<BufferId, GpuError> {
        let stored = match data {
            BufferData::Floats(values) => StoredBuffer::Floats(values.to_vec()),
            BufferData::Indices(values) => StoredBuffer::Indices(values.to_vec()),
        };
        Ok(BufferId(self.buffers.insert(stored)))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer.0);
    }

    fn create_texture(&mut self) -> Result<TextureId, GpuError> {
        Ok(TextureId(self.textures.insert(RgbaImage::new(0, 0))))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture.0);
    }

    fn upload_texture_rgba(&mut self, texture: &TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<(), GpuError> {
        let image = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            GpuError::TextureUpload(format!("{}x{} texture got {} bytes", width, height, pixels.len()))
        })?;
        self.upload_texture_image(texture, &image)
    }

    fn upload_texture_image(&mut self, texture: &TextureId, image: &RgbaImage) -> Result<(), GpuError> {
        match self.textures.get_mut(texture.0) {
            Some(slot) => {
                *slot = image.clone();
                Ok(())
            }
            _ => Err(GpuError::TextureUpload(format!("texture {} was deleted", texture.0))),
        }
    }

    fn set_uniform(&mut self, program: ShaderProgram, name: &str, value: &UniformValue) {
        self.uniforms.insert((program, name.to_string()), *value);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.resize(width as usize, (height / CELL_ASPECT) as usize);
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) {
        self.depth_buffer.fill(f32::INFINITY);
        self.char_buffer.fill(' ');
        self.color_buffer.fill(Color::Reset);
        self.background = rgb(&[clear_color[0], clear_color[1], clear_color[2]]);
    }

    fn draw_mesh(&mut self, draw: MeshDraw<'_, Self>) {
        let model = self.mat4(ShaderProgram::Pbr, "uModelMatrix");
        let normal_matrix = self.mat4(ShaderProgram::Pbr, "uNormalMatrix");
        let mvp = self.mat4(ShaderProgram::Pbr, "uProjectionMatrix") * self.mat4(ShaderProgram::Pbr, "uViewMatrix") * model;

        let positions = self.floats(draw.positions);
        let normals = self.floats(draw.normals);
        let texcoords = self.floats(draw.texcoords);
        let indices = self.indices(draw.indices);
        let texture = match self.textures.get(draw.texture.0) {
            Some(image) => image,
            _ => return,
        };

        let count = draw.index_count.min(indices.len());
        let mut shaded = Vec::with_capacity(count / 3);
        'triangles: for corners in indices[..count].chunks_exact(3) {
            let mut screen = [(0.0, 0.0, 0.0); 3];
            let mut normal = Vector3::zeros();
            let mut centroid = Vector3::zeros();
            let (mut u, mut v) = (0.0, 0.0);

            for (slot, &index) in corners.iter().enumerate() {
                let index = index as usize;
                let Some(position) = Self::position(positions, index) else {
                    continue 'triangles;
                };
                let Some(projected) = project_to_viewport(&mvp, &position, self.width as u32, self.height as u32) else {
                    continue 'triangles;
                };
                screen[slot] = projected;
                normal += Self::position(normals, index).unwrap_or_else(Vector3::zeros);
                centroid += transform_point(&model, &position);
                if let Some(uv) = texcoords.get(index * 2..index * 2 + 2) {
                    u += uv[0] / 3.0;
                    v += uv[1] / 3.0;
                }
            }

            let world_normal = normalize_or_zero(&transform_direction(&normal_matrix, &normal));
            let brightness = self.brightness(&(centroid / 3.0), &world_normal);

            let char_index = (brightness * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
            let char_index = char_index.min(LUMINOSITY_RAMP.len() - 1);
            let base = sample(texture, u, v);

            shaded.push(ShadedTriangle {
                screen,
                character: LUMINOSITY_RAMP[char_index],
                color: rgb(&base.map(|c| c * (0.3 + 0.7 * brightness))),
            });
        }

        for triangle in &shaded {
            self.rasterize_triangle(triangle);
        }
    }

    fn draw_lines(&mut self, draw: LineDraw<'_, Self>) {
        let scale = self.vec3(ShaderProgram::Lines, "uScale");
        let mvp = self.mat4(ShaderProgram::Lines, "uProjection")
            * self.mat4(ShaderProgram::Lines, "uView")
            * self.mat4(ShaderProgram::Lines, "uModel")
            * Matrix4::new_nonuniform_scaling(&scale);

        let positions = self.floats(draw.positions);
        let colors = self.floats(draw.colors);
        let count = draw.vertex_count.min(positions.len() / 3);

        let mut segments = Vec::with_capacity(count / 2);
        for first in (0..count.saturating_sub(1)).step_by(2) {
            let (Some(a), Some(b)) = (Self::position(positions, first), Self::position(positions, first + 1)) else {
                continue;
            };
            let (width, height) = (self.width as u32, self.height as u32);
            let (Some(a), Some(b)) = (
                project_to_viewport(&mvp, &a, width, height),
                project_to_viewport(&mvp, &b, width, height),
            ) else {
                continue;
            };
            let color = Self::position(colors, first).unwrap_or_else(|| Vector3::repeat(1.0));
            segments.push((a, b, rgb(&[color.x, color.y, color.z])));
        }

        for (a, b, color) in segments {
            self.rasterize_line(a, b, draw.depth_test, color);
        }
    }
}

fn rgb(color: &[f32; 3]) -> Color {
    let [r, g, b] = color.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8);
    Color::Rgb { r, g, b }
}

/// Pick a glyph that follows the on-screen direction of a segment.
fn line_char(dx: f32, dy: f32) -> char {
    let (adx, ady) = (dx.abs(), dy.abs());
    if ady <= adx * 0.5 {
        '-'
    } else if adx <= ady * 0.5 {
        '|'
    } else if (dx > 0.0) == (dy > 0.0) {
        '\\'
    } else {
        '/'
    }
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(v0: (f32, f32), v1: (f32, f32), v2: (f32, f32), p: (f32, f32)) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelscope_core::{import_model, Renderer, ViewerConfig};

    const CUBE_OBJ: &str = "\
v -1 -1 -1
v 1 -1 -1
v 1 1 -1
v -1 1 -1
v -1 -1 1
v 1 -1 1
v 1 1 1
v -1 1 1
f 1 2 3 4
f 5 8 7 6
f 1 5 6 2
f 2 6 7 3
f 3 7 8 4
f 5 1 4 8
";

    fn renderer(cols: u32, rows: u32) -> Renderer<AsciiBackend> {
        let mut config = ViewerConfig::default();
        config.scene.projection = config.scene.projection.with_viewport(cols, rows * CELL_ASPECT);
        Renderer::new(AsciiBackend::new(cols as usize, rows as usize), config).unwrap()
    }

    #[test]
    fn test_viewport_maps_to_cells() {
        let renderer = renderer(80, 24);
        assert_eq!(renderer.backend().width(), 80);
        assert_eq!(renderer.backend().height(), 24);
    }

    #[test]
    fn test_texture_size_is_checked() {
        let mut backend = AsciiBackend::new(4, 4);
        let texture = backend.create_texture().unwrap();
        assert!(backend.upload_texture_rgba(&texture, 2, 2, &[0; 16]).is_ok());
        assert!(matches!(
            backend.upload_texture_rgba(&texture, 2, 2, &[0; 15]),
            Err(GpuError::TextureUpload(_))
        ));
    }

    #[test]
    fn test_deleted_texture_rejects_upload() {
        let mut backend = AsciiBackend::new(4, 4);
        let texture = backend.create_texture().unwrap();
        backend.delete_texture(texture);
        assert!(backend.upload_texture_rgba(&texture, 1, 1, &[0, 0, 0, 255]).is_err());
    }

    #[test]
    fn test_sample_wraps_and_flips() {
        // Top row red, bottom row blue.
        let image = RgbaImage::from_raw(1, 2, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
        assert_eq!(sample(&image, 0.5, 0.9), [1.0, 0.0, 0.0]);
        assert_eq!(sample(&image, 0.5, 0.1), [0.0, 0.0, 1.0]);
        assert_eq!(sample(&image, 1.5, -0.9), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_cube_covers_screen_center() {
        let mut renderer = renderer(80, 24);
        let mut params = *renderer.params();
        params.guides.show_grid = false;
        params.guides.show_axes = false;
        params.transform.position = [0.0, 0.0, 0.0];
        renderer.apply_parameters(params).unwrap();
        renderer
            .replace_model(import_model("cube.obj", CUBE_OBJ.as_bytes()).unwrap())
            .unwrap();
        renderer.draw_frame();

        let backend = renderer.backend();
        assert!(backend.drawn_cells() > 20);
        assert!(backend.drawn_cells() < 80 * 24);
        // The camera looks at the origin, the middle of the cube's floor.
        assert!(backend.depth_buffer[12 * 80 + 40].is_finite());
    }

    #[test]
    fn test_grid_draws_lines() {
        let mut renderer = renderer(80, 24);
        renderer.draw_frame();
        let backend = renderer.backend();
        assert!(backend.covered_cells() > 0);
        let glyphs: Vec<char> = backend.char_buffer.iter().copied().filter(|&c| c != ' ').collect();
        assert!(glyphs.iter().all(|c| "-|/\\".contains(*c)));
    }

    #[test]
    fn test_begin_frame_clears() {
        let mut renderer = renderer(40, 12);
        renderer.draw_frame();
        assert!(renderer.backend().covered_cells() > 0);
        renderer.backend_mut().begin_frame([0.0, 0.0, 0.0, 1.0]);
        assert_eq!(renderer.backend().covered_cells(), 0);
    }

    #[test]
    fn test_shutdown_frees_resources() {
        let mut renderer = renderer(40, 12);
        renderer
            .replace_model(import_model("cube.obj", CUBE_OBJ.as_bytes()).unwrap())
            .unwrap();
        let backend = renderer.shutdown();
        assert_eq!(backend.live_resources(), (0, 0));
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut renderer = renderer(40, 12);
        let model = || import_model("cube.obj", CUBE_OBJ.as_bytes()).unwrap();
        renderer.replace_model(model()).unwrap();
        let slots = renderer.backend().buffers.entries.len();
        for _ in 0..5 {
            renderer.replace_model(model()).unwrap();
        }
        // Each swap needs one extra set of buffers while both models are live.
        let per_model = 4 * renderer.submeshes().len();
        assert!(renderer.backend().buffers.entries.len() <= slots + per_model);
        assert_eq!(renderer.backend().live_resources().0, 4 + per_model);
    }

    #[test]
    fn test_slots_hand_out_freed_indices() {
        let mut slots = Slots::new();
        let a = slots.insert('a');
        let b = slots.insert('b');
        slots.remove(a);
        slots.remove(a);
        assert_eq!(slots.live(), 1);
        assert_eq!(slots.insert('c'), a);
        assert_eq!(slots.get(a), Some(&'c'));
        assert_eq!(slots.get(b), Some(&'b'));
        assert_eq!(slots.insert('d'), 2);
        assert_eq!(slots.live(), 3);
    }

    #[test]
    fn test_line_glyphs() {
        assert_eq!(line_char(5.0, 0.5), '-');
        assert_eq!(line_char(0.2, 4.0), '|');
        assert_eq!(line_char(3.0, 3.0), '\\');
        assert_eq!(line_char(3.0, -3.0), '/');
    }

    #[test]
    fn test_depth_test_keeps_nearest() {
        let mut backend = AsciiBackend::new(4, 1);
        backend.plot(1, 0, 0.5, true, '#', Color::White);
        backend.plot(1, 0, 0.9, true, '.', Color::White);
        assert_eq!(backend.char_at(1, 0), Some('#'));
        backend.plot(1, 0, 0.9, false, '+', Color::White);
        assert_eq!(backend.char_at(1, 0), Some('+'));
    }
}
