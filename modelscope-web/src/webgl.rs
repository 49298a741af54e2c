/// WebGL 2 implementation of the renderer's backend contract
use std::collections::HashMap;

use modelscope_core::gpu::{BufferData, GpuBackend, LineDraw, MeshDraw};
use modelscope_core::{GpuError, ShaderProgram, UniformValue};
use web_sys::{
    HtmlImageElement, WebGl2RenderingContext as Gl, WebGlBuffer, WebGlProgram, WebGlShader, WebGlTexture,
    WebGlUniformLocation,
};

use crate::shaders;

pub struct GlBuffer {
    buffer: WebGlBuffer,
    target: u32,
}

/// A linked program with its attribute locations (in declaration order)
/// and a lazily filled uniform location cache.
struct Program {
    program: WebGlProgram,
    attributes: Vec<Option<u32>>,
    uniforms: HashMap<String, Option<WebGlUniformLocation>>,
}

impl Program {
    fn new(gl: &Gl, vertex: &str, fragment: &str, attributes: &[&str]) -> Result<Self, GpuError> {
        let vertex = compile_shader(gl, Gl::VERTEX_SHADER, vertex)?;
        let fragment = match compile_shader(gl, Gl::FRAGMENT_SHADER, fragment) {
            Ok(shader) => shader,
            Err(err) => {
                gl.delete_shader(Some(&vertex));
                return Err(err);
            }
        };
        let program = link_program(gl, &vertex, &fragment);
        gl.delete_shader(Some(&vertex));
        gl.delete_shader(Some(&fragment));
        let program = program?;

        let attributes = attributes
            .iter()
            .map(|name| {
                let location = gl.get_attrib_location(&program, name);
                if location < 0 {
                    log::warn!("Attribute {} is unused by its program", name);
                }
                u32::try_from(location).ok()
            })
            .collect();

        Ok(Self {
            program,
            attributes,
            uniforms: HashMap::new(),
        })
    }

    fn location(&mut self, gl: &Gl, name: &str) -> Option<&WebGlUniformLocation> {
        if !self.uniforms.contains_key(name) {
            let location = gl.get_uniform_location(&self.program, name);
            if location.is_none() {
                log::debug!("Uniform {} is not active", name);
            }
            self.uniforms.insert(name.to_string(), location);
        }
        self.uniforms.get(name).and_then(Option::as_ref)
    }

    fn bind_attribute(&self, gl: &Gl, slot: usize, buffer: &GlBuffer, size: i32) {
        if let Some(Some(location)) = self.attributes.get(slot) {
            gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&buffer.buffer));
            gl.enable_vertex_attrib_array(*location);
            gl.vertex_attrib_pointer_with_i32(*location, size, Gl::FLOAT, false, 0, 0);
        }
    }

    fn unbind_attributes(&self, gl: &Gl) {
        for location in self.attributes.iter().flatten() {
            gl.disable_vertex_attrib_array(*location);
        }
    }
}

fn compile_shader(gl: &Gl, kind: u32, source: &str) -> Result<WebGlShader, GpuError> {
    let shader = gl
        .create_shader(kind)
        .ok_or(GpuError::ResourceCreation("shader"))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    if gl
        .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(shader)
    } else {
        let message = gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| String::from("unknown error"));
        gl.delete_shader(Some(&shader));
        Err(GpuError::ShaderCompile(message))
    }
}

fn link_program(gl: &Gl, vertex: &WebGlShader, fragment: &WebGlShader) -> Result<WebGlProgram, GpuError> {
    let program = gl
        .create_program()
        .ok_or(GpuError::ResourceCreation("program"))?;
    gl.attach_shader(&program, vertex);
    gl.attach_shader(&program, fragment);
    gl.link_program(&program);

    if gl
        .get_program_parameter(&program, Gl::LINK_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        Ok(program)
    } else {
        let message = gl
            .get_program_info_log(&program)
            .unwrap_or_else(|| String::from("unknown error"));
        gl.delete_program(Some(&program));
        Err(GpuError::ProgramLink(message))
    }
}

pub struct WebGlBackend {
    gl: Gl,
    pbr: Program,
    lines: Program,
}

impl WebGlBackend {
    /// Compile both programs and set the fixed pipeline state.
    pub fn new(gl: Gl) -> Result<Self, GpuError> {
        if gl.is_context_lost() {
            return Err(GpuError::ContextLost);
        }
        let pbr = Program::new(&gl, shaders::PBR_VERTEX, shaders::PBR_FRAGMENT, &shaders::PBR_ATTRIBUTES)?;
        let lines = Program::new(&gl, shaders::LINE_VERTEX, shaders::LINE_FRAGMENT, &shaders::LINE_ATTRIBUTES)?;

        gl.pixel_storei(Gl::UNPACK_FLIP_Y_WEBGL, 1);
        gl.enable(Gl::BLEND);
        gl.blend_func(Gl::SRC_ALPHA, Gl::ONE_MINUS_SRC_ALPHA);

        log::info!("WebGL backend ready");
        Ok(Self { gl, pbr, lines })
    }

    /// Creation failures on a lost context are reported as such.
    fn creation_error(&self, what: &'static str) -> GpuError {
        if self.gl.is_context_lost() {
            GpuError::ContextLost
        } else {
            GpuError::ResourceCreation(what)
        }
    }

    fn upload_error(&self, err: wasm_bindgen::JsValue) -> GpuError {
        if self.gl.is_context_lost() {
            GpuError::ContextLost
        } else {
            GpuError::TextureUpload(format!("{:?}", err))
        }
    }
}

impl GpuBackend for WebGlBackend {
    type Buffer = GlBuffer;
    type Texture = WebGlTexture;
    type Image = HtmlImageElement;

    fn create_buffer(&mut self, data: BufferData<'_>) -> Result<GlBuffer, GpuError> {
        let buffer = self
            .gl
            .create_buffer()
            .ok_or_else(|| self.creation_error("buffer"))?;
        let (target, bytes): (u32, &[u8]) = match data {
            BufferData::Floats(values) => (Gl::ARRAY_BUFFER, bytemuck::cast_slice(values)),
            BufferData::Indices(values) => (Gl::ELEMENT_ARRAY_BUFFER, bytemuck::cast_slice(values)),
        };
        self.gl.bind_buffer(target, Some(&buffer));
        self.gl.buffer_data_with_u8_array(target, bytes, Gl::STATIC_DRAW);
        Ok(GlBuffer { buffer, target })
    }

    fn delete_buffer(&mut self, buffer: GlBuffer) {
        self.gl.bind_buffer(buffer.target, None);
        self.gl.delete_buffer(Some(&buffer.buffer));
    }

    fn create_texture(&mut self) -> Result<WebGlTexture, GpuError> {
        self.gl
            .create_texture()
            .ok_or_else(|| self.creation_error("texture"))
    }

    fn delete_texture(&mut self, texture: WebGlTexture) {
        self.gl.delete_texture(Some(&texture));
    }

    fn upload_texture_rgba(&mut self, texture: &WebGlTexture, width: u32, height: u32, pixels: &[u8]) -> Result<(), GpuError> {
        let gl = &self.gl;
        gl.bind_texture(Gl::TEXTURE_2D, Some(texture));
        gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            Gl::TEXTURE_2D,
            0,
            Gl::RGBA as i32,
            width as i32,
            height as i32,
            0,
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            Some(pixels),
        )
        .map_err(|err| self.upload_error(err))?;
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MIN_FILTER, Gl::NEAREST as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MAG_FILTER, Gl::NEAREST as i32);
        Ok(())
    }

    fn upload_texture_image(&mut self, texture: &WebGlTexture, image: &HtmlImageElement) -> Result<(), GpuError> {
        let gl = &self.gl;
        gl.bind_texture(Gl::TEXTURE_2D, Some(texture));
        gl.tex_image_2d_with_u32_and_u32_and_html_image_element(
            Gl::TEXTURE_2D,
            0,
            Gl::RGBA as i32,
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            image,
        )
        .map_err(|err| self.upload_error(err))?;
        gl.generate_mipmap(Gl::TEXTURE_2D);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MIN_FILTER, Gl::LINEAR_MIPMAP_LINEAR as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MAG_FILTER, Gl::LINEAR as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_WRAP_S, Gl::REPEAT as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_WRAP_T, Gl::REPEAT as i32);
        Ok(())
    }

    fn set_uniform(&mut self, program: ShaderProgram, name: &str, value: &UniformValue) {
        let gl = &self.gl;
        let program = match program {
            ShaderProgram::Pbr => &mut self.pbr,
            ShaderProgram::Lines => &mut self.lines,
        };
        gl.use_program(Some(&program.program));
        let Some(location) = program.location(gl, name) else {
            return;
        };
        match value {
            UniformValue::Int(v) => gl.uniform1i(Some(location), *v),
            UniformValue::Float(v) => gl.uniform1f(Some(location), *v),
            UniformValue::Vec3(v) => gl.uniform3fv_with_f32_array(Some(location), v),
            UniformValue::Mat4(m) => gl.uniform_matrix4fv_with_f32_array(Some(location), false, m),
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.gl.viewport(0, 0, width as i32, height as i32);
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) {
        let gl = &self.gl;
        let [r, g, b, a] = clear_color;
        gl.clear_color(r, g, b, a);
        gl.clear_depth(1.0);
        gl.enable(Gl::DEPTH_TEST);
        gl.depth_func(Gl::LEQUAL);
        gl.clear(Gl::COLOR_BUFFER_BIT | Gl::DEPTH_BUFFER_BIT);
    }

    fn draw_mesh(&mut self, draw: MeshDraw<'_, Self>) {
        let gl = &self.gl;
        let program = &self.pbr;
        gl.use_program(Some(&program.program));
        program.bind_attribute(gl, 0, draw.positions, 3);
        program.bind_attribute(gl, 1, draw.normals, 3);
        program.bind_attribute(gl, 2, draw.texcoords, 2);

        gl.active_texture(Gl::TEXTURE0);
        gl.bind_texture(Gl::TEXTURE_2D, Some(draw.texture));
        gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&draw.indices.buffer));
        gl.draw_elements_with_i32(Gl::TRIANGLES, draw.index_count as i32, Gl::UNSIGNED_SHORT, 0);
        program.unbind_attributes(gl);
    }

    fn draw_lines(&mut self, draw: LineDraw<'_, Self>) {
        let gl = &self.gl;
        let program = &self.lines;
        gl.use_program(Some(&program.program));
        program.bind_attribute(gl, 0, draw.positions, 3);
        program.bind_attribute(gl, 1, draw.colors, 3);

        if !draw.depth_test {
            gl.disable(Gl::DEPTH_TEST);
        }
        gl.draw_arrays(Gl::LINES, 0, draw.vertex_count as i32);
        if !draw.depth_test {
            gl.enable(Gl::DEPTH_TEST);
        }
        program.unbind_attributes(gl);
    }
}
