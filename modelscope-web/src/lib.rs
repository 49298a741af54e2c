/// ModelScope Web - WebGL model viewer exported to JavaScript
///
/// The page owns file pickers and image decoding; this crate parses models,
/// keeps the GPU resources and draws into a canvas.
use modelscope_core::ViewerConfig;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, HtmlImageElement, WebGl2RenderingContext};

pub mod logger;
pub mod session;
pub mod shaders;
pub mod webgl;

pub use session::ViewerSession;
pub use webgl::WebGlBackend;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Interactive viewer bound to one canvas.
#[wasm_bindgen]
pub struct ModelViewer {
    session: ViewerSession<WebGlBackend>,
}

#[wasm_bindgen]
impl ModelViewer {
    /// Attach to the `<canvas>` with id `canvas_id`.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: &str) -> Result<ModelViewer, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| js_error("no document"))?;
        let canvas: HtmlCanvasElement = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| js_error(format!("no element with id '{}'", canvas_id)))?
            .dyn_into()
            .map_err(|_| js_error(format!("'{}' is not a canvas", canvas_id)))?;
        let gl: WebGl2RenderingContext = canvas
            .get_context("webgl2")?
            .ok_or_else(|| js_error("WebGL 2 is not available"))?
            .dyn_into()
            .map_err(|_| js_error("unexpected WebGL context type"))?;

        let mut config = ViewerConfig::default();
        config.scene.projection = config
            .scene
            .projection
            .with_viewport(canvas.width(), canvas.height());

        let backend = WebGlBackend::new(gl).map_err(js_error)?;
        let session = ViewerSession::new(backend, config).map_err(js_error)?;
        Ok(ModelViewer { session })
    }

    /// Start parsing an `.obj` or `.stl` file. The model replaces the
    /// current one on a later `render` call.
    #[wasm_bindgen(js_name = importModel)]
    pub fn import_model(&mut self, file_name: &str, bytes: Vec<u8>) -> u64 {
        self.session.import_model(file_name, bytes)
    }

    /// Install an `.mtl` library. Returns the image file names to decode
    /// and hand to `uploadTexture` with the current `materialGeneration`.
    #[wasm_bindgen(js_name = importMaterialLibrary)]
    pub fn import_material_library(
        &mut self,
        file_name: &str,
        text: &str,
        available_images: Vec<String>,
    ) -> Result<Vec<String>, JsValue> {
        self.session
            .import_material_library(file_name, text, &available_images)
            .map_err(js_error)
    }

    #[wasm_bindgen(getter, js_name = materialGeneration)]
    pub fn material_generation(&self) -> u64 {
        self.session.material_generation()
    }

    /// False when the image belongs to a replaced material library.
    #[wasm_bindgen(js_name = uploadTexture)]
    pub fn upload_texture(&mut self, file_name: &str, generation: u64, image: &HtmlImageElement) -> Result<bool, JsValue> {
        self.session
            .upload_texture(file_name, generation, image)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = setMaterial)]
    pub fn set_material(&mut self, r: f32, g: f32, b: f32, metallic: f32, roughness: f32, ao: f32) {
        let material = &mut self.session.params_mut().material;
        material.albedo = [r, g, b];
        material.metallic = metallic;
        material.roughness = roughness;
        material.ao = ao;
    }

    #[wasm_bindgen(js_name = setDirectionalLight)]
    pub fn set_directional_light(&mut self, x: f32, y: f32, z: f32, r: f32, g: f32, b: f32) {
        let light = &mut self.session.params_mut().directional_light;
        light.direction = [x, y, z];
        light.color = [r, g, b];
    }

    #[wasm_bindgen(js_name = setPointLight)]
    pub fn set_point_light(&mut self, x: f32, y: f32, z: f32, r: f32, g: f32, b: f32) {
        let light = &mut self.session.params_mut().point_light;
        light.position = [x, y, z];
        light.color = [r, g, b];
    }

    /// Yaw and pitch in degrees.
    #[wasm_bindgen(js_name = setCamera)]
    pub fn set_camera(&mut self, yaw: f32, pitch: f32, distance: f32) {
        let camera = &mut self.session.params_mut().camera;
        camera.yaw = yaw;
        camera.pitch = pitch;
        camera.distance = distance;
    }

    pub fn orbit(&mut self, dyaw: f32, dpitch: f32) {
        self.session.params_mut().camera.orbit(dyaw, dpitch);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.session.params_mut().camera.zoom(factor);
    }

    #[wasm_bindgen(js_name = setPosition)]
    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.session.params_mut().transform.position = [x, y, z];
    }

    /// Euler angles in degrees.
    #[wasm_bindgen(js_name = setRotation)]
    pub fn set_rotation(&mut self, x: f32, y: f32, z: f32) {
        self.session.params_mut().transform.rotation = [x, y, z];
    }

    pub fn rotate(&mut self, dx: f32, dy: f32, dz: f32) {
        self.session.params_mut().transform.rotate(dx, dy, dz);
    }

    /// Per-axis factors and a uniform multiplier.
    #[wasm_bindgen(js_name = setScale)]
    pub fn set_scale(&mut self, x: f32, y: f32, z: f32, uniform: f32) {
        self.session.params_mut().transform.scale = [x, y, z, uniform];
    }

    #[wasm_bindgen(js_name = setFieldOfView)]
    pub fn set_field_of_view(&mut self, degrees: f32) {
        self.session.params_mut().projection.fov_degrees = degrees;
    }

    #[wasm_bindgen(js_name = setShowGrid)]
    pub fn set_show_grid(&mut self, show: bool) {
        self.session.params_mut().guides.show_grid = show;
    }

    #[wasm_bindgen(js_name = setShowAxes)]
    pub fn set_show_axes(&mut self, show: bool) {
        self.session.params_mut().guides.show_axes = show;
    }

    /// Call after the canvas drawing buffer changed size.
    pub fn resize(&mut self, width: u32, height: u32) {
        let params = self.session.params_mut();
        params.projection = params.projection.with_viewport(width, height);
    }

    /// Draw one frame; call from `requestAnimationFrame`.
    pub fn render(&mut self) -> Result<(), JsValue> {
        self.session.frame().map_err(js_error)
    }

    #[wasm_bindgen(getter, js_name = lastError)]
    pub fn last_error(&self) -> Option<String> {
        self.session.last_error().map(str::to_string)
    }

    #[wasm_bindgen(getter, js_name = triangleCount)]
    pub fn triangle_count(&self) -> usize {
        self.session.stats().triangles
    }

    #[wasm_bindgen(getter, js_name = vertexCount)]
    pub fn vertex_count(&self) -> usize {
        self.session.stats().vertices
    }

    /// Binary STL of the displayed model with the current transform.
    #[wasm_bindgen(js_name = exportStl)]
    pub fn export_stl(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(&self.session.export_stl()[..])
    }

    #[wasm_bindgen(getter, js_name = exportFileName)]
    pub fn export_file_name(&self) -> String {
        self.session.renderer().export_file_name().to_string()
    }
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    logger::init(log::LevelFilter::Info);
}
