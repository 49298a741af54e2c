/// Viewer state behind the exported JavaScript API, independent of WebGL
use modelscope_core::{
    parse_material_library, GpuBackend, GpuError, ImportOutcome, Importer, ModelError, ModelStats, Renderer,
    SceneParameters, TextureRequest, ViewerConfig,
};

pub struct ViewerSession<B: GpuBackend> {
    renderer: Renderer<B>,
    params: SceneParameters,
    importer: Importer,
    last_error: Option<String>,
}

impl<B: GpuBackend> ViewerSession<B> {
    pub fn new(backend: B, config: ViewerConfig) -> Result<Self, GpuError> {
        let params = config.scene;
        Ok(Self {
            renderer: Renderer::new(backend, config)?,
            params,
            importer: Importer::new(),
            last_error: None,
        })
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn params(&self) -> &SceneParameters {
        &self.params
    }

    /// Edits take effect on the next frame.
    pub fn params_mut(&mut self) -> &mut SceneParameters {
        &mut self.params
    }

    pub fn import_model(&mut self, file_name: &str, bytes: Vec<u8>) -> u64 {
        self.importer.submit(file_name, bytes)
    }

    /// Install a material library. Returns the diffuse map file names the
    /// page should decode and pass to [`ViewerSession::upload_texture`]
    /// together with [`ViewerSession::material_generation`].
    pub fn import_material_library(
        &mut self,
        file_name: &str,
        text: &str,
        available_images: &[String],
    ) -> Result<Vec<String>, ModelError> {
        let library = parse_material_library(file_name, text)?;
        let requests = self
            .renderer
            .set_material_library(library, available_images.iter().map(String::as_str));
        Ok(requests.into_iter().map(|r| r.file_name).collect())
    }

    pub fn material_generation(&self) -> u64 {
        self.renderer.material_generation()
    }

    /// Returns `Ok(false)` for an image decoded for a library that has
    /// since been replaced.
    pub fn upload_texture(&mut self, file_name: &str, generation: u64, image: &B::Image) -> Result<bool, GpuError> {
        let request = TextureRequest {
            generation,
            file_name: file_name.to_string(),
        };
        self.renderer.complete_texture(&request, image)
    }

    /// Install a finished import, push parameter changes and draw.
    pub fn frame(&mut self) -> Result<(), GpuError> {
        if let Some(outcome) = self.importer.poll() {
            self.install(outcome);
        }
        self.renderer.apply_parameters(self.params)?;
        self.renderer.draw_frame();
        Ok(())
    }

    fn install(&mut self, outcome: ImportOutcome) {
        let result = outcome
            .result
            .map_err(|err| err.to_string())
            .and_then(|model| self.renderer.replace_model(model).map_err(|err| err.to_string()));
        match result {
            Ok(()) => self.last_error = None,
            Err(message) => {
                log::error!("Could not load {}: {}", outcome.file_name, message);
                self.last_error = Some(message);
            }
        }
    }

    /// The most recent import failure, cleared by the next successful import.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        !self.importer.is_idle()
    }

    pub fn stats(&self) -> ModelStats {
        self.renderer.model_stats()
    }

    pub fn export_stl(&self) -> Vec<u8> {
        self.renderer.export_stl()
    }
}
