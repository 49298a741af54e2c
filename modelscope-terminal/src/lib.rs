/// Terminal front-end: an interactive model viewer drawn with ASCII cells
use anyhow::{Context, Result};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self},
};
use modelscope_core::{
    parse_material_library, ImportOutcome, ImportedModel, Importer, MaterialLibrary, Renderer, SceneParameters,
    ViewerConfig,
};
use std::fs;
use std::io::{stdout, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub mod renderer;

pub use renderer::{AsciiBackend, CELL_ASPECT};

/// Degrees per key press.
const ORBIT_STEP: f32 = 5.0;
const ZOOM_STEP: f32 = 1.1;
const SCALE_STEP: f32 = 1.1;
/// Bottom rows kept free for the status line.
const STATUS_ROWS: u16 = 1;

/// Models shipped inside the binary, loadable by name.
pub const PRESETS: &[(&str, &[u8])] = &[
    ("cube.obj", include_bytes!("../presets/cube.obj")),
    ("tetrahedron.stl", include_bytes!("../presets/tetrahedron.stl")),
];

/// Names of the bundled models, in menu order.
pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// Bytes of the bundled model `name`.
pub fn preset(name: &str) -> Result<&'static [u8]> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, bytes)| *bytes)
        .with_context(|| {
            format!(
                "unknown preset '{}' (available: {})",
                name,
                preset_names().collect::<Vec<_>>().join(", ")
            )
        })
}

/// Read every `mtllib` next to the model and merge them in order.
/// Missing or malformed libraries are logged and skipped.
pub fn load_material_libraries(model_dir: &Path, names: &[String]) -> MaterialLibrary {
    let mut merged = MaterialLibrary::new();
    for name in names {
        let path = model_dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Skipping material library {}: {}", path.display(), err);
                continue;
            }
        };
        match parse_material_library(name, &text) {
            Ok(library) => merged.merge(library),
            Err(err) => log::warn!("Skipping material library {}: {}", path.display(), err),
        }
    }
    merged
}

/// Image files in `dir` that `library` refers to as diffuse maps.
pub fn available_images(dir: &Path, library: &MaterialLibrary) -> Vec<String> {
    let mut names: Vec<String> = library
        .iter()
        .filter_map(|m| m.diffuse_map.clone())
        .filter(|name| dir.join(name).is_file())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Main application struct for the terminal viewer
pub struct TerminalApp {
    renderer: Renderer<AsciiBackend>,
    params: SceneParameters,
    importer: Importer,
    model_dir: PathBuf,
    export_path: PathBuf,
    /// Index into [`PRESETS`] of the last preset opened.
    preset: Option<usize>,
    status: String,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    /// Size the viewer to the current terminal.
    pub fn new(config: ViewerConfig, export_path: PathBuf) -> Result<Self> {
        let (cols, rows) = terminal::size().context("could not query terminal size")?;
        Self::with_size(config, export_path, cols, rows)
    }

    pub fn with_size(config: ViewerConfig, export_path: PathBuf, cols: u16, rows: u16) -> Result<Self> {
        let mut config = config;
        let (width, height) = viewport_for(cols, rows);
        config.scene.projection = config.scene.projection.with_viewport(width, height);
        let params = config.scene;

        let backend = AsciiBackend::new(width as usize, (height / CELL_ASPECT) as usize);
        let renderer = Renderer::new(backend, config).context("could not set up the renderer")?;

        Ok(Self {
            renderer,
            params,
            importer: Importer::new(),
            model_dir: PathBuf::from("."),
            export_path,
            preset: None,
            status: String::from("No model loaded"),
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    pub fn renderer(&self) -> &Renderer<AsciiBackend> {
        &self.renderer
    }

    pub fn params(&self) -> &SceneParameters {
        &self.params
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start importing `path` in the background. Material libraries and
    /// textures are looked up next to it once the import finishes.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let bytes = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.model_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.preset = None;
        self.submit(file_name, bytes);
        Ok(())
    }

    /// Start importing a bundled model. Presets carry no material libraries.
    pub fn open_preset(&mut self, name: &str) -> Result<()> {
        let bytes = preset(name)?;
        self.preset = PRESETS.iter().position(|(preset, _)| *preset == name);
        self.submit(name.to_string(), bytes.to_vec());
        Ok(())
    }

    /// Open the preset after the current one, wrapping around.
    pub fn next_preset(&mut self) {
        let next = self.preset.map_or(0, |i| (i + 1) % PRESETS.len());
        let (name, bytes) = PRESETS[next];
        self.preset = Some(next);
        self.submit(name.to_string(), bytes.to_vec());
    }

    fn submit(&mut self, file_name: String, bytes: Vec<u8>) {
        self.status = format!("Loading {}...", file_name);
        self.importer.submit(file_name, bytes);
    }

    pub fn run(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

        let result = self.main_loop();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), terminal::LeaveAlternateScreen, cursor::Show)?;

        result
    }

    fn main_loop(&mut self) -> Result<()> {
        let target_frame_time = Duration::from_millis(1000 / 30); // 30 FPS target

        while self.running {
            let frame_start = Instant::now();

            while event::poll(Duration::from_millis(0))? {
                self.handle_event(event::read()?);
            }

            self.update();
            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) => self.handle_key(code),
            Event::Resize(cols, rows) => self.resize(cols, rows),
            _ => {}
        }
    }

    /// Apply one key press to the scene parameters.
    pub fn handle_key(&mut self, code: KeyCode) {
        let params = &mut self.params;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('a') | KeyCode::Left => params.camera.orbit(-ORBIT_STEP, 0.0),
            KeyCode::Char('d') | KeyCode::Right => params.camera.orbit(ORBIT_STEP, 0.0),
            KeyCode::Char('w') | KeyCode::Up => params.camera.orbit(0.0, ORBIT_STEP),
            KeyCode::Char('s') | KeyCode::Down => params.camera.orbit(0.0, -ORBIT_STEP),
            KeyCode::Char('+') | KeyCode::Char('=') => params.camera.zoom(1.0 / ZOOM_STEP),
            KeyCode::Char('-') => params.camera.zoom(ZOOM_STEP),
            KeyCode::Char('[') => params.transform.rotate(0.0, -ORBIT_STEP, 0.0),
            KeyCode::Char(']') => params.transform.rotate(0.0, ORBIT_STEP, 0.0),
            KeyCode::Char('>') => params.transform.scale[3] *= SCALE_STEP,
            KeyCode::Char('<') => params.transform.scale[3] /= SCALE_STEP,
            KeyCode::Char('g') => params.guides.show_grid = !params.guides.show_grid,
            KeyCode::Char('x') => params.guides.show_axes = !params.guides.show_axes,
            KeyCode::Char('e') => self.export(),
            KeyCode::Char('p') => self.next_preset(),
            _ => {}
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        let (width, height) = viewport_for(cols, rows);
        self.params.projection = self.params.projection.with_viewport(width, height);
    }

    /// Write the displayed model as binary STL to the export path.
    pub fn export(&mut self) {
        if !self.renderer.has_model() {
            self.status = String::from("Nothing to export");
            return;
        }
        let bytes = self.renderer.export_stl();
        self.status = match fs::write(&self.export_path, &bytes) {
            Ok(()) => format!("Exported {} ({} bytes)", self.export_path.display(), bytes.len()),
            Err(err) => {
                log::error!("Export to {} failed: {}", self.export_path.display(), err);
                format!("Export failed: {}", err)
            }
        };
    }

    /// Pick up finished imports and push changed parameters.
    pub fn update(&mut self) {
        if let Some(outcome) = self.importer.poll() {
            self.install(outcome);
        }
        if let Err(err) = self.renderer.apply_parameters(self.params) {
            log::error!("Could not update scene: {}", err);
            self.status = format!("Render error: {}", err);
        }
    }

    /// Block until the pending import (if any) is installed.
    pub fn finish_loading(&mut self) {
        if let Some(outcome) = self.importer.wait() {
            self.install(outcome);
        }
    }

    fn install(&mut self, outcome: ImportOutcome) {
        let model = match outcome.result {
            Ok(model) => model,
            Err(err) => {
                log::error!("Import failed: {}", err);
                self.status = format!("Import failed: {}", err);
                return;
            }
        };
        let summary = summary(&model);
        let libraries = model.material_libraries.clone();

        if let Err(err) = self.renderer.replace_model(model) {
            log::error!("Upload of {} failed: {}", outcome.file_name, err);
            self.status = format!("Could not display {}: {}", outcome.file_name, err);
            return;
        }
        self.status = summary;

        let library = load_material_libraries(&self.model_dir, &libraries);
        let images = available_images(&self.model_dir, &library);
        let requests = self
            .renderer
            .set_material_library(library, images.iter().map(String::as_str));
        for request in requests {
            let path = self.model_dir.join(&request.file_name);
            let decoded = match image::open(&path) {
                Ok(decoded) => decoded.into_rgba8(),
                Err(err) => {
                    log::warn!("Could not decode {}: {}", path.display(), err);
                    continue;
                }
            };
            if let Err(err) = self.renderer.complete_texture(&request, &decoded) {
                log::warn!("Could not upload {}: {}", request.file_name, err);
            }
        }
    }

    fn render(&mut self) -> Result<()> {
        self.renderer.draw_frame();

        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;
        self.renderer.backend().draw(&mut stdout)?;

        let (_, rows) = terminal::size()?;
        queue!(
            stdout,
            cursor::MoveTo(0, rows.saturating_sub(STATUS_ROWS)),
            terminal::Clear(terminal::ClearType::CurrentLine),
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "{} | FPS: {:.1} | WASD/Arrows=Orbit +/-=Zoom []=Spin <>=Scale G=Grid X=Axes P=Preset E=Export Q=Quit",
                self.status, self.fps
            )),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }
}

/// Viewport in pixels for a terminal of `cols` x `rows` cells.
fn viewport_for(cols: u16, rows: u16) -> (u32, u32) {
    let rows = rows.saturating_sub(STATUS_ROWS).max(1);
    (cols.max(1) as u32, rows as u32 * CELL_ASPECT)
}

/// One-line description of an imported model.
pub fn summary(model: &ImportedModel) -> String {
    format!(
        "{} ({:?}): {} triangles, {} vertices, {} submeshes",
        model.file_name,
        model.format,
        model.triangle_count,
        model.vertex_count,
        model.submeshes.len()
    )
}
