/// Model import pipeline and background loading
///
/// Parsing, normalization and partitioning are pure computation, so they run
/// off the render loop. Results come back over a channel and are tagged with
/// a generation; only the newest submission is ever delivered.
use std::any::Any;
use std::panic::{self, UnwindSafe};
use std::sync::mpsc;

use crate::error::{ModelError, ModelResult};
use crate::geometry::Submesh;
use crate::mtl::{parse_mtl, MaterialLibrary};
use crate::normalize::normalize_mesh;
use crate::obj::parse_obj;
use crate::partition::partition_mesh;
use crate::stl::parse_stl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Obj,
    Stl,
}

impl ModelFormat {
    /// Pick the parser from the file extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> ModelResult<Self> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "obj" => Ok(ModelFormat::Obj),
            "stl" => Ok(ModelFormat::Stl),
            _ => Err(ModelError::UnsupportedFormat {
                file: file_name.to_string(),
            }),
        }
    }
}

/// A fully processed model, ready for upload. Never mutated after import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedModel {
    pub file_name: String,
    pub format: ModelFormat,
    pub submeshes: Vec<Submesh>,
    pub triangle_count: usize,
    /// Vertex count of the parsed mesh, before partitioning.
    pub vertex_count: usize,
    /// `mtllib` file names referenced by an OBJ source.
    pub material_libraries: Vec<String>,
    /// Divisor the normalizer applied to the source units.
    pub source_scale: f32,
}

/// Parse, normalize and partition a model file.
pub fn import_model(file_name: &str, bytes: &[u8]) -> ModelResult<ImportedModel> {
    let format = ModelFormat::from_file_name(file_name)?;

    let mut mesh = match format {
        ModelFormat::Obj => {
            let text = std::str::from_utf8(bytes).map_err(|_| ModelError::InvalidText {
                file: file_name.to_string(),
            })?;
            parse_obj(text).map_err(|e| ModelError::parse(file_name, e))?
        }
        ModelFormat::Stl => parse_stl(bytes).map_err(|e| ModelError::parse(file_name, e))?,
    };

    let source_scale = normalize_mesh(&mut mesh);
    let submeshes = partition_mesh(&mesh);

    log::info!(
        "Imported {}: {} vertices, {} triangles in {} submeshes",
        file_name,
        mesh.vertex_count(),
        mesh.triangle_count(),
        submeshes.len()
    );

    Ok(ImportedModel {
        file_name: file_name.to_string(),
        format,
        triangle_count: mesh.triangle_count(),
        vertex_count: mesh.vertex_count(),
        material_libraries: std::mem::take(&mut mesh.material_libraries),
        submeshes,
        source_scale,
    })
}

/// Parse an MTL file, attributing failures to `file_name`.
pub fn parse_material_library(file_name: &str, text: &str) -> ModelResult<MaterialLibrary> {
    parse_mtl(text).map_err(|e| ModelError::parse(file_name, e))
}

/// A finished background import.
#[derive(Debug)]
pub struct ImportOutcome {
    pub generation: u64,
    pub file_name: String,
    pub result: ModelResult<ImportedModel>,
}

/// Runs imports in the background and hands back the newest result.
///
/// On `wasm32` there are no threads; submissions run to completion inside
/// [`Importer::submit`] and are still delivered through [`Importer::poll`].
pub struct Importer {
    sender: mpsc::Sender<ImportOutcome>,
    receiver: mpsc::Receiver<ImportOutcome>,
    latest: u64,
    in_flight: usize,
}

impl Importer {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            latest: 0,
            in_flight: 0,
        }
    }

    /// Generation of the most recent submission (0 before any).
    pub fn latest_generation(&self) -> u64 {
        self.latest
    }

    /// True when no submitted import is still running.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    /// Start importing `bytes`; returns the generation assigned to it.
    pub fn submit(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) -> u64 {
        self.submit_with(file_name, bytes, import_model)
    }

    /// A panicking `import` is reported as [`ModelError::Worker`], so the
    /// submission still completes.
    fn submit_with<F>(&mut self, file_name: impl Into<String>, bytes: Vec<u8>, import: F) -> u64
    where
        F: FnOnce(&str, &[u8]) -> ModelResult<ImportedModel> + Send + UnwindSafe + 'static,
    {
        self.latest += 1;
        self.in_flight += 1;
        let generation = self.latest;
        let file_name = file_name.into();
        log::debug!("Submitting import #{} for {}", generation, file_name);

        let sender = self.sender.clone();
        let job = move || {
            let result = panic::catch_unwind(|| import(&file_name, &bytes)).unwrap_or_else(|payload| {
                Err(ModelError::Worker {
                    file: file_name.clone(),
                    message: panic_message(payload),
                })
            });
            // The importer may have been dropped; nobody wants the result then.
            let _ = sender.send(ImportOutcome {
                generation,
                file_name,
                result,
            });
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let spawned = std::thread::Builder::new()
                .name(format!("model-import-{}", generation))
                .spawn(job);
            if let Err(err) = spawned {
                log::error!("Could not start import thread: {}", err);
                let _ = self.sender.send(ImportOutcome {
                    generation,
                    file_name: String::new(),
                    result: Err(ModelError::Worker {
                        file: format!("import #{}", generation),
                        message: err.to_string(),
                    }),
                });
            }
        }
        #[cfg(target_arch = "wasm32")]
        job();

        generation
    }

    fn accept(&mut self, outcome: ImportOutcome) -> Option<ImportOutcome> {
        self.in_flight = self.in_flight.saturating_sub(1);
        if outcome.generation < self.latest {
            log::debug!(
                "Discarding stale import #{} of {} (latest is #{})",
                outcome.generation,
                outcome.file_name,
                self.latest
            );
            return None;
        }
        Some(outcome)
    }

    /// Non-blocking: the newest finished import, if it is the latest
    /// submission. Stale completions are dropped on the way.
    pub fn poll(&mut self) -> Option<ImportOutcome> {
        let mut newest = None;
        while let Ok(outcome) = self.receiver.try_recv() {
            if let Some(outcome) = self.accept(outcome) {
                newest = Some(outcome);
            }
        }
        newest
    }

    /// Block until the latest submission finishes. Returns `None` when
    /// nothing is pending.
    pub fn wait(&mut self) -> Option<ImportOutcome> {
        while !self.is_idle() {
            let outcome = self.receiver.recv().ok()?;
            if let Some(outcome) = self.accept(outcome) {
                return Some(outcome);
            }
        }
        None
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "import panicked".to_string()
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::new()
    }
}
