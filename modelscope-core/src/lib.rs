/// ModelScope Core Library - Mesh ingestion and rendering pipeline
///
/// This library provides the platform-independent core of the viewer:
/// OBJ/STL/MTL parsing, mesh normalization and partitioning, transform and
/// camera matrices, the uniform update protocol, the GPU backend contract
/// with the renderer built on it, and binary STL export.

pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod gpu;
pub mod guides;
pub mod import;
pub mod math;
pub mod mtl;
pub mod normalize;
pub mod obj;
pub mod partition;
pub mod projection;
pub mod render;
pub mod stl;
pub mod transform;
pub mod uniforms;

// Re-export commonly used types
pub use config::ViewerConfig;
pub use error::{GpuError, ModelError, ModelResult, ParseError};
pub use export::{export_stl, DEFAULT_EXPORT_FILE_NAME};
pub use geometry::{Mesh, Submesh, Triangle, Vertex};
pub use gpu::{BufferData, GpuBackend, GpuMaterials, GpuMesh, LineDraw, MeshDraw};
pub use import::{import_model, parse_material_library, ImportOutcome, ImportedModel, Importer, ModelFormat};
pub use mtl::{Material, MaterialLibrary};
pub use projection::{OrbitCamera, ProjectionParams};
pub use render::{ModelStats, Renderer, TextureRequest};
pub use transform::TransformState;
pub use uniforms::{
    DirectionalLight, GuideVisibility, MaterialParams, ParameterGroup, PointLight, SceneParameters, ShaderProgram,
    UniformValue, UniformWrite,
};
