/// Error types for model import, material parsing and GPU upload
use thiserror::Error;

/// Where in a source file a parse failure happened, plus what went wrong.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Text formats (OBJ, MTL, ASCII STL) report the 1-based line number.
    #[error("line {line}: {message}")]
    Line { line: usize, message: String },
    /// Binary STL reports the byte offset of the record being read.
    #[error("byte offset {offset}: {message}")]
    Offset { offset: usize, message: String },
    /// Failures that are not tied to a single line, e.g. a truncated facet list.
    #[error("{0}")]
    Structure(String),
}

impl ParseError {
    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        ParseError::Line {
            line,
            message: message.into(),
        }
    }

    pub fn at_offset(offset: usize, message: impl Into<String>) -> Self {
        ParseError::Offset {
            offset,
            message: message.into(),
        }
    }
}

/// Errors surfaced to the application when an import or upload fails.
///
/// Every variant is recoverable: the caller keeps the last good model and
/// the user can retry with another file.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    #[error("unsupported model format for {file} (expected .obj or .stl)")]
    UnsupportedFormat { file: String },

    #[error("{file} is not valid UTF-8 text")]
    InvalidText { file: String },

    #[error("GPU upload failed: {0}")]
    Gpu(#[from] GpuError),

    #[error("background import of {file} failed: {message}")]
    Worker { file: String, message: String },
}

impl ModelError {
    pub fn parse(file: impl Into<String>, source: ParseError) -> Self {
        ModelError::Parse {
            file: file.into(),
            source,
        }
    }
}

/// Failures reported by a GPU backend. Context loss and resource exhaustion
/// are fatal for the renderer that owns the backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpuError {
    #[error("failed to create {0}")]
    ResourceCreation(&'static str),
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
    #[error("program link failed: {0}")]
    ProgramLink(String),
    #[error("texture upload failed: {0}")]
    TextureUpload(String),
    #[error("rendering context lost")]
    ContextLost,
}

/// Result alias for import operations.
pub type ModelResult<T> = Result<T, ModelError>;
