/// Viewer configuration
use crate::export::DEFAULT_EXPORT_FILE_NAME;
use crate::math::DEFAULT_INVERSE_EPSILON;
use crate::uniforms::SceneParameters;

/// Start-up state of a viewer. Every field has a default, so a partial
/// configuration file only overrides what it names.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewerConfig {
    pub scene: SceneParameters,
    /// RGBA frame clear color.
    pub clear_color: [f32; 4],
    /// Determinant threshold for the normal-matrix inverse.
    pub inverse_epsilon: f32,
    pub export_file_name: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scene: SceneParameters::default(),
            clear_color: [0.235, 0.235, 0.235, 1.0],
            inverse_epsilon: DEFAULT_INVERSE_EPSILON,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}
