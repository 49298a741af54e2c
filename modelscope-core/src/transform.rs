/// Model transform state and the matrices derived from it
use nalgebra::{Matrix4, Vector3};

use crate::math;

/// Position, per-axis scale and Euler rotation of the single model instance.
///
/// `scale[3]` is an overall multiplier applied on top of the three axis
/// factors. Rotation angles are in degrees around x, y and z.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransformState {
    pub position: [f32; 3],
    pub scale: [f32; 4],
    pub rotation: [f32; 3],
}

impl TransformState {
    pub fn identity() -> Self {
        Self {
            position: [0.0; 3],
            scale: [1.0; 4],
            rotation: [0.0; 3],
        }
    }

    /// Axis scale factors with the overall multiplier folded in.
    pub fn effective_scale(&self) -> Vector3<f32> {
        Vector3::new(self.scale[0], self.scale[1], self.scale[2]) * self.scale[3]
    }

    /// Rotate by delta amounts (in degrees)
    pub fn rotate(&mut self, dx: f32, dy: f32, dz: f32) {
        self.rotation[0] += dx;
        self.rotation[1] += dy;
        self.rotation[2] += dz;
    }

    /// World matrix `T * Rz * Rx * Ry * S`: a vertex is scaled first, then
    /// rotated about Y, X and Z in that order, then translated.
    pub fn model_matrix(&self) -> Matrix4<f32> {
        let [rx, ry, rz] = self.rotation.map(f32::to_radians);

        let m = math::translate(&Matrix4::identity(), &Vector3::from(self.position));
        let m = math::rotate(&m, rz, &Vector3::z());
        let m = math::rotate(&m, rx, &Vector3::x());
        let m = math::rotate(&m, ry, &Vector3::y());
        math::scale(&m, &self.effective_scale())
    }

    /// Scale for the model axis tripod: cancels the model's own scale and
    /// grows with camera distance so the tripod keeps a constant screen size.
    /// Axes with a zero scale factor fall back to 1.
    pub fn axis_guide_scale(&self, camera_distance: f32) -> Vector3<f32> {
        self.effective_scale().map(|s| {
            let inverse = camera_distance / s;
            if inverse.is_finite() {
                inverse
            } else {
                1.0
            }
        })
    }
}

impl Default for TransformState {
    /// The model sits slightly below and in front of the origin.
    fn default() -> Self {
        Self {
            position: [0.0, -0.25, -1.5],
            ..Self::identity()
        }
    }
}

/// `transpose(inverse(m))` for transforming normals under non-uniform scale.
///
/// A singular `m` (for instance a zero scale factor) has no inverse; identity
/// is returned instead and a warning logged.
pub fn normal_matrix(m: &Matrix4<f32>, epsilon: f32) -> Matrix4<f32> {
    match math::invert(m, epsilon) {
        Some(inverse) => inverse.transpose(),
        None => {
            log::warn!("Model matrix is singular, using identity normal matrix");
            Matrix4::identity()
        }
    }
}

/// Create a model-view-projection matrix
pub fn mvp_matrix(model: &Matrix4<f32>, view: &Matrix4<f32>, projection: &Matrix4<f32>) -> Matrix4<f32> {
    projection * view * model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{transform_point, DEFAULT_INVERSE_EPSILON};

    #[test]
    fn test_identity_transform() {
        let matrix = TransformState::identity().model_matrix();
        assert!((matrix - Matrix4::identity()).norm() < 1e-6);
    }

    #[test]
    fn test_rotate_accumulates_degrees() {
        let mut state = TransformState::identity();
        state.rotate(10.0, 20.0, 30.0);
        state.rotate(5.0, 0.0, -30.0);
        assert_eq!(state.rotation, [15.0, 20.0, 0.0]);
    }

    #[test]
    fn test_scale_then_rotate_then_translate() {
        let state = TransformState {
            position: [1.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0, 2.0],
            rotation: [0.0, 90.0, 0.0],
        };
        let m = state.model_matrix();

        let origin = transform_point(&m, &Vector3::zeros());
        assert!((origin - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-4);

        let p = transform_point(&m, &Vector3::new(1.0, 0.0, 0.0));
        assert!((p - Vector3::new(1.0, 0.0, -2.0)).norm() < 1e-4);
    }

    #[test]
    fn test_y_rotation_applied_before_x() {
        // Y by 90 then X by 90: +x goes to -z, then -z goes to +y.
        let state = TransformState {
            rotation: [90.0, 90.0, 0.0],
            ..TransformState::identity()
        };
        let p = transform_point(&state.model_matrix(), &Vector3::x());
        assert!((p - Vector3::y()).norm() < 1e-5);
    }

    #[test]
    fn test_normal_matrix_under_non_uniform_scale() {
        let state = TransformState {
            scale: [2.0, 1.0, 1.0, 1.0],
            ..TransformState::identity()
        };
        let n = normal_matrix(&state.model_matrix(), DEFAULT_INVERSE_EPSILON);
        assert!((n[(0, 0)] - 0.5).abs() < 1e-6);
        assert!((n[(1, 1)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normal_matrix_singular_falls_back() {
        let state = TransformState {
            scale: [1.0, 0.0, 1.0, 1.0],
            ..TransformState::identity()
        };
        let n = normal_matrix(&state.model_matrix(), DEFAULT_INVERSE_EPSILON);
        assert_eq!(n, Matrix4::identity());
    }

    #[test]
    fn test_axis_guide_scale() {
        let state = TransformState {
            scale: [1.0, 2.0, 0.0, 2.0],
            ..TransformState::identity()
        };
        let s = state.axis_guide_scale(2.0);
        assert!((s.x - 1.0).abs() < 1e-6);
        assert!((s.y - 0.5).abs() < 1e-6);
        assert_eq!(s.z, 1.0);
    }

    #[test]
    fn test_mvp_order() {
        let model = Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0));
        let view = Matrix4::new_scaling(2.0);
        let mvp = mvp_matrix(&model, &view, &Matrix4::identity());
        let p = transform_point(&mvp, &Vector3::zeros());
        assert!((p - Vector3::new(2.0, 0.0, 0.0)).norm() < 1e-6);
    }
}
