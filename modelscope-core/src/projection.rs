/// Orbit camera and perspective projection
use nalgebra::{Matrix4, Point3, Vector3, Vector4};

use crate::math;

/// Largest pitch magnitude in degrees. Looking straight up or down would make
/// the view direction parallel to the up vector.
pub const MAX_PITCH_DEGREES: f32 = 89.9;

/// Camera orbiting a focal point. Its position is always derived from
/// yaw/pitch/distance and never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrbitCamera {
    /// Degrees; positive yaw turns the camera clockwise seen from above.
    pub yaw: f32,
    /// Degrees, clamped to +-MAX_PITCH_DEGREES when used.
    pub pitch: f32,
    pub distance: f32,
    pub target: [f32; 3],
}

impl OrbitCamera {
    pub fn new(yaw: f32, pitch: f32, distance: f32) -> Self {
        Self {
            yaw,
            pitch,
            distance,
            target: [0.0; 3],
        }
    }

    pub fn clamped_pitch(&self) -> f32 {
        self.pitch.clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES)
    }

    /// Spherical to cartesian around the target, with yaw negated.
    pub fn position(&self) -> Point3<f32> {
        let yaw = (-self.yaw).to_radians();
        let pitch = self.clamped_pitch().to_radians();
        let offset = Vector3::new(
            pitch.cos() * yaw.sin(),
            pitch.sin(),
            pitch.cos() * yaw.cos(),
        ) * self.distance;
        Point3::from(self.target) + offset
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        math::look_at(&self.position(), &Point3::from(self.target), &Vector3::y())
    }

    /// Orbit by delta amounts (in degrees); pitch stays within its clamp.
    pub fn orbit(&mut self, dyaw: f32, dpitch: f32) {
        self.yaw += dyaw;
        self.pitch = (self.pitch + dpitch).clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES);
    }

    /// Multiply the distance, keeping it strictly positive.
    pub fn zoom(&mut self, factor: f32) {
        let distance = self.distance * factor;
        if distance.is_finite() && distance > f32::EPSILON {
            self.distance = distance;
        }
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(-45.0, 30.0, 2.0)
    }
}

/// Perspective projection settings plus the viewport they apply to.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProjectionParams {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    /// `None` selects the infinite far plane.
    pub far: Option<f32>,
    pub width: u32,
    pub height: u32,
}

impl ProjectionParams {
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        math::perspective(self.fov_degrees.to_radians(), self.aspect(), self.near, self.far)
    }

    /// Same settings with a new viewport size.
    pub fn with_viewport(self, width: u32, height: u32) -> Self {
        Self { width, height, ..self }
    }
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.001,
            far: None,
            width: 800,
            height: 600,
        }
    }
}

/// Project a point through a combined model-view-projection matrix to
/// viewport coordinates. Returns `(x, y, depth)` with depth in NDC, or
/// `None` when the point is behind the camera. The result may lie outside
/// the viewport; rasterizers clip per pixel so partly visible primitives
/// are kept.
pub fn project_to_viewport(
    mvp: &Matrix4<f32>,
    point: &Vector3<f32>,
    width: u32,
    height: u32,
) -> Option<(f32, f32, f32)> {
    let clip = mvp * Vector4::new(point.x, point.y, point.z, 1.0);

    // Prevent division by near-zero (or behind-camera) w
    if clip.w < 1e-6 {
        return None;
    }

    let ndc = clip.xyz() / clip.w;

    // Convert to screen space
    let screen_x = (ndc.x + 1.0) * 0.5 * width as f32;
    let screen_y = (1.0 - ndc.y) * 0.5 * height as f32;

    Some((screen_x, screen_y, ndc.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_position_on_z_axis() {
        let camera = OrbitCamera::new(0.0, 0.0, 5.0);
        let p = camera.position();
        assert!((p.coords - Vector3::new(0.0, 0.0, 5.0)).norm() < 1e-5);
    }

    #[test]
    fn test_yaw_is_negated() {
        let camera = OrbitCamera::new(90.0, 0.0, 1.0);
        let p = camera.position();
        assert!((p.coords - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let camera = OrbitCamera::new(0.0, 120.0, 1.0);
        assert_eq!(camera.clamped_pitch(), MAX_PITCH_DEGREES);
        let view = camera.view_matrix();
        assert!(view.iter().all(|v| v.is_finite()));

        let mut orbiting = OrbitCamera::default();
        orbiting.orbit(10.0, -500.0);
        assert_eq!(orbiting.pitch, -MAX_PITCH_DEGREES);
        assert_eq!(orbiting.yaw, -35.0);
    }

    #[test]
    fn test_position_follows_target() {
        let mut camera = OrbitCamera::new(0.0, 0.0, 2.0);
        camera.target = [1.0, 2.0, 3.0];
        assert!((camera.position().coords - Vector3::new(1.0, 2.0, 5.0)).norm() < 1e-5);
    }

    #[test]
    fn test_view_matrix_moves_target_in_front() {
        let camera = OrbitCamera::default();
        let target = camera.view_matrix() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!((target.z + camera.distance).abs() < 1e-4);
        assert!(target.x.abs() < 1e-5 && target.y.abs() < 1e-5);
    }

    #[test]
    fn test_zoom_stays_positive() {
        let mut camera = OrbitCamera::default();
        camera.zoom(0.5);
        assert!((camera.distance - 1.0).abs() < 1e-6);
        camera.zoom(0.0);
        assert!((camera.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_projection_aspect() {
        let params = ProjectionParams::default().with_viewport(800, 400);
        assert!((params.aspect() - 2.0).abs() < 1e-6);
        let m = params.matrix();
        assert!((m[(1, 1)] / m[(0, 0)] - 2.0).abs() < 1e-5);
        assert_eq!(ProjectionParams::default().with_viewport(10, 0).aspect(), 1.0);
    }

    #[test]
    fn test_project_center_and_behind() {
        let camera = OrbitCamera::new(0.0, 0.0, 5.0);
        let params = ProjectionParams::default();
        let vp = params.matrix() * camera.view_matrix();

        let (x, y, _) = project_to_viewport(&vp, &Vector3::zeros(), 800, 600).unwrap();
        assert!((x - 400.0).abs() < 1e-3);
        assert!((y - 300.0).abs() < 1e-3);

        // Far to the side: off-screen but still projected.
        let (x, _, _) = project_to_viewport(&vp, &Vector3::new(100.0, 0.0, 0.0), 800, 600).unwrap();
        assert!(x > 800.0);

        assert!(project_to_viewport(&vp, &Vector3::new(0.0, 0.0, 10.0), 800, 600).is_none());
    }
}
