/// Scene parameters and the uniform writes each parameter group produces
use nalgebra::Matrix4;

use crate::math;
use crate::projection::{OrbitCamera, ProjectionParams};
use crate::transform::{normal_matrix, TransformState};

/// The two shader programs the renderer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    /// Lit, textured model surfaces.
    Pbr,
    /// Unlit colored line lists (grid and axis guides).
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3([f32; 3]),
    /// Column-major.
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn mat4(m: &Matrix4<f32>) -> Self {
        Self::Mat4(math::to_column_array(m))
    }
}

/// One named uniform assignment on one program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformWrite {
    pub program: ShaderProgram,
    pub name: &'static str,
    pub value: UniformValue,
}

impl UniformWrite {
    fn pbr(name: &'static str, value: UniformValue) -> Self {
        Self {
            program: ShaderProgram::Pbr,
            name,
            value,
        }
    }

    fn lines(name: &'static str, value: UniformValue) -> Self {
        Self {
            program: ShaderProgram::Lines,
            name,
            value,
        }
    }
}

/// Independently updatable slices of the scene state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterGroup {
    Material,
    DirectionalLight,
    PointLight,
    Camera,
    Model,
    Projection,
    Guides,
}

impl ParameterGroup {
    pub const ALL: [ParameterGroup; 7] = [
        ParameterGroup::Material,
        ParameterGroup::DirectionalLight,
        ParameterGroup::PointLight,
        ParameterGroup::Camera,
        ParameterGroup::Model,
        ParameterGroup::Projection,
        ParameterGroup::Guides,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MaterialParams {
    pub albedo: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            albedo: [0.75, 0.75, 0.75],
            metallic: 0.04,
            roughness: 0.2,
            ao: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DirectionalLight {
    pub direction: [f32; 3],
    pub color: [f32; 3],
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: [-0.1, -0.1, -0.1],
            color: [0.9, 0.9, 0.9],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PointLight {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: [-1.0, 0.0, 0.0],
            color: [0.9, 0.9, 0.9],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GuideVisibility {
    pub show_grid: bool,
    pub show_axes: bool,
}

impl Default for GuideVisibility {
    fn default() -> Self {
        Self {
            show_grid: true,
            show_axes: true,
        }
    }
}

/// Everything the UI can edit that affects rendering.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SceneParameters {
    pub material: MaterialParams,
    pub directional_light: DirectionalLight,
    pub point_light: PointLight,
    pub camera: OrbitCamera,
    pub transform: TransformState,
    pub projection: ProjectionParams,
    pub guides: GuideVisibility,
}

impl SceneParameters {
    /// Groups whose values differ between `self` and `other`.
    pub fn changed_groups(&self, other: &SceneParameters) -> Vec<ParameterGroup> {
        ParameterGroup::ALL
            .into_iter()
            .filter(|group| match group {
                ParameterGroup::Material => self.material != other.material,
                ParameterGroup::DirectionalLight => self.directional_light != other.directional_light,
                ParameterGroup::PointLight => self.point_light != other.point_light,
                ParameterGroup::Camera => self.camera != other.camera,
                ParameterGroup::Model => self.transform != other.transform,
                ParameterGroup::Projection => self.projection != other.projection,
                ParameterGroup::Guides => self.guides != other.guides,
            })
            .collect()
    }
}

pub fn material_writes(material: &MaterialParams) -> Vec<UniformWrite> {
    vec![
        UniformWrite::pbr("material.albedo", UniformValue::Vec3(material.albedo)),
        UniformWrite::pbr("material.metallic", UniformValue::Float(material.metallic)),
        UniformWrite::pbr("material.roughness", UniformValue::Float(material.roughness)),
        UniformWrite::pbr("material.ao", UniformValue::Float(material.ao)),
        UniformWrite::pbr("sampler", UniformValue::Int(0)),
    ]
}

pub fn directional_light_writes(light: &DirectionalLight) -> Vec<UniformWrite> {
    vec![
        UniformWrite::pbr("dirLight.direction", UniformValue::Vec3(light.direction)),
        UniformWrite::pbr("dirLight.color", UniformValue::Vec3(light.color)),
    ]
}

pub fn point_light_writes(light: &PointLight) -> Vec<UniformWrite> {
    vec![
        UniformWrite::pbr("pointLight.position", UniformValue::Vec3(light.position)),
        UniformWrite::pbr("pointLight.color", UniformValue::Vec3(light.color)),
    ]
}

/// Camera position and the view matrix, for both programs.
pub fn camera_writes(camera: &OrbitCamera) -> Vec<UniformWrite> {
    let position = camera.position();
    let view = UniformValue::mat4(&camera.view_matrix());
    vec![
        UniformWrite::pbr("camPos", UniformValue::Vec3([position.x, position.y, position.z])),
        UniformWrite::pbr("uViewMatrix", view),
        UniformWrite::lines("uView", view),
    ]
}

/// Model and normal matrices. Line guides receive their model matrix per
/// draw, so only the lit program is written here.
pub fn model_writes(transform: &TransformState, inverse_epsilon: f32) -> Vec<UniformWrite> {
    let model = transform.model_matrix();
    let normal = normal_matrix(&model, inverse_epsilon);
    vec![
        UniformWrite::pbr("uModelMatrix", UniformValue::mat4(&model)),
        UniformWrite::pbr("uNormalMatrix", UniformValue::mat4(&normal)),
    ]
}

pub fn projection_writes(projection: &ProjectionParams) -> Vec<UniformWrite> {
    let matrix = UniformValue::mat4(&projection.matrix());
    vec![
        UniformWrite::pbr("uProjectionMatrix", matrix),
        UniformWrite::lines("uProjection", matrix),
    ]
}

/// The writes for one group. Guide visibility is consulted at draw time and
/// produces no uniform writes.
pub fn group_writes(
    group: ParameterGroup,
    params: &SceneParameters,
    inverse_epsilon: f32,
) -> Vec<UniformWrite> {
    match group {
        ParameterGroup::Material => material_writes(&params.material),
        ParameterGroup::DirectionalLight => directional_light_writes(&params.directional_light),
        ParameterGroup::PointLight => point_light_writes(&params.point_light),
        ParameterGroup::Camera => camera_writes(&params.camera),
        ParameterGroup::Model => model_writes(&params.transform, inverse_epsilon),
        ParameterGroup::Projection => projection_writes(&params.projection),
        ParameterGroup::Guides => Vec::new(),
    }
}

/// The 1x1 RGBA pixel of the fallback texture for a material's base color.
pub fn default_texture_pixel(albedo: [f32; 3]) -> [u8; 4] {
    let [r, g, b] = albedo.map(|c| (255.0 * c.clamp(0.0, 1.0)).floor() as u8);
    [r, g, b, 255]
}

/// Remembers the last parameters pushed to the backend so that only changed
/// groups are written again.
#[derive(Debug, Default)]
pub struct UniformCache {
    pushed: Option<SceneParameters>,
}

impl UniformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups that must be pushed to bring the backend to `params`. Every
    /// group is stale before the first push.
    pub fn stale_groups(&self, params: &SceneParameters) -> Vec<ParameterGroup> {
        match &self.pushed {
            Some(pushed) => pushed.changed_groups(params),
            None => ParameterGroup::ALL.to_vec(),
        }
    }

    pub fn mark_pushed(&mut self, params: SceneParameters) {
        self.pushed = Some(params);
    }

    /// Forget what was pushed, e.g. after the GPU context was recreated.
    pub fn invalidate(&mut self) {
        self.pushed = None;
    }

    pub fn pushed(&self) -> Option<&SceneParameters> {
        self.pushed.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DEFAULT_INVERSE_EPSILON;

    fn names(writes: &[UniformWrite]) -> Vec<(ShaderProgram, &'static str)> {
        writes.iter().map(|w| (w.program, w.name)).collect()
    }

    #[test]
    fn test_default_scene() {
        let params = SceneParameters::default();
        assert_eq!(params.material.albedo, [0.75, 0.75, 0.75]);
        assert_eq!(params.camera.yaw, -45.0);
        assert_eq!(params.camera.pitch, 30.0);
        assert_eq!(params.transform.position, [0.0, -0.25, -1.5]);
        assert_eq!(params.projection.far, None);
        assert!(params.guides.show_grid && params.guides.show_axes);
    }

    #[test]
    fn test_changed_groups_only_lists_edits() {
        let before = SceneParameters::default();
        let mut after = before;
        after.point_light.color = [1.0, 0.0, 0.0];
        after.camera.yaw += 15.0;
        assert_eq!(
            before.changed_groups(&after),
            vec![ParameterGroup::PointLight, ParameterGroup::Camera]
        );
        assert!(before.changed_groups(&before).is_empty());
    }

    #[test]
    fn test_cache_pushes_everything_first() {
        let mut cache = UniformCache::new();
        let params = SceneParameters::default();
        assert_eq!(cache.stale_groups(&params).len(), ParameterGroup::ALL.len());

        cache.mark_pushed(params);
        assert!(cache.stale_groups(&params).is_empty());

        let mut edited = params;
        edited.transform.rotation[1] = 45.0;
        assert_eq!(cache.stale_groups(&edited), vec![ParameterGroup::Model]);

        cache.invalidate();
        assert_eq!(cache.stale_groups(&edited).len(), ParameterGroup::ALL.len());
    }

    #[test]
    fn test_camera_writes_both_programs() {
        let writes = camera_writes(&OrbitCamera::new(0.0, 0.0, 5.0));
        assert_eq!(
            names(&writes),
            vec![
                (ShaderProgram::Pbr, "camPos"),
                (ShaderProgram::Pbr, "uViewMatrix"),
                (ShaderProgram::Lines, "uView"),
            ]
        );
        match writes[0].value {
            UniformValue::Vec3(p) => assert!((p[2] - 5.0).abs() < 1e-5),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_model_writes_include_normal_matrix() {
        let writes = model_writes(&TransformState::identity(), DEFAULT_INVERSE_EPSILON);
        assert_eq!(
            names(&writes),
            vec![(ShaderProgram::Pbr, "uModelMatrix"), (ShaderProgram::Pbr, "uNormalMatrix")]
        );
        let identity = UniformValue::mat4(&Matrix4::identity());
        assert_eq!(writes[1].value, identity);
    }

    #[test]
    fn test_group_writes_are_pure() {
        let params = SceneParameters::default();
        for group in ParameterGroup::ALL {
            let first = group_writes(group, &params, DEFAULT_INVERSE_EPSILON);
            let second = group_writes(group, &params, DEFAULT_INVERSE_EPSILON);
            assert_eq!(first, second);
        }
        assert!(group_writes(ParameterGroup::Guides, &params, DEFAULT_INVERSE_EPSILON).is_empty());
        assert_eq!(
            names(&group_writes(ParameterGroup::Projection, &params, DEFAULT_INVERSE_EPSILON)),
            vec![(ShaderProgram::Pbr, "uProjectionMatrix"), (ShaderProgram::Lines, "uProjection")]
        );
    }

    #[test]
    fn test_default_texture_pixel() {
        assert_eq!(default_texture_pixel([0.75, 0.75, 0.75]), [191, 191, 191, 255]);
        assert_eq!(default_texture_pixel([1.0, 0.0, 2.0]), [255, 0, 255, 255]);
    }
}
