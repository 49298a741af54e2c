/// Vector and matrix helpers on top of nalgebra.
///
/// Everything here works on fixed-size stack types so it can run inside the
/// render loop without allocating.
use nalgebra::{Matrix4, Point3, Unit, Vector3, Vector4};

/// Magnitudes below this are treated as zero when normalizing.
pub const NORMALIZE_EPSILON: f32 = 1e-12;

/// Default determinant threshold below which a matrix counts as singular.
pub const DEFAULT_INVERSE_EPSILON: f32 = 1e-12;

/// Normalize a vector, returning the zero vector when its length is ~0.
pub fn normalize_or_zero(v: &Vector3<f32>) -> Vector3<f32> {
    let length = v.norm();
    if length > NORMALIZE_EPSILON {
        v / length
    } else {
        Vector3::zeros()
    }
}

/// Normalize in place and return the length the vector had before.
/// A ~zero vector is left untouched.
pub fn normalize_in_place(v: &mut Vector3<f32>) -> f32 {
    let length = v.norm();
    if length > NORMALIZE_EPSILON {
        *v /= length;
    }
    length
}

/// Face normal of a triangle (unit length, or zero for a degenerate triangle).
pub fn face_normal(v0: &Vector3<f32>, v1: &Vector3<f32>, v2: &Vector3<f32>) -> Vector3<f32> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    normalize_or_zero(&edge1.cross(&edge2))
}

/// `m * T(offset)`: translation applied before `m`.
pub fn translate(m: &Matrix4<f32>, offset: &Vector3<f32>) -> Matrix4<f32> {
    m * Matrix4::new_translation(offset)
}

/// `m * R(axis, angle)`. A zero-length axis leaves `m` unchanged.
pub fn rotate(m: &Matrix4<f32>, angle: f32, axis: &Vector3<f32>) -> Matrix4<f32> {
    match Unit::try_new(*axis, NORMALIZE_EPSILON) {
        Some(axis) => m * Matrix4::from_axis_angle(&axis, angle),
        None => *m,
    }
}

/// `m * S(factors)`.
pub fn scale(m: &Matrix4<f32>, factors: &Vector3<f32>) -> Matrix4<f32> {
    m * Matrix4::new_nonuniform_scaling(factors)
}

/// General 4x4 inverse.
///
/// Returns `None` when `|det| <= epsilon` instead of dividing by a
/// (near-)zero determinant.
pub fn invert(m: &Matrix4<f32>, epsilon: f32) -> Option<Matrix4<f32>> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() <= epsilon {
        return None;
    }
    m.try_inverse()
}

/// OpenGL-convention perspective projection (clip z in [-1, 1]).
///
/// `far = None` builds the infinite-far-plane variant, which keeps depth
/// precision stable instead of approximating infinity with a huge value.
pub fn perspective(fovy: f32, aspect: f32, near: f32, far: Option<f32>) -> Matrix4<f32> {
    let aspect = if aspect.is_finite() && aspect > f32::EPSILON {
        aspect
    } else {
        1.0
    };
    let f = 1.0 / (fovy / 2.0).tan();

    let mut out = Matrix4::zeros();
    out[(0, 0)] = f / aspect;
    out[(1, 1)] = f;
    out[(3, 2)] = -1.0;

    match far {
        Some(far) if far.is_finite() && (far - near).abs() > f32::EPSILON => {
            let nf = 1.0 / (near - far);
            out[(2, 2)] = (far + near) * nf;
            out[(2, 3)] = 2.0 * far * near * nf;
        }
        _ => {
            out[(2, 2)] = -1.0;
            out[(2, 3)] = -2.0 * near;
        }
    }

    out
}

/// Right-handed look-at view matrix. Returns identity when eye and target
/// coincide, since no viewing direction exists.
pub fn look_at(eye: &Point3<f32>, target: &Point3<f32>, up: &Vector3<f32>) -> Matrix4<f32> {
    if (eye - target).norm() <= NORMALIZE_EPSILON {
        return Matrix4::identity();
    }
    Matrix4::look_at_rh(eye, target, up)
}

/// Transform a position (w = 1) without a perspective divide.
pub fn transform_point(m: &Matrix4<f32>, p: &Vector3<f32>) -> Vector3<f32> {
    (m * Vector4::new(p.x, p.y, p.z, 1.0)).xyz()
}

/// Transform a direction (w = 0), e.g. a normal by the normal matrix.
pub fn transform_direction(m: &Matrix4<f32>, v: &Vector3<f32>) -> Vector3<f32> {
    (m * Vector4::new(v.x, v.y, v.z, 0.0)).xyz()
}

/// Column-major copy suitable for uniform upload.
pub fn to_column_array(m: &Matrix4<f32>) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}
