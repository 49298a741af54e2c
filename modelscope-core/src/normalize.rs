/// Fit an imported mesh into the unit-scale scene
use nalgebra::Vector3;

use crate::geometry::Mesh;

/// Sizes at or below this are treated as a degenerate (point-like) mesh.
pub const MIN_NORMALIZE_SIZE: f32 = 1e-12;

/// Rescale `mesh` in place so its largest bounding-box dimension is 1.
///
/// X and Z are centered on the origin; Y is anchored at its minimum so the
/// model rests on the floor grid at y = 0. A mesh whose bounding box has no
/// extent is only translated, never divided by zero. Returns the scale
/// divisor that was applied.
pub fn normalize_mesh(mesh: &mut Mesh) -> f32 {
    let Some((min, max)) = mesh.bounds() else {
        return 1.0;
    };

    let origin = Vector3::new((min.x + max.x) / 2.0, min.y, (min.z + max.z) / 2.0);
    let extent = max - min;
    let size = extent.max();

    let divisor = if size.is_finite() && size > MIN_NORMALIZE_SIZE {
        size
    } else {
        log::warn!(
            "Mesh bounding box has no usable extent ({:?}), skipping rescale",
            extent.as_slice()
        );
        1.0
    };

    for p in mesh.vertices.chunks_exact_mut(3) {
        p[0] = (p[0] - origin.x) / divisor;
        p[1] = (p[1] - origin.y) / divisor;
        p[2] = (p[2] - origin.z) / divisor;
    }

    log::debug!("Normalized mesh by factor {}", divisor);
    divisor
}
