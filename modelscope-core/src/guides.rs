//! Line geometry for the floor grid and the model axis tripod

const GRID_COLOR: f32 = 0.05;
const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];

/// Length of each tripod arm in model units (before the guide scale).
pub const AXIS_LENGTH: f32 = 0.25;

/// A line list: every consecutive pair of points is one segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSet {
    pub points: Vec<f32>,
    pub colors: Vec<f32>,
}

impl LineSet {
    pub fn vertex_count(&self) -> usize {
        self.points.len() / 3
    }

    pub fn segment_count(&self) -> usize {
        self.vertex_count() / 2
    }

    fn segment(&mut self, from: [f32; 3], to: [f32; 3], color: [f32; 3]) {
        self.points.extend_from_slice(&from);
        self.points.extend_from_slice(&to);
        self.colors.extend_from_slice(&color);
        self.colors.extend_from_slice(&color);
    }

    /// Segment on the y = 0 plane.
    fn floor_segment(&mut self, from: [f32; 2], to: [f32; 2], color: [f32; 3]) {
        self.segment([from[0], 0.0, from[1]], [to[0], 0.0, to[1]], color);
    }
}

/// Floor grid on y = 0.
///
/// The unit square under a normalized model is ruled every 0.1, with its -z
/// edge drawn red (x direction) and its -x edge blue (z direction). Around it
/// sit the eight remaining cells of a 3x3 grid of unit cells.
pub fn grid_lines() -> LineSet {
    let grey = [GRID_COLOR; 3];
    let mut lines = LineSet::default();

    lines.floor_segment([-0.5, -0.5], [0.5, -0.5], RED);
    lines.floor_segment([-0.5, -0.5], [-0.5, 0.5], BLUE);

    for step in 1..=10 {
        let w = -0.5 + step as f32 * 0.1;
        lines.floor_segment([w, -0.5], [w, 0.5], grey);
        lines.floor_segment([-0.5, w], [0.5, w], grey);
    }

    // Far edges of the 3x3 block, then the near edges of every outer cell.
    lines.floor_segment([1.5, -1.5], [1.5, 1.5], grey);
    lines.floor_segment([-1.5, 1.5], [1.5, 1.5], grey);
    for i in 0..3 {
        for j in 0..3 {
            if i == 1 && j == 1 {
                continue;
            }
            let x = -1.5 + i as f32;
            let z = -1.5 + j as f32;
            lines.floor_segment([x, z], [x + 1.0, z], grey);
            lines.floor_segment([x, z], [x, z + 1.0], grey);
        }
    }

    lines
}

/// Red, green and blue arms along the model's local x, y and z axes.
pub fn axis_lines() -> LineSet {
    let mut lines = LineSet::default();
    lines.segment([0.0; 3], [AXIS_LENGTH, 0.0, 0.0], RED);
    lines.segment([0.0; 3], [0.0, AXIS_LENGTH, 0.0], GREEN);
    lines.segment([0.0; 3], [0.0, 0.0, AXIS_LENGTH], BLUE);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_segment_count() {
        let grid = grid_lines();
        // 2 colored edges + 20 inner rules + 2 far edges + 8 cells x 2
        assert_eq!(grid.segment_count(), 40);
        assert_eq!(grid.points.len(), grid.colors.len());
    }

    #[test]
    fn test_grid_lies_on_floor() {
        let grid = grid_lines();
        for p in grid.points.chunks_exact(3) {
            assert_eq!(p[1], 0.0);
            assert!(p[0].abs() <= 1.5 + 1e-6 && p[2].abs() <= 1.5 + 1e-6);
        }
        assert_eq!(&grid.colors[0..3], &RED);
        assert_eq!(&grid.colors[6..9], &BLUE);
    }

    #[test]
    fn test_axis_tripod() {
        let axes = axis_lines();
        assert_eq!(axes.vertex_count(), 6);
        assert_eq!(&axes.points[3..6], &[AXIS_LENGTH, 0.0, 0.0]);
        assert_eq!(&axes.colors[6..9], &GREEN);
    }
}
