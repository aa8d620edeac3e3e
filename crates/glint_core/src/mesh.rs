//! Mesh geometry representation for the Glint scene registry.
//!
//! Meshes live in their own local space. The tracer's geometry extractor
//! bakes the owning object's transform into every vertex, so nothing here
//! knows about world space or GPU layouts.

use glint_math::{Aabb, Vec3};

/// A triangle mesh: vertex positions plus a flat triangle index list.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Local-space axis-aligned bounding box
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let bounds = Aabb::from_points(positions.iter().copied());
        Self {
            positions,
            indices,
            bounds,
        }
    }

    /// Axis-aligned cube centred on the origin with the given edge length.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h, -h, -h),
            Vec3::new(h, -h, -h),
            Vec3::new(h, h, -h),
            Vec3::new(-h, h, -h),
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, h, h),
            Vec3::new(-h, h, h),
        ];
        // Counter-clockwise when seen from outside
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -Z
            4, 5, 6, 4, 6, 7, // +Z
            0, 1, 5, 0, 5, 4, // -Y
            3, 6, 2, 3, 7, 6, // +Y
            0, 4, 7, 0, 7, 3, // -X
            1, 2, 6, 1, 6, 5, // +X
        ];
        Self::new(positions, indices)
    }

    /// Single quad in the XZ plane facing +Y, centred on the origin.
    pub fn plane(size: f32) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h, 0.0, -h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(h, 0.0, h),
            Vec3::new(-h, 0.0, h),
        ];
        Self::new(positions, vec![0, 2, 1, 0, 3, 2])
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Iterate over triangles as `[v0, v1, v2]` local-space vertex triplets.
    ///
    /// A trailing partial triangle is ignored. Triangles referencing a vertex
    /// outside `positions` are skipped with a warning.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        let vertex_count = self.positions.len();

        self.indices.chunks_exact(3).filter_map(move |chunk| {
            let i0 = chunk[0] as usize;
            let i1 = chunk[1] as usize;
            let i2 = chunk[2] as usize;

            if i0 >= vertex_count || i1 >= vertex_count || i2 >= vertex_count {
                log::warn!(
                    "Invalid triangle indices: [{}, {}, {}], vertex count: {}",
                    i0,
                    i1,
                    i2,
                    vertex_count
                );
                return None;
            }

            Some([self.positions[i0], self.positions[i1], self.positions[i2]])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_creation() {
        let mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.bounds.min, Vec3::ZERO);
        assert_eq!(mesh.bounds.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_bounds_computation() {
        let positions = vec![
            Vec3::new(-1.0, -2.0, -3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let mesh = Mesh::new(positions, vec![0, 1, 2]);

        assert_eq!(mesh.bounds.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(mesh.bounds.max, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = Mesh::new(Vec::new(), Vec::new());

        assert_eq!(mesh.triangle_count(), 0);
        assert!(mesh.bounds.is_empty());
        assert_eq!(mesh.triangles().count(), 0);
    }

    #[test]
    fn test_triangles_skip_invalid_indices() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0), // v0
            Vec3::new(1.0, 0.0, 0.0), // v1
            Vec3::new(0.0, 1.0, 0.0), // v2
            Vec3::new(1.0, 1.0, 0.0), // v3
        ];
        // Second triangle references vertex 9, trailing index is a partial triangle
        let indices = vec![0, 1, 2, 1, 9, 2, 1, 3, 2, 0];

        let mesh = Mesh::new(positions.clone(), indices);
        let triangles: Vec<_> = mesh.triangles().collect();

        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0], [positions[0], positions[1], positions[2]]);
        assert_eq!(triangles[1], [positions[1], positions[3], positions[2]]);
    }

    #[test]
    fn test_cube() {
        let cube = Mesh::cube(2.0);

        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.bounds.min, Vec3::splat(-1.0));
        assert_eq!(cube.bounds.max, Vec3::splat(1.0));
    }

    #[test]
    fn test_plane() {
        let plane = Mesh::plane(4.0);

        assert_eq!(plane.triangle_count(), 2);
        assert_eq!(plane.bounds.extent(), Vec3::new(4.0, 0.0, 4.0));
    }
}
