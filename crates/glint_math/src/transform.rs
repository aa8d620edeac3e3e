// Transform utilities for Mat4
//
// Extends glam::Mat4 with the bounds math the geometry extractor needs.
// Note: glam::Mat4 already provides transform_point3() and inverse()

use glam::Mat4;
use crate::Aabb;

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform an axis-aligned bounding box.
    ///
    /// Transforms all 8 corners and returns their enclosing box. This stays
    /// correct under rotation, where transforming only min/max does not.
    /// An empty box stays empty.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }

        Aabb::from_points(aabb.corners().into_iter().map(|corner| self.transform_point3(corner)))
    }
}
