// Re-export glam for convenience
pub use glam::*;

// Glint math types
mod aabb;
mod transform;

pub use aabb::Aabb;
pub use transform::Mat4Ext;
