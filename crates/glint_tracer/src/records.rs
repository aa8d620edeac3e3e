//! Fixed-layout records uploaded into the kernel's storage buffers.
//!
//! Every field is a 4-byte scalar or an array of them, so `repr(C)` adds no
//! padding and the byte layout is exactly the field order. The tracing
//! kernel reads these as flat `f32` arrays with the strides below.

use bytemuck::{Pod, Zeroable};
use glint_core::SurfaceMaterial;
use glint_math::{Aabb, Vec3};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Material {
    pub albedo: [f32; 3],
    pub emissive: [f32; 3],
    pub emissive_strength: f32,
    pub smoothness: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub material: Material,
}

/// One world-space triangle plus the tight box around its vertices.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub v1: [f32; 3],
    pub v2: [f32; 3],
    pub v3: [f32; 3],
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

/// A mesh's slice of the global triangle array, its world box, and its material.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshRecord {
    pub start_index: i32,
    pub triangle_count: i32,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub material: Material,
}

// Strides the kernel relies on
const _: () = assert!(std::mem::size_of::<Material>() == 32);
const _: () = assert!(std::mem::size_of::<Sphere>() == 48);
const _: () = assert!(std::mem::size_of::<Triangle>() == 60);
const _: () = assert!(std::mem::size_of::<MeshRecord>() == 64);

impl From<&SurfaceMaterial> for Material {
    fn from(material: &SurfaceMaterial) -> Self {
        Self {
            albedo: material.albedo.to_array(),
            emissive: material.emissive.to_array(),
            emissive_strength: material.emissive_strength,
            smoothness: material.smoothness,
        }
    }
}

impl Triangle {
    /// Build a triangle from world-space vertices, computing its bounds.
    pub fn new(v1: Vec3, v2: Vec3, v3: Vec3) -> Self {
        let bounds = Aabb::from_points([v1, v2, v3]);
        Self {
            v1: v1.to_array(),
            v2: v2.to_array(),
            v3: v3.to_array(),
            bounds_min: bounds.min.to_array(),
            bounds_max: bounds.max.to_array(),
        }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [
            Vec3::from_array(self.v1),
            Vec3::from_array(self.v2),
            Vec3::from_array(self.v3),
        ]
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: Vec3::from_array(self.bounds_min),
            max: Vec3::from_array(self.bounds_max),
        }
    }
}

impl MeshRecord {
    /// An empty box is stored as a zero-sized box at the origin so no
    /// infinities reach the GPU.
    pub fn new(start_index: i32, triangle_count: i32, bounds: Aabb, material: Material) -> Self {
        let (min, max) = if bounds.is_empty() {
            (Vec3::ZERO, Vec3::ZERO)
        } else {
            (bounds.min, bounds.max)
        };
        Self {
            start_index,
            triangle_count,
            bounds_min: min.to_array(),
            bounds_max: max.to_array(),
            material,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: Vec3::from_array(self.bounds_min),
            max: Vec3::from_array(self.bounds_max),
        }
    }

    /// Index one past the last triangle of this mesh.
    pub fn end_index(&self) -> i32 {
        self.start_index + self.triangle_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets() {
        // Byte offsets follow declaration order with no padding
        let record = MeshRecord::default();
        let base = &record as *const MeshRecord as usize;
        assert_eq!(&record.triangle_count as *const i32 as usize - base, 4);
        assert_eq!(&record.bounds_min as *const [f32; 3] as usize - base, 8);
        assert_eq!(&record.bounds_max as *const [f32; 3] as usize - base, 20);
        assert_eq!(&record.material as *const Material as usize - base, 32);

        let sphere = Sphere::default();
        let base = &sphere as *const Sphere as usize;
        assert_eq!(&sphere.radius as *const f32 as usize - base, 12);
        assert_eq!(&sphere.material as *const Material as usize - base, 16);
    }

    #[test]
    fn test_triangle_bounds_are_tight() {
        let triangle = Triangle::new(
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-1.0, 3.0, 0.5),
            Vec3::new(0.0, 0.0, 0.5),
        );

        assert_eq!(triangle.bounds_min, [-1.0, -2.0, 0.5]);
        assert_eq!(triangle.bounds_max, [1.0, 3.0, 0.5]);
    }

    #[test]
    fn test_material_from_surface() {
        let surface = SurfaceMaterial::emissive(Vec3::new(1.0, 0.5, 0.25), 8.0);
        let material = Material::from(&surface);

        assert_eq!(material.emissive, [1.0, 0.5, 0.25]);
        assert_eq!(material.emissive_strength, 8.0);
        assert_eq!(material.albedo, [0.0; 3]);
    }

    #[test]
    fn test_empty_mesh_bounds_are_finite() {
        let record = MeshRecord::new(3, 0, Aabb::EMPTY, Material::default());

        assert_eq!(record.bounds_min, [0.0; 3]);
        assert_eq!(record.bounds_max, [0.0; 3]);
        assert_eq!(record.end_index(), 3);
    }

    #[test]
    fn test_bytes_match_field_order() {
        let sphere = Sphere {
            position: [1.0, 2.0, 3.0],
            radius: 4.0,
            material: Material {
                albedo: [5.0, 6.0, 7.0],
                emissive: [8.0, 9.0, 10.0],
                emissive_strength: 11.0,
                smoothness: 12.0,
            },
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&sphere));
        let expected: Vec<f32> = (1..=12).map(|i| i as f32).collect();

        assert_eq!(floats, expected.as_slice());
    }
}
