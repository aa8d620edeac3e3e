//! Scene registry types for Glint.
//!
//! A `Scene` is an explicit, ordered collection of authored objects. The
//! tracer never walks a scene graph looking for objects of some type; it
//! receives these collections and enumerates them in insertion order.

use std::sync::Arc;

use glint_math::{Aabb, Mat4, Mat4Ext, Quat, Vec3};

use crate::camera::{Camera, CameraKind};
use crate::mesh::Mesh;

/// Surface shading parameters as authored on an object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceMaterial {
    /// Diffuse/albedo color (RGB, nominally 0-1, not enforced)
    pub albedo: Vec3,

    /// Emissive color (RGB)
    pub emissive: Vec3,

    /// Multiplier applied to `emissive` (non-negative, unbounded)
    pub emissive_strength: f32,

    /// Smoothness in [0, 1]
    pub smoothness: f32,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self {
            albedo: Vec3::splat(0.5),
            emissive: Vec3::ZERO,
            emissive_strength: 0.0,
            smoothness: 0.0,
        }
    }
}

impl SurfaceMaterial {
    /// Create a plain diffuse material.
    pub fn diffuse(albedo: Vec3) -> Self {
        Self {
            albedo,
            ..Default::default()
        }
    }

    /// Create a light-emitting material.
    pub fn emissive(color: Vec3, strength: f32) -> Self {
        Self {
            albedo: Vec3::ZERO,
            emissive: color,
            emissive_strength: strength.max(0.0),
            smoothness: 0.0,
        }
    }

    /// Set smoothness, clamped to [0, 1].
    pub fn with_smoothness(mut self, smoothness: f32) -> Self {
        self.smoothness = smoothness.clamp(0.0, 1.0);
        self
    }
}

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation
    pub translation: Vec3,

    /// Rotation (as quaternion)
    pub rotation: Quat,

    /// Scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Translation plus a uniform scale.
    pub fn from_translation_scale(translation: Vec3, scale: f32) -> Self {
        Self {
            translation,
            scale: Vec3::splat(scale),
            ..Default::default()
        }
    }

    /// Create a new transform from a 4x4 matrix.
    ///
    /// Decomposes the matrix into translation, rotation, and scale.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A mesh placed in the scene.
#[derive(Clone, Debug)]
pub struct MeshObject {
    pub name: String,

    /// Local-space geometry. `None` renders as zero triangles.
    pub mesh: Option<Arc<Mesh>>,

    pub transform: Transform,

    /// Shared by every triangle of the mesh
    pub material: SurfaceMaterial,
}

impl MeshObject {
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            mesh: Some(mesh),
            transform,
            material: SurfaceMaterial::default(),
        }
    }

    /// Set the material for this object.
    pub fn with_material(mut self, material: SurfaceMaterial) -> Self {
        self.material = material;
        self
    }

    /// Get the 4x4 model matrix for this object.
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.as_ref().map_or(0, |mesh| mesh.triangle_count())
    }

    /// World-space bounds: the local box's 8 corners transformed and re-enclosed.
    pub fn world_bounds(&self) -> Aabb {
        match &self.mesh {
            Some(mesh) => self.model_matrix().transform_aabb(&mesh.bounds),
            None => Aabb::EMPTY,
        }
    }
}

/// A sphere placed in the scene.
///
/// The radius is half of the X scale; a non-uniform scale is not
/// represented, only the X axis is read.
#[derive(Clone, Debug)]
pub struct SphereObject {
    pub name: String,
    pub transform: Transform,
    pub material: SurfaceMaterial,
}

impl SphereObject {
    pub fn new(name: impl Into<String>, center: Vec3, radius: f32) -> Self {
        Self {
            name: name.into(),
            transform: Transform::from_translation_scale(center, radius * 2.0),
            material: SurfaceMaterial::default(),
        }
    }

    /// Set the material for this object.
    pub fn with_material(mut self, material: SurfaceMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn center(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn radius(&self) -> f32 {
        self.transform.scale.x * 0.5
    }
}

/// A complete scene: meshes, spheres, and cameras in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub meshes: Vec<MeshObject>,
    pub spheres: Vec<SphereObject>,
    pub cameras: Vec<Camera>,

    /// Scene name (usually from filename)
    pub name: String,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a mesh object and return its index.
    pub fn add_mesh(&mut self, object: MeshObject) -> usize {
        self.meshes.push(object);
        self.meshes.len() - 1
    }

    /// Add a sphere object and return its index.
    pub fn add_sphere(&mut self, object: SphereObject) -> usize {
        self.spheres.push(object);
        self.spheres.len() - 1
    }

    pub fn add_camera(&mut self, camera: Camera) -> usize {
        self.cameras.push(camera);
        self.cameras.len() - 1
    }

    /// First primary camera, falling back to the first camera of any kind.
    pub fn active_camera(&self) -> Option<&Camera> {
        self.cameras
            .iter()
            .find(|camera| camera.kind == CameraKind::Primary)
            .or_else(|| self.cameras.first())
    }

    /// Get total triangle count across all mesh objects.
    pub fn total_triangle_count(&self) -> usize {
        self.meshes.iter().map(MeshObject::triangle_count).sum()
    }
}
