//! JSON scene descriptions.
//!
//! A small authoring format for tooling and tests: a camera, spheres, and
//! meshes that are either built in, inline, or loaded from OBJ files.
//!
//! ```json
//! {
//!   "name": "cornell",
//!   "camera": { "position": [0, 1, 4], "target": [0, 1, 0], "fov_y_degrees": 50 },
//!   "spheres": [
//!     { "center": [0, 1, 0], "radius": 0.5, "material": { "albedo": [1, 0.2, 0.2] } }
//!   ],
//!   "meshes": [
//!     { "name": "floor", "source": { "type": "plane", "size": 10 } },
//!     { "name": "bunny", "source": { "type": "obj", "path": "bunny.obj" } }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glint_math::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{Camera, CameraKind};
use crate::mesh::Mesh;
use crate::scene::{MeshObject, Scene, SphereObject, SurfaceMaterial, Transform};

/// Errors that can occur while loading a scene description.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scene description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to load OBJ file {path}: {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("Scene has no camera")]
    MissingCamera,
}

/// Result type for scene loading operations.
pub type SceneResult<T> = Result<T, SceneError>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub name: String,
    pub camera: Option<CameraDescription>,
    pub spheres: Vec<SphereDescription>,
    pub meshes: Vec<MeshDescription>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDescription {
    pub name: String,
    pub preview: bool,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            preview: false,
            position: [0.0, 1.0, 5.0],
            target: [0.0, 0.0, 0.0],
            fov_y_degrees: 60.0,
            near: 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescription {
    pub albedo: [f32; 3],
    pub emissive: [f32; 3],
    pub emissive_strength: f32,
    pub smoothness: f32,
}

impl Default for MaterialDescription {
    fn default() -> Self {
        Self {
            albedo: [0.5, 0.5, 0.5],
            emissive: [0.0, 0.0, 0.0],
            emissive_strength: 0.0,
            smoothness: 0.0,
        }
    }
}

/// Translation, Euler rotation in degrees (XYZ order), and scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDescription {
    pub translation: [f32; 3],
    pub rotation_degrees: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for TransformDescription {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation_degrees: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SphereDescription {
    #[serde(default)]
    pub name: String,
    pub center: [f32; 3],
    pub radius: f32,
    #[serde(default)]
    pub material: MaterialDescription,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshDescription {
    #[serde(default)]
    pub name: String,
    pub source: MeshSource,
    #[serde(default)]
    pub transform: TransformDescription,
    #[serde(default)]
    pub material: MaterialDescription,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshSource {
    Cube { size: f32 },
    Plane { size: f32 },
    /// Path relative to the scene file's directory
    Obj { path: PathBuf },
    Inline { positions: Vec<[f32; 3]>, indices: Vec<u32> },
}

impl From<&MaterialDescription> for SurfaceMaterial {
    fn from(desc: &MaterialDescription) -> Self {
        SurfaceMaterial {
            albedo: Vec3::from_array(desc.albedo),
            emissive: Vec3::from_array(desc.emissive),
            emissive_strength: desc.emissive_strength.max(0.0),
            smoothness: desc.smoothness.clamp(0.0, 1.0),
        }
    }
}

impl From<&TransformDescription> for Transform {
    fn from(desc: &TransformDescription) -> Self {
        let [rx, ry, rz] = desc.rotation_degrees;
        Transform {
            translation: Vec3::from_array(desc.translation),
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                rx.to_radians(),
                ry.to_radians(),
                rz.to_radians(),
            ),
            scale: Vec3::from_array(desc.scale),
        }
    }
}

impl From<&CameraDescription> for Camera {
    fn from(desc: &CameraDescription) -> Self {
        let kind = if desc.preview {
            CameraKind::Preview
        } else {
            CameraKind::Primary
        };
        let mut camera = Camera::new(desc.name.clone(), kind)
            .looking_at(Vec3::from_array(desc.position), Vec3::from_array(desc.target))
            .with_fov(desc.fov_y_degrees);
        camera.near = desc.near;
        camera
    }
}

impl SceneDescription {
    pub fn from_json_str(json: &str) -> SceneResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a scene, resolving OBJ paths against `base_dir`.
    pub fn build(&self, base_dir: &Path) -> SceneResult<Scene> {
        let mut scene = Scene::new(self.name.clone());

        if let Some(camera) = &self.camera {
            scene.add_camera(Camera::from(camera));
        }

        for (i, sphere) in self.spheres.iter().enumerate() {
            let name = if sphere.name.is_empty() {
                format!("sphere{}", i)
            } else {
                sphere.name.clone()
            };
            scene.add_sphere(
                SphereObject::new(name, Vec3::from_array(sphere.center), sphere.radius)
                    .with_material(SurfaceMaterial::from(&sphere.material)),
            );
        }

        for (i, desc) in self.meshes.iter().enumerate() {
            let name = if desc.name.is_empty() {
                format!("mesh{}", i)
            } else {
                desc.name.clone()
            };
            let mesh = match &desc.source {
                MeshSource::Cube { size } => Some(Mesh::cube(*size)),
                MeshSource::Plane { size } => Some(Mesh::plane(*size)),
                MeshSource::Obj { path } => load_obj(&base_dir.join(path))?,
                MeshSource::Inline { positions, indices } => Some(Mesh::new(
                    positions.iter().copied().map(Vec3::from_array).collect(),
                    indices.clone(),
                )),
            };

            scene.add_mesh(MeshObject {
                name,
                mesh: mesh.map(Arc::new),
                transform: Transform::from(&desc.transform),
                material: SurfaceMaterial::from(&desc.material),
            });
        }

        log::info!(
            "Built scene '{}': {} meshes ({} triangles), {} spheres",
            scene.name,
            scene.meshes.len(),
            scene.total_triangle_count(),
            scene.spheres.len()
        );

        Ok(scene)
    }
}

/// Load a JSON scene description from disk and build it.
pub fn load_scene<P: AsRef<Path>>(path: P) -> SceneResult<Scene> {
    let path = path.as_ref();
    log::info!("Loading scene from: {:?}", path);

    let json = std::fs::read_to_string(path)?;
    let description = SceneDescription::from_json_str(&json)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    description.build(base_dir)
}

/// Load every model of an OBJ file into a single mesh.
///
/// A file without models yields `None`: the object renders as nothing.
pub fn load_obj(path: &Path) -> SceneResult<Option<Mesh>> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
    )
    .map_err(|source| SceneError::Obj {
        path: path.to_path_buf(),
        source,
    })?;

    if models.is_empty() {
        log::warn!("No models found in OBJ file {:?}", path);
        return Ok(None);
    }

    let mut positions = Vec::new();
    let mut indices = Vec::new();

    for model in &models {
        let base = positions.len() as u32;
        positions.extend(
            model
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2])),
        );
        indices.extend(model.mesh.indices.iter().map(|i| base + i));
    }

    log::info!(
        "Loaded {} vertices, {} triangles from {:?}",
        positions.len(),
        indices.len() / 3,
        path
    );

    Ok(Some(Mesh::new(positions, indices)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "name": "test",
        "camera": { "position": [0, 1, 4], "target": [0, 1, 0], "fov_y_degrees": 50 },
        "spheres": [
            { "center": [0, 1, 0], "radius": 0.5, "material": { "albedo": [1, 0.2, 0.2], "smoothness": 3 } },
            { "name": "light", "center": [0, 5, 0], "radius": 1,
              "material": { "emissive": [1, 1, 1], "emissive_strength": 4 } }
        ],
        "meshes": [
            { "name": "floor", "source": { "type": "plane", "size": 10 } },
            { "source": { "type": "inline", "positions": [[0,0,0],[1,0,0],[0,1,0]], "indices": [0,1,2] },
              "transform": { "translation": [0, 0, -2], "rotation_degrees": [0, 90, 0] } }
        ]
    }"#;

    #[test]
    fn test_parse_and_build() {
        let description = SceneDescription::from_json_str(SCENE).unwrap();
        let scene = description.build(Path::new(".")).unwrap();

        assert_eq!(scene.name, "test");
        assert_eq!(scene.spheres.len(), 2);
        assert_eq!(scene.meshes.len(), 2);
        assert_eq!(scene.total_triangle_count(), 3);

        assert_eq!(scene.spheres[0].name, "sphere0");
        assert_eq!(scene.spheres[0].material.smoothness, 1.0);
        assert!(scene.spheres[1].material.emissive_strength > 0.0);
        assert_eq!(scene.meshes[1].name, "mesh1");

        let camera = scene.active_camera().unwrap();
        assert_eq!(camera.fov_y_degrees, 50.0);
        assert!((camera.position() - Vec3::new(0.0, 1.0, 4.0)).length() < 1e-5);
    }

    #[test]
    fn test_euler_rotation_in_degrees() {
        let desc = TransformDescription {
            rotation_degrees: [0.0, 90.0, 0.0],
            ..Default::default()
        };
        let transform = Transform::from(&desc);
        let rotated = transform.rotation * Vec3::X;

        assert!((rotated - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_empty_description() {
        let description = SceneDescription::from_json_str("{}").unwrap();
        let scene = description.build(Path::new(".")).unwrap();

        assert!(scene.meshes.is_empty());
        assert!(scene.active_camera().is_none());
    }

    #[test]
    fn test_invalid_json() {
        let result = SceneDescription::from_json_str("{ \"spheres\": 3 }");
        assert!(matches!(result, Err(SceneError::Json(_))));
    }

    #[test]
    fn test_missing_obj_is_error() {
        let result = load_obj(Path::new("definitely/not/here.obj"));
        assert!(matches!(result, Err(SceneError::Obj { .. })));
    }
}
