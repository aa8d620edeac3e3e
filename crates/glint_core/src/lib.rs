//! Glint Core - authoring-side scene registry for the Glint path tracer.
//!
//! This crate provides:
//!
//! - **Scene registry types**: `Scene`, `MeshObject`, `SphereObject`, `Camera`, `Mesh`
//! - **Scene descriptions**: JSON scene files with built-in, inline, or OBJ meshes
//!
//! # Example
//!
//! ```ignore
//! use glint_core::load_scene;
//!
//! let scene = load_scene("scene.json")?;
//! println!("Loaded {} meshes, {} spheres",
//!     scene.meshes.len(),
//!     scene.spheres.len());
//! ```

pub mod camera;
pub mod description;
pub mod mesh;
pub mod scene;

// Re-export commonly used types
pub use camera::{Camera, CameraKind};
pub use description::{load_obj, load_scene, SceneDescription, SceneError, SceneResult};
pub use mesh::Mesh;
pub use scene::{MeshObject, Scene, SphereObject, SurfaceMaterial, Transform};
