//! Glint tracer: a progressive GPU path tracer's staging and accumulation core.
//!
//! Scene objects from `glint_core` are flattened into fixed-layout records
//! ([`records`]), uploaded into GPU buffers that are only reallocated when
//! their element count changes ([`buffers`]), and traced once per frame
//! with parameters derived from the camera ([`params`]). While the view is
//! unchanged, frames are blended into a running average ([`accumulation`]).
//!
//! The GPU itself sits behind [`GpuBackend`]: [`WgpuBackend`] runs the
//! WGSL kernels, [`HeadlessBackend`] keeps everything in host memory.

pub mod accumulation;
pub mod backend;
pub mod buffers;
pub mod error;
pub mod extract;
pub mod headless;
pub mod params;
pub mod raytracer;
pub mod records;
pub mod wgpu_backend;

pub use accumulation::{blend, AccumulationController};
pub use backend::{param, GpuBackend, Kernel};
pub use buffers::SceneBufferManager;
pub use error::{TracerError, TracerResult};
pub use extract::{extract_meshes, extract_spheres, ExtractedMeshes};
pub use headless::HeadlessBackend;
pub use params::{Environment, FrameParameters, NearPlane, TraceLimits, TracerSettings};
pub use raytracer::{FrameOutcome, Raytracer};
pub use records::{Material, MeshRecord, Sphere, Triangle};
pub use wgpu_backend::{GpuBuffer, GpuImage, WgpuBackend};
