//! The seam between the staging/accumulation core and a GPU.
//!
//! The core only ever talks to kernels through named parameters, storage
//! buffers, and images. The names in [`param`] are the wire format shared
//! with the kernels and must match them exactly.

use glint_math::{Mat4, Vec4};

use crate::error::TracerResult;

/// The two compute kernels the core drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Produces one noisy radiance sample per pixel
    Trace,
    /// Blends the newest sample into the running average
    Accumulate,
}

/// Kernel parameter names.
pub mod param {
    pub const FRAME_NUMBER: &str = "frameNumber";
    pub const CAMERA_TO_WORLD: &str = "cameraToWorldMatrix";
    pub const NEAR_CLIP_PLANE: &str = "nearClipPlane";
    pub const BOUNCE_LIMIT: &str = "bounceLimit";
    pub const RAYS_PER_PIXEL: &str = "raysPerPixel";

    pub const TRIANGLES: &str = "triangles";
    pub const TRIANGLE_COUNT: &str = "triangleCount";
    pub const MESHES: &str = "meshes";
    pub const MESH_COUNT: &str = "meshCount";
    pub const SPHERES: &str = "spheres";
    pub const SPHERE_COUNT: &str = "sphereCount";

    pub const APPLY_ENVIRONMENT: &str = "applyEnvironmentLighting";
    pub const SKY_COLOR_HORIZON: &str = "SkyColorHorizon";
    pub const SKY_COLOR_ZENITH: &str = "SkyColorZenith";
    pub const GROUND_COLOR: &str = "GroundColor";
    pub const SUN_FOCUS: &str = "SunFocus";
    pub const SUN_INTENSITY: &str = "SunIntensity";
    pub const SUN_DIRECTION: &str = "SunDirection";

    pub const CURRENT_FRAME: &str = "currentFrame";
}

/// A device that can hold scene buffers and images and run the two kernels.
///
/// Buffers and images are owned handles: whoever created one must hand it
/// back through `release_*`. Parameters are sticky, a value set once stays
/// bound until overwritten.
pub trait GpuBackend {
    type Buffer;
    type Image;

    /// Allocate a storage buffer of `len` elements of `stride` bytes each.
    fn create_buffer(&mut self, label: &str, len: usize, stride: usize)
        -> TracerResult<Self::Buffer>;

    /// Upload `bytes` at the start of `buffer`.
    fn write_buffer(&mut self, buffer: &Self::Buffer, bytes: &[u8]);

    fn release_buffer(&mut self, buffer: Self::Buffer);

    /// Capacity in elements.
    fn buffer_len(&self, buffer: &Self::Buffer) -> usize;

    /// Allocate an RGBA float image. Its initial contents are undefined.
    fn create_image(&mut self, label: &str, width: u32, height: u32)
        -> TracerResult<Self::Image>;

    fn release_image(&mut self, image: Self::Image);

    fn image_size(&self, image: &Self::Image) -> (u32, u32);

    /// Copy `src` into `dst`. Both must be the same size.
    fn copy_image(&mut self, src: &Self::Image, dst: &Self::Image) -> TracerResult<()>;

    fn set_int(&mut self, kernel: Kernel, name: &str, value: i32);
    fn set_float(&mut self, kernel: Kernel, name: &str, value: f32);
    fn set_vector(&mut self, kernel: Kernel, name: &str, value: Vec4);
    fn set_matrix(&mut self, kernel: Kernel, name: &str, value: Mat4);
    fn set_buffer(&mut self, kernel: Kernel, name: &str, buffer: &Self::Buffer);

    /// Run the tracing kernel with the currently bound parameters into `target`.
    fn dispatch_trace(&mut self, target: &Self::Image) -> TracerResult<()>;

    /// Run the blend kernel. `previous` is the primary input, `current` is
    /// bound as `currentFrame`, the result lands in `target`.
    fn dispatch_accumulate(
        &mut self,
        previous: &Self::Image,
        current: &Self::Image,
        target: &Self::Image,
    ) -> TracerResult<()>;
}
