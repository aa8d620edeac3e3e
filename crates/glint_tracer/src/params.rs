//! Per-frame tracing parameters and the settings they come from.

use glint_core::Camera;
use glint_math::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::backend::{param, GpuBackend, Kernel};

pub const MIN_TRACE_LIMIT: u32 = 1;
pub const MAX_TRACE_LIMIT: u32 = 100;

/// Bounce and ray-count limits, always inside [1, 100].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceLimits {
    bounce_limit: u32,
    rays_per_pixel: u32,
}

impl TraceLimits {
    /// Clamp both values into range, warning about any that were changed.
    pub fn clamped(bounce_limit: u32, rays_per_pixel: u32) -> Self {
        Self {
            bounce_limit: clamp_limit("bounce_limit", bounce_limit),
            rays_per_pixel: clamp_limit("rays_per_pixel", rays_per_pixel),
        }
    }

    pub fn bounce_limit(&self) -> u32 {
        self.bounce_limit
    }

    pub fn rays_per_pixel(&self) -> u32 {
        self.rays_per_pixel
    }
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self {
            bounce_limit: 10,
            rays_per_pixel: 10,
        }
    }
}

fn clamp_limit(name: &str, value: u32) -> u32 {
    let clamped = value.clamp(MIN_TRACE_LIMIT, MAX_TRACE_LIMIT);
    if clamped != value {
        log::warn!(
            "{} = {} is outside [{}, {}], using {}",
            name,
            value,
            MIN_TRACE_LIMIT,
            MAX_TRACE_LIMIT,
            clamped
        );
    }
    clamped
}

/// Analytic sky and sun lighting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub enabled: bool,
    pub sky_color_horizon: Vec3,
    pub sky_color_zenith: Vec3,
    pub ground_color: Vec3,
    /// Sharpness of the sun highlight
    pub sun_focus: f32,
    pub sun_intensity: f32,
    /// Direction the sunlight travels, in world space
    pub sun_direction: Vec3,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            enabled: true,
            sky_color_horizon: Vec3::splat(0.5),
            sky_color_zenith: Vec3::splat(0.5),
            ground_color: Vec3::splat(0.5),
            sun_focus: 1.0,
            sun_intensity: 1.0,
            sun_direction: Vec3::new(0.0, -1.0, -0.3),
        }
    }
}

impl Environment {
    /// Push the lighting toggle, and the sky/sun values when they apply.
    ///
    /// With `force` the colours are pushed even while disabled, so a later
    /// enable has up-to-date values without waiting for the next refresh.
    pub fn bind<B: GpuBackend>(&self, backend: &mut B, force: bool) {
        backend.set_int(Kernel::Trace, param::APPLY_ENVIRONMENT, self.enabled as i32);

        if !(self.enabled || force) {
            return;
        }

        backend.set_vector(Kernel::Trace, param::SKY_COLOR_HORIZON, color(self.sky_color_horizon));
        backend.set_vector(Kernel::Trace, param::SKY_COLOR_ZENITH, color(self.sky_color_zenith));
        backend.set_vector(Kernel::Trace, param::GROUND_COLOR, color(self.ground_color));
        backend.set_float(Kernel::Trace, param::SUN_FOCUS, self.sun_focus);
        backend.set_float(Kernel::Trace, param::SUN_INTENSITY, self.sun_intensity);
        backend.set_vector(
            Kernel::Trace,
            param::SUN_DIRECTION,
            self.sun_direction.normalize_or(Vec3::NEG_Y).extend(0.0),
        );
    }
}

fn color(rgb: Vec3) -> Vec4 {
    rgb.extend(1.0)
}

/// Everything a caller can configure on the tracer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerSettings {
    /// Maximum bounces per path, in [1, 100]
    pub bounce_limit: u32,
    /// Samples traced per pixel per frame, in [1, 100]
    pub rays_per_pixel: u32,
    /// Blend frames into a running average while the view holds still
    pub accumulate: bool,
    /// Trace for preview cameras too; when off they pass the source through
    pub use_on_preview_cameras: bool,
    pub environment: Environment,
}

impl Default for TracerSettings {
    fn default() -> Self {
        let limits = TraceLimits::default();
        Self {
            bounce_limit: limits.bounce_limit(),
            rays_per_pixel: limits.rays_per_pixel(),
            accumulate: true,
            use_on_preview_cameras: true,
            environment: Environment::default(),
        }
    }
}

impl TracerSettings {
    pub fn limits(&self) -> TraceLimits {
        TraceLimits::clamped(self.bounce_limit, self.rays_per_pixel)
    }

    /// Settings with out-of-range limits pulled back into range.
    pub fn normalized(mut self) -> Self {
        let limits = self.limits();
        self.bounce_limit = limits.bounce_limit();
        self.rays_per_pixel = limits.rays_per_pixel();
        self
    }
}

/// The camera's near clip plane as the kernel sees it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearPlane {
    pub half_width: f32,
    pub half_height: f32,
    pub distance: f32,
}

impl NearPlane {
    pub fn from_camera(camera: &Camera) -> Self {
        let half_height = camera.near * (camera.fov_y_degrees.to_radians() * 0.5).tan();
        Self {
            half_width: half_height * camera.aspect,
            half_height,
            distance: camera.near,
        }
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.half_width, self.half_height, self.distance, 0.0)
    }
}

/// One frame's worth of tracing parameters.
pub struct FrameParameters<'a> {
    pub camera: &'a Camera,
    pub frame_number: u32,
    pub limits: TraceLimits,
    pub environment: &'a Environment,
}

impl FrameParameters<'_> {
    /// Push every per-frame parameter to the tracing kernel.
    pub fn bind<B: GpuBackend>(&self, backend: &mut B) {
        backend.set_matrix(
            Kernel::Trace,
            param::CAMERA_TO_WORLD,
            self.camera.camera_to_world(),
        );
        backend.set_vector(
            Kernel::Trace,
            param::NEAR_CLIP_PLANE,
            NearPlane::from_camera(self.camera).to_vec4(),
        );
        backend.set_int(Kernel::Trace, param::BOUNCE_LIMIT, self.limits.bounce_limit() as i32);
        backend.set_int(Kernel::Trace, param::RAYS_PER_PIXEL, self.limits.rays_per_pixel() as i32);
        backend.set_int(Kernel::Trace, param::FRAME_NUMBER, self.frame_number as i32);
        self.environment.bind(backend, false);
    }
}
