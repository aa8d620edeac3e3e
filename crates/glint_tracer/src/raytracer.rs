//! Frame orchestration.
//!
//! [`Raytracer`] is driven once per produced frame by whoever owns the
//! render loop. Geometry is staged only when the caller asks for it with
//! [`Raytracer::refresh_geometry`]; parameters are bound on every frame.

use glint_core::{Camera, Scene};

use crate::accumulation::AccumulationController;
use crate::backend::GpuBackend;
use crate::buffers::SceneBufferManager;
use crate::error::{TracerError, TracerResult};
use crate::extract::{extract_meshes, extract_spheres};
use crate::params::{FrameParameters, TracerSettings};

/// What a call to [`Raytracer::render_frame`] wrote to the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Source copied unchanged (preview camera with tracing disabled)
    Passthrough,
    /// One noisy sample, no temporal blend
    SingleSample,
    /// The running average of `samples` frames
    Accumulated { samples: u32 },
}

/// Progressive path tracer state: scene buffers, settings, accumulation.
pub struct Raytracer<B: GpuBackend> {
    settings: TracerSettings,
    buffers: SceneBufferManager<B>,
    accumulation: AccumulationController<B>,
}

impl<B: GpuBackend> Raytracer<B> {
    pub fn new(settings: TracerSettings) -> Self {
        Self {
            settings: settings.normalized(),
            buffers: SceneBufferManager::new(),
            accumulation: AccumulationController::new(),
        }
    }

    pub fn settings(&self) -> &TracerSettings {
        &self.settings
    }

    /// Replace the settings. The running average restarts since the old
    /// samples were traced with different parameters.
    pub fn set_settings(&mut self, backend: &mut B, settings: TracerSettings) {
        self.settings = settings.normalized();
        self.settings.environment.bind(backend, true);
        self.accumulation.reset();
    }

    /// Number of samples in the current running average.
    pub fn frame_number(&self) -> u32 {
        self.accumulation.frame_number()
    }

    pub fn reset_frame_counter(&mut self) {
        self.accumulation.reset();
    }

    /// Re-extract every mesh and sphere of `scene` and upload the results.
    ///
    /// The running average restarts even when the upload fails. A failed
    /// upload drops all scene buffers, so later frames trace an empty scene
    /// until a refresh succeeds.
    pub fn refresh_geometry(&mut self, backend: &mut B, scene: &Scene) -> TracerResult<()> {
        let extracted = extract_meshes(&scene.meshes);
        let spheres = extract_spheres(&scene.spheres);

        self.accumulation.reset();
        self.buffers
            .sync_scene(backend, &extracted.triangles, &extracted.meshes, &spheres)?;

        log::info!(
            "Geometry refreshed: {} triangles in {} meshes, {} spheres",
            extracted.triangles.len(),
            extracted.meshes.len(),
            spheres.len()
        );
        Ok(())
    }

    /// Re-push the sky and sun parameters, even while the environment is off.
    pub fn refresh_environment(&mut self, backend: &mut B) {
        self.settings.environment.bind(backend, true);
    }

    /// Produce one frame for `camera` into `destination`.
    ///
    /// `source` is what the host would display without tracing; it is only
    /// read when a preview camera passes through. On error nothing has been
    /// written to `destination`.
    pub fn render_frame(
        &mut self,
        backend: &mut B,
        camera: &Camera,
        source: &B::Image,
        destination: &B::Image,
    ) -> TracerResult<FrameOutcome> {
        if camera.is_preview() && !self.settings.use_on_preview_cameras {
            backend.copy_image(source, destination)?;
            return Ok(FrameOutcome::Passthrough);
        }

        self.accumulation.observe_view(camera);
        self.buffers.ensure_bound(backend)?;

        let accumulate = self.settings.accumulate && !camera.is_preview();
        if accumulate {
            let (width, height) = backend.image_size(destination);
            if (width, height) == (0, 0) {
                return Err(TracerError::UnboundResource("destination"));
            }
            self.accumulation.ensure_size(backend, width, height)?;
        }

        FrameParameters {
            camera,
            frame_number: self.accumulation.frame_number(),
            limits: self.settings.limits(),
            environment: &self.settings.environment,
        }
        .bind(backend);

        if accumulate {
            self.accumulation.accumulate(backend, destination)?;
            Ok(FrameOutcome::Accumulated {
                samples: self.accumulation.frame_number(),
            })
        } else {
            backend.dispatch_trace(destination)?;
            Ok(FrameOutcome::SingleSample)
        }
    }

    /// Release every GPU resource.
    ///
    /// Rendering may continue afterwards, but the scene is gone: frames
    /// trace empty placeholder buffers until [`Self::refresh_geometry`] is
    /// called again. Accumulation images are reallocated on demand.
    pub fn release(&mut self, backend: &mut B) {
        self.buffers.release(backend);
        self.accumulation.release(backend);
    }
}
