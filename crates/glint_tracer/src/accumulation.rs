//! Temporal accumulation.
//!
//! Each traced frame is one noisy sample. While the view holds still the
//! controller folds every new sample into a persistent running average;
//! any change of camera (identity or transform) or of resolution starts
//! the average over.

use glint_core::Camera;
use glint_math::{Mat4, Vec4};

use crate::backend::{param, GpuBackend, Kernel};
use crate::error::{TracerError, TracerResult};

/// Running-average blend of the `frame_index`-th sample into `previous`.
///
/// `previous + (current - previous) / (frame_index + 1)`. At frame 0 the
/// result is exactly `current`, whatever `previous` holds (NaN included).
pub fn blend(previous: Vec4, current: Vec4, frame_index: u32) -> Vec4 {
    if frame_index == 0 {
        return current;
    }
    let weight = 1.0 / (frame_index as f32 + 1.0);
    previous + (current - previous) * weight
}

/// The images backing the running average.
struct Images<I> {
    /// Persistent running average; this is what gets displayed
    accumulator: I,
    /// Snapshot of the accumulator taken before blending
    previous: I,
    /// Target of the tracing kernel
    current: I,
    size: (u32, u32),
}

pub struct AccumulationController<B: GpuBackend> {
    images: Option<Images<B::Image>>,
    frame_number: u32,
    last_view: Option<(String, Mat4)>,
}

impl<B: GpuBackend> Default for AccumulationController<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> AccumulationController<B> {
    pub fn new() -> Self {
        Self {
            images: None,
            frame_number: 0,
            last_view: None,
        }
    }

    /// Samples folded into the accumulator since the last reset.
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    pub fn reset(&mut self) {
        if self.frame_number != 0 {
            log::debug!("Accumulation reset after {} frames", self.frame_number);
        }
        self.frame_number = 0;
    }

    /// Record the camera for this frame, resetting when it differs from
    /// the last one seen. Returns true on reset.
    ///
    /// Runs every frame, including frames that do not accumulate, so a
    /// move made while accumulation is off is still noticed.
    pub fn observe_view(&mut self, camera: &Camera) -> bool {
        let matrix = camera.camera_to_world();
        let changed = match &self.last_view {
            Some((name, last)) => *name != camera.name || *last != matrix,
            None => false,
        };

        if changed {
            log::debug!("View changed ('{}'), restarting accumulation", camera.name);
            self.reset();
        }

        self.last_view = Some((camera.name.clone(), matrix));
        changed
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.images.as_ref().map(|images| images.size)
    }

    /// Allocate the images at `width` x `height`, replacing images of any
    /// other size. Reallocation discards the average.
    pub fn ensure_size(&mut self, backend: &mut B, width: u32, height: u32) -> TracerResult<()> {
        if self.size() == Some((width, height)) {
            return Ok(());
        }

        self.release(backend);
        log::info!("Allocating accumulation images at {}x{}", width, height);

        let accumulator = backend.create_image("accumulation", width, height)?;
        let previous = match backend.create_image("accumulation_previous", width, height) {
            Ok(image) => image,
            Err(err) => {
                backend.release_image(accumulator);
                return Err(err);
            }
        };
        let current = match backend.create_image("accumulation_current", width, height) {
            Ok(image) => image,
            Err(err) => {
                backend.release_image(accumulator);
                backend.release_image(previous);
                return Err(err);
            }
        };

        self.images = Some(Images {
            accumulator,
            previous,
            current,
            size: (width, height),
        });
        self.reset();
        Ok(())
    }

    /// Trace one sample, fold it into the running average, and copy the
    /// average to `destination`.
    ///
    /// Images must already match `destination`'s size; see [`Self::ensure_size`].
    pub fn accumulate(&mut self, backend: &mut B, destination: &B::Image) -> TracerResult<()> {
        let Some(images) = self.images.as_ref() else {
            return Err(TracerError::UnboundResource("accumulation"));
        };

        backend.copy_image(&images.accumulator, &images.previous)?;
        backend.dispatch_trace(&images.current)?;

        backend.set_int(Kernel::Accumulate, param::FRAME_NUMBER, self.frame_number as i32);
        backend.dispatch_accumulate(&images.previous, &images.current, &images.accumulator)?;
        backend.copy_image(&images.accumulator, destination)?;

        self.frame_number += 1;
        Ok(())
    }

    pub fn release(&mut self, backend: &mut B) {
        if let Some(images) = self.images.take() {
            log::debug!("Releasing accumulation images {:?}", images.size);
            backend.release_image(images.accumulator);
            backend.release_image(images.previous);
            backend.release_image(images.current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use glint_core::CameraKind;
    use glint_math::Vec3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_vec4(rng: &mut StdRng) -> Vec4 {
        Vec4::new(
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
        )
    }

    #[test]
    fn test_blend_first_frame_replaces() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let previous = random_vec4(&mut rng);
            let current = random_vec4(&mut rng);
            assert_eq!(blend(previous, current, 0), current);
        }

        let garbage = Vec4::splat(f32::NAN);
        assert_eq!(blend(garbage, Vec4::ONE, 0), Vec4::ONE);
    }

    #[test]
    fn test_blend_running_average() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let previous = random_vec4(&mut rng);
            let current = random_vec4(&mut rng);
            let i = rng.gen_range(1..1000u32);

            let expected = previous + (current - previous) / (i as f32 + 1.0);
            assert!((blend(previous, current, i) - expected).abs().max_element() < 1e-4);
        }
    }

    #[test]
    fn test_blend_constant_colors() {
        let previous = Vec4::splat(1.0);
        let current = Vec4::splat(3.0);

        assert_eq!(blend(previous, current, 1), Vec4::splat(2.0));
        assert_eq!(blend(previous, current, 3), Vec4::splat(1.5));
    }

    #[test]
    fn test_blend_converges_to_mean() {
        let samples = [0.2f32, 0.9, 0.4, 0.7, 0.3];
        let mut average = Vec4::splat(f32::NAN);
        for (i, sample) in samples.iter().enumerate() {
            average = blend(average, Vec4::splat(*sample), i as u32);
        }

        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!((average.x - mean).abs() < 1e-5);
    }

    fn camera() -> Camera {
        Camera::new("main", CameraKind::Primary).looking_at(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO)
    }

    #[test]
    fn test_unchanged_view_keeps_counting() {
        let mut backend = HeadlessBackend::new();
        let destination = backend.create_image("dst", 4, 4).unwrap();
        let mut controller = AccumulationController::new();
        let camera = camera();

        controller.ensure_size(&mut backend, 4, 4).unwrap();
        for _ in 0..10 {
            controller.observe_view(&camera);
            controller.accumulate(&mut backend, &destination).unwrap();
        }

        assert_eq!(controller.frame_number(), 10);
    }

    #[test]
    fn test_moved_camera_resets() {
        let mut backend = HeadlessBackend::new();
        let destination = backend.create_image("dst", 2, 2).unwrap();
        let mut controller = AccumulationController::new();
        let mut camera = camera();

        controller.ensure_size(&mut backend, 2, 2).unwrap();
        for _ in 0..3 {
            controller.observe_view(&camera);
            controller.accumulate(&mut backend, &destination).unwrap();
        }
        assert_eq!(controller.frame_number(), 3);

        camera.look_at(Vec3::new(1.0, 1.0, 5.0), Vec3::ZERO);
        assert!(controller.observe_view(&camera));
        assert_eq!(controller.frame_number(), 0);

        // The new view is now the reference
        assert!(!controller.observe_view(&camera));
    }

    #[test]
    fn test_different_camera_resets() {
        let mut controller = AccumulationController::<HeadlessBackend>::new();
        let first = camera();
        let mut second = camera();
        second.name = "other".to_string();

        controller.observe_view(&first);
        controller.frame_number = 5;

        assert!(controller.observe_view(&second));
        assert_eq!(controller.frame_number(), 0);
    }

    #[test]
    fn test_resize_reallocates_and_resets() {
        let mut backend = HeadlessBackend::new();
        let mut controller = AccumulationController::new();

        controller.ensure_size(&mut backend, 8, 8).unwrap();
        controller.frame_number = 4;
        controller.ensure_size(&mut backend, 8, 8).unwrap();
        assert_eq!(controller.frame_number(), 4);
        assert_eq!(backend.live_images(), 3);

        controller.ensure_size(&mut backend, 16, 8).unwrap();
        assert_eq!(controller.frame_number(), 0);
        assert_eq!(controller.size(), Some((16, 8)));
        assert_eq!(backend.live_images(), 3);
    }

    #[test]
    fn test_accumulated_output_is_average() {
        let mut backend = HeadlessBackend::new();
        // Sample value depends on the frame being traced
        backend.set_radiance(|frame, _, _| Vec4::splat(frame as f32));
        let destination = backend.create_image("dst", 2, 1).unwrap();
        let mut controller = AccumulationController::new();
        controller.ensure_size(&mut backend, 2, 1).unwrap();

        for _ in 0..4 {
            let frame = controller.frame_number() as i32;
            backend.set_int(Kernel::Trace, param::FRAME_NUMBER, frame);
            controller.accumulate(&mut backend, &destination).unwrap();
        }

        // Mean of 0, 1, 2, 3
        let pixels = backend.image_pixels(&destination);
        assert!(pixels.iter().all(|p| (p.x - 1.5).abs() < 1e-5));
        assert_eq!(
            backend.int_param(Kernel::Accumulate, param::FRAME_NUMBER),
            Some(3)
        );
    }

    #[test]
    fn test_first_frame_ignores_stale_contents() {
        let mut backend = HeadlessBackend::new();
        backend.set_radiance(|_, _, _| Vec4::new(0.25, 0.5, 0.75, 1.0));
        let destination = backend.create_image("dst", 3, 3).unwrap();
        let mut controller = AccumulationController::new();
        controller.ensure_size(&mut backend, 3, 3).unwrap();

        // Leftovers in the accumulator must not reach the output
        backend.fill_image(&controller.images.as_ref().unwrap().accumulator, Vec4::splat(f32::NAN));
        controller.accumulate(&mut backend, &destination).unwrap();

        let pixels = backend.image_pixels(&destination);
        assert!(pixels.iter().all(|p| *p == Vec4::new(0.25, 0.5, 0.75, 1.0)));
    }

    #[test]
    fn test_accumulate_without_images_fails() {
        let mut backend = HeadlessBackend::new();
        let destination = backend.create_image("dst", 1, 1).unwrap();
        let mut controller = AccumulationController::new();

        assert!(controller.accumulate(&mut backend, &destination).is_err());
        assert_eq!(controller.frame_number(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        let mut controller = AccumulationController::new();

        controller.ensure_size(&mut backend, 4, 4).unwrap();
        controller.release(&mut backend);
        controller.release(&mut backend);

        assert_eq!(backend.live_images(), 0);
        assert_eq!(controller.size(), None);
    }
}
