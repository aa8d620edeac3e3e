//! In-memory backend.
//!
//! Keeps buffers and images in host memory and records every allocation
//! and release, so resource behaviour can be checked without a GPU. The
//! tracing kernel is replaced by a caller-supplied radiance function and
//! the blend kernel by [`blend`].

use std::collections::HashMap;

use glint_math::{Mat4, Vec4};

use crate::accumulation::blend;
use crate::backend::{param, GpuBackend, Kernel};
use crate::error::{TracerError, TracerResult};

/// Opaque handle to a headless buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessBuffer {
    id: u64,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Opaque handle to a headless image.
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessImage {
    id: u64,
}

impl HeadlessImage {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Resource lifecycle events, in the order they happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    BufferCreated { id: u64, label: String, len: usize },
    BufferReleased(u64),
    ImageCreated { id: u64, width: u32, height: u32 },
    ImageReleased(u64),
    Trace(u64),
    Accumulate(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    Vector(Vec4),
    Matrix(Mat4),
    Buffer(u64),
}

struct BufferData {
    label: String,
    len: usize,
    bytes: Vec<u8>,
}

struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

type Radiance = Box<dyn FnMut(i32, u32, u32) -> Vec4>;

pub struct HeadlessBackend {
    next_id: u64,
    buffers: HashMap<u64, BufferData>,
    images: HashMap<u64, ImageData>,
    params: HashMap<(Kernel, String), ParamValue>,
    events: Vec<Event>,
    radiance: Radiance,
    fail_allocations: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A backend whose tracing kernel outputs black.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            buffers: HashMap::new(),
            images: HashMap::new(),
            params: HashMap::new(),
            events: Vec::new(),
            radiance: Box::new(|_, _, _| Vec4::new(0.0, 0.0, 0.0, 1.0)),
            fail_allocations: false,
        }
    }

    /// Replace the tracing kernel. The function receives the bound
    /// `frameNumber` and the pixel coordinates.
    pub fn set_radiance<F>(&mut self, radiance: F)
    where
        F: FnMut(i32, u32, u32) -> Vec4 + 'static,
    {
        self.radiance = Box::new(radiance);
    }

    /// Make every following allocation fail.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    /// How many buffers with this label were ever created.
    pub fn buffer_creations(&self, label: &str) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::BufferCreated { label: l, .. } if l == label))
            .count()
    }

    pub fn buffer_bytes(&self, buffer: &HeadlessBuffer) -> &[u8] {
        self.buffers
            .get(&buffer.id)
            .map(|data| data.bytes.as_slice())
            .unwrap_or(&[])
    }

    pub fn image_pixels(&self, image: &HeadlessImage) -> &[Vec4] {
        self.images
            .get(&image.id)
            .map(|data| data.pixels.as_slice())
            .unwrap_or(&[])
    }

    pub fn fill_image(&mut self, image: &HeadlessImage, value: Vec4) {
        if let Some(data) = self.images.get_mut(&image.id) {
            data.pixels.fill(value);
        }
    }

    pub fn param(&self, kernel: Kernel, name: &str) -> Option<&ParamValue> {
        self.params.get(&(kernel, name.to_string()))
    }

    pub fn int_param(&self, kernel: Kernel, name: &str) -> Option<i32> {
        match self.param(kernel, name) {
            Some(ParamValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn float_param(&self, kernel: Kernel, name: &str) -> Option<f32> {
        match self.param(kernel, name) {
            Some(ParamValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn vector_param(&self, kernel: Kernel, name: &str) -> Option<Vec4> {
        match self.param(kernel, name) {
            Some(ParamValue::Vector(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn matrix_param(&self, kernel: Kernel, name: &str) -> Option<Mat4> {
        match self.param(kernel, name) {
            Some(ParamValue::Matrix(value)) => Some(*value),
            _ => None,
        }
    }

    /// Id of the buffer bound under `name`.
    pub fn bound_buffer(&self, kernel: Kernel, name: &str) -> Option<u64> {
        match self.param(kernel, name) {
            Some(ParamValue::Buffer(id)) => Some(*id),
            _ => None,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn set(&mut self, kernel: Kernel, name: &str, value: ParamValue) {
        self.params.insert((kernel, name.to_string()), value);
    }

    fn image(&self, image: &HeadlessImage) -> TracerResult<&ImageData> {
        self.images
            .get(&image.id)
            .ok_or_else(|| TracerError::device(format!("image {} was released", image.id)))
    }

    fn check_same_size(&self, a: &HeadlessImage, b: &HeadlessImage) -> TracerResult<()> {
        let a = self.image(a)?;
        let b = self.image(b)?;
        if (a.width, a.height) != (b.width, b.height) {
            return Err(TracerError::SizeMismatch(
                (a.width, a.height),
                (b.width, b.height),
            ));
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Image = HeadlessImage;

    fn create_buffer(&mut self, label: &str, len: usize, stride: usize) -> TracerResult<HeadlessBuffer> {
        if self.fail_allocations || len == 0 {
            return Err(TracerError::BufferAllocation {
                label: label.to_string(),
                len,
                stride,
                reason: "allocation refused".to_string(),
            });
        }

        let id = self.next_id();
        self.buffers.insert(
            id,
            BufferData {
                label: label.to_string(),
                len,
                bytes: vec![0; len * stride],
            },
        );
        self.events.push(Event::BufferCreated {
            id,
            label: label.to_string(),
            len,
        });
        Ok(HeadlessBuffer { id })
    }

    fn write_buffer(&mut self, buffer: &HeadlessBuffer, bytes: &[u8]) {
        match self.buffers.get_mut(&buffer.id) {
            Some(data) if bytes.len() <= data.bytes.len() => {
                data.bytes[..bytes.len()].copy_from_slice(bytes);
            }
            Some(data) => log::warn!(
                "Write of {} bytes overflows buffer '{}' ({} bytes)",
                bytes.len(),
                data.label,
                data.bytes.len()
            ),
            None => log::warn!("Write to released buffer {}", buffer.id),
        }
    }

    fn release_buffer(&mut self, buffer: HeadlessBuffer) {
        if self.buffers.remove(&buffer.id).is_some() {
            self.events.push(Event::BufferReleased(buffer.id));
        }
    }

    fn buffer_len(&self, buffer: &HeadlessBuffer) -> usize {
        self.buffers.get(&buffer.id).map_or(0, |data| data.len)
    }

    fn create_image(&mut self, label: &str, width: u32, height: u32) -> TracerResult<HeadlessImage> {
        if self.fail_allocations || width == 0 || height == 0 {
            return Err(TracerError::ImageAllocation {
                label: label.to_string(),
                width,
                height,
                reason: "allocation refused".to_string(),
            });
        }

        let id = self.next_id();
        self.images.insert(
            id,
            ImageData {
                width,
                height,
                pixels: vec![Vec4::ZERO; (width * height) as usize],
            },
        );
        self.events.push(Event::ImageCreated { id, width, height });
        Ok(HeadlessImage { id })
    }

    fn release_image(&mut self, image: HeadlessImage) {
        if self.images.remove(&image.id).is_some() {
            self.events.push(Event::ImageReleased(image.id));
        }
    }

    fn image_size(&self, image: &HeadlessImage) -> (u32, u32) {
        self.images
            .get(&image.id)
            .map_or((0, 0), |data| (data.width, data.height))
    }

    fn copy_image(&mut self, src: &HeadlessImage, dst: &HeadlessImage) -> TracerResult<()> {
        self.check_same_size(src, dst)?;
        let pixels = self.image(src)?.pixels.clone();
        if let Some(data) = self.images.get_mut(&dst.id) {
            data.pixels = pixels;
        }
        Ok(())
    }

    fn set_int(&mut self, kernel: Kernel, name: &str, value: i32) {
        self.set(kernel, name, ParamValue::Int(value));
    }

    fn set_float(&mut self, kernel: Kernel, name: &str, value: f32) {
        self.set(kernel, name, ParamValue::Float(value));
    }

    fn set_vector(&mut self, kernel: Kernel, name: &str, value: Vec4) {
        self.set(kernel, name, ParamValue::Vector(value));
    }

    fn set_matrix(&mut self, kernel: Kernel, name: &str, value: Mat4) {
        self.set(kernel, name, ParamValue::Matrix(value));
    }

    fn set_buffer(&mut self, kernel: Kernel, name: &str, buffer: &HeadlessBuffer) {
        self.set(kernel, name, ParamValue::Buffer(buffer.id));
    }

    fn dispatch_trace(&mut self, target: &HeadlessImage) -> TracerResult<()> {
        let frame = self.int_param(Kernel::Trace, param::FRAME_NUMBER).unwrap_or(0);
        let width = self.image(target)?.width;
        let radiance = &mut self.radiance;

        if let Some(data) = self.images.get_mut(&target.id) {
            for (i, pixel) in data.pixels.iter_mut().enumerate() {
                let x = i as u32 % width;
                let y = i as u32 / width;
                *pixel = radiance(frame, x, y);
            }
        }
        self.events.push(Event::Trace(target.id));
        Ok(())
    }

    fn dispatch_accumulate(
        &mut self,
        previous: &HeadlessImage,
        current: &HeadlessImage,
        target: &HeadlessImage,
    ) -> TracerResult<()> {
        self.check_same_size(previous, current)?;
        self.check_same_size(previous, target)?;

        let frame = self
            .int_param(Kernel::Accumulate, param::FRAME_NUMBER)
            .unwrap_or(0)
            .max(0) as u32;
        let blended: Vec<Vec4> = self
            .image(previous)?
            .pixels
            .iter()
            .zip(&self.image(current)?.pixels)
            .map(|(p, c)| blend(*p, *c, frame))
            .collect();

        if let Some(data) = self.images.get_mut(&target.id) {
            data.pixels = blended;
        }
        self.events.push(Event::Accumulate(target.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_buffer("a", 1, 4).unwrap();
        let b = backend.create_buffer("b", 1, 4).unwrap();
        let image = backend.create_image("c", 1, 1).unwrap();

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), image.id());
    }

    #[test]
    fn test_zero_sized_buffer_refused() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.create_buffer("empty", 0, 48).is_err());
    }

    #[test]
    fn test_copy_requires_same_size() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_image("a", 2, 2).unwrap();
        let b = backend.create_image("b", 3, 2).unwrap();

        assert!(matches!(
            backend.copy_image(&a, &b),
            Err(TracerError::SizeMismatch((2, 2), (3, 2)))
        ));
    }

    #[test]
    fn test_trace_uses_radiance() {
        let mut backend = HeadlessBackend::new();
        backend.set_radiance(|frame, x, y| Vec4::new(frame as f32, x as f32, y as f32, 1.0));
        backend.set_int(Kernel::Trace, param::FRAME_NUMBER, 3);
        let image = backend.create_image("out", 2, 2).unwrap();

        backend.dispatch_trace(&image).unwrap();
        let pixels = backend.image_pixels(&image);

        assert_eq!(pixels[0], Vec4::new(3.0, 0.0, 0.0, 1.0));
        assert_eq!(pixels[3], Vec4::new(3.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn test_release_is_logged_once() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer("b", 2, 4).unwrap();
        let id = buffer.id();

        backend.release_buffer(buffer);
        backend.release_buffer(HeadlessBuffer { id });

        let releases = backend
            .events()
            .iter()
            .filter(|event| **event == Event::BufferReleased(id))
            .count();
        assert_eq!(releases, 1);
        assert_eq!(backend.live_buffers(), 0);
    }
}
