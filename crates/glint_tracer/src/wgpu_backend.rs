//! wgpu implementation of [`GpuBackend`].
//!
//! Scene records live in read-only storage buffers, images are
//! `Rgba32Float` textures usable both as storage targets and as sampled
//! inputs. Named parameters are collected host-side into one uniform block
//! per kernel and uploaded right before each dispatch.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use bytemuck::{Pod, Zeroable};
use glint_math::{Mat4, Vec4};

use crate::backend::{param, GpuBackend, Kernel};
use crate::error::{TracerError, TracerResult};

const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const BYTES_PER_PIXEL: u32 = 16;
const WORKGROUP_SIZE: u32 = 8;

/// Uniform block of the tracing kernel. Matches `TraceParams` in trace.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct TraceUniforms {
    camera_to_world: [[f32; 4]; 4],
    near_clip_plane: [f32; 4],
    sky_color_horizon: [f32; 4],
    sky_color_zenith: [f32; 4],
    ground_color: [f32; 4],
    sun_direction: [f32; 4],
    frame_number: i32,
    bounce_limit: i32,
    rays_per_pixel: i32,
    triangle_count: i32,
    mesh_count: i32,
    sphere_count: i32,
    apply_environment: i32,
    sun_focus: f32,
    sun_intensity: f32,
    _padding: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<TraceUniforms>() == 192);

impl Default for TraceUniforms {
    fn default() -> Self {
        Self {
            camera_to_world: Mat4::IDENTITY.to_cols_array_2d(),
            near_clip_plane: [0.0; 4],
            sky_color_horizon: [0.0; 4],
            sky_color_zenith: [0.0; 4],
            ground_color: [0.0; 4],
            sun_direction: [0.0, -1.0, 0.0, 0.0],
            frame_number: 0,
            bounce_limit: 1,
            rays_per_pixel: 1,
            triangle_count: 0,
            mesh_count: 0,
            sphere_count: 0,
            apply_environment: 0,
            sun_focus: 1.0,
            sun_intensity: 1.0,
            _padding: [0.0; 3],
        }
    }
}

/// Uniform block of the blend kernel. Matches `AccumulateParams` in accumulate.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct AccumulateUniforms {
    frame_number: i32,
    _padding: [i32; 3],
}

pub struct GpuBuffer {
    id: u64,
    buffer: Arc<wgpu::Buffer>,
    len: usize,
}

impl GpuBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub struct GpuImage {
    id: u64,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl GpuImage {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Scene buffers currently bound to the tracing kernel.
#[derive(Default)]
struct SceneBindings {
    triangles: Option<Arc<wgpu::Buffer>>,
    meshes: Option<Arc<wgpu::Buffer>>,
    spheres: Option<Arc<wgpu::Buffer>>,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u64,

    trace_pipeline: wgpu::ComputePipeline,
    trace_layout: wgpu::BindGroupLayout,
    trace_uniform_buffer: wgpu::Buffer,
    trace_uniforms: TraceUniforms,
    scene: SceneBindings,

    accumulate_pipeline: wgpu::ComputePipeline,
    accumulate_layout: wgpu::BindGroupLayout,
    accumulate_uniform_buffer: wgpu::Buffer,
    accumulate_uniforms: AccumulateUniforms,
}

impl WgpuBackend {
    /// Request a headless adapter and device.
    pub async fn new() -> TracerResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| TracerError::device("Failed to find suitable GPU adapter"))?;

        log::info!("Using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Glint Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(TracerError::device)?;

        Ok(Self::from_device(device, queue))
    }

    /// Build the pipelines on a device the host already owns.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let trace_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Trace Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
                output_entry(4),
            ],
        });

        let accumulate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Accumulate Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                input_entry(1),
                input_entry(2),
                output_entry(3),
            ],
        });

        let trace_pipeline = compute_pipeline(
            &device,
            "Trace",
            include_str!("shaders/trace.wgsl"),
            &trace_layout,
        );
        let accumulate_pipeline = compute_pipeline(
            &device,
            "Accumulate",
            include_str!("shaders/accumulate.wgsl"),
            &accumulate_layout,
        );

        let trace_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Uniforms"),
            size: std::mem::size_of::<TraceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let accumulate_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Accumulate Uniforms"),
            size: std::mem::size_of::<AccumulateUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            next_id: 1,
            trace_pipeline,
            trace_layout,
            trace_uniform_buffer,
            trace_uniforms: TraceUniforms::default(),
            scene: SceneBindings::default(),
            accumulate_pipeline,
            accumulate_layout,
            accumulate_uniform_buffer,
            accumulate_uniforms: AccumulateUniforms::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Copy an image back to host memory, one `Vec4` per pixel, row-major.
    pub fn read_image(&self, image: &GpuImage) -> TracerResult<Vec<Vec4>> {
        let tight_bpr = image.width * BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bpr = tight_bpr.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: (padded_bpr * image.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            image.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr),
                    rows_per_image: Some(image.height),
                },
            },
            extent(image.width, image.height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| TracerError::readback("map_async callback dropped"))?
            .map_err(TracerError::readback)?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((image.width * image.height) as usize);
        for row in 0..image.height as usize {
            let start = row * padded_bpr as usize;
            let bytes = &data[start..start + tight_bpr as usize];
            pixels.extend(
                bytes
                    .chunks_exact(BYTES_PER_PIXEL as usize)
                    .map(|px| Vec4::from_array(bytemuck::pod_read_unaligned(px))),
            );
        }
        drop(data);
        staging.unmap();

        Ok(pixels)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Run `create` inside an out-of-memory error scope.
    fn allocate<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        width: u32,
        height: u32,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(
                width.div_ceil(WORKGROUP_SIZE),
                height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = GpuBuffer;
    type Image = GpuImage;

    fn create_buffer(&mut self, label: &str, len: usize, stride: usize) -> TracerResult<GpuBuffer> {
        let size = (len * stride) as u64;
        let max = self.device.limits().max_storage_buffer_binding_size as u64;
        let fail = |reason: String| TracerError::BufferAllocation {
            label: label.to_string(),
            len,
            stride,
            reason,
        };

        if size == 0 {
            return Err(fail("zero-sized buffer".to_string()));
        }
        if size > max {
            return Err(fail(format!("{} bytes exceeds binding limit {}", size, max)));
        }

        let buffer = self
            .allocate(|device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .map_err(fail)?;

        Ok(GpuBuffer {
            id: self.next_id(),
            buffer: Arc::new(buffer),
            len,
        })
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, bytes: &[u8]) {
        self.queue.write_buffer(&buffer.buffer, 0, bytes);
    }

    fn release_buffer(&mut self, buffer: GpuBuffer) {
        buffer.buffer.destroy();
    }

    fn buffer_len(&self, buffer: &GpuBuffer) -> usize {
        buffer.len
    }

    fn create_image(&mut self, label: &str, width: u32, height: u32) -> TracerResult<GpuImage> {
        let max = self.device.limits().max_texture_dimension_2d;
        let fail = |reason: String| TracerError::ImageAllocation {
            label: label.to_string(),
            width,
            height,
            reason,
        };

        if width == 0 || height == 0 || width > max || height > max {
            return Err(fail(format!("dimensions must be in 1..={}", max)));
        }

        let texture = self
            .allocate(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: extent(width, height),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: IMAGE_FORMAT,
                    usage: wgpu::TextureUsages::STORAGE_BINDING
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .map_err(fail)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(GpuImage {
            id: self.next_id(),
            texture,
            view,
            width,
            height,
        })
    }

    fn release_image(&mut self, image: GpuImage) {
        image.texture.destroy();
    }

    fn image_size(&self, image: &GpuImage) -> (u32, u32) {
        (image.width, image.height)
    }

    fn copy_image(&mut self, src: &GpuImage, dst: &GpuImage) -> TracerResult<()> {
        if (src.width, src.height) != (dst.width, dst.height) {
            return Err(TracerError::SizeMismatch(
                (src.width, src.height),
                (dst.width, dst.height),
            ));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Copy Image"),
            });
        encoder.copy_texture_to_texture(
            src.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            extent(src.width, src.height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn set_int(&mut self, kernel: Kernel, name: &str, value: i32) {
        let uniforms = &mut self.trace_uniforms;
        let slot = match (kernel, name) {
            (Kernel::Trace, param::FRAME_NUMBER) => &mut uniforms.frame_number,
            (Kernel::Trace, param::BOUNCE_LIMIT) => &mut uniforms.bounce_limit,
            (Kernel::Trace, param::RAYS_PER_PIXEL) => &mut uniforms.rays_per_pixel,
            (Kernel::Trace, param::TRIANGLE_COUNT) => &mut uniforms.triangle_count,
            (Kernel::Trace, param::MESH_COUNT) => &mut uniforms.mesh_count,
            (Kernel::Trace, param::SPHERE_COUNT) => &mut uniforms.sphere_count,
            (Kernel::Trace, param::APPLY_ENVIRONMENT) => &mut uniforms.apply_environment,
            (Kernel::Accumulate, param::FRAME_NUMBER) => &mut self.accumulate_uniforms.frame_number,
            _ => return unknown(kernel, name),
        };
        *slot = value;
    }

    fn set_float(&mut self, kernel: Kernel, name: &str, value: f32) {
        let slot = match (kernel, name) {
            (Kernel::Trace, param::SUN_FOCUS) => &mut self.trace_uniforms.sun_focus,
            (Kernel::Trace, param::SUN_INTENSITY) => &mut self.trace_uniforms.sun_intensity,
            _ => return unknown(kernel, name),
        };
        *slot = value;
    }

    fn set_vector(&mut self, kernel: Kernel, name: &str, value: Vec4) {
        let uniforms = &mut self.trace_uniforms;
        let slot = match (kernel, name) {
            (Kernel::Trace, param::NEAR_CLIP_PLANE) => &mut uniforms.near_clip_plane,
            (Kernel::Trace, param::SKY_COLOR_HORIZON) => &mut uniforms.sky_color_horizon,
            (Kernel::Trace, param::SKY_COLOR_ZENITH) => &mut uniforms.sky_color_zenith,
            (Kernel::Trace, param::GROUND_COLOR) => &mut uniforms.ground_color,
            (Kernel::Trace, param::SUN_DIRECTION) => &mut uniforms.sun_direction,
            _ => return unknown(kernel, name),
        };
        *slot = value.to_array();
    }

    fn set_matrix(&mut self, kernel: Kernel, name: &str, value: Mat4) {
        match (kernel, name) {
            (Kernel::Trace, param::CAMERA_TO_WORLD) => {
                self.trace_uniforms.camera_to_world = value.to_cols_array_2d();
            }
            _ => unknown(kernel, name),
        }
    }

    fn set_buffer(&mut self, kernel: Kernel, name: &str, buffer: &GpuBuffer) {
        let slot = match (kernel, name) {
            (Kernel::Trace, param::TRIANGLES) => &mut self.scene.triangles,
            (Kernel::Trace, param::MESHES) => &mut self.scene.meshes,
            (Kernel::Trace, param::SPHERES) => &mut self.scene.spheres,
            _ => return unknown(kernel, name),
        };
        *slot = Some(buffer.buffer.clone());
    }

    fn dispatch_trace(&mut self, target: &GpuImage) -> TracerResult<()> {
        let triangles = self
            .scene
            .triangles
            .as_ref()
            .ok_or(TracerError::UnboundResource(param::TRIANGLES))?;
        let meshes = self
            .scene
            .meshes
            .as_ref()
            .ok_or(TracerError::UnboundResource(param::MESHES))?;
        let spheres = self
            .scene
            .spheres
            .as_ref()
            .ok_or(TracerError::UnboundResource(param::SPHERES))?;

        self.queue.write_buffer(
            &self.trace_uniform_buffer,
            0,
            bytemuck::bytes_of(&self.trace_uniforms),
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trace Bind Group"),
            layout: &self.trace_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.trace_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: meshes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: spheres.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
            ],
        });

        self.dispatch(
            "Trace Pass",
            &self.trace_pipeline,
            &bind_group,
            target.width,
            target.height,
        );
        Ok(())
    }

    fn dispatch_accumulate(
        &mut self,
        previous: &GpuImage,
        current: &GpuImage,
        target: &GpuImage,
    ) -> TracerResult<()> {
        for image in [current, target] {
            if (image.width, image.height) != (previous.width, previous.height) {
                return Err(TracerError::SizeMismatch(
                    (previous.width, previous.height),
                    (image.width, image.height),
                ));
            }
        }

        self.queue.write_buffer(
            &self.accumulate_uniform_buffer,
            0,
            bytemuck::bytes_of(&self.accumulate_uniforms),
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Accumulate Bind Group"),
            layout: &self.accumulate_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.accumulate_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&previous.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&current.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
            ],
        });

        self.dispatch(
            "Accumulate Pass",
            &self.accumulate_pipeline,
            &bind_group,
            target.width,
            target.height,
        );
        Ok(())
    }
}

fn unknown(kernel: Kernel, name: &str) {
    log::warn!("Ignoring unknown {:?} kernel parameter '{}'", kernel, name);
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn input_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn output_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: IMAGE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    name: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(name),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(name),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: "main",
        compilation_options: Default::default(),
        cache: None,
    })
}
