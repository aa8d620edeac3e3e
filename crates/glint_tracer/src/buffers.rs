//! GPU-resident scene buffers.
//!
//! The manager owns one buffer per record kind. A sync reallocates only
//! when the element count changes, then uploads the whole slice and
//! rebinds the buffer together with its true count. Buffers are never
//! empty: with no records a single zeroed placeholder element is allocated
//! and the count parameter says 0.

use bytemuck::Pod;

use crate::backend::{param, GpuBackend, Kernel};
use crate::error::TracerResult;
use crate::records::{MeshRecord, Sphere, Triangle};

/// A buffer slot and the parameter names it binds.
struct Slot<B: GpuBackend> {
    label: &'static str,
    buffer_param: &'static str,
    count_param: &'static str,
    buffer: Option<B::Buffer>,
}

impl<B: GpuBackend> Slot<B> {
    fn new(label: &'static str, buffer_param: &'static str, count_param: &'static str) -> Self {
        Self {
            label,
            buffer_param,
            count_param,
            buffer: None,
        }
    }

    fn sync<T: Pod>(&mut self, backend: &mut B, records: &[T]) -> TracerResult<()> {
        let capacity = records.len().max(1);

        let buffer = match self.buffer.take() {
            Some(buffer) if backend.buffer_len(&buffer) == capacity => buffer,
            old => {
                // Old buffer goes away before its replacement exists
                if let Some(old) = old {
                    log::debug!("Releasing {} buffer", self.label);
                    backend.release_buffer(old);
                }
                log::debug!(
                    "Allocating {} buffer: {} x {} bytes",
                    self.label,
                    capacity,
                    std::mem::size_of::<T>()
                );
                backend.create_buffer(self.label, capacity, std::mem::size_of::<T>())?
            }
        };

        if records.is_empty() {
            let placeholder: T = bytemuck::Zeroable::zeroed();
            backend.write_buffer(&buffer, bytemuck::bytes_of(&placeholder));
        } else {
            backend.write_buffer(&buffer, bytemuck::cast_slice(records));
        }

        backend.set_buffer(Kernel::Trace, self.buffer_param, &buffer);
        backend.set_int(Kernel::Trace, self.count_param, records.len() as i32);
        self.buffer = Some(buffer);
        Ok(())
    }

    fn release(&mut self, backend: &mut B) {
        if let Some(buffer) = self.buffer.take() {
            log::debug!("Releasing {} buffer", self.label);
            backend.release_buffer(buffer);
        }
    }
}

/// Owner of the triangle, mesh, and sphere buffers.
pub struct SceneBufferManager<B: GpuBackend> {
    triangles: Slot<B>,
    meshes: Slot<B>,
    spheres: Slot<B>,
}

impl<B: GpuBackend> Default for SceneBufferManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> SceneBufferManager<B> {
    pub fn new() -> Self {
        Self {
            triangles: Slot::new("triangles", param::TRIANGLES, param::TRIANGLE_COUNT),
            meshes: Slot::new("meshes", param::MESHES, param::MESH_COUNT),
            spheres: Slot::new("spheres", param::SPHERES, param::SPHERE_COUNT),
        }
    }

    pub fn sync_triangles(&mut self, backend: &mut B, triangles: &[Triangle]) -> TracerResult<()> {
        self.triangles.sync(backend, triangles)
    }

    pub fn sync_meshes(&mut self, backend: &mut B, meshes: &[MeshRecord]) -> TracerResult<()> {
        self.meshes.sync(backend, meshes)
    }

    pub fn sync_spheres(&mut self, backend: &mut B, spheres: &[Sphere]) -> TracerResult<()> {
        self.spheres.sync(backend, spheres)
    }

    /// Sync all three kinds together. If any sync fails every slot is
    /// released, so the next [`Self::ensure_bound`] binds an empty scene
    /// instead of mesh ranges pointing past the triangle buffer.
    pub fn sync_scene(
        &mut self,
        backend: &mut B,
        triangles: &[Triangle],
        meshes: &[MeshRecord],
        spheres: &[Sphere],
    ) -> TracerResult<()> {
        let result = self
            .sync_triangles(backend, triangles)
            .and_then(|()| self.sync_meshes(backend, meshes))
            .and_then(|()| self.sync_spheres(backend, spheres));

        if result.is_err() {
            log::warn!("Scene upload failed, releasing all scene buffers");
            self.release(backend);
        }
        result
    }

    /// Make sure every slot holds a buffer, binding empty placeholders for
    /// kinds that were never synced. The tracing kernel needs all three.
    pub fn ensure_bound(&mut self, backend: &mut B) -> TracerResult<()> {
        if self.triangles.buffer.is_none() {
            self.sync_triangles(backend, &[])?;
        }
        if self.meshes.buffer.is_none() {
            self.sync_meshes(backend, &[])?;
        }
        if self.spheres.buffer.is_none() {
            self.sync_spheres(backend, &[])?;
        }
        Ok(())
    }

    pub fn triangle_buffer(&self) -> Option<&B::Buffer> {
        self.triangles.buffer.as_ref()
    }

    pub fn mesh_buffer(&self) -> Option<&B::Buffer> {
        self.meshes.buffer.as_ref()
    }

    pub fn sphere_buffer(&self) -> Option<&B::Buffer> {
        self.spheres.buffer.as_ref()
    }

    /// Hand every buffer back to the backend. Safe to call more than once.
    pub fn release(&mut self, backend: &mut B) {
        self.triangles.release(backend);
        self.meshes.release(backend);
        self.spheres.release(backend);
    }
}
