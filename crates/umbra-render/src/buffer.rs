//! Vertex and index buffer management for GPU rendering.

use bytemuck::{Pod, Zeroable};

/// An uploaded mesh: vertex and index buffers ready to draw.
pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl MeshBuffer {
    /// Bind vertex and index buffers to a render pass.
    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), self.index_format);
    }

    /// Draw the entire mesh using indexed rendering.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// Index data that can be either u16 or u32 format.
pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            IndexData::U16(data) => data.len() as u32,
            IndexData::U32(data) => data.len() as u32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(data) => bytemuck::cast_slice(data),
            IndexData::U32(data) => bytemuck::cast_slice(data),
        }
    }
}

/// Creates vertex and index buffers on one device.
pub struct BufferAllocator<'a> {
    device: &'a wgpu::Device,
}

impl<'a> BufferAllocator<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self { device }
    }

    /// Create a complete mesh buffer from vertex and index data.
    pub fn create_mesh(&self, label: &str, vertices: &[u8], indices: IndexData) -> MeshBuffer {
        use wgpu::util::DeviceExt;

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: vertices,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: indices.as_bytes(),
                usage: wgpu::BufferUsages::INDEX,
            });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: indices.count(),
            index_format: indices.format(),
        }
    }
}

/// Scene vertex: position, normal, and texture coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex buffer layout at locations 0 (position), 1 (normal), 2 (uv).
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        const ATTRIBUTES: [VertexAttribute; 3] = [
            VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: VertexFormat::Float32x3,
            },
            VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: VertexFormat::Float32x3,
            },
            VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: VertexFormat::Float32x2,
            },
        ];

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Byte distance between dynamic-offset uniform slots.
///
/// 256 is the largest `min_uniform_buffer_offset_alignment` wgpu allows, so
/// it is valid on every device.
pub const UNIFORM_SLOT_STRIDE: u64 = 256;

/// A uniform buffer of fixed-stride slots bound with dynamic offsets.
///
/// Used for per-entity transforms and per-face view-projections: one bind
/// group, one `write_buffer` per frame, and a different offset per draw.
pub struct UniformSlots {
    label: &'static str,
    slot_size: u64,
    capacity: usize,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformSlots {
    /// `slot_size` is the binding size of one element; it must fit the stride.
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        slot_size: u64,
        capacity: usize,
    ) -> Self {
        debug_assert!(slot_size <= UNIFORM_SLOT_STRIDE);
        let capacity = capacity.max(1);
        let (buffer, bind_group) = Self::allocate(device, layout, label, slot_size, capacity);
        Self {
            label,
            slot_size,
            capacity,
            buffer,
            bind_group,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        slot_size: u64,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: UNIFORM_SLOT_STRIDE * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: std::num::NonZeroU64::new(slot_size),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Write `items` into slots `0..items.len()`, growing the buffer if needed.
    pub fn write<T: Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        items: &[T],
    ) {
        if items.is_empty() {
            return;
        }
        if items.len() > self.capacity {
            let capacity = items.len().next_power_of_two();
            log::debug!("Growing {} to {capacity} slots", self.label);
            let (buffer, bind_group) =
                Self::allocate(device, layout, self.label, self.slot_size, capacity);
            self.buffer.destroy();
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }

        let stride = UNIFORM_SLOT_STRIDE as usize;
        let mut bytes = vec![0u8; stride * items.len()];
        for (slot, item) in bytes.chunks_exact_mut(stride).zip(items) {
            let data = bytemuck::bytes_of(item);
            slot[..data.len()].copy_from_slice(data);
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    /// Dynamic offset of slot `index`.
    pub fn offset(index: usize) -> u32 {
        (index as u64 * UNIFORM_SLOT_STRIDE) as u32
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::create_test_device_queue;

    #[test]
    fn test_mesh_buffer_creation_u32() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let allocator = BufferAllocator::new(&device);
        let vertices = [Vertex {
            position: [0.0; 3],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0; 2],
        }; 4];
        let indices: &[u32] = &[0, 1, 2, 2, 3, 0];

        let mesh = allocator.create_mesh(
            "test-quad",
            bytemuck::cast_slice(&vertices),
            IndexData::U32(indices),
        );

        assert_eq!(mesh.index_count, 6);
        assert_eq!(mesh.index_format, wgpu::IndexFormat::Uint32);
    }

    #[test]
    fn test_u16_vs_u32_format_selection() {
        assert_eq!(
            IndexData::U16(&[0, 1, 2]).format(),
            wgpu::IndexFormat::Uint16
        );
        assert_eq!(
            IndexData::U32(&[0, 1, 2]).format(),
            wgpu::IndexFormat::Uint32
        );
    }

    #[test]
    fn test_index_data_as_bytes() {
        assert_eq!(IndexData::U16(&[0, 1, 2]).as_bytes().len(), 6);
        assert_eq!(IndexData::U32(&[0, 1, 2]).as_bytes().len(), 12);
    }

    #[test]
    fn test_slot_offsets_use_stride() {
        assert_eq!(UniformSlots::offset(0), 0);
        assert_eq!(UniformSlots::offset(3), 768);
    }

    #[test]
    fn test_uniform_slots_grow() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let layout = crate::layouts::SceneLayouts::new(&device);
        let mut slots = UniformSlots::new(&device, &layout.face, "test-slots", 80, 2);
        assert_eq!(slots.capacity(), 2);
        slots.write(&device, &queue, &layout.face, &[[0.0f32; 20]; 5]);
        assert_eq!(slots.capacity(), 8);
    }

    #[test]
    fn test_vertex_layout() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 32);
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.attributes[2].offset, 24);
    }
}
