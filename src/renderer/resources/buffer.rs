use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

use crate::renderer::core::memory::find_memory_type;

/// A buffer with its backing allocation, destroyed on drop.
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,

    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        required: vk::MemoryPropertyFlags,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)?
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(find_memory_type(
                memory_properties,
                requirements.memory_type_bits,
                required,
            )?);
        let memory = unsafe {
            device.allocate_memory(&alloc_info, None)?
        };

        unsafe {
            device.bind_buffer_memory(buffer, memory, 0)?;
        }

        Ok(Self {
            buffer,
            memory,
            size,
            device,
        })
    }

    /// Transient host-visible source buffer for one transfer operation.
    pub fn new_staging(
        size: vk::DeviceSize,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        Self::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            memory_properties,
            device,
        )
    }

    /// Device-local buffer filled once through a staging copy and never
    /// mutated afterwards.
    pub fn new_device_local(
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        Self::new(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            memory_properties,
            device,
        )
    }

    /// Maps the whole allocation, copies `data` into it, and unmaps.
    /// Only valid for host-visible buffers.
    pub fn write_mapped(&self, data: &[u8]) -> Result<()> {
        unsafe {
            let mapped = self.device.map_memory(
                self.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}
