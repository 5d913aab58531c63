use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

use crate::renderer::core::memory::find_memory_type;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// An image, its backing allocation, and a single array view over all of
/// its layers. Destroyed on drop.
pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub layers: u32,

    device: Arc<ash::Device>,
}

impl GpuImage {
    pub fn new(
        width: u32,
        height: u32,
        format: vk::Format,
        layers: u32,
        aspect: vk::ImageAspectFlags,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(layers)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe {
            device.create_image(&image_info, None)?
        };

        let requirements = unsafe {
            device.get_image_memory_requirements(image)
        };
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(find_memory_type(
                memory_properties,
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?);
        let memory = unsafe {
            device.allocate_memory(&alloc_info, None)?
        };
        unsafe {
            device.bind_image_memory(image, memory, 0)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D_ARRAY)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: layers,
            });
        let view = unsafe {
            device.create_image_view(&view_info, None)?
        };

        Ok(Self {
            image,
            view,
            memory,
            layers,
            device,
        })
    }

    /// Sampled 2D array image receiving the tile atlas layers.
    pub fn new_texture_array(
        tile_width: u32,
        tile_height: u32,
        layers: u32,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        Self::new(
            tile_width,
            tile_height,
            TEXTURE_FORMAT,
            layers,
            vk::ImageAspectFlags::COLOR,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            memory_properties,
            device,
        )
    }

    /// Multisampled depth attachment sized to the swapchain extent.
    pub fn new_depth(
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        Self::new(
            extent.width,
            extent.height,
            DEPTH_FORMAT,
            1,
            vk::ImageAspectFlags::DEPTH,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_properties,
            device,
        )
    }

    /// Transient multisampled color target, resolved into the swapchain
    /// image at the end of the render pass.
    pub fn new_msaa_color(
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        Self::new(
            extent.width,
            extent.height,
            format,
            1,
            vk::ImageAspectFlags::COLOR,
            samples,
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_properties,
            device,
        )
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
        }
    }
}
