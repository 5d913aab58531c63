use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::image::GpuImage;

/// Synchronous host-to-device transfers through a single staging buffer.
///
/// Every operation waits for the previous one on the dedicated fence before
/// reusing the command buffer, so at most one staging allocation is alive at
/// a time. Transfers only happen during setup, never in the draw loop, so
/// blocking here is fine.
pub struct TransferContext {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    staging: Option<Buffer>,

    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(
        queue: vk::Queue,
        queue_family_index: u32,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe {
            device.create_command_pool(&pool_info, None)?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe {
            device.allocate_command_buffers(&alloc_info)?[0]
        };

        // Pre-signaled so the first transfer does not block.
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe {
            device.create_fence(&fence_info, None)?
        };

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
            staging: None,
            queue,
            memory_properties,
            device,
        })
    }

    pub fn upload_to_buffer(&mut self, dst: &Buffer, data: &[u8]) -> Result<()> {
        self.begin()?;

        let staging = self.stage(data)?;

        let copy = vk::BufferCopy::default()
            .size(data.len() as vk::DeviceSize);
        unsafe {
            self.device.cmd_copy_buffer(
                self.command_buffer,
                staging,
                dst.buffer,
                &[copy],
            );
        }

        self.end()
    }

    /// Copies `data` into `dst` one region per layer. The image must already
    /// be in `TRANSFER_DST_OPTIMAL` layout.
    pub fn upload_to_image(
        &mut self,
        dst: &GpuImage,
        data: &[u8],
        regions: &[vk::BufferImageCopy],
    ) -> Result<()> {
        self.begin()?;

        let staging = self.stage(data)?;

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                staging,
                dst.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            );
        }

        self.end()
    }

    /// Transitions all layers of `image` between the two layout pairs a
    /// texture upload needs. Any other pair is a programming error.
    pub fn transition_image_layout(
        &mut self,
        image: &GpuImage,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> Result<()> {
        let (src_access, dst_access, src_stage, dst_stage) = match (from, to) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            _ => {
                return Err(eyre!(
                    "Unsupported image layout transition {:?} -> {:?}",
                    from,
                    to,
                ));
            }
        };

        self.begin()?;

        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(from)
            .new_layout(to)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: image.layers,
            });

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        self.end()
    }

    /// Waits out the previous submission and opens the one-shot command
    /// buffer for re-recording.
    fn begin(&mut self) -> Result<()> {
        unsafe {
            self.device.wait_for_fences(&[self.fence], true, u64::MAX)?;
            self.device.reset_fences(&[self.fence])?;
            self.device.reset_command_buffer(
                self.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        unsafe {
            self.device.end_command_buffer(self.command_buffer)?;

            let command_buffers = [self.command_buffer];
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&command_buffers);
            self.device.queue_submit(self.queue, &[submit_info], self.fence)?;
        }
        Ok(())
    }

    /// Replaces the staging buffer with a fresh one holding `data`. The old
    /// buffer is destroyed first; its submission already completed because
    /// `begin` waited on the fence.
    fn stage(&mut self, data: &[u8]) -> Result<vk::Buffer> {
        self.staging = None;

        let staging = Buffer::new_staging(
            data.len() as vk::DeviceSize,
            &self.memory_properties,
            self.device.clone(),
        )?;
        staging.write_mapped(data)?;

        let handle = staging.buffer;
        self.staging = Some(staging);
        Ok(handle)
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            // Let the last transfer finish before freeing its staging buffer.
            let _ = self.device.wait_for_fences(&[self.fence], true, u64::MAX);
            self.staging = None;
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
