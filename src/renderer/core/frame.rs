use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// Everything one in-flight frame owns.
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub descriptor_set: vk::DescriptorSet,
}

/// A ring of frame slots, one per swapchain image, cycled in order.
///
/// The ring is torn down and rebuilt together with the swapchain, so its
/// length always matches the swapchain image count.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    cursor: usize,

    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    device: Arc<ash::Device>,
}

impl FrameRing {
    pub fn new(
        queue_family_index: u32,
        image_count: u32,
        descriptor_set_layout: vk::DescriptorSetLayout,
        texture_view: vk::ImageView,
        sampler: vk::Sampler,
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
            .command_buffer_count(image_count);
        let command_buffers = unsafe {
            device.allocate_command_buffers(&alloc_info)?
        };

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: image_count,
        }];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(image_count);
        let descriptor_pool = unsafe {
            device.create_descriptor_pool(&descriptor_pool_info, None)?
        };

        let set_layouts = vec![descriptor_set_layout; image_count as usize];
        let set_alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor_pool)
            .set_layouts(&set_layouts);
        let descriptor_sets = unsafe {
            device.allocate_descriptor_sets(&set_alloc_info)?
        };

        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: texture_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes = descriptor_sets
            .iter()
            .map(|set| {
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info)
            })
            .collect::<Vec<_>>();
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Pre-signaled so the first pass through each slot does not wait.
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);

        let slots = command_buffers
            .into_iter()
            .zip(descriptor_sets)
            .map(|(command_buffer, descriptor_set)| {
                let (image_available, render_finished, in_flight) = unsafe {
                    (
                        device.create_semaphore(&semaphore_info, None)?,
                        device.create_semaphore(&semaphore_info, None)?,
                        device.create_fence(&fence_info, None)?,
                    )
                };
                Ok(FrameSlot {
                    command_buffer,
                    image_available,
                    render_finished,
                    in_flight,
                    descriptor_set,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots,
            cursor: 0,
            command_pool,
            descriptor_pool,
            device,
        })
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.cursor]
    }

    pub fn advance(&mut self) {
        self.cursor = next_cursor(self.cursor, self.slots.len());
    }
}

impl Drop for FrameRing {
    fn drop(&mut self) {
        unsafe {
            for slot in &self.slots {
                self.device.destroy_semaphore(slot.image_available, None);
                self.device.destroy_semaphore(slot.render_finished, None);
                self.device.destroy_fence(slot.in_flight, None);
            }
            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

fn next_cursor(cursor: usize, len: usize) -> usize {
    (cursor + 1) % len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_after_the_last_slot() {
        let mut cursor = 0;
        let visited = (0..7)
            .map(|_| {
                let current = cursor;
                cursor = next_cursor(cursor, 3);
                current
            })
            .collect::<Vec<_>>();
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
