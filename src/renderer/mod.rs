pub mod config;
pub mod core;
pub mod resources;
pub mod scene;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use winit::window::Window;

use config::RendererConfig;
use self::core::device::RenderDevice;
use self::core::frame::FrameRing;
use self::core::instance::RenderInstance;
use self::core::pipeline::PipelineState;
use self::core::target::RenderTarget;
use self::core::transfer::TransferContext;
use resources::buffer::Buffer;
use resources::image::GpuImage;
use resources::shader::GraphicsShader;
use resources::texture::{Sampler, TextureAtlas};
use scene::PushTransform;

/// Radians added to the scene rotation on every drawn frame.
const ROTATION_PER_FRAME: f32 = 0.0001;

/// Owns the whole rendering stack and drives the per-frame loop.
///
/// Field order doubles as teardown order: frames and pipeline go first,
/// the device after everything that borrows it, the instance last.
pub struct Renderer {
    rotation: f32,
    resize_requested: bool,

    frames: FrameRing,
    pipeline: PipelineState,
    shader: GraphicsShader,
    depth: GpuImage,
    msaa_color: GpuImage,
    sampler: Sampler,
    texture: TextureAtlas,
    instance_buffer: Buffer,
    vertex_buffer: Buffer,
    transfer: TransferContext,
    target: RenderTarget,
    device: RenderDevice,
    instance: RenderInstance,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let instance = RenderInstance::new(&window, config.enable_validation)?;
        let (surface, surface_loader) = instance.create_surface(&window)?;
        let device = RenderDevice::new(&instance.instance, surface, &surface_loader)?;
        let target = RenderTarget::new(
            window,
            surface,
            surface_loader,
            &instance,
            &device,
            config.vsync,
        )?;

        let mut transfer = TransferContext::new(
            device.queue,
            device.queue_family_index,
            device.memory_properties,
            device.logical.clone(),
        )?;

        let texture = TextureAtlas::load(
            &config.texture_path,
            &mut transfer,
            &device.memory_properties,
            device.logical.clone(),
        )?;
        let sampler = Sampler::new(
            device.limits.max_sampler_anisotropy,
            device.logical.clone(),
        )?;

        let vertex_data: &[u8] = bytemuck::cast_slice(&scene::QUAD_VERTICES);
        let vertex_buffer = Buffer::new_device_local(
            vertex_data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &device.memory_properties,
            device.logical.clone(),
        )?;
        transfer.upload_to_buffer(&vertex_buffer, vertex_data)?;

        let instance_data: &[u8] = bytemuck::cast_slice(&scene::DEMO_INSTANCES);
        let instance_buffer = Buffer::new_device_local(
            instance_data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &device.memory_properties,
            device.logical.clone(),
        )?;
        transfer.upload_to_buffer(&instance_buffer, instance_data)?;

        let shader = GraphicsShader::new("quad", device.logical.clone())?;
        let mut pipeline = PipelineState::new(
            &shader,
            target.surface_format.format,
            device.samples,
            device.logical.clone(),
        )?;

        let msaa_color = GpuImage::new_msaa_color(
            target.extent,
            target.surface_format.format,
            device.samples,
            &device.memory_properties,
            device.logical.clone(),
        )?;
        let depth = GpuImage::new_depth(
            target.extent,
            device.samples,
            &device.memory_properties,
            device.logical.clone(),
        )?;
        pipeline.rebuild_framebuffers(
            target.extent,
            &msaa_color,
            &depth,
            &target.image_views,
        )?;

        let frames = FrameRing::new(
            device.queue_family_index,
            target.image_count(),
            pipeline.descriptor_set_layout,
            texture.image.view,
            sampler.sampler,
            device.logical.clone(),
        )?;

        Ok(Self {
            rotation: 0.0,
            resize_requested: false,
            frames,
            pipeline,
            shader,
            depth,
            msaa_color,
            sampler,
            texture,
            instance_buffer,
            vertex_buffer,
            transfer,
            target,
            device,
            instance,
        })
    }

    /// Marks the swapchain for rebuilding before the next frame is drawn.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Renders and presents one frame, advancing the scene rotation.
    /// Does nothing while the window is minimized; drawing resumes once a
    /// resize event restores a non-zero drawable size.
    pub fn draw(&mut self) -> Result<()> {
        if self.resize_requested && !self.rebuild_swapchain()? {
            return Ok(());
        }

        let slot = self.frames.current();
        let in_flight = slot.in_flight;
        let image_available = slot.image_available;
        let render_finished = slot.render_finished;
        let command_buffer = slot.command_buffer;
        let descriptor_set = slot.descriptor_set;

        unsafe {
            self.device
                .logical
                .wait_for_fences(&[in_flight], true, u64::MAX)?;
        }

        let acquired = unsafe {
            self.target.swapchain_loader.acquire_next_image(
                self.target.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        let (image_index, suboptimal) = match acquired {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // The fence is still signaled; retry with a fresh swapchain
                // on the next call.
                self.rebuild_swapchain()?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        unsafe {
            self.device.logical.reset_fences(&[in_flight])?;
        }

        self.record_commands(command_buffer, descriptor_set, image_index)?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .logical
                .queue_submit(self.device.queue, &[submit_info], in_flight)?;
        }

        let swapchains = [self.target.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            self.target
                .swapchain_loader
                .queue_present(self.device.queue, &present_info)
        };

        self.rotation += ROTATION_PER_FRAME;
        self.frames.advance();

        match presented {
            Ok(false) if !suboptimal => Ok(()),
            Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.rebuild_swapchain().map(|_| ())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn record_commands(
        &self,
        command_buffer: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
        image_index: u32,
    ) -> Result<()> {
        let extent = self.target.extent;
        let device = &self.device.logical;

        unsafe {
            device.reset_command_buffer(
                command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
            let begin_info = vk::CommandBufferBeginInfo::default();
            device.begin_command_buffer(command_buffer, &begin_info)?;

            // Depth clears to zero because the depth test is reversed.
            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 0.0],
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 0.0,
                        stencil: 0,
                    },
                },
            ];
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.pipeline.render_pass)
                .framebuffer(self.pipeline.framebuffers[image_index as usize])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );

            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline,
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);

            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.vertex_buffer.buffer, self.instance_buffer.buffer],
                &[0, 0],
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline_layout,
                0,
                &[descriptor_set],
                &[],
            );

            let aspect = extent.width as f32 / extent.height as f32;
            let push = PushTransform {
                transform: scene::compose_transform(aspect, self.rotation),
            };
            device.cmd_push_constants(
                command_buffer,
                self.pipeline.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );

            device.cmd_draw(
                command_buffer,
                scene::QUAD_VERTICES.len() as u32,
                scene::DEMO_INSTANCES.len() as u32,
                0,
                0,
            );

            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer)?;
        }

        Ok(())
    }

    /// Tears the presentation chain down to the surface and builds it back
    /// up at the current window size. The frame ring is replaced outright so
    /// its length keeps matching the swapchain image count.
    ///
    /// Returns `false` without touching anything while the window reports a
    /// zero drawable size (minimized); the pending resize request stays set
    /// so the rebuild retries once the restoring resize event arrives.
    fn rebuild_swapchain(&mut self) -> Result<bool> {
        let size = self.target.window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.resize_requested = true;
            return Ok(false);
        }

        unsafe {
            self.device.logical.device_wait_idle()?;
        }

        self.pipeline.destroy_framebuffers();
        self.target.rebuild()?;

        self.msaa_color = GpuImage::new_msaa_color(
            self.target.extent,
            self.target.surface_format.format,
            self.device.samples,
            &self.device.memory_properties,
            self.device.logical.clone(),
        )?;
        self.depth = GpuImage::new_depth(
            self.target.extent,
            self.device.samples,
            &self.device.memory_properties,
            self.device.logical.clone(),
        )?;
        self.pipeline.rebuild_framebuffers(
            self.target.extent,
            &self.msaa_color,
            &self.depth,
            &self.target.image_views,
        )?;

        self.frames = FrameRing::new(
            self.device.queue_family_index,
            self.target.image_count(),
            self.pipeline.descriptor_set_layout,
            self.texture.image.view,
            self.sampler.sampler,
            self.device.logical.clone(),
        )?;

        self.resize_requested = false;

        Ok(true)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Outstanding frames must finish before any resource goes away.
        unsafe {
            let _ = self.device.logical.device_wait_idle();
        }
    }
}
