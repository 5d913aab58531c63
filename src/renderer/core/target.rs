use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use winit::window::Window;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;

use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;

/// Presentation target of the renderer, encapsulating the window, surface,
/// and swapchain.
pub struct RenderTarget {
    pub window: Arc<Window>,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub surface_format: vk::SurfaceFormatKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,

    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,

    physical: vk::PhysicalDevice,
    device: Arc<ash::Device>,
}

impl RenderTarget {
    pub fn new(
        window: Arc<Window>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        ins: &RenderInstance,
        dev: &RenderDevice,
        vsync: bool,
    ) -> Result<Self> {
        let surface_format = Self::pick_surface_format(
            &surface_loader,
            dev.physical,
            surface,
        )?;

        let present_mode = if vsync {
            vk::PresentModeKHR::FIFO
        } else {
            vk::PresentModeKHR::IMMEDIATE
        };

        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(dev.physical, surface)?
        };
        let size = window.inner_size();
        let extent = negotiate_extent(size.width, size.height, &capabilities)
            .ok_or_eyre("Window reports a zero drawable size")?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&ins.instance, &dev.logical);

        let mut target = Self {
            window,
            surface,
            surface_loader,
            surface_format,
            capabilities,
            extent,
            present_mode,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            physical: dev.physical,
            device: dev.logical.clone(),
        };
        target.build_swapchain()?;

        Ok(target)
    }

    /// Number of swapchain images (equals the frame ring length).
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Tears down the old swapchain and builds a new one against a freshly
    /// negotiated extent. The caller must have waited for the device to go
    /// idle, destroyed every framebuffer referencing the old views, and
    /// checked that the window has a non-zero drawable size.
    pub fn rebuild(&mut self) -> Result<()> {
        self.teardown_swapchain();

        self.capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical, self.surface)?
        };
        let size = self.window.inner_size();
        self.extent = negotiate_extent(size.width, size.height, &self.capabilities)
            .ok_or_eyre("Window reports a zero drawable size")?;

        self.build_swapchain()?;

        log::debug!(
            "Rebuilt swapchain at {}x{} with {} images",
            self.extent.width,
            self.extent.height,
            self.images.len(),
        );

        Ok(())
    }

    fn pick_surface_format(
        surface_loader: &ash::khr::surface::Instance,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceFormatKHR> {
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, surface)?
        };

        // The device selector already gated on this format being present.
        surface_formats
            .into_iter()
            .find(|format| {
                format.format == vk::Format::B8G8R8A8_SRGB
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .ok_or_eyre("No suitable surface format found")
    }

    fn build_swapchain(&mut self) -> Result<()> {
        let min_image_count = image_count_for(&self.capabilities);

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(min_image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(self.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .image_array_layers(1);

        self.swapchain = unsafe {
            self.swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        self.images = unsafe {
            self.swapchain_loader.get_swapchain_images(self.swapchain)?
        };
        self.image_views = self.images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe {
                    self.device.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok(())
    }

    /// Views first, then the swapchain itself.
    fn teardown_swapchain(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.images.clear();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.teardown_swapchain();
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Clamps the drawable size into the surface capability bounds. `None`
/// while the window is minimized and reports a zero size; the caller must
/// then return to the event loop instead of blocking, so the resize event
/// restoring the window can actually be delivered.
pub(crate) fn negotiate_extent(
    width: u32,
    height: u32,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> Option<vk::Extent2D> {
    if width == 0 || height == 0 {
        return None;
    }
    Some(clamp_extent(width, height, capabilities))
}

pub(crate) fn clamp_extent(
    width: u32,
    height: u32,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `max(min(3, capMax), capMin)`, where a zero `max_image_count` means the
/// surface imposes no upper bound.
pub(crate) fn image_count_for(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max = if capabilities.max_image_count == 0 {
        u32::MAX
    } else {
        capabilities.max_image_count
    };
    3u32.min(max).max(capabilities.min_image_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(
        min_extent: (u32, u32),
        max_extent: (u32, u32),
        min_images: u32,
        max_images: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D {
                width: min_extent.0,
                height: min_extent.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_extent.0,
                height: max_extent.1,
            },
            min_image_count: min_images,
            max_image_count: max_images,
            ..Default::default()
        }
    }

    #[test]
    fn oversized_window_clamps_to_capability_max() {
        let caps = capabilities((1, 1), (4096, 4096), 2, 8);
        let extent = clamp_extent(7680, 4320, &caps);
        assert_eq!(extent.width, 4096);
        assert_eq!(extent.height, 4096);
    }

    #[test]
    fn extent_components_clamp_independently() {
        let caps = capabilities((640, 480), (4096, 4096), 2, 8);
        let extent = clamp_extent(320, 2160, &caps);
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 2160);
    }

    #[test]
    fn extent_never_zero_for_nonzero_minimum() {
        let caps = capabilities((1, 1), (4096, 4096), 2, 8);
        let extent = clamp_extent(1, 1, &caps);
        assert!(extent.width >= 1 && extent.height >= 1);
    }

    #[test]
    fn minimized_window_defers_negotiation() {
        let caps = capabilities((1, 1), (4096, 4096), 2, 8);
        assert_eq!(negotiate_extent(0, 0, &caps), None);
        assert_eq!(negotiate_extent(1280, 0, &caps), None);
        assert_eq!(negotiate_extent(0, 720, &caps), None);
    }

    #[test]
    fn restored_window_negotiates_clamped_extent() {
        let caps = capabilities((640, 480), (4096, 4096), 2, 8);
        assert_eq!(
            negotiate_extent(320, 2160, &caps),
            Some(vk::Extent2D {
                width: 640,
                height: 2160,
            })
        );
    }

    #[test]
    fn image_count_prefers_three() {
        assert_eq!(image_count_for(&capabilities((1, 1), (1, 1), 2, 8)), 3);
    }

    #[test]
    fn image_count_respects_capability_maximum() {
        assert_eq!(image_count_for(&capabilities((1, 1), (1, 1), 1, 2)), 2);
    }

    #[test]
    fn image_count_respects_capability_minimum() {
        assert_eq!(image_count_for(&capabilities((1, 1), (1, 1), 4, 8)), 4);
    }

    #[test]
    fn unbounded_capability_maximum_yields_three() {
        assert_eq!(image_count_for(&capabilities((1, 1), (1, 1), 2, 0)), 3);
    }
}
