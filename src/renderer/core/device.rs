use std::ffi::{c_char, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Extra weight given to discrete GPUs over integrated ones.
const DISCRETE_GPU_BONUS: u32 = 1000;
/// Multiplier applied to the best supported framebuffer sample count.
const SAMPLE_COUNT_WEIGHT: u32 = 16;

const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[
    ash::khr::swapchain::NAME,
];

const REQUIRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// The selected accelerator with its logical device and submission queue.
///
/// Owns the one `ash::Device` for the lifetime of the application; every
/// other renderer object keeps a clone of the `Arc` so destruction of the
/// device itself can only happen after all of them are gone.
pub struct RenderDevice {
    pub physical: vk::PhysicalDevice,
    pub logical: Arc<ash::Device>,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub samples: vk::SampleCountFlags,
    pub limits: vk::PhysicalDeviceLimits,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

/// Everything learned about a physical device while gating and scoring it.
/// Discarded once the winner has been turned into a [`RenderDevice`].
struct Candidate {
    physical: vk::PhysicalDevice,
    score: u32,
    queue_family_index: u32,
    samples: vk::SampleCountFlags,
    limits: vk::PhysicalDeviceLimits,
}

impl RenderDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        let physical_devices = unsafe {
            instance.enumerate_physical_devices()?
        };

        let candidates = physical_devices
            .iter()
            .map(|physical| Self::evaluate(instance, *physical, surface, surface_loader))
            .collect::<Result<Vec<_>>>()?;

        let best = pick_best(candidates.iter().map(|c| {
            c.as_ref().map_or(0, |c| c.score)
        }))
            .ok_or_else(|| eyre!("No capable accelerator found"))?;
        let candidate = candidates
            .into_iter()
            .nth(best)
            .flatten()
            .ok_or_else(|| eyre!("No capable accelerator found"))?;

        let properties = unsafe {
            instance.get_physical_device_properties(candidate.physical)
        };
        log::info!(
            "Selected accelerator {:?} (score {}, {:?} samples)",
            properties.device_name_as_c_str().unwrap_or(c"?"),
            candidate.score,
            candidate.samples,
        );

        let (logical, queue) = Self::create_logical_device(instance, &candidate)?;

        let memory_properties = unsafe {
            instance.get_physical_device_memory_properties(candidate.physical)
        };

        Ok(Self {
            physical: candidate.physical,
            logical: Arc::new(logical),
            queue,
            queue_family_index: candidate.queue_family_index,
            samples: candidate.samples,
            limits: candidate.limits,
            memory_properties,
        })
    }

    /// Runs the four capability gates in order; a candidate failing any of
    /// them comes back as `None` and is excluded rather than aborting the
    /// whole selection.
    fn evaluate(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Option<Candidate>> {
        if !Self::gate_features(instance, physical) {
            return Ok(None);
        }

        let Some(queue_family_index) =
            Self::gate_queues(instance, physical, surface, surface_loader)?
        else {
            return Ok(None);
        };

        if !Self::gate_extensions(instance, physical)? {
            return Ok(None);
        }

        if !Self::gate_surface_format(physical, surface, surface_loader)? {
            return Ok(None);
        }

        let properties = unsafe {
            instance.get_physical_device_properties(physical)
        };
        let samples = max_sample_count(
            properties.limits.framebuffer_color_sample_counts,
            properties.limits.framebuffer_depth_sample_counts,
        )
            .ok_or_else(|| eyre!("Accelerator supports no multisample count"))?;

        Ok(Some(Candidate {
            physical,
            score: score_candidate(
                properties.device_type,
                samples,
                properties.limits.max_image_dimension2_d,
            ),
            queue_family_index,
            samples,
            limits: properties.limits,
        }))
    }

    fn gate_features(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
    ) -> bool {
        let features = unsafe {
            instance.get_physical_device_features(physical)
        };
        features.sampler_anisotropy == vk::TRUE
            && features.sample_rate_shading == vk::TRUE
    }

    /// One queue family must support both graphics operations and
    /// presentation to the target surface.
    fn gate_queues(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Option<u32>> {
        let queue_families = unsafe {
            instance.get_physical_device_queue_family_properties(physical)
        };

        for (i, family) in queue_families.iter().enumerate() {
            let supports_present = unsafe {
                surface_loader.get_physical_device_surface_support(
                    physical,
                    i as u32,
                    surface,
                )?
            };
            if supports_present && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                return Ok(Some(i as u32));
            }
        }

        Ok(None)
    }

    fn gate_extensions(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
    ) -> Result<bool> {
        let supported = unsafe {
            instance.enumerate_device_extension_properties(physical)?
        };

        Ok(REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
            supported
                .iter()
                .any(|ext| {
                    ext.extension_name_as_c_str()
                        .is_ok_and(|name| name == *required)
                })
        }))
    }

    fn gate_surface_format(
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<bool> {
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical, surface)?
        };

        Ok(formats.iter().any(|format| {
            format.format == REQUIRED_SURFACE_FORMAT.format
                && format.color_space == REQUIRED_SURFACE_FORMAT.color_space
        }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        candidate: &Candidate,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(candidate.queue_family_index)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .sample_rate_shading(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance.create_device(candidate.physical, &device_create_info, None)?
        };
        let queue = unsafe {
            device.get_device_queue(candidate.queue_family_index, 0)
        };

        Ok((device, queue))
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            self.logical.destroy_device(None);
        }
    }
}

/// Highest sample count supported by both the color and depth framebuffer
/// limits, capped at 16.
pub(crate) fn max_sample_count(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
) -> Option<vk::SampleCountFlags> {
    let counts = color & depth;
    [
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
        .into_iter()
        .find(|count| counts.contains(*count))
}

pub(crate) fn score_candidate(
    device_type: vk::PhysicalDeviceType,
    samples: vk::SampleCountFlags,
    max_image_dimension_2d: u32,
) -> u32 {
    let mut score = 0;

    if device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }

    score += samples.as_raw() * SAMPLE_COUNT_WEIGHT;
    score += max_image_dimension_2d;

    score
}

/// Index of the strictly highest positive score; ties resolve to the first
/// enumerated candidate. `None` when nothing scores above zero.
pub(crate) fn pick_best(scores: impl IntoIterator<Item = u32>) -> Option<usize> {
    let mut best = None;
    let mut best_score = 0;

    for (i, score) in scores.into_iter().enumerate() {
        if score > best_score {
            best = Some(i);
            best_score = score;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_gpu_outranks_integrated_with_equal_limits() {
        let discrete = score_candidate(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::SampleCountFlags::TYPE_4,
            8192,
        );
        let integrated = score_candidate(
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::SampleCountFlags::TYPE_4,
            8192,
        );
        assert_eq!(discrete - integrated, 1000);
    }

    #[test]
    fn sample_count_ladder_picks_highest_common_bit() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(
            max_sample_count(color, depth),
            Some(vk::SampleCountFlags::TYPE_4)
        );
    }

    #[test]
    fn sample_count_requires_at_least_two() {
        assert_eq!(
            max_sample_count(
                vk::SampleCountFlags::TYPE_1,
                vk::SampleCountFlags::TYPE_1,
            ),
            None
        );
    }

    #[test]
    fn best_candidate_wins_strictly() {
        assert_eq!(pick_best([100, 300, 200]), Some(1));
    }

    #[test]
    fn ties_resolve_to_first_enumerated() {
        assert_eq!(pick_best([0, 300, 300]), Some(1));
    }

    #[test]
    fn gated_out_candidates_never_win() {
        assert_eq!(pick_best([0, 0, 0]), None);
        assert_eq!(pick_best([]), None);
    }

    #[test]
    fn score_is_sum_of_terms() {
        let score = score_candidate(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::SampleCountFlags::TYPE_16,
            16384,
        );
        assert_eq!(score, 1000 + 16 * 16 + 16384);
    }
}
