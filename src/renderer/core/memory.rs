use std::error::Error;
use std::fmt;
use ash::vk;

/// No memory type satisfied both the requirement mask and the requested
/// property flags. Always a startup-environment defect, never transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoSuitableMemoryType {
    pub type_bits: u32,
    pub required: vk::MemoryPropertyFlags,
}

impl fmt::Display for NoSuitableMemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No memory type matches requirement bits {:#b} with properties {:?}",
            self.type_bits, self.required,
        )
    }
}

impl Error for NoSuitableMemoryType {}

/// Selects the lowest memory type index whose bit is set in `type_bits` and
/// whose property flags are a superset of `required`. Deterministic: the
/// same inputs always yield the same index.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, NoSuitableMemoryType> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0
                && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
        .ok_or(NoSuitableMemoryType {
            type_bits,
            required,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn lowest_matching_index_wins() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Ok(1));
    }

    #[test]
    fn requirement_mask_excludes_types() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        // Type 0 matches the flags but is excluded by the mask.
        let index = find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(index, Ok(1));
    }

    #[test]
    fn property_flags_must_be_superset() {
        let props = properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let result = find_memory_type(
            &props,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(
            result,
            Err(NoSuitableMemoryType {
                type_bits: 0b1,
                required: vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            })
        );
    }

    #[test]
    fn selection_is_deterministic() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let first = find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        for _ in 0..16 {
            assert_eq!(
                find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL),
                first,
            );
        }
        assert_eq!(first, Ok(0));
    }
}
