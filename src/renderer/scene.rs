use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use std::mem::offset_of;

/// One corner of the unit quad, expanded as a triangle strip.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: Vec2,
    pub texcoord: Vec2,
}

/// Per-instance placement of a quad in the scene.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct QuadInstance {
    pub position: Vec3,
    pub dimensions: Vec2,
    pub rotation: f32,
    pub tex_index: u32,
}

/// The camera transform pushed to the vertex stage every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PushTransform {
    pub transform: Mat4,
}

/// Unit quad centered on the origin, wound for a triangle strip.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: Vec2::new(-0.5, -0.5),
        texcoord: Vec2::new(0.0, 0.0),
    },
    QuadVertex {
        position: Vec2::new(0.5, -0.5),
        texcoord: Vec2::new(1.0, 0.0),
    },
    QuadVertex {
        position: Vec2::new(-0.5, 0.5),
        texcoord: Vec2::new(0.0, 1.0),
    },
    QuadVertex {
        position: Vec2::new(0.5, 0.5),
        texcoord: Vec2::new(1.0, 1.0),
    },
];

/// A large ground plane far below the camera plus three unit quads stacked
/// along the view axis, each sampling a different atlas layer.
pub const DEMO_INSTANCES: [QuadInstance; 4] = [
    QuadInstance {
        position: Vec3::new(0.0, 0.0, -50.0),
        dimensions: Vec2::new(50.0, 50.0),
        rotation: 0.0,
        tex_index: 0,
    },
    QuadInstance {
        position: Vec3::new(0.0, 0.0, -1.0),
        dimensions: Vec2::new(1.0, 1.0),
        rotation: 0.0,
        tex_index: 1,
    },
    QuadInstance {
        position: Vec3::new(0.0, 0.0, 0.0),
        dimensions: Vec2::new(1.0, 1.0),
        rotation: 1.0,
        tex_index: 2,
    },
    QuadInstance {
        position: Vec3::new(0.0, 0.0, 1.0),
        dimensions: Vec2::new(1.0, 1.0),
        rotation: 2.0,
        tex_index: 3,
    },
];

/// Binding 0 feeds per-vertex corners, binding 1 per-instance placement.
pub fn binding_descriptions() -> [vk::VertexInputBindingDescription; 2] {
    [
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<QuadVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: 1,
            stride: size_of::<QuadInstance>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        },
    ]
}

pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 6] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(QuadVertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(QuadVertex, texcoord) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 1,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(QuadInstance, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 3,
            binding: 1,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(QuadInstance, dimensions) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 4,
            binding: 1,
            format: vk::Format::R32_SFLOAT,
            offset: offset_of!(QuadInstance, rotation) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 5,
            binding: 1,
            format: vk::Format::R32_UINT,
            offset: offset_of!(QuadInstance, tex_index) as u32,
        },
    ]
}

/// Projection, a fixed near-vertical camera, and a slow spin around the
/// vertical axis. The near/far planes are swapped for a reversed depth
/// range, which spreads precision away from the camera.
pub fn compose_transform(aspect: f32, rotation: f32) -> Mat4 {
    let projection = Mat4::perspective_lh(45f32.to_radians(), aspect, 1000.0, 0.01);
    let view = Mat4::look_at_lh(
        Vec3::new(0.0, 0.001, 3.0),
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, 1.0),
    );
    projection * view * Mat4::from_rotation_y(rotation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_shader_layout() {
        let [vertex, instance] = binding_descriptions();
        assert_eq!(vertex.stride, 16);
        assert_eq!(instance.stride, 28);
        assert_eq!(vertex.input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(instance.input_rate, vk::VertexInputRate::INSTANCE);
    }

    #[test]
    fn attributes_cover_both_bindings_in_location_order() {
        let attributes = attribute_descriptions();
        for (location, attribute) in attributes.iter().enumerate() {
            assert_eq!(attribute.location, location as u32);
        }
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[3].offset, 12);
        assert_eq!(attributes[4].offset, 20);
        assert_eq!(attributes[5].offset, 24);
    }

    #[test]
    fn instance_layer_indices_stay_within_the_default_atlas() {
        for instance in DEMO_INSTANCES {
            assert!(instance.tex_index < 4);
        }
    }

    #[test]
    fn transform_is_finite_for_common_aspects() {
        for aspect in [4.0 / 3.0, 16.0 / 9.0, 1.0] {
            let matrix = compose_transform(aspect, 0.5);
            assert!(matrix.to_cols_array().iter().all(|v| v.is_finite()));
        }
    }
}
