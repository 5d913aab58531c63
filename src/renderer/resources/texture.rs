use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{ensure, eyre, OptionExt};
use color_eyre::Result;
use smallvec::SmallVec;

use crate::renderer::core::transfer::TransferContext;
use crate::renderer::resources::image::GpuImage;

/// A tile atlas uploaded as a 2D array image, one tile per layer.
///
/// The tile grid is parsed from the file name, which must follow the
/// `<tileWidth>x<tileHeight>x<layerCount>.<ext>` pattern. Layer `i` is read
/// from grid cell `(i % columns, i / columns)`.
pub struct TextureAtlas {
    pub image: GpuImage,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl TextureAtlas {
    pub fn load(
        path: &Path,
        transfer: &mut TransferContext,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let (tile_width, tile_height, layers) = parse_atlas_name(path)?;

        let decoded = image::open(path)?.to_rgba8();
        let (atlas_width, atlas_height) = decoded.dimensions();

        ensure!(
            atlas_width % tile_width == 0 && atlas_height % tile_height == 0,
            "Atlas {}x{} does not divide evenly into {}x{} tiles",
            atlas_width,
            atlas_height,
            tile_width,
            tile_height,
        );

        let columns = atlas_width / tile_width;
        let rows = atlas_height / tile_height;
        ensure!(
            layers <= columns * rows,
            "Atlas holds {} tiles but the name declares {} layers",
            columns * rows,
            layers,
        );

        let image = GpuImage::new_texture_array(
            tile_width,
            tile_height,
            layers,
            memory_properties,
            device,
        )?;

        let regions = atlas_copy_regions(
            tile_width,
            tile_height,
            atlas_width,
            atlas_height,
            layers,
        );

        transfer.transition_image_layout(
            &image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        transfer.upload_to_image(&image, decoded.as_raw(), &regions)?;
        transfer.transition_image_layout(
            &image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        log::info!(
            "Loaded atlas {:?}: {}x{} tiles, {} layers",
            path,
            tile_width,
            tile_height,
            layers,
        );

        Ok(Self {
            image,
            tile_width,
            tile_height,
        })
    }
}

/// Nearest-filtered clamping sampler with anisotropy at the device limit.
pub struct Sampler {
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Sampler {
    pub fn new(max_anisotropy: f32, device: Arc<ash::Device>) -> Result<Self> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);

        let sampler = unsafe {
            device.create_sampler(&sampler_info, None)?
        };

        Ok(Self { sampler, device })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Parses `<tileWidth>x<tileHeight>x<layerCount>` from the last path
/// segment's stem.
pub(crate) fn parse_atlas_name(path: &Path) -> Result<(u32, u32, u32)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_eyre("Atlas path has no file name")?;
    let stem = name.split('.').next().unwrap_or(name);

    let mut parts = stem.split('x').map(|part| part.parse::<u32>());
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Ok(width)), Some(Ok(height)), Some(Ok(layers)), None)
            if width > 0 && height > 0 && layers > 0 =>
        {
            Ok((width, height, layers))
        }
        _ => Err(eyre!(
            "Atlas file name {:?} does not match <w>x<h>x<layers>.<ext>",
            name,
        )),
    }
}

/// One copy region per layer, addressing the layer's tile inside the packed
/// atlas. Offsets are in bytes of tightly packed RGBA8 data.
pub(crate) fn atlas_copy_regions(
    tile_width: u32,
    tile_height: u32,
    atlas_width: u32,
    atlas_height: u32,
    layers: u32,
) -> SmallVec<[vk::BufferImageCopy; 8]> {
    let columns = atlas_width / tile_width;

    (0..layers)
        .map(|layer| {
            let column = layer % columns;
            let row = layer / columns;
            let offset = (u64::from(row) * u64::from(tile_height) * u64::from(atlas_width)
                + u64::from(column) * u64::from(tile_width))
                * 4;

            vk::BufferImageCopy::default()
                .buffer_offset(offset)
                .buffer_row_length(atlas_width)
                .buffer_image_height(atlas_height)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: tile_width,
                    height: tile_height,
                    depth: 1,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_tile_grid_from_file_name() {
        let path = PathBuf::from("textures/32x32x4.png");
        assert_eq!(parse_atlas_name(&path).unwrap(), (32, 32, 4));
    }

    #[test]
    fn only_the_last_segment_is_parsed() {
        let path = PathBuf::from("assets/8x8x2/32x32x4.png");
        assert_eq!(parse_atlas_name(&path).unwrap(), (32, 32, 4));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(parse_atlas_name(&PathBuf::from("texture.png")).is_err());
        assert!(parse_atlas_name(&PathBuf::from("32x32.png")).is_err());
        assert!(parse_atlas_name(&PathBuf::from("32x32x4x1.png")).is_err());
        assert!(parse_atlas_name(&PathBuf::from("0x32x4.png")).is_err());
    }

    #[test]
    fn regions_walk_the_tile_grid_row_major() {
        // 128x128 atlas of 32x32 tiles: 4 columns, only 4 layers addressed.
        let regions = atlas_copy_regions(32, 32, 128, 128, 4);
        assert_eq!(regions.len(), 4);

        for (i, region) in regions.iter().enumerate() {
            assert_eq!(region.image_subresource.base_array_layer, i as u32);
            assert_eq!(region.buffer_row_length, 128);
            assert_eq!(region.image_extent.width, 32);
        }

        // The four layers all come from the first tile row.
        let offsets = regions.iter().map(|r| r.buffer_offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 128, 256, 384]);
    }

    #[test]
    fn regions_advance_by_a_full_tile_row_stride() {
        // 64x64 atlas of 32x32 tiles: 2 columns, layer 2 starts row 1.
        let regions = atlas_copy_regions(32, 32, 64, 64, 4);
        assert_eq!(regions[2].buffer_offset, 32 * 64 * 4);
        assert_eq!(regions[3].buffer_offset, (32 * 64 + 32) * 4);
    }
}
