use std::path::PathBuf;

/// Runtime options for the renderer.
pub struct RendererConfig {
    /// Enables the Khronos validation layer and the debug messenger.
    pub enable_validation: bool,
    /// FIFO presentation when true, IMMEDIATE otherwise.
    pub vsync: bool,
    /// Tile atlas to sample from. The file name must follow the
    /// `<tileWidth>x<tileHeight>x<layerCount>.<ext>` pattern.
    pub texture_path: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            vsync: true,
            texture_path: PathBuf::from("textures/4x4x4.png"),
        }
    }
}
