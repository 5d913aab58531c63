use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Vertex and fragment shader modules for one graphics pipeline, loaded from
/// the SPIR-V files the build script emits into `shaders-built/`.
pub struct GraphicsShader {
    pub vert_module: vk::ShaderModule,
    pub frag_module: vk::ShaderModule,

    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let vert_module = Self::load_module(
            &format!("shaders-built/{}.vert.spv", name),
            device.clone(),
        )?;
        let frag_module = Self::load_module(
            &format!("shaders-built/{}.frag.spv", name),
            device.clone(),
        )?;

        Ok(Self {
            vert_module,
            frag_module,
            device,
        })
    }

    fn load_module(path: &str, device: Arc<ash::Device>) -> Result<vk::ShaderModule> {
        let bytes = std::fs::read(path)
            .map_err(|err| eyre!("Failed to read shader {}: {}", path, err))?;
        let code = ash::util::read_spv(&mut std::io::Cursor::new(&bytes))
            .map_err(|err| eyre!("Shader {} is not valid SPIR-V: {}", path, err))?;

        let module_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe {
            device.create_shader_module(&module_info, None)?
        };

        Ok(module)
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_module, None);
            self.device.destroy_shader_module(self.frag_module, None);
        }
    }
}
