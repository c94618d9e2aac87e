use std::fs::File;
use std::path::Path;

use ash::vk;

use crate::render::hal::vulkan::renderer::VulkanRenderer;
use crate::render::hal::{Error, Result, Stage, StageExt};

/// Reads a compiled SPIR-V binary. Byte order is taken from the magic number.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let shader_err = |source| Error::Shader { path: path.to_path_buf(), source };

    let mut file = File::open(path).map_err(shader_err)?;
    let code = ash::util::read_spv(&mut file).map_err(shader_err)?;

    tracing::debug!("loaded {} SPIR-V words from {}", code.len(), path.display());
    Ok(code)
}

pub struct Shader<'r, 'w> {
    pub(crate) module: vk::ShaderModule,

    renderer: &'r VulkanRenderer<'w>,
}

impl<'r, 'w> Shader<'r, 'w> {
    pub fn new(renderer: &'r VulkanRenderer<'w>, code: &[u32]) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);

        let module = unsafe { renderer.device.create_shader_module(&info, None) }.during(Stage::CreateShaderModule)?;

        Ok(Shader { module, renderer })
    }

    pub fn from_file(renderer: &'r VulkanRenderer<'w>, path: impl AsRef<Path>) -> Result<Self> {
        let code = load_spirv(path)?;
        Self::new(renderer, &code)
    }

    pub fn raw(&self) -> vk::ShaderModule {
        self.module
    }
}

impl<'r, 'w> Drop for Shader<'r, 'w> {
    fn drop(&mut self) {
        unsafe { self.renderer.device.destroy_shader_module(self.module, None); }
    }
}
