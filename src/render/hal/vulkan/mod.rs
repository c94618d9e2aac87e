pub mod adapter;
pub mod instance;
pub mod renderer;
pub mod shader;
pub mod swapchain;
