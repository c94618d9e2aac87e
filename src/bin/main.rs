extern crate prism;

use anyhow::{Context, Result};
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use prism::render::hal::vulkan::renderer::VulkanRenderer;
use prism::render::hal::{Renderer, RendererCreateInfo};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let create_info = RendererCreateInfo::from_env();

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("Prism")
        .with_inner_size(LogicalSize::new(create_info.extent.0, create_info.extent.1))
        .with_resizable(false)
        .build(&event_loop)?;

    let renderer = VulkanRenderer::new(&window, &create_info).context("failed to initialize renderer")?;

    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);

        if let Event::WindowEvent { event: WindowEvent::CloseRequested, window_id } = event {
            if window_id == renderer.window().id() {
                elwt.exit();
            }
        }
    })?;

    renderer.wait_idle()?;
    tracing::info!("window closed, shutting down");
    Ok(())
}
