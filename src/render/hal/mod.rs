use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;
use winit::raw_window_handle::HandleError;
use winit::window::Window;

pub mod selector;
pub mod vulkan;

pub use selector::{Adapter, AdapterType, DeviceSelector, QueueFamilyIndices, SelectionError, SurfaceSupport};

/// Bootstrap step a backend call belongs to, reported with its failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnumerateLayers,
    EnumerateExtensions,
    CreateInstance,
    CreateDebugMessenger,
    CreateSurface,
    EnumerateAdapters,
    QueryAdapter,
    CreateDevice,
    CreateSwapchain,
    CreateImageViews,
    CreateShaderModule,
    WaitIdle,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::EnumerateLayers => "layer enumeration",
            Stage::EnumerateExtensions => "extension enumeration",
            Stage::CreateInstance => "instance creation",
            Stage::CreateDebugMessenger => "debug messenger creation",
            Stage::CreateSurface => "surface creation",
            Stage::EnumerateAdapters => "adapter enumeration",
            Stage::QueryAdapter => "adapter query",
            Stage::CreateDevice => "logical device creation",
            Stage::CreateSwapchain => "swapchain creation",
            Stage::CreateImageViews => "swapchain image view creation",
            Stage::CreateShaderModule => "shader module creation",
            Stage::WaitIdle => "device idle wait",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("{stage} failed: {source}")]
    BackendCallFailed {
        stage: Stage,
        #[source]
        source: vk::Result,
    },

    #[error("validation layers requested, but not available: {}", .0.join(", "))]
    MissingLayers(Vec<String>),

    #[error("invalid window handle: {0}")]
    Window(#[from] HandleError),

    #[error("failed to read shader binary {}: {source}", path.display())]
    Shader {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tags a raw backend result with the bootstrap stage it came from.
pub(crate) trait StageExt<T> {
    fn during(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for std::result::Result<T, vk::Result> {
    fn during(self, stage: Stage) -> Result<T> {
        self.map_err(|source| Error::BackendCallFailed { stage, source })
    }
}

pub const VALIDATION_ENV: &str = "PRISM_VALIDATION";

#[derive(Debug, Clone)]
pub struct RendererCreateInfo {
    pub app_name: String,
    pub enable_validation: bool,
    /// Fallback swapchain extent when the surface leaves it to the application.
    pub extent: (u32, u32),
}

impl Default for RendererCreateInfo {
    fn default() -> Self {
        Self {
            app_name: "prism".to_owned(),
            enable_validation: cfg!(debug_assertions),
            extent: (800, 600),
        }
    }
}

impl RendererCreateInfo {
    /// Defaults, with the validation flag overridable through `PRISM_VALIDATION`.
    pub fn from_env() -> Self {
        let mut info = Self::default();
        if let Ok(value) = std::env::var(VALIDATION_ENV) {
            match parse_flag(&value) {
                Some(flag) => info.enable_validation = flag,
                None => tracing::warn!("ignoring unrecognized {VALIDATION_ENV}={value:?}"),
            }
        }
        info
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

bitflags::bitflags! {
    /// Operation classes a device must expose through its queue families.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueCapabilities: u8 {
        const GRAPHICS = 0x1;
        const PRESENT = 0x2;
    }
}

pub trait Renderer<'w>: Sized {
    fn new(window: &'w Window, info: &RendererCreateInfo) -> Result<Box<Self>>;
}
