//! Scored adapter selection.
//!
//! Works on capability descriptors the backend has already queried, so it
//! never touches the graphics API itself and can be exercised without a GPU.

use thiserror::Error;

use crate::render::hal::QueueCapabilities;

/// Bonus awarded to discrete adapters on top of their texture-size ceiling.
pub const DISCRETE_BONUS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn satisfies(&self, required: QueueCapabilities) -> bool {
        (!required.contains(QueueCapabilities::GRAPHICS) || self.graphics.is_some())
            && (!required.contains(QueueCapabilities::PRESENT) || self.present.is_some())
    }
}

/// What an adapter offers for presenting to one particular surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceSupport {
    pub swapchain_extension: bool,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        self.swapchain_extension && self.format_count > 0 && self.present_mode_count > 0
    }
}

#[derive(Debug, Clone)]
pub struct Adapter<H> {
    pub handle: H,
    pub name: String,
    pub device_type: AdapterType,
    pub max_image_dimension_2d: u32,
    pub supports_geometry_stage: bool,
    pub queue_families: QueueFamilyIndices,
    /// `None` when no surface was queried or the adapter can't present to it.
    pub surface: Option<SurfaceSupport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("failed to find GPUs with Vulkan support")]
    NoAdaptersFound,
    #[error("failed to find a suitable GPU")]
    NoSuitableAdapter,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceSelector {
    required: QueueCapabilities,
}

impl DeviceSelector {
    pub fn new(required: QueueCapabilities) -> Self {
        Self { required }
    }

    /// Only graphics submission is required.
    pub fn graphics() -> Self {
        Self::new(QueueCapabilities::GRAPHICS)
    }

    /// Graphics submission plus presentation to a surface with a usable swapchain.
    pub fn presentation() -> Self {
        Self::new(QueueCapabilities::GRAPHICS | QueueCapabilities::PRESENT)
    }

    pub fn required(&self) -> QueueCapabilities {
        self.required
    }

    pub fn is_suitable<H>(&self, adapter: &Adapter<H>) -> bool {
        if !adapter.queue_families.satisfies(self.required) {
            return false;
        }

        if self.required.contains(QueueCapabilities::PRESENT) {
            return adapter.surface.is_some_and(|s| s.is_adequate());
        }

        true
    }

    /// Zero means the adapter misses a hard requirement.
    pub fn rate<H>(&self, adapter: &Adapter<H>) -> u64 {
        if !adapter.supports_geometry_stage || !self.is_suitable(adapter) {
            return 0;
        }

        let mut score = 0;
        if adapter.device_type == AdapterType::Discrete {
            score += DISCRETE_BONUS;
        }
        score + u64::from(adapter.max_image_dimension_2d)
    }

    /// Picks the highest-rated adapter. Among equal scores the one enumerated
    /// first wins.
    pub fn select_best<'a, H>(&self, adapters: &'a [Adapter<H>]) -> Result<&'a Adapter<H>, SelectionError> {
        if adapters.is_empty() {
            return Err(SelectionError::NoAdaptersFound);
        }

        let mut best: Option<(u64, &Adapter<H>)> = None;
        for adapter in adapters {
            let score = self.rate(adapter);
            tracing::debug!(adapter = %adapter.name, score, "rated adapter");

            if score == 0 {
                continue;
            }
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, adapter));
            }
        }

        let (score, adapter) = best.ok_or(SelectionError::NoSuitableAdapter)?;
        tracing::info!(adapter = %adapter.name, score, "selected adapter");
        Ok(adapter)
    }
}
