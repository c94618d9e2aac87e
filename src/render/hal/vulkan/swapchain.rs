use ash::khr::{surface, swapchain};
use ash::{vk, Device};

use crate::render::hal::{QueueFamilyIndices, Result, Stage, StageExt};

pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// FIFO is always available, so it is the fallback.
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, (width, height): (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    // Zero max means no upper bound.
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub struct Swapchain {
    pub(crate) loader: swapchain::Device,
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) format: vk::SurfaceFormatKHR,
    pub(crate) extent: vk::Extent2D,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    pub(crate) unsafe fn new(
        instance: &ash::Instance,
        device: &Device,
        physical_device: vk::PhysicalDevice,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        families: QueueFamilyIndices,
        window_size: (u32, u32),
    ) -> Result<Self> {
        let caps = surface_loader
            .get_physical_device_surface_capabilities(physical_device, surface)
            .during(Stage::CreateSwapchain)?;
        let formats = surface_loader
            .get_physical_device_surface_formats(physical_device, surface)
            .during(Stage::CreateSwapchain)?;
        let modes = surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .during(Stage::CreateSwapchain)?;

        // The selector already rejected adapters without formats.
        let format = choose_surface_format(&formats)
            .ok_or(vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
            .during(Stage::CreateSwapchain)?;
        let present_mode = choose_present_mode(&modes);
        let extent = choose_extent(&caps, window_size);

        let family_indices: Vec<u32> = match (families.graphics, families.present) {
            (Some(g), Some(p)) if g != p => vec![g, p],
            _ => Vec::new(),
        };
        let sharing_mode = if family_indices.is_empty() {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(choose_image_count(&caps))
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = swapchain::Device::new(instance, device);
        let swapchain = loader
            .create_swapchain(&create_info, None)
            .during(Stage::CreateSwapchain)?;

        let images = match loader.get_swapchain_images(swapchain).during(Stage::CreateSwapchain) {
            Ok(images) => images,
            Err(err) => {
                loader.destroy_swapchain(swapchain, None);
                return Err(err);
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in images.iter() {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            match device.create_image_view(&view_info, None) {
                Ok(view) => image_views.push(view),
                Err(source) => {
                    for view in image_views {
                        device.destroy_image_view(view, None);
                    }
                    loader.destroy_swapchain(swapchain, None);
                    return Err(source).during(Stage::CreateImageViews);
                }
            }
        }

        tracing::info!(
            format = ?format.format,
            ?present_mode,
            width = extent.width,
            height = extent.height,
            images = images.len(),
            "created swapchain"
        );

        Ok(Self { loader, swapchain, format, extent, images, image_views })
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Must run before the owning device is destroyed.
    pub(crate) unsafe fn destroy(&mut self, device: &Device) {
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.loader.destroy_swapchain(self.swapchain, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: 100, height: 100 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn prefers_srgb_bgra() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_when_offered_else_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn uses_current_extent_unless_sentinel() {
        assert_eq!(choose_extent(&caps((640, 480), 2, 3), (800, 600)), vk::Extent2D { width: 640, height: 480 });

        let free = caps((u32::MAX, u32::MAX), 2, 3);
        assert_eq!(choose_extent(&free, (800, 600)), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(choose_extent(&free, (4000, 10)), vk::Extent2D { width: 1920, height: 100 });
    }

    #[test]
    fn image_count_one_above_minimum_within_bounds() {
        assert_eq!(choose_image_count(&caps((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 3, 3)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 2, 0)), 3);
    }
}
