use std::ffi::CStr;

use ash::khr::{surface, swapchain};
use ash::{vk, Instance};

use crate::render::hal::{Adapter, AdapterType, QueueFamilyIndices, Result, Stage, StageExt, SurfaceSupport};

/// Surface that adapters are probed against for presentation support.
#[derive(Clone, Copy)]
pub(crate) struct SurfaceTarget<'a> {
    pub loader: &'a surface::Instance,
    pub surface: vk::SurfaceKHR,
}

pub(crate) fn adapter_type(device_type: vk::PhysicalDeviceType) -> AdapterType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterType::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterType::Cpu,
        _ => AdapterType::Other,
    }
}

fn has_extension(props: &[vk::ExtensionProperties], required: &CStr) -> bool {
    props.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == required
    })
}

/// Chooses graphics and present families, preferring one family that does both.
fn assign_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut presents: impl FnMut(u32) -> Result<bool>,
) -> Result<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (idx, family) in families.iter().enumerate() {
        let idx = idx as u32;
        let usable = family.queue_count > 0;
        let graphics = usable && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = usable && presents(idx)?;

        if graphics && present {
            return Ok(QueueFamilyIndices { graphics: Some(idx), present: Some(idx) });
        }
        if graphics && indices.graphics.is_none() {
            indices.graphics = Some(idx);
        }
        if present && indices.present.is_none() {
            indices.present = Some(idx);
        }
    }

    Ok(indices)
}

unsafe fn find_queue_families(
    instance: &Instance,
    device: vk::PhysicalDevice,
    target: Option<SurfaceTarget<'_>>,
) -> Result<QueueFamilyIndices> {
    let props = instance.get_physical_device_queue_family_properties(device);

    assign_queue_families(&props, |idx| match target {
        Some(t) => t
            .loader
            .get_physical_device_surface_support(device, idx, t.surface)
            .during(Stage::QueryAdapter),
        None => Ok(false),
    })
}

unsafe fn query_surface_support(
    instance: &Instance,
    device: vk::PhysicalDevice,
    target: SurfaceTarget<'_>,
) -> Result<SurfaceSupport> {
    let extensions = instance
        .enumerate_device_extension_properties(device)
        .during(Stage::QueryAdapter)?;

    if !has_extension(&extensions, swapchain::NAME) {
        return Ok(SurfaceSupport::default());
    }

    let formats = target
        .loader
        .get_physical_device_surface_formats(device, target.surface)
        .during(Stage::QueryAdapter)?;
    let present_modes = target
        .loader
        .get_physical_device_surface_present_modes(device, target.surface)
        .during(Stage::QueryAdapter)?;

    Ok(SurfaceSupport {
        swapchain_extension: true,
        format_count: formats.len(),
        present_mode_count: present_modes.len(),
    })
}

unsafe fn probe(
    instance: &Instance,
    device: vk::PhysicalDevice,
    target: Option<SurfaceTarget<'_>>,
) -> Result<Adapter<vk::PhysicalDevice>> {
    let properties = instance.get_physical_device_properties(device);
    let features = instance.get_physical_device_features(device);

    let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy().into_owned();
    let queue_families = find_queue_families(instance, device, target)?;
    let surface = match target {
        Some(t) => Some(query_surface_support(instance, device, t)?),
        None => None,
    };

    Ok(Adapter {
        handle: device,
        name,
        device_type: adapter_type(properties.device_type),
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        supports_geometry_stage: features.geometry_shader == vk::TRUE,
        queue_families,
        surface,
    })
}

/// Materializes every physical device into a selector-ready descriptor.
pub(crate) unsafe fn enumerate_adapters(
    instance: &Instance,
    target: Option<SurfaceTarget<'_>>,
) -> Result<Vec<Adapter<vk::PhysicalDevice>>> {
    let devices = instance.enumerate_physical_devices().during(Stage::EnumerateAdapters)?;
    tracing::debug!("found {} physical device(s)", devices.len());

    devices.iter().map(|&device| probe(instance, device, target)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties { queue_flags: flags, queue_count: 1, ..Default::default() }
    }

    #[test]
    fn maps_device_types() {
        assert_eq!(adapter_type(vk::PhysicalDeviceType::DISCRETE_GPU), AdapterType::Discrete);
        assert_eq!(adapter_type(vk::PhysicalDeviceType::INTEGRATED_GPU), AdapterType::Integrated);
        assert_eq!(adapter_type(vk::PhysicalDeviceType::VIRTUAL_GPU), AdapterType::Virtual);
        assert_eq!(adapter_type(vk::PhysicalDeviceType::CPU), AdapterType::Cpu);
        assert_eq!(adapter_type(vk::PhysicalDeviceType::OTHER), AdapterType::Other);
    }

    #[test]
    fn prefers_family_with_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = assign_queue_families(&families, |idx| Ok(idx != 1)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(2), present: Some(2) });
    }

    #[test]
    fn falls_back_to_separate_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];
        let indices = assign_queue_families(&families, |idx| Ok(idx == 1)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(0), present: Some(1) });
    }

    #[test]
    fn without_surface_only_graphics_is_found() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::GRAPHICS)];
        let indices = assign_queue_families(&families, |_| Ok(false)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: None });
    }

    #[test]
    fn empty_families_are_skipped() {
        let empty = vk::QueueFamilyProperties { queue_flags: vk::QueueFlags::GRAPHICS, ..Default::default() };
        let indices = assign_queue_families(&[empty], |_| Ok(false)).unwrap();
        assert_eq!(indices.graphics, None);
    }

    #[test]
    fn empty_family_never_presents() {
        let empty = vk::QueueFamilyProperties { queue_flags: vk::QueueFlags::COMPUTE, ..Default::default() };
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = assign_queue_families(&families, |idx| Ok(idx == 0)).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: None });
    }

    #[test]
    fn present_query_failure_propagates() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = assign_queue_families(&families, |_| Err::<bool, _>(vk::Result::ERROR_SURFACE_LOST_KHR).during(Stage::QueryAdapter))
            .unwrap_err();
        assert!(err.to_string().contains("adapter query"));
    }
}
