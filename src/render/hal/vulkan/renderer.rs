use std::collections::BTreeSet;

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Device, Entry, Instance};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

use crate::render::hal;
use crate::render::hal::vulkan::adapter::{enumerate_adapters, SurfaceTarget};
use crate::render::hal::vulkan::instance::{create_debug_messenger, create_instance, layer_names};
use crate::render::hal::vulkan::swapchain::Swapchain;
use crate::render::hal::{Adapter, DeviceSelector, QueueFamilyIndices, RendererCreateInfo, Result, Stage, StageExt};

pub struct VulkanRenderer<'w> {
    // Never read; keeps the loader alive for the instance's lifetime.
    #[allow(dead_code)]
    pub(crate) entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) debug_messenger: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    pub(crate) surface_loader: surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,

    pub(crate) adapter: Adapter<vk::PhysicalDevice>,
    pub(crate) graphics_family_idx: u32,
    pub(crate) present_family_idx: u32,

    pub(crate) device: Device,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,

    pub(crate) swapchain: Swapchain,

    window: &'w Window,
}

/// Destroys partially-built backend objects in reverse creation order
/// unless disarmed.
#[derive(Default)]
struct Rollback {
    steps: Vec<Box<dyn FnOnce()>>,
}

impl Rollback {
    fn push(&mut self, step: impl FnOnce() + 'static) {
        self.steps.push(Box::new(step));
    }

    fn disarm(&mut self) {
        self.steps.clear();
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            tracing::debug!("rolling back {} bootstrap step(s)", self.steps.len());
        }
        while let Some(step) = self.steps.pop() {
            step();
        }
    }
}

fn unique_families(families: QueueFamilyIndices) -> BTreeSet<u32> {
    families.graphics.into_iter().chain(families.present).collect()
}

unsafe fn create_logical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilyIndices,
    enable_validation: bool,
) -> Result<Device> {
    let priorities = [1.0];

    let queue_infos: Vec<_> = unique_families(families)
        .into_iter()
        .map(|idx| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(idx)
                .queue_priorities(&priorities)
        })
        .collect();

    let device_extension_names_raw = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    // Older loaders still read device-level layers.
    let enabled_layers = layer_names(enable_validation);

    #[allow(deprecated)]
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_layer_names(&enabled_layers)
        .enabled_extension_names(&device_extension_names_raw)
        .enabled_features(&features);

    instance
        .create_device(physical_device, &device_create_info, None)
        .during(Stage::CreateDevice)
}

impl<'w> VulkanRenderer<'w> {
    pub fn adapter(&self) -> &Adapter<vk::PhysicalDevice> {
        &self.adapter
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn graphics_queue(&self) -> (u32, vk::Queue) {
        (self.graphics_family_idx, self.graphics_queue)
    }

    pub fn present_queue(&self) -> (u32, vk::Queue) {
        (self.present_family_idx, self.present_queue)
    }

    pub fn window(&self) -> &Window {
        self.window
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.during(Stage::WaitIdle)
    }
}

impl<'w> hal::Renderer<'w> for VulkanRenderer<'w> {
    fn new(window: &'w Window, info: &RendererCreateInfo) -> Result<Box<Self>> {
        unsafe {
            let entry = Entry::linked();
            let mut rollback = Rollback::default();

            let instance = create_instance(&entry, window, info)?;
            let owned = instance.clone();
            rollback.push(move || owned.destroy_instance(None));

            let debug_messenger = if info.enable_validation {
                let (loader, messenger) = create_debug_messenger(&entry, &instance)?;
                let owned = loader.clone();
                rollback.push(move || owned.destroy_debug_utils_messenger(messenger, None));
                Some((loader, messenger))
            } else {
                None
            };

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )
            .during(Stage::CreateSurface)?;

            let surface_loader = surface::Instance::new(&entry, &instance);
            let owned = surface_loader.clone();
            rollback.push(move || owned.destroy_surface(surface, None));

            let target = SurfaceTarget { loader: &surface_loader, surface };
            let adapters = enumerate_adapters(&instance, Some(target))?;
            let adapter = DeviceSelector::presentation().select_best(&adapters)?.clone();

            let (graphics_family_idx, present_family_idx) =
                match (adapter.queue_families.graphics, adapter.queue_families.present) {
                    (Some(g), Some(p)) => (g, p),
                    _ => return Err(hal::SelectionError::NoSuitableAdapter.into()),
                };

            let device = create_logical_device(&instance, adapter.handle, adapter.queue_families, info.enable_validation)?;
            let owned = device.clone();
            rollback.push(move || owned.destroy_device(None));

            let graphics_queue = device.get_device_queue(graphics_family_idx, 0);
            let present_queue = device.get_device_queue(present_family_idx, 0);

            let size = window.inner_size();
            let window_size = if size.width == 0 || size.height == 0 {
                info.extent
            } else {
                (size.width, size.height)
            };

            let swapchain = Swapchain::new(
                &instance,
                &device,
                adapter.handle,
                &surface_loader,
                surface,
                adapter.queue_families,
                window_size,
            )?;

            // From here on Drop owns teardown.
            rollback.disarm();

            tracing::info!(
                adapter = %adapter.name,
                graphics_family_idx,
                present_family_idx,
                "renderer initialized"
            );

            Ok(Box::new(Self {
                entry,
                instance,
                debug_messenger,
                surface_loader,
                surface,
                adapter,
                graphics_family_idx,
                present_family_idx,
                device,
                graphics_queue,
                present_queue,
                swapchain,
                window,
            }))
        }
    }
}

impl<'w> Drop for VulkanRenderer<'w> {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.swapchain.destroy(&self.device);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, Rollback) {
        (Rc::new(RefCell::new(Vec::new())), Rollback::default())
    }

    #[test]
    fn failed_bootstrap_unwinds_in_reverse() {
        let (log, mut rollback) = recorder();
        for name in ["instance", "messenger", "surface", "device"] {
            let log = log.clone();
            rollback.push(move || log.borrow_mut().push(name));
        }
        drop(rollback);
        assert_eq!(*log.borrow(), vec!["device", "surface", "messenger", "instance"]);
    }

    #[test]
    fn early_return_unwinds_completed_steps() {
        let (log, _) = recorder();
        let bootstrap = |fail_at_selection: bool| -> std::result::Result<(), hal::SelectionError> {
            let mut rollback = Rollback::default();
            for name in ["instance", "surface"] {
                let log = log.clone();
                rollback.push(move || log.borrow_mut().push(name));
            }
            if fail_at_selection {
                return Err(hal::SelectionError::NoSuitableAdapter);
            }
            rollback.disarm();
            Ok(())
        };

        assert!(bootstrap(false).is_ok());
        assert!(log.borrow().is_empty());

        assert_eq!(bootstrap(true), Err(hal::SelectionError::NoSuitableAdapter));
        assert_eq!(*log.borrow(), vec!["surface", "instance"]);
    }

    #[test]
    fn disarmed_rollback_does_nothing() {
        let (log, mut rollback) = recorder();
        let step_log = log.clone();
        rollback.push(move || step_log.borrow_mut().push("instance"));
        rollback.disarm();
        drop(rollback);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn shared_family_creates_one_queue() {
        let families = QueueFamilyIndices { graphics: Some(1), present: Some(1) };
        assert_eq!(unique_families(families).into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn split_families_create_two_queues() {
        let families = QueueFamilyIndices { graphics: Some(2), present: Some(0) };
        assert_eq!(unique_families(families).into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }
}
