use std::borrow::Cow;
use std::ffi::{c_char, CStr, CString};

use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use winit::raw_window_handle::HasDisplayHandle;
use winit::window::Window;

use crate::render::hal::{Error, RendererCreateInfo, Result, Stage, StageExt};

pub(crate) const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

pub(crate) fn layer_names(enable_validation: bool) -> Vec<*const c_char> {
    if !enable_validation {
        return Vec::new();
    }
    VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
}

fn missing_layers<'a>(available: impl IntoIterator<Item = &'a CStr> + Clone, requested: &[&CStr]) -> Vec<String> {
    requested
        .iter()
        .filter(|&&wanted| !available.clone().into_iter().any(|name| name == wanted))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

unsafe fn check_validation_layer_support(entry: &Entry) -> Result<()> {
    let props = entry.enumerate_instance_layer_properties().during(Stage::EnumerateLayers)?;
    let available: Vec<&CStr> = props
        .iter()
        .map(|layer| CStr::from_ptr(layer.layer_name.as_ptr()))
        .collect();

    let missing = missing_layers(available.iter().copied(), &VALIDATION_LAYERS);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingLayers(missing))
    }
}

unsafe fn log_available_extensions(entry: &Entry) -> Result<()> {
    let props = entry
        .enumerate_instance_extension_properties(None)
        .during(Stage::EnumerateExtensions)?;

    for ext in props.iter() {
        let name = CStr::from_ptr(ext.extension_name.as_ptr());
        tracing::debug!("available instance extension: {}", name.to_string_lossy());
    }
    Ok(())
}

fn required_extensions(window: &Window, enable_validation: bool) -> Result<Vec<*const c_char>> {
    let mut res = ash_window::enumerate_required_extensions(window.display_handle()?.as_raw())
        .during(Stage::EnumerateExtensions)?
        .to_vec();

    if enable_validation {
        res.push(debug_utils::NAME.as_ptr());
    }
    Ok(res)
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message_id_number = callback_data.message_id_number;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!("{message_type:?} [{message_id_name} ({message_id_number})] : {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!("{message_type:?} [{message_id_name} ({message_id_number})] : {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::info!("{message_type:?} [{message_id_name} ({message_id_number})] : {message}");
    } else {
        tracing::trace!("{message_type:?} [{message_id_name} ({message_id_number})] : {message}");
    }

    // Never abort the call that triggered the message.
    vk::FALSE
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

pub(crate) unsafe fn create_instance(entry: &Entry, window: &Window, info: &RendererCreateInfo) -> Result<Instance> {
    if info.enable_validation {
        check_validation_layer_support(entry)?;
    }
    log_available_extensions(entry)?;

    let app_name = CString::new(info.app_name.replace('\0', "")).unwrap_or_default();
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"Prism")
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let enabled_layers = layer_names(info.enable_validation);
    let enabled_extensions = required_extensions(window, info.enable_validation)?;

    // Chained so instance creation and destruction are covered by the messenger too.
    let mut debug_info = debug_messenger_info();

    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&enabled_layers)
        .enabled_extension_names(&enabled_extensions);
    if info.enable_validation {
        create_info = create_info.push_next(&mut debug_info);
    }

    let instance = entry.create_instance(&create_info, None).during(Stage::CreateInstance)?;
    tracing::info!(validation = info.enable_validation, "created Vulkan instance");
    Ok(instance)
}

pub(crate) unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let messenger = loader
        .create_debug_utils_messenger(&debug_messenger_info(), None)
        .during(Stage::CreateDebugMessenger)?;
    Ok((loader, messenger))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_absent_layers() {
        let available = [c"VK_LAYER_LUNARG_api_dump", c"VK_LAYER_KHRONOS_validation"];
        assert!(missing_layers(available.iter().copied(), &VALIDATION_LAYERS).is_empty());

        let available = [c"VK_LAYER_LUNARG_api_dump"];
        assert_eq!(
            missing_layers(available.iter().copied(), &VALIDATION_LAYERS),
            vec!["VK_LAYER_KHRONOS_validation".to_owned()]
        );
    }

    #[test]
    fn layers_follow_validation_flag() {
        assert!(layer_names(false).is_empty());
        assert_eq!(layer_names(true).len(), VALIDATION_LAYERS.len());
    }
}
