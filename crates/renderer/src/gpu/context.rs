use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::context::{ContextProvider, GraphicsContext};
use crate::error::RendererError;
use crate::resize::target_size;
use crate::surface::OffscreenSurface;
use crate::window::WindowSurface;

use super::device::{RenderTarget, WgpuDevice};

/// Format of offscreen targets; readback assumes 4 bytes per pixel.
pub(crate) const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Acquires wgpu-backed contexts for windows and offscreen surfaces.
#[derive(Debug, Default)]
pub struct WgpuProvider {
    _private: (),
}

impl WgpuProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unavailable(what: &str, err: impl std::fmt::Display) -> RendererError {
    RendererError::ContextUnavailable(format!("{what}: {err}"))
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), RendererError> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface,
        force_fallback_adapter: false,
    }))
    .map_err(|err| unavailable("no suitable GPU adapter", err))?;

    let info = adapter.get_info();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("shaderbg device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| unavailable("failed to create GPU device", err))?;

    Ok((adapter, device, queue))
}

fn check_dimensions(device: &wgpu::Device, width: u32, height: u32) -> Result<(), RendererError> {
    let max_dimension = device.limits().max_texture_dimension_2d;
    if width > max_dimension || height > max_dimension {
        return Err(RendererError::ContextUnavailable(format!(
            "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}"
        )));
    }
    Ok(())
}

pub(crate) fn create_target_texture(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

impl ContextProvider<WindowSurface> for WgpuProvider {
    type Device = WgpuDevice;

    fn acquire(
        &mut self,
        surface: &WindowSurface,
    ) -> Result<GraphicsContext<WgpuDevice>, RendererError> {
        let instance = create_instance();
        let window = surface.window();
        let window_handle = window
            .window_handle()
            .map_err(|err| unavailable("failed to acquire window handle", err))?;
        let display_handle = window
            .display_handle()
            .map_err(|err| unavailable("failed to acquire display handle", err))?;

        // SAFETY: the device keeps an `Arc` to the window through the
        // `WindowSurface` handle stored alongside the swapchain, so the raw
        // handles outlive the wgpu surface.
        let wgpu_surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .map_err(|err| unavailable("failed to create rendering surface", err))?;

        let (adapter, device, queue) = request_device(&instance, Some(&wgpu_surface))?;
        let (width, height) = target_size(surface);
        check_dimensions(&device, width, height)?;

        let caps = wgpu_surface.get_capabilities(&adapter);
        let Some(&first_format) = caps.formats.first() else {
            return Err(RendererError::ContextUnavailable(
                "surface reports no supported formats".into(),
            ));
        };
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                tracing::warn!(
                    fallback = ?first_format,
                    "no linear (non-sRGB) surface format available"
                );
                first_format
            });
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        wgpu_surface.configure(&device, &config);
        tracing::debug!(?format, ?present_mode, width, height, "window surface configured");

        let target = RenderTarget::Window {
            surface: wgpu_surface,
            config,
            _window: surface.clone(),
        };
        Ok(GraphicsContext::new(WgpuDevice::new(
            device,
            queue,
            target,
            format,
            (width, height),
        )))
    }
}

impl ContextProvider<OffscreenSurface> for WgpuProvider {
    type Device = WgpuDevice;

    fn acquire(
        &mut self,
        surface: &OffscreenSurface,
    ) -> Result<GraphicsContext<WgpuDevice>, RendererError> {
        let instance = create_instance();
        let (_adapter, device, queue) = request_device(&instance, None)?;
        let (width, height) = target_size(surface);
        check_dimensions(&device, width, height)?;
        let texture = create_target_texture(&device, OFFSCREEN_FORMAT, width, height);
        Ok(GraphicsContext::new(WgpuDevice::new(
            device,
            queue,
            RenderTarget::Texture { texture },
            OFFSCREEN_FORMAT,
            (width, height),
        )))
    }
}
