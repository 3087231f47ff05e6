use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use scheduler::{FramePacer, Ticker};
use winit::dpi::{LogicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window, WindowBuilder};

use crate::cache::ProgramCache;
use crate::canvas::{CanvasOptions, ShaderCanvas};
use crate::gpu::{WgpuDevice, WgpuProvider};
use crate::input::PointerEvent;
use crate::reload::ShaderWatch;
use crate::surface::{DrawableSurface, SurfaceRect};
use crate::RendererConfig;

/// A winit window as a drawable surface. Client coordinates are the
/// window's logical content area, so the origin is always `(0, 0)`.
#[derive(Debug, Clone)]
pub struct WindowSurface {
    window: Arc<Window>,
}

impl WindowSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl DrawableSurface for WindowSurface {
    fn bounding_rect(&self) -> SurfaceRect {
        let size = self
            .window
            .inner_size()
            .to_logical::<f64>(self.window.scale_factor());
        SurfaceRect::new(0.0, 0.0, size.width, size.height)
    }

    fn device_pixel_ratio(&self) -> Option<f64> {
        Some(self.window.scale_factor())
    }
}

/// Opens the preview window and drives the shader until it is closed.
///
/// Compile errors do not end the session: they are logged, the window keeps
/// its last frame, and a watched file can fix things on the next save.
pub(crate) fn run(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let mut builder = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1));
    if config.fill_viewport {
        builder = builder.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    let window = builder
        .build(&event_loop)
        .context("failed to create preview window")?;
    let surface = WindowSurface::new(Arc::new(window));

    let ticker = Ticker::new();
    let mut provider = WgpuProvider::new();
    let options = CanvasOptions {
        enable_cache: config.enable_cache,
        fill_viewport: config.fill_viewport,
    };
    let mut canvas: Option<ShaderCanvas<WgpuDevice>> = Some(ShaderCanvas::mount(
        &mut provider,
        &surface,
        &config.shader_source,
        options,
        ProgramCache::shared(),
        &ticker,
    ));
    if let Some(err) = canvas.as_ref().and_then(ShaderCanvas::error) {
        if canvas.as_ref().and_then(ShaderCanvas::context).is_none() {
            return Err(anyhow!("failed to initialise window renderer: {err}"));
        }
        tracing::error!("{err}");
    }

    let mut pacer = FramePacer::new(config.target_fps);
    let mut watch = match (&config.shader_path, config.watch) {
        (Some(path), Some(debounce)) => {
            let proxy = event_loop.create_proxy();
            match ShaderWatch::new(path, debounce, move || {
                let _ = proxy.send_event(());
            }) {
                Ok(watch) => Some(watch),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "hot reload disabled");
                    None
                }
            }
        }
        _ => None,
    };
    let mut cursor = LogicalPosition::new(0.0_f64, 0.0_f64);
    surface.window().request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == surface.window().id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        if let Some(canvas) = canvas.take() {
                            canvas.unmount();
                        }
                        elwt.exit();
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position.to_logical(surface.window().scale_factor());
                        if let Some(canvas) = &canvas {
                            canvas.pointer_event(
                                &surface,
                                PointerEvent::Moved {
                                    client_x: cursor.x,
                                    client_y: cursor.y,
                                },
                            );
                        }
                    }
                    WindowEvent::MouseInput {
                        state: ElementState::Pressed,
                        button: MouseButton::Left,
                        ..
                    } => {
                        if let Some(canvas) = &canvas {
                            canvas.pointer_event(
                                &surface,
                                PointerEvent::Pressed {
                                    client_x: cursor.x,
                                    client_y: cursor.y,
                                },
                            );
                        }
                    }
                    WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                        if let Some(canvas) = canvas.as_mut() {
                            if canvas.resize(&surface) {
                                surface.window().request_redraw();
                            }
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        paced_tick(&ticker, &mut pacer, Instant::now());
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                let now = Instant::now();
                if let (Some(watch), Some(canvas)) = (watch.as_mut(), canvas.as_mut()) {
                    if let Some(source) = watch.poll(now) {
                        canvas.set_source(&surface, &source);
                        if let Some(err) = canvas.error() {
                            tracing::error!(path = %watch.path().display(), "{err}");
                        }
                    }
                }

                let running = canvas.as_ref().is_some_and(ShaderCanvas::is_running);
                if running && pacer.ready_for_frame(now) {
                    surface.window().request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                } else {
                    let frame = pacer.next_deadline().filter(|_| running);
                    let reload = watch.as_ref().and_then(ShaderWatch::next_check);
                    match frame.into_iter().chain(reload).min() {
                        Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                        None => elwt.set_control_flow(ControlFlow::Wait),
                    }
                }
            }
            _ => {}
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}

/// Runs one frame unless the FPS cap says it is too early. Redraws the
/// compositor asks for (expose, resize) go through here too.
fn paced_tick(ticker: &Ticker, pacer: &mut FramePacer, now: Instant) -> usize {
    if !pacer.ready_for_frame(now) {
        return 0;
    }
    pacer.mark_rendered(now);
    ticker.tick(now).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "frame dispatch skipped");
        0
    })
}
