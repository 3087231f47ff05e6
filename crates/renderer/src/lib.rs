//! Renderer crate for shaderbg.
//!
//! Turns a ShaderToy-style fragment (a `mainImage(out vec4, in vec2)`
//! function) into a continuously animated image on a drawable surface. The
//! flow for one mounted canvas is:
//!
//! ```text
//!   ContextProvider ──▶ GraphicsContext ──▶ ProgramCache ──┐
//!                                          (miss: compile)  │
//!                                                           ▼
//!   Ticker ──▶ RenderLoop ──▶ UniformSet::apply ──▶ GraphicsDevice::draw_quad
//!                 ▲
//!   InputTracker ─┘ (iMouse)      ResizeController ──▶ resize_buffer/viewport
//! ```
//!
//! [`ShaderCanvas`] ties these together for a single surface and hands the
//! program back through [`cleanup`] when it goes away. The engine is generic
//! over [`GraphicsDevice`]; [`gpu`] provides the wgpu implementation used by
//! the preview window and still export, [`recording`] a scriptable one.

pub mod cache;
pub mod canvas;
pub mod cleanup;
pub mod compile;
pub mod context;
pub mod device;
pub mod error;
pub mod export;
pub mod gpu;
pub mod input;
pub mod recording;
pub mod reload;
pub mod render_loop;
pub mod resize;
pub mod surface;
pub mod types;
pub mod uniforms;
pub mod window;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

pub use cache::{source_hash, CacheKey, ProgramCache, SharedProgramCache};
pub use canvas::{CanvasOptions, ShaderCanvas};
pub use cleanup::CleanupOutcome;
pub use compile::{compile_program, wrap_fragment, CompiledProgram};
pub use context::{ContextProvider, GraphicsContext};
pub use device::GraphicsDevice;
pub use error::RendererError;
pub use input::{InputTracker, MouseState, PointerEvent};
pub use render_loop::{FrameClock, FrameTiming, LoopHandle, RenderLoop};
pub use resize::{target_size, ResizeController};
pub use surface::{DrawableSurface, OffscreenSurface, SurfaceRect};
pub use types::{
    ContextId, ProgramObject, ShaderObject, ShaderStage, UniformLocation, UniformValue,
};
pub use uniforms::{FrameUniforms, UniformName, UniformSet};

/// How the renderer should present frames.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMode {
    /// Interactive preview window driven by `winit`.
    Windowed,
    /// Render one frame offscreen at `time` and write it to `path` as PNG.
    Export { path: PathBuf, time: Duration },
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Fragment text, as the user wrote it.
    pub shader_source: String,
    /// File the source came from; required for `watch`.
    pub shader_path: Option<PathBuf>,
    /// Window or image size in physical pixels.
    pub surface_size: (u32, u32),
    pub title: String,
    pub enable_cache: bool,
    pub fill_viewport: bool,
    /// Optional FPS cap; None renders on every redraw opportunity.
    pub target_fps: Option<f32>,
    /// Watch `shader_path` and reload once edits have been quiet this long.
    pub watch: Option<Duration>,
    pub mode: RenderMode,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shader_source: String::new(),
            shader_path: None,
            surface_size: (1280, 720),
            title: "shaderbg".to_string(),
            enable_cache: true,
            fill_viewport: false,
            target_fps: None,
            watch: None,
            mode: RenderMode::Windowed,
        }
    }
}

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Runs until the window closes, or until the still frame is written.
    pub fn run(&mut self) -> Result<()> {
        match &self.config.mode {
            RenderMode::Windowed => window::run(&self.config),
            RenderMode::Export { path, time } => export::run(
                &self.config.shader_source,
                self.config.surface_size,
                *time,
                path,
            ),
        }
    }
}
