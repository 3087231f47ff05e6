//! wgpu backend for the shader engine.
//!
//! - `context` acquires adapters/devices and binds them to a window swapchain
//!   or an offscreen texture.
//! - `device` implements [`GraphicsDevice`](crate::GraphicsDevice): GLSL
//!   modules stand in for shader objects, render pipelines for programs.
//! - `uniforms` mirrors the std140 `ShaderParams` block.
//! - `readback` copies offscreen frames back for export and tests.

mod context;
mod device;
mod readback;
mod uniforms;

pub use context::WgpuProvider;
pub use device::WgpuDevice;
