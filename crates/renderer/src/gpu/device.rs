use std::borrow::Cow;
use std::collections::HashMap;

use bytemuck::Zeroable;
use wgpu::naga::front::glsl;
use wgpu::naga::ShaderStage as NagaStage;

use crate::device::GraphicsDevice;
use crate::types::{ProgramObject, ShaderObject, ShaderStage, UniformLocation, UniformValue};
use crate::uniforms::UniformName;
use crate::window::WindowSurface;

use super::uniforms::{UniformBlock, UNIFORM_BLOCK_SIZE};

/// Where frames end up.
pub(crate) enum RenderTarget {
    /// Swapchain of an on-screen window.
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        /// Keeps the native window alive for as long as the surface.
        _window: WindowSurface,
    },
    /// Offscreen texture that supports readback.
    Texture { texture: wgpu::Texture },
}

struct ShaderEntry {
    stage: ShaderStage,
    source: String,
    module: Option<wgpu::ShaderModule>,
    log: String,
}

struct ProgramEntry {
    attached: Vec<ShaderObject>,
    pipeline: Option<wgpu::RenderPipeline>,
    block: UniformBlock,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    log: String,
}

/// [`GraphicsDevice`] backed by wgpu.
///
/// Shader objects are GLSL modules, programs are render pipelines. Each
/// program owns a uniform buffer that is rewritten before every draw.
pub struct WgpuDevice {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) target: RenderTarget,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) size: (u32, u32),
    uniform_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    viewport: (u32, u32),
    next_object: u32,
    shaders: HashMap<ShaderObject, ShaderEntry>,
    programs: HashMap<ProgramObject, ProgramEntry>,
    current: Option<ProgramObject>,
}

impl WgpuDevice {
    pub(crate) fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: RenderTarget,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shader params layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE),
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shader pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        Self {
            device,
            queue,
            target,
            format,
            size,
            uniform_layout,
            pipeline_layout,
            viewport: size,
            next_object: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current: None,
        }
    }

    fn next_object(&mut self) -> u32 {
        self.next_object += 1;
        self.next_object
    }

    fn build_pipeline(
        &self,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
    ) -> Result<wgpu::RenderPipeline, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("shader pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some("main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(pipeline),
        }
    }

    fn frame_view(&mut self) -> Option<(wgpu::TextureView, Option<wgpu::SurfaceTexture>)> {
        match &mut self.target {
            RenderTarget::Texture { texture } => Some((
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
                None,
            )),
            RenderTarget::Window { surface, config, .. } => match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    Some((view, Some(frame)))
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    tracing::debug!("surface lost or outdated; reconfiguring");
                    surface.configure(&self.device, config);
                    None
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    tracing::warn!("timed out acquiring surface frame; skipping");
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to acquire surface frame");
                    None
                }
            },
        }
    }
}

fn naga_stage(stage: ShaderStage) -> NagaStage {
    match stage {
        ShaderStage::Vertex => NagaStage::Vertex,
        ShaderStage::Fragment => NagaStage::Fragment,
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> ShaderObject {
        let shader = ShaderObject(self.next_object());
        self.shaders.insert(
            shader,
            ShaderEntry {
                stage,
                source: String::new(),
                module: None,
                log: String::new(),
            },
        );
        shader
    }

    fn shader_source(&mut self, shader: ShaderObject, source: &str) {
        if let Some(entry) = self.shaders.get_mut(&shader) {
            entry.source = source.to_string();
            entry.module = None;
        }
    }

    fn compile_shader(&mut self, shader: ShaderObject) -> bool {
        let Some(entry) = self.shaders.get_mut(&shader) else {
            return false;
        };
        let stage = naga_stage(entry.stage);

        // naga reports GLSL errors with source spans; wgpu's own validation
        // only sees the module afterwards.
        let mut frontend = glsl::Frontend::default();
        if let Err(errors) = frontend.parse(&glsl::Options::from(stage), &entry.source) {
            entry.log = errors.emit_to_string(&entry.source);
            return false;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match entry.stage {
                    ShaderStage::Vertex => "quad vertex",
                    ShaderStage::Fragment => "shader fragment",
                }),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Owned(entry.source.clone()),
                    stage,
                    defines: &[],
                },
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            entry.log = err.to_string();
            return false;
        }
        entry.log.clear();
        entry.module = Some(module);
        true
    }

    fn shader_info_log(&self, shader: ShaderObject) -> String {
        self.shaders
            .get(&shader)
            .map(|entry| entry.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderObject) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> ProgramObject {
        let program = ProgramObject(self.next_object());
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shader params"),
            size: UNIFORM_BLOCK_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shader params bind group"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        self.programs.insert(
            program,
            ProgramEntry {
                attached: Vec::new(),
                pipeline: None,
                block: UniformBlock::zeroed(),
                buffer,
                bind_group,
                log: String::new(),
            },
        );
        program
    }

    fn attach_shader(&mut self, program: ProgramObject, shader: ShaderObject) {
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.attached.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramObject) -> bool {
        let Some(entry) = self.programs.get(&program) else {
            return false;
        };
        let module_for = |stage: ShaderStage| {
            entry.attached.iter().find_map(|shader| {
                let shader = self.shaders.get(shader)?;
                (shader.stage == stage).then_some(shader.module.as_ref()).flatten()
            })
        };
        let result = match (module_for(ShaderStage::Vertex), module_for(ShaderStage::Fragment)) {
            (Some(vertex), Some(fragment)) => self.build_pipeline(vertex, fragment),
            _ => Err("program needs a compiled vertex and fragment stage".to_string()),
        };

        let Some(entry) = self.programs.get_mut(&program) else {
            return false;
        };
        match result {
            Ok(pipeline) => {
                entry.pipeline = Some(pipeline);
                entry.log.clear();
                true
            }
            Err(log) => {
                entry.log = log;
                false
            }
        }
    }

    fn program_info_log(&self, program: ProgramObject) -> String {
        self.programs
            .get(&program)
            .map(|entry| entry.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramObject) {
        if let Some(entry) = self.programs.remove(&program) {
            entry.buffer.destroy();
        }
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn uniform_location(&self, program: ProgramObject, name: &str) -> Option<UniformLocation> {
        let name = UniformName::from_name(name)?;
        self.programs
            .get(&program)
            .filter(|entry| entry.pipeline.is_some())
            .map(|_| UniformLocation {
                program,
                index: name.index() as u32,
            })
    }

    fn use_program(&mut self, program: ProgramObject) {
        self.current = Some(program);
    }

    fn set_uniform(&mut self, location: &UniformLocation, value: UniformValue) {
        let Some(name) = UniformName::ALL.get(location.index as usize).copied() else {
            return;
        };
        if let Some(entry) = self.programs.get_mut(&location.program) {
            entry.block.write(name, value);
        }
    }

    fn buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize_buffer(&mut self, width: u32, height: u32) {
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        let (width, height) = clamp_to_limit(width, height, max_dimension);
        self.size = (width, height);
        if width == 0 || height == 0 {
            return;
        }
        match &mut self.target {
            RenderTarget::Window { surface, config, .. } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            RenderTarget::Texture { texture } => {
                *texture = super::context::create_target_texture(
                    &self.device,
                    self.format,
                    width,
                    height,
                );
            }
        }
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn draw_quad(&mut self, vertex_count: u32) {
        let (width, height) = self.size;
        if width == 0 || height == 0 {
            return;
        }
        let Some(program) = self.current else {
            return;
        };
        let Some((view, frame)) = self.frame_view() else {
            return;
        };
        let Some(entry) = self.programs.get(&program) else {
            return;
        };
        let Some(pipeline) = entry.pipeline.as_ref() else {
            return;
        };

        self.queue
            .write_buffer(&entry.buffer, 0, bytemuck::bytes_of(&entry.block));
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quad encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let viewport_width = self.viewport.0.min(width).max(1);
            let viewport_height = self.viewport.1.min(height).max(1);
            render_pass.set_viewport(
                0.0,
                0.0,
                viewport_width as f32,
                viewport_height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &entry.bind_group, &[]);
            render_pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }
    }
}

/// Caps each side at the device's texture limit, warning when it bites.
fn clamp_to_limit(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let clamped = (width.min(max_dimension), height.min(max_dimension));
    if clamped != (width, height) {
        tracing::warn!(
            requested = %format!("{width}x{height}"),
            max_dimension,
            "drawing buffer clamped to GPU texture limit"
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_buffers_are_clamped_per_side() {
        assert_eq!(clamp_to_limit(16384, 900, 8192), (8192, 900));
        assert_eq!(clamp_to_limit(700, 9000, 8192), (700, 8192));
        assert_eq!(clamp_to_limit(1920, 1080, 8192), (1920, 1080));
        assert_eq!(clamp_to_limit(0, 0, 8192), (0, 0));
    }
}
