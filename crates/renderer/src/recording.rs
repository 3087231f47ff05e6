//! In-memory device that records every call it receives.
//!
//! Compilation is simulated: a fragment stage without a `mainImage`
//! definition fails with a driver-style log, and an empty stage is a syntax
//! error. Link failures and optimized-out uniforms can be forced. Deletions
//! are counted per object so double frees show up as counts above one.

use std::collections::{HashMap, HashSet};

use crate::context::{ContextProvider, GraphicsContext};
use crate::device::GraphicsDevice;
use crate::error::RendererError;
use crate::resize::target_size;
use crate::surface::DrawableSurface;
use crate::types::{ProgramObject, ShaderObject, ShaderStage, UniformLocation, UniformValue};

/// Mutating calls, in the order they were made.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateShader(ShaderStage, ShaderObject),
    CompileShader(ShaderObject),
    DeleteShader(ShaderObject),
    CreateProgram(ProgramObject),
    AttachShader(ProgramObject, ShaderObject),
    LinkProgram(ProgramObject),
    DeleteProgram(ProgramObject),
    UseProgram(ProgramObject),
    SetUniform {
        location: UniformLocation,
        value: UniformValue,
    },
    ResizeBuffer(u32, u32),
    Viewport(u32, u32),
    DrawQuad(u32),
}

#[derive(Debug)]
struct ShaderRecord {
    stage: ShaderStage,
    source: String,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    attached: Vec<ShaderObject>,
    linked: bool,
    log: String,
}

#[derive(Debug)]
pub struct RecordingDevice {
    size: (u32, u32),
    viewport: Option<(u32, u32)>,
    next_object: u32,
    shaders: HashMap<ShaderObject, ShaderRecord>,
    programs: HashMap<ProgramObject, ProgramRecord>,
    live_shaders: HashSet<ShaderObject>,
    live_programs: HashSet<ProgramObject>,
    shader_deletes: HashMap<ShaderObject, u32>,
    program_deletes: HashMap<ProgramObject, u32>,
    shaders_created: usize,
    programs_created: usize,
    link_failure: Option<String>,
    hidden_uniforms: HashSet<String>,
    uniforms: HashMap<UniformLocation, UniformValue>,
    calls: Vec<DeviceCall>,
    draws: Vec<u32>,
    resizes: usize,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            viewport: None,
            next_object: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            live_shaders: HashSet::new(),
            live_programs: HashSet::new(),
            shader_deletes: HashMap::new(),
            program_deletes: HashMap::new(),
            shaders_created: 0,
            programs_created: 0,
            link_failure: None,
            hidden_uniforms: HashSet::new(),
            uniforms: HashMap::new(),
            calls: Vec::new(),
            draws: Vec::new(),
            resizes: 0,
        }
    }

    /// Every link attempt fails with `log`.
    pub fn failing_link(mut self, log: &str) -> Self {
        self.link_failure = Some(log.to_string());
        self
    }

    /// Reports the given uniforms as optimized out.
    pub fn without_uniforms(mut self, names: &[&str]) -> Self {
        self.hidden_uniforms
            .extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Vertex count of every draw issued so far.
    pub fn draws(&self) -> &[u32] {
        &self.draws
    }

    pub fn resize_count(&self) -> usize {
        self.resizes
    }

    pub fn viewport_size(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    pub fn shaders_created(&self) -> usize {
        self.shaders_created
    }

    pub fn programs_created(&self) -> usize {
        self.programs_created
    }

    pub fn is_live_shader(&self, shader: ShaderObject) -> bool {
        self.live_shaders.contains(&shader)
    }

    pub fn is_live_program(&self, program: ProgramObject) -> bool {
        self.live_programs.contains(&program)
    }

    pub fn live_shader_count(&self) -> usize {
        self.live_shaders.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.live_programs.len()
    }

    pub fn shader_deletions(&self, shader: ShaderObject) -> u32 {
        self.shader_deletes.get(&shader).copied().unwrap_or(0)
    }

    pub fn program_deletions(&self, program: ProgramObject) -> u32 {
        self.program_deletes.get(&program).copied().unwrap_or(0)
    }

    /// Most recent value written to `name` on `program`.
    pub fn last_uniform(&self, program: ProgramObject, name: &str) -> Option<UniformValue> {
        let location = self.uniform_location(program, name)?;
        self.uniforms.get(&location).copied()
    }

    fn next_object(&mut self) -> u32 {
        self.next_object += 1;
        self.next_object
    }

    fn simulate_compile(stage: ShaderStage, source: &str) -> Result<(), String> {
        if source.trim().is_empty() {
            return Err("ERROR: 0:1: '' : syntax error: unexpected end of file".to_string());
        }
        if stage == ShaderStage::Fragment && !source.contains("void mainImage(") {
            return Err(
                "ERROR: 0:1: 'mainImage' : no matching overloaded function found".to_string(),
            );
        }
        Ok(())
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> ShaderObject {
        let shader = ShaderObject(self.next_object());
        self.shaders.insert(
            shader,
            ShaderRecord {
                stage,
                source: String::new(),
                log: String::new(),
            },
        );
        self.live_shaders.insert(shader);
        self.shaders_created += 1;
        self.calls.push(DeviceCall::CreateShader(stage, shader));
        shader
    }

    fn shader_source(&mut self, shader: ShaderObject, source: &str) {
        if let Some(record) = self.shaders.get_mut(&shader) {
            record.source = source.to_string();
        }
    }

    fn compile_shader(&mut self, shader: ShaderObject) -> bool {
        self.calls.push(DeviceCall::CompileShader(shader));
        let Some(record) = self.shaders.get_mut(&shader) else {
            return false;
        };
        match Self::simulate_compile(record.stage, &record.source) {
            Ok(()) => {
                record.log.clear();
                true
            }
            Err(log) => {
                record.log = log;
                false
            }
        }
    }

    fn shader_info_log(&self, shader: ShaderObject) -> String {
        self.shaders
            .get(&shader)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderObject) {
        self.calls.push(DeviceCall::DeleteShader(shader));
        self.live_shaders.remove(&shader);
        *self.shader_deletes.entry(shader).or_default() += 1;
    }

    fn create_program(&mut self) -> ProgramObject {
        let program = ProgramObject(self.next_object());
        self.programs.insert(program, ProgramRecord::default());
        self.live_programs.insert(program);
        self.programs_created += 1;
        self.calls.push(DeviceCall::CreateProgram(program));
        program
    }

    fn attach_shader(&mut self, program: ProgramObject, shader: ShaderObject) {
        self.calls.push(DeviceCall::AttachShader(program, shader));
        if let Some(record) = self.programs.get_mut(&program) {
            record.attached.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramObject) -> bool {
        self.calls.push(DeviceCall::LinkProgram(program));
        let forced = self.link_failure.clone();
        let Some(record) = self.programs.get_mut(&program) else {
            return false;
        };
        if let Some(log) = forced {
            record.log = log;
            return false;
        }
        let stages: HashSet<ShaderStage> = record
            .attached
            .iter()
            .filter_map(|shader| self.shaders.get(shader))
            .filter(|shader| shader.log.is_empty() && !shader.source.is_empty())
            .map(|shader| shader.stage)
            .collect();
        if stages.len() != 2 {
            record.log = "ERROR: program needs a compiled vertex and fragment stage".to_string();
            return false;
        }
        record.linked = true;
        true
    }

    fn program_info_log(&self, program: ProgramObject) -> String {
        self.programs
            .get(&program)
            .map(|record| record.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramObject) {
        self.calls.push(DeviceCall::DeleteProgram(program));
        self.live_programs.remove(&program);
        *self.program_deletes.entry(program).or_default() += 1;
    }

    fn uniform_location(&self, program: ProgramObject, name: &str) -> Option<UniformLocation> {
        if self.hidden_uniforms.contains(name) {
            return None;
        }
        let record = self.programs.get(&program).filter(|record| record.linked)?;
        let index = record.attached.iter().find_map(|shader| {
            let source = &self.shaders.get(shader)?.source;
            find_identifier(source, name)
        })?;
        Some(UniformLocation {
            program,
            index: u32::try_from(index).ok()?,
        })
    }

    fn use_program(&mut self, program: ProgramObject) {
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn set_uniform(&mut self, location: &UniformLocation, value: UniformValue) {
        self.calls.push(DeviceCall::SetUniform {
            location: *location,
            value,
        });
        self.uniforms.insert(*location, value);
    }

    fn buffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn resize_buffer(&mut self, width: u32, height: u32) {
        self.calls.push(DeviceCall::ResizeBuffer(width, height));
        self.size = (width, height);
        self.resizes += 1;
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.calls.push(DeviceCall::Viewport(width, height));
        self.viewport = Some((width, height));
    }

    fn draw_quad(&mut self, vertex_count: u32) {
        self.calls.push(DeviceCall::DrawQuad(vertex_count));
        self.draws.push(vertex_count);
    }
}

/// Byte offset of `name` where it is not a prefix of a longer identifier.
fn find_identifier(source: &str, name: &str) -> Option<usize> {
    source.match_indices(name).map(|(at, _)| at).find(|&at| {
        source[at + name.len()..]
            .chars()
            .next()
            .map_or(true, |next| !(next.is_ascii_alphanumeric() || next == '_'))
    })
}

/// Hands out [`RecordingDevice`] contexts and keeps a handle to each so the
/// caller can inspect them afterwards.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    unavailable: Option<String>,
    hidden_uniforms: Vec<&'static str>,
    link_failure: Option<String>,
    acquired: Vec<GraphicsContext<RecordingDevice>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every acquire fails.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            unavailable: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn without_uniforms(mut self, names: &[&'static str]) -> Self {
        self.hidden_uniforms.extend_from_slice(names);
        self
    }

    pub fn failing_link(mut self, log: &str) -> Self {
        self.link_failure = Some(log.to_string());
        self
    }

    pub fn acquired(&self) -> &[GraphicsContext<RecordingDevice>] {
        &self.acquired
    }
}

/// Initial buffer size before the first resize, matching an unsized canvas.
const DEFAULT_BUFFER: (u32, u32) = (300, 150);

impl<S: DrawableSurface + ?Sized> ContextProvider<S> for RecordingProvider {
    type Device = RecordingDevice;

    fn acquire(&mut self, surface: &S) -> Result<GraphicsContext<RecordingDevice>, RendererError> {
        if let Some(reason) = &self.unavailable {
            return Err(RendererError::ContextUnavailable(reason.clone()));
        }
        let (width, height) = DEFAULT_BUFFER;
        let mut device =
            RecordingDevice::new(width, height).without_uniforms(&self.hidden_uniforms);
        if let Some(log) = &self.link_failure {
            device = device.failing_link(log);
        }
        let context = GraphicsContext::new(device);
        tracing::trace!(
            context = %context.id(),
            target = ?target_size(surface),
            "recording context acquired"
        );
        self.acquired.push(context.clone());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::OffscreenSurface;

    #[test]
    fn fragment_without_main_image_fails_to_compile() {
        let mut device = RecordingDevice::new(1, 1);
        let shader = device.create_shader(ShaderStage::Fragment);
        device.shader_source(shader, "void main() {}");
        assert!(!device.compile_shader(shader));
        assert!(device.shader_info_log(shader).contains("mainImage"));
    }

    #[test]
    fn uniform_locations_do_not_alias_prefixed_names() {
        let source = "float _iFrameRate; int _iFrame; void mainImage(";
        assert_ne!(find_identifier(source, "iFrame"), find_identifier(source, "iFrameRate"));
        assert_eq!(find_identifier(source, "iMouse"), None);
    }

    #[test]
    fn deletions_are_counted_per_object() {
        let mut device = RecordingDevice::new(1, 1);
        let shader = device.create_shader(ShaderStage::Vertex);
        device.delete_shader(shader);
        device.delete_shader(shader);
        assert_eq!(device.shader_deletions(shader), 2);
        assert!(!device.is_live_shader(shader));
    }

    #[test]
    fn unavailable_provider_reports_context_error() {
        let mut provider = RecordingProvider::unavailable("no adapter");
        let err = provider.acquire(&OffscreenSurface::new(10, 10)).unwrap_err();
        assert_eq!(err, RendererError::ContextUnavailable("no adapter".into()));
        assert!(provider.acquired().is_empty());
    }
}
