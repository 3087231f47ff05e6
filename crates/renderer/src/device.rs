use crate::types::{ProgramObject, ShaderObject, ShaderStage, UniformLocation, UniformValue};

/// GL-style object API the engine drives.
///
/// Objects are plain handles owned by the device; the caller is responsible
/// for deleting what it creates. Compile and link report success as a flag
/// and leave the diagnostic text in the matching info log, mirroring how
/// drivers expose them.
pub trait GraphicsDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> ShaderObject;
    fn shader_source(&mut self, shader: ShaderObject, source: &str);
    fn compile_shader(&mut self, shader: ShaderObject) -> bool;
    fn shader_info_log(&self, shader: ShaderObject) -> String;
    fn delete_shader(&mut self, shader: ShaderObject);

    fn create_program(&mut self) -> ProgramObject;
    fn attach_shader(&mut self, program: ProgramObject, shader: ShaderObject);
    fn link_program(&mut self, program: ProgramObject) -> bool;
    fn program_info_log(&self, program: ProgramObject) -> String;
    fn delete_program(&mut self, program: ProgramObject);

    /// Location of a named uniform, or `None` when the program does not
    /// expose it (unknown, or optimized out).
    fn uniform_location(&self, program: ProgramObject, name: &str) -> Option<UniformLocation>;
    fn use_program(&mut self, program: ProgramObject);
    fn set_uniform(&mut self, location: &UniformLocation, value: UniformValue);

    /// Current backing buffer size in physical pixels.
    fn buffer_size(&self) -> (u32, u32);
    /// Reallocates the backing buffer.
    fn resize_buffer(&mut self, width: u32, height: u32);
    fn viewport(&mut self, width: u32, height: u32);

    /// Draws a full-viewport quad as a triangle strip with the bound program.
    fn draw_quad(&mut self, vertex_count: u32);
}
