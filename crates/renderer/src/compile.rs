use std::cell::Cell;
use std::fmt;

use crate::context::{ContextRef, GraphicsContext};
use crate::device::GraphicsDevice;
use crate::error::RendererError;
use crate::types::{ContextId, ProgramObject, ShaderObject, ShaderStage};

/// Linked program plus the two stage objects it was built from.
///
/// Shared between the program cache and any number of live consumers through
/// `Rc`. The device objects are deleted at most once, through
/// [`CompiledProgram::release`].
pub struct CompiledProgram<D> {
    vertex: ShaderObject,
    fragment: ShaderObject,
    program: ProgramObject,
    owner: ContextRef<D>,
    released: Cell<bool>,
}

impl<D> CompiledProgram<D> {
    pub fn vertex(&self) -> ShaderObject {
        self.vertex
    }

    pub fn fragment(&self) -> ShaderObject {
        self.fragment
    }

    pub fn program(&self) -> ProgramObject {
        self.program
    }

    pub fn context_id(&self) -> ContextId {
        self.owner.id()
    }

    /// True when `context` is the exact context this program was linked on.
    pub fn belongs_to(&self, context: &GraphicsContext<D>) -> bool {
        self.owner.refers_to(context)
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }
}

impl<D: GraphicsDevice> CompiledProgram<D> {
    /// Deletes the program, then both shader objects, on the owning device.
    /// Returns `false` if the objects were already released or the device is
    /// gone.
    pub fn release(&self) -> bool {
        if self.released.replace(true) {
            return false;
        }
        let Some(device) = self.owner.upgrade() else {
            tracing::debug!(
                context = %self.owner.id(),
                "owning context dropped before program release"
            );
            return false;
        };
        let mut device = device.borrow_mut();
        device.delete_program(self.program);
        device.delete_shader(self.vertex);
        device.delete_shader(self.fragment);
        true
    }
}

impl<D> fmt::Debug for CompiledProgram<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("context", &self.owner.id())
            .field("program", &self.program)
            .field("vertex", &self.vertex)
            .field("fragment", &self.fragment)
            .field("released", &self.released.get())
            .finish()
    }
}

/// Compiles both stages and links them on `context`.
///
/// The fragment source is user text implementing `mainImage`; it is always
/// wrapped with [`wrap_fragment`] first. Either stage failing aborts before
/// linking. Every object created along a failing path is deleted before the
/// error is returned.
pub fn compile_program<D: GraphicsDevice>(
    context: &GraphicsContext<D>,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<CompiledProgram<D>, RendererError> {
    let wrapped = wrap_fragment(fragment_source);
    let mut device = context.device();

    let vertex = compile_stage(&mut *device, ShaderStage::Vertex, vertex_source)?;
    let fragment = match compile_stage(&mut *device, ShaderStage::Fragment, &wrapped) {
        Ok(fragment) => fragment,
        Err(err) => {
            device.delete_shader(vertex);
            return Err(err);
        }
    };

    let program = device.create_program();
    device.attach_shader(program, vertex);
    device.attach_shader(program, fragment);
    if !device.link_program(program) {
        let log = device.program_info_log(program);
        tracing::warn!(context = %context.id(), %log, "shader program failed to link");
        device.delete_program(program);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        return Err(RendererError::Link { log });
    }

    tracing::debug!(context = %context.id(), ?program, "shader program linked");
    Ok(CompiledProgram {
        vertex,
        fragment,
        program,
        owner: context.downgrade(),
        released: Cell::new(false),
    })
}

fn compile_stage<D: GraphicsDevice>(
    device: &mut D,
    stage: ShaderStage,
    source: &str,
) -> Result<ShaderObject, RendererError> {
    let shader = device.create_shader(stage);
    device.shader_source(shader, source);
    if device.compile_shader(shader) {
        return Ok(shader);
    }
    let log = device.shader_info_log(shader);
    tracing::warn!(%stage, %log, "shader stage failed to compile");
    device.delete_shader(shader);
    Err(RendererError::Compile { stage, log })
}

/// Surrounds user code with the uniform contract and an entry point that
/// calls `mainImage` with bottom-left-origin fragment coordinates.
///
/// The user text is inserted verbatim.
pub fn wrap_fragment(source: &str) -> String {
    let mut wrapped = String::with_capacity(HEADER.len() + source.len() + FOOTER.len() + 1);
    wrapped.push_str(HEADER);
    wrapped.push_str(source);
    if !source.ends_with('\n') {
        wrapped.push('\n');
    }
    wrapped.push_str(FOOTER);
    wrapped
}

/// GLSL prologue declaring the fixed uniform block.
///
/// The block layout must match `UniformBlock` in `gpu/uniforms.rs`.
const HEADER: &str = r"#version 450
layout(location = 0) out vec4 shaderbg_fragColor;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec3 _iResolution;
    float _iTime;
    float _iTimeDelta;
    float _iFrameRate;
    int _iFrame;
    float _padding0;
    vec4 _iMouse;
    vec4 _iDate;
    float _iChannelTime[4];
    vec3 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrameRate ubo._iFrameRate
#define iFrame ubo._iFrame
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iChannelTime ubo._iChannelTime
#define iChannelResolution ubo._iChannelResolution
";

/// Entry point appended after the user code.
const FOOTER: &str = r"void main() {
    vec2 fragCoord = vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y);
    vec4 color = vec4(0.0);
    mainImage(color, fragCoord);
    shaderbg_fragColor = color;
}
";

/// Full-viewport quad emitted as a 4-vertex triangle strip.
pub const VERTEX_SHADER: &str = r"#version 450

const vec2 positions[4] = vec2[4](
    vec2(-1.0, -1.0),
    vec2(1.0, -1.0),
    vec2(-1.0, 1.0),
    vec2(1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    gl_Position = vec4(positions[vertex_index], 0.0, 1.0);
}
";

/// Vertices issued per frame for the quad above.
pub const QUAD_VERTEX_COUNT: u32 = 4;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;

    const SOLID: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord) {\n    fragColor = vec4(1.0);\n}\n";

    #[test]
    fn wrap_keeps_user_code_between_header_and_entry_point() {
        let wrapped = wrap_fragment(SOLID);
        let header_end = wrapped.find("#define iDate").unwrap();
        let user = wrapped.find("void mainImage").unwrap();
        let entry = wrapped.find("void main()").unwrap();
        assert!(header_end < user && user < entry);
        assert!(wrapped.contains("mainImage(color, fragCoord);"));
        for name in crate::uniforms::UniformName::ALL {
            assert!(wrapped.contains(&format!("#define {}", name.as_str())));
        }
    }

    #[test]
    fn wrap_does_not_rewrite_user_text() {
        let source = "#version 300 es\nuniform float iTime;\nvoid mainImage(out vec4 c, in vec2 p) { c = vec4(0.0); }";
        let wrapped = wrap_fragment(source);
        assert!(wrapped.contains(source));
    }

    #[test]
    fn successful_compile_transfers_all_objects() {
        let context = GraphicsContext::new(RecordingDevice::new(300, 150));
        let program = compile_program(&context, VERTEX_SHADER, SOLID).unwrap();
        let device = context.device_ref();
        assert!(device.is_live_shader(program.vertex()));
        assert!(device.is_live_shader(program.fragment()));
        assert!(device.is_live_program(program.program()));
        assert!(program.belongs_to(&context));
    }

    #[test]
    fn fragment_failure_deletes_vertex_and_skips_link() {
        let context = GraphicsContext::new(RecordingDevice::new(300, 150));
        let err = compile_program(&context, VERTEX_SHADER, "").unwrap_err();
        assert!(matches!(
            err,
            RendererError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        let device = context.device_ref();
        assert_eq!(device.programs_created(), 0);
        assert_eq!(device.live_shader_count(), 0);
    }

    #[test]
    fn link_failure_deletes_everything() {
        let context = GraphicsContext::new(RecordingDevice::new(300, 150).failing_link("boom"));
        let err = compile_program(&context, VERTEX_SHADER, SOLID).unwrap_err();
        assert_eq!(
            err,
            RendererError::Link {
                log: "boom".to_string()
            }
        );
        let device = context.device_ref();
        assert_eq!(device.live_shader_count(), 0);
        assert_eq!(device.live_program_count(), 0);
    }

    #[test]
    fn release_deletes_once() {
        let context = GraphicsContext::new(RecordingDevice::new(300, 150));
        let program = compile_program(&context, VERTEX_SHADER, SOLID).unwrap();
        assert!(program.release());
        assert!(!program.release());
        let device = context.device_ref();
        assert_eq!(device.shader_deletions(program.vertex()), 1);
        assert_eq!(device.shader_deletions(program.fragment()), 1);
        assert_eq!(device.program_deletions(program.program()), 1);
    }
}
