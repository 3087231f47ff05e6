use crate::types::ShaderStage;

/// Failures surfaced by the shader engine.
///
/// None of these are fatal to the host: [`ShaderCanvas`](crate::ShaderCanvas)
/// parks them in its error slot and keeps the last presented frame on screen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RendererError {
    #[error("graphics context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

impl RendererError {
    /// Driver diagnostic attached to compile/link failures.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            RendererError::ContextUnavailable(_) => None,
            RendererError::Compile { log, .. } | RendererError::Link { log } => Some(log),
        }
    }
}
