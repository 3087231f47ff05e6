use std::rc::Rc;

use crate::cache::{CacheKey, ProgramCache};
use crate::compile::CompiledProgram;
use crate::device::GraphicsDevice;
use crate::render_loop::LoopHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Program and both shader objects were deleted.
    Released,
    /// The cache still holds the key; nothing was deleted.
    RetainedByCache,
    /// No program was held, or it had already been released.
    NothingToRelease,
}

/// Tears down one program binding.
///
/// Always stops the loop first. The program is then deleted unless `key` is
/// still present in `cache`; without a cache the caller is the sole owner and
/// the program is always deleted.
pub fn release<D: GraphicsDevice>(
    loop_handle: Option<&mut LoopHandle>,
    program: Option<Rc<CompiledProgram<D>>>,
    key: Option<&CacheKey>,
    cache: Option<&ProgramCache<D>>,
) -> CleanupOutcome {
    if let Some(handle) = loop_handle {
        handle.stop();
    }
    let Some(program) = program else {
        return CleanupOutcome::NothingToRelease;
    };
    if let (Some(key), Some(cache)) = (key, cache) {
        if cache.contains(key) {
            tracing::debug!(%key, "program retained by cache");
            return CleanupOutcome::RetainedByCache;
        }
    }
    if program.release() {
        tracing::debug!(
            context = %program.context_id(),
            program = ?program.program(),
            "program released"
        );
        CleanupOutcome::Released
    } else {
        CleanupOutcome::NothingToRelease
    }
}
