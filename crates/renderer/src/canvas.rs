use std::rc::Rc;
use std::time::Instant;

use scheduler::Ticker;

use crate::cache::{CacheKey, ProgramCache, SharedProgramCache};
use crate::cleanup::{self, CleanupOutcome};
use crate::compile::{compile_program, CompiledProgram, VERTEX_SHADER};
use crate::context::{ContextProvider, GraphicsContext};
use crate::device::GraphicsDevice;
use crate::error::RendererError;
use crate::input::{InputTracker, MouseState, PointerEvent};
use crate::render_loop::{LoopHandle, RenderLoop};
use crate::resize::ResizeController;
use crate::surface::DrawableSurface;
use crate::uniforms::resolve_uniforms;

/// Per-mount switches supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanvasOptions {
    /// Share programs through the program cache. Off means this canvas owns
    /// and deletes its program.
    pub enable_cache: bool,
    /// Presentation hint for the host; rendering ignores it.
    pub fill_viewport: bool,
}

struct ActiveProgram<D> {
    program: Rc<CompiledProgram<D>>,
    key: Option<CacheKey>,
    loop_handle: LoopHandle,
}

/// A shader bound to one drawable surface.
///
/// Owns the surface's graphics context, the running loop, and the input and
/// resize listeners. Context, compile, and link failures never escape: they
/// are parked in [`ShaderCanvas::error`] and whatever was last drawn stays on
/// screen.
pub struct ShaderCanvas<D: GraphicsDevice + 'static> {
    context: Option<GraphicsContext<D>>,
    options: CanvasOptions,
    cache: Option<SharedProgramCache<D>>,
    ticker: Ticker,
    input: InputTracker,
    resize: ResizeController,
    active: Option<ActiveProgram<D>>,
    error: Option<RendererError>,
}

impl<D: GraphicsDevice + 'static> ShaderCanvas<D> {
    pub fn mount<P, S>(
        provider: &mut P,
        surface: &S,
        source: &str,
        options: CanvasOptions,
        cache: SharedProgramCache<D>,
        ticker: &Ticker,
    ) -> Self
    where
        P: ContextProvider<S, Device = D>,
        S: DrawableSurface + ?Sized,
    {
        Self::mount_at(provider, surface, source, options, cache, ticker, Instant::now())
    }

    /// Like [`ShaderCanvas::mount`], with `start` as the loop's time zero.
    pub fn mount_at<P, S>(
        provider: &mut P,
        surface: &S,
        source: &str,
        options: CanvasOptions,
        cache: SharedProgramCache<D>,
        ticker: &Ticker,
        start: Instant,
    ) -> Self
    where
        P: ContextProvider<S, Device = D>,
        S: DrawableSurface + ?Sized,
    {
        let mut canvas = Self {
            context: None,
            options,
            cache: options.enable_cache.then_some(cache),
            ticker: ticker.clone(),
            input: InputTracker::attach(),
            resize: ResizeController::attach(),
            active: None,
            error: None,
        };

        match provider.acquire(surface) {
            Ok(context) => {
                canvas.resize.sync(surface, &mut *context.device());
                canvas.context = Some(context);
                canvas.build(source, start);
            }
            Err(err) => {
                tracing::warn!(%err, "shader canvas has no graphics context");
                canvas.error = Some(err);
            }
        }
        canvas
    }

    /// Swaps in new shader text. The old program is cleaned up first; if the
    /// new one fails, no loop runs until a later call succeeds.
    pub fn set_source<S: DrawableSurface + ?Sized>(&mut self, surface: &S, source: &str) {
        if self.context.is_none() {
            return;
        }
        self.teardown_program();
        self.resize(surface);
        self.build(source, Instant::now());
    }

    pub fn pointer_event<S: DrawableSurface + ?Sized>(&self, surface: &S, event: PointerEvent) {
        self.input.handle(surface, event);
    }

    /// Re-syncs the backing buffer; `true` when it was reallocated.
    pub fn resize<S: DrawableSurface + ?Sized>(&mut self, surface: &S) -> bool {
        match &self.context {
            Some(context) => self.resize.sync(surface, &mut *context.device()),
            None => false,
        }
    }

    /// Stops rendering, releases the program unless the cache retains it,
    /// and detaches listeners.
    pub fn unmount(mut self) -> CleanupOutcome {
        let outcome = self.teardown_program();
        self.input.detach();
        self.resize.detach();
        if let Some(context) = &self.context {
            tracing::debug!(context = %context.id(), ?outcome, "shader canvas unmounted");
        }
        outcome
    }

    /// Last context, compile, or link failure. Cleared by a successful build.
    pub fn error(&self) -> Option<&RendererError> {
        self.error.as_ref()
    }

    pub fn context(&self) -> Option<&GraphicsContext<D>> {
        self.context.as_ref()
    }

    pub fn program(&self) -> Option<&Rc<CompiledProgram<D>>> {
        self.active.as_ref().map(|active| &active.program)
    }

    pub fn cache_key(&self) -> Option<CacheKey> {
        self.active.as_ref().and_then(|active| active.key)
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.loop_handle.is_running())
    }

    pub fn mouse(&self) -> MouseState {
        self.input.state()
    }

    pub fn options(&self) -> CanvasOptions {
        self.options
    }

    pub fn fill_viewport(&self) -> bool {
        self.options.fill_viewport
    }

    fn build(&mut self, source: &str, start: Instant) {
        let Some(context) = self.context.as_ref() else {
            return;
        };

        let key = self
            .cache
            .as_ref()
            .map(|_| ProgramCache::key(context, VERTEX_SHADER, source));
        let cached = match (&self.cache, &key) {
            (Some(cache), Some(key)) => cache.borrow().lookup(key, context),
            _ => None,
        };

        let program = match cached {
            Some(program) => program,
            None => match compile_program(context, VERTEX_SHADER, source) {
                Ok(program) => {
                    let program = Rc::new(program);
                    if let (Some(cache), Some(key)) = (&self.cache, key) {
                        cache.borrow_mut().insert(key, Rc::clone(&program));
                    }
                    program
                }
                Err(err) => {
                    self.error = Some(err);
                    return;
                }
            },
        };

        let Some(uniforms) = resolve_uniforms(Some(context), Some(&*program)) else {
            return;
        };
        let loop_handle = RenderLoop::start_at(
            &self.ticker,
            context.clone(),
            Rc::clone(&program),
            uniforms,
            self.input.shared_state(),
            start,
        );
        self.error = None;
        self.active = Some(ActiveProgram {
            program,
            key,
            loop_handle,
        });
    }

    fn teardown_program(&mut self) -> CleanupOutcome {
        let Some(mut active) = self.active.take() else {
            return CleanupOutcome::NothingToRelease;
        };
        let cache = self.cache.as_ref().map(|cache| cache.borrow());
        cleanup::release(
            Some(&mut active.loop_handle),
            Some(active.program),
            active.key.as_ref(),
            cache.as_deref(),
        )
    }
}

impl<D: GraphicsDevice + 'static> Drop for ShaderCanvas<D> {
    fn drop(&mut self) {
        self.teardown_program();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingProvider;
    use crate::surface::OffscreenSurface;

    const SOLID: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }";

    #[test]
    fn mount_sizes_buffer_and_starts_loop() {
        let mut provider = RecordingProvider::new();
        let surface = OffscreenSurface::new(640, 480).with_pixel_ratio(Some(2.0));
        let ticker = Ticker::new();
        let canvas = ShaderCanvas::mount(
            &mut provider,
            &surface,
            SOLID,
            CanvasOptions::default(),
            ProgramCache::shared(),
            &ticker,
        );
        assert!(canvas.error().is_none());
        assert!(canvas.is_running());
        let context = canvas.context().unwrap();
        assert_eq!(context.device_ref().buffer_size(), (1280, 960));

        ticker.tick(Instant::now()).unwrap();
        assert_eq!(context.device_ref().draws(), &[4]);
    }

    #[test]
    fn unavailable_context_lands_in_error_slot() {
        let mut provider = RecordingProvider::unavailable("driver lost");
        let canvas = ShaderCanvas::mount(
            &mut provider,
            &OffscreenSurface::new(10, 10),
            SOLID,
            CanvasOptions::default(),
            ProgramCache::shared(),
            &Ticker::new(),
        );
        assert!(matches!(
            canvas.error(),
            Some(RendererError::ContextUnavailable(_))
        ));
        assert!(canvas.context().is_none());
        assert!(!canvas.is_running());
        assert_eq!(canvas.unmount(), CleanupOutcome::NothingToRelease);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let mut provider = RecordingProvider::new();
        let cache = ProgramCache::shared();
        let canvas = ShaderCanvas::mount(
            &mut provider,
            &OffscreenSurface::new(10, 10),
            SOLID,
            CanvasOptions::default(),
            Rc::clone(&cache),
            &Ticker::new(),
        );
        assert!(cache.borrow().is_empty());
        assert!(canvas.cache_key().is_none());
    }

    #[test]
    fn successful_source_change_clears_error() {
        let mut provider = RecordingProvider::new();
        let surface = OffscreenSurface::new(10, 10);
        let mut canvas = ShaderCanvas::mount(
            &mut provider,
            &surface,
            "",
            CanvasOptions::default(),
            ProgramCache::shared(),
            &Ticker::new(),
        );
        assert!(canvas.error().is_some());
        canvas.set_source(&surface, SOLID);
        assert!(canvas.error().is_none());
        assert!(canvas.is_running());
    }

    #[test]
    fn dropping_without_unmount_still_releases() {
        let mut provider = RecordingProvider::new();
        let canvas = ShaderCanvas::mount(
            &mut provider,
            &OffscreenSurface::new(10, 10),
            SOLID,
            CanvasOptions::default(),
            ProgramCache::shared(),
            &Ticker::new(),
        );
        let program = Rc::clone(canvas.program().unwrap());
        drop(canvas);
        assert!(program.is_released());
    }
}
