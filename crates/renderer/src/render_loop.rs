use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::Local;
use scheduler::{FrameTask, Reschedule, TaskId, Ticker};

use crate::compile::{CompiledProgram, QUAD_VERTEX_COUNT};
use crate::context::GraphicsContext;
use crate::device::GraphicsDevice;
use crate::input::MouseState;
use crate::uniforms::{date_vector, FrameUniforms, UniformSet};

/// Frame rate reported when two frames share a timestamp.
const FALLBACK_FRAME_RATE: f32 = 60.0;
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Time metrics for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub elapsed: f32,
    pub delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
}

/// Derives elapsed/delta/rate/frame index from successive frame instants.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame: u32,
}

impl FrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last: start,
            frame: 0,
        }
    }

    pub fn advance(&mut self, now: Instant) -> FrameTiming {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        let delta = now.saturating_duration_since(self.last).as_secs_f32();
        let frame_rate = if delta > 0.0 {
            1.0 / delta
        } else {
            FALLBACK_FRAME_RATE
        };
        let frame = self.frame.min(i32::MAX as u32) as i32;
        self.last = now;
        self.frame = self.frame.saturating_add(1);
        FrameTiming {
            elapsed,
            delta,
            frame_rate,
            frame,
        }
    }

    pub fn frames(&self) -> u32 {
        self.frame
    }
}

#[derive(Debug)]
struct RenderStats {
    window_start: Option<Instant>,
    frames: u32,
}

impl RenderStats {
    fn record(&mut self, now: Instant, frame: i32) {
        let window_start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let span = now.saturating_duration_since(window_start);
        if span >= STATS_INTERVAL {
            let fps = self.frames as f64 / span.as_secs_f64();
            tracing::debug!(fps = (fps * 10.0).round() / 10.0, frame, "render stats");
            self.window_start = Some(now);
            self.frames = 0;
        }
    }
}

/// Per-frame work: push the uniform contract and draw one quad.
pub struct RenderLoop<D> {
    context: GraphicsContext<D>,
    program: Rc<CompiledProgram<D>>,
    uniforms: UniformSet,
    mouse: Rc<Cell<MouseState>>,
    clock: FrameClock,
    stats: RenderStats,
}

impl<D: GraphicsDevice + 'static> RenderLoop<D> {
    pub fn new(
        context: GraphicsContext<D>,
        program: Rc<CompiledProgram<D>>,
        uniforms: UniformSet,
        mouse: Rc<Cell<MouseState>>,
        start: Instant,
    ) -> Self {
        Self {
            context,
            program,
            uniforms,
            mouse,
            clock: FrameClock::new(start),
            stats: RenderStats {
                window_start: None,
                frames: 0,
            },
        }
    }

    /// Schedules the loop with `now` as time zero.
    pub fn start(
        ticker: &Ticker,
        context: GraphicsContext<D>,
        program: Rc<CompiledProgram<D>>,
        uniforms: UniformSet,
        mouse: Rc<Cell<MouseState>>,
    ) -> LoopHandle {
        Self::start_at(ticker, context, program, uniforms, mouse, Instant::now())
    }

    pub fn start_at(
        ticker: &Ticker,
        context: GraphicsContext<D>,
        program: Rc<CompiledProgram<D>>,
        uniforms: UniformSet,
        mouse: Rc<Cell<MouseState>>,
        start: Instant,
    ) -> LoopHandle {
        let context_id = context.id();
        let task = ticker.schedule(Self::new(context, program, uniforms, mouse, start));
        tracing::debug!(context = %context_id, %task, "render loop started");
        LoopHandle {
            ticker: ticker.clone(),
            task: Some(task),
        }
    }

    fn render(&mut self, now: Instant) -> FrameTiming {
        let timing = self.clock.advance(now);
        let mut device = self.context.device();
        let (width, height) = device.buffer_size();
        let frame = FrameUniforms {
            resolution: [width as f32, height as f32, 1.0],
            time: timing.elapsed,
            time_delta: timing.delta,
            frame_rate: timing.frame_rate,
            frame: timing.frame,
            mouse: self.mouse.get().as_uniform(),
            date: date_vector(&Local::now()),
        };
        device.use_program(self.program.program());
        self.uniforms.apply(&mut *device, &frame);
        device.draw_quad(QUAD_VERTEX_COUNT);
        timing
    }
}

impl<D: GraphicsDevice + 'static> FrameTask for RenderLoop<D> {
    fn on_frame(&mut self, now: Instant) -> Reschedule {
        let timing = self.render(now);
        self.stats.record(now, timing.frame);
        Reschedule::Continue
    }
}

/// Cancellation token for a running loop. Dropping it stops the loop.
#[derive(Debug)]
#[must_use = "the render loop stops when its handle is dropped"]
pub struct LoopHandle {
    ticker: Ticker,
    task: Option<TaskId>,
}

impl LoopHandle {
    /// Cancels the loop. No callback runs after this returns; calling it
    /// again does nothing.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            self.ticker.cancel(task);
            tracing::debug!(%task, "render loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some_and(|task| self.ticker.is_scheduled(task))
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_program, VERTEX_SHADER};
    use crate::recording::RecordingDevice;
    use crate::types::UniformValue;
    use crate::uniforms::resolve_uniforms;

    const SOURCE: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }";

    fn setup() -> (
        GraphicsContext<RecordingDevice>,
        Rc<CompiledProgram<RecordingDevice>>,
        UniformSet,
    ) {
        let context = GraphicsContext::new(RecordingDevice::new(300, 150));
        let program = Rc::new(compile_program(&context, VERTEX_SHADER, SOURCE).unwrap());
        let uniforms = resolve_uniforms(Some(&context), Some(&*program)).unwrap();
        (context, program, uniforms)
    }

    #[test]
    fn clock_reports_fallback_rate_on_first_frame() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let first = clock.advance(start);
        assert_eq!(first.frame, 0);
        assert_eq!(first.delta, 0.0);
        assert_eq!(first.frame_rate, 60.0);

        let second = clock.advance(start + Duration::from_millis(250));
        assert_eq!(second.frame, 1);
        assert_eq!(second.elapsed, 0.25);
        assert_eq!(second.frame_rate, 4.0);
        assert_eq!(clock.frames(), 2);
    }

    #[test]
    fn each_tick_draws_one_quad_with_uniforms() {
        let (context, program, uniforms) = setup();
        let ticker = Ticker::new();
        let mouse = Rc::new(Cell::new(MouseState {
            x: 1.0,
            y: 2.0,
            click_x: 3.0,
            click_y: 4.0,
        }));
        let start = Instant::now();
        let _handle =
            RenderLoop::start_at(&ticker, context.clone(), program.clone(), uniforms, mouse, start);

        ticker.tick(start + Duration::from_millis(500)).unwrap();
        ticker.tick(start + Duration::from_secs(1)).unwrap();

        let device = context.device_ref();
        assert_eq!(device.draws(), &[4, 4]);
        let id = program.program();
        assert_eq!(device.last_uniform(id, "iTime"), Some(UniformValue::Float(1.0)));
        assert_eq!(device.last_uniform(id, "iTimeDelta"), Some(UniformValue::Float(0.5)));
        assert_eq!(device.last_uniform(id, "iFrameRate"), Some(UniformValue::Float(2.0)));
        assert_eq!(device.last_uniform(id, "iFrame"), Some(UniformValue::Int(1)));
        assert_eq!(
            device.last_uniform(id, "iResolution"),
            Some(UniformValue::Vec3([300.0, 150.0, 1.0]))
        );
        assert_eq!(
            device.last_uniform(id, "iMouse"),
            Some(UniformValue::Vec4([1.0, 2.0, 3.0, 4.0]))
        );
    }

    #[test]
    fn stop_is_synchronous_and_idempotent() {
        let (context, program, uniforms) = setup();
        let ticker = Ticker::new();
        let mouse = Rc::new(Cell::new(MouseState::default()));
        let mut handle = RenderLoop::start(&ticker, context.clone(), program, uniforms, mouse);
        assert!(handle.is_running());

        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
        ticker.tick(Instant::now()).unwrap();
        assert!(context.device_ref().draws().is_empty());
        assert!(ticker.is_empty());
    }

    #[test]
    fn dropped_handle_cancels_loop() {
        let (context, program, uniforms) = setup();
        let ticker = Ticker::new();
        let mouse = Rc::new(Cell::new(MouseState::default()));
        let handle = RenderLoop::start(&ticker, context.clone(), program.clone(), uniforms, mouse);
        assert_eq!(ticker.len(), 1);

        drop(handle);
        assert!(ticker.is_empty());
        assert_eq!(ticker.tick(Instant::now()).unwrap(), 0);
        assert!(context.device_ref().draws().is_empty());
        // Only the test's own clone is left once the task is gone.
        assert_eq!(Rc::strong_count(&program), 1);
    }
}
