use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::compile::CompiledProgram;
use crate::context::GraphicsContext;
use crate::device::GraphicsDevice;
use crate::types::{UniformLocation, UniformValue};

/// Channel slots declared by the contract. Channels are not supported, so
/// their uniforms are always zero.
pub const CHANNEL_COUNT: usize = 4;

/// The nine ambient uniforms every wrapped shader sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformName {
    Resolution,
    Time,
    TimeDelta,
    FrameRate,
    Frame,
    ChannelTime,
    ChannelResolution,
    Mouse,
    Date,
}

impl UniformName {
    pub const ALL: [UniformName; 9] = [
        UniformName::Resolution,
        UniformName::Time,
        UniformName::TimeDelta,
        UniformName::FrameRate,
        UniformName::Frame,
        UniformName::ChannelTime,
        UniformName::ChannelResolution,
        UniformName::Mouse,
        UniformName::Date,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UniformName::Resolution => "iResolution",
            UniformName::Time => "iTime",
            UniformName::TimeDelta => "iTimeDelta",
            UniformName::FrameRate => "iFrameRate",
            UniformName::Frame => "iFrame",
            UniformName::ChannelTime => "iChannelTime",
            UniformName::ChannelResolution => "iChannelResolution",
            UniformName::Mouse => "iMouse",
            UniformName::Date => "iDate",
        }
    }

    /// Position in [`UniformName::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == name)
    }
}

/// Resolved locations for the fixed contract. A `None` slot is a uniform the
/// program does not expose; writes to it are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSet {
    locations: [Option<UniformLocation>; 9],
}

impl UniformSet {
    pub fn location(&self, name: UniformName) -> Option<UniformLocation> {
        self.locations[name.index()]
    }

    pub fn resolved(&self) -> usize {
        self.locations.iter().flatten().count()
    }

    pub fn set<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        name: UniformName,
        value: UniformValue,
    ) {
        if let Some(location) = &self.locations[name.index()] {
            device.set_uniform(location, value);
        }
    }

    /// Writes every uniform from one frame's values.
    pub fn apply<D: GraphicsDevice + ?Sized>(&self, device: &mut D, frame: &FrameUniforms) {
        self.set(device, UniformName::Resolution, UniformValue::Vec3(frame.resolution));
        self.set(device, UniformName::Time, UniformValue::Float(frame.time));
        self.set(device, UniformName::TimeDelta, UniformValue::Float(frame.time_delta));
        self.set(device, UniformName::FrameRate, UniformValue::Float(frame.frame_rate));
        self.set(device, UniformName::Frame, UniformValue::Int(frame.frame));
        self.set(
            device,
            UniformName::ChannelTime,
            UniformValue::FloatArray4([0.0; CHANNEL_COUNT]),
        );
        self.set(
            device,
            UniformName::ChannelResolution,
            UniformValue::Vec3Array4([[0.0; 3]; CHANNEL_COUNT]),
        );
        self.set(device, UniformName::Mouse, UniformValue::Vec4(frame.mouse));
        self.set(device, UniformName::Date, UniformValue::Vec4(frame.date));
    }
}

/// Looks up all nine contract names on `program`. Returns `None` when either
/// the context or the program is missing.
pub fn resolve_uniforms<D: GraphicsDevice>(
    context: Option<&GraphicsContext<D>>,
    program: Option<&CompiledProgram<D>>,
) -> Option<UniformSet> {
    let (context, program) = (context?, program?);
    let device = context.device_ref();
    let mut locations = [None; 9];
    for name in UniformName::ALL {
        locations[name.index()] = device.uniform_location(program.program(), name.as_str());
    }
    let set = UniformSet { locations };
    tracing::trace!(
        context = %context.id(),
        resolved = set.resolved(),
        "uniform locations resolved"
    );
    Some(set)
}

/// Values pushed for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
}

/// `(year, month - 1, day, seconds since midnight)`.
pub fn date_vector<Tz: TimeZone>(now: &DateTime<Tz>) -> [f32; 4] {
    let seconds = now.num_seconds_from_midnight() as f32
        + now.nanosecond().min(999_999_999) as f32 / 1_000_000_000.0;
    [
        now.year() as f32,
        now.month0() as f32,
        now.day() as f32,
        seconds,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_program, VERTEX_SHADER};
    use crate::recording::{DeviceCall, RecordingDevice};
    use chrono::Utc;

    const SOURCE: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(iTime); }";

    #[test]
    fn resolve_requires_context_and_program() {
        let context = GraphicsContext::new(RecordingDevice::new(10, 10));
        let program = compile_program(&context, VERTEX_SHADER, SOURCE).unwrap();
        assert!(resolve_uniforms::<RecordingDevice>(None, Some(&program)).is_none());
        assert!(resolve_uniforms(Some(&context), None).is_none());
        let set = resolve_uniforms(Some(&context), Some(&program)).unwrap();
        assert_eq!(set.resolved(), 9);
    }

    #[test]
    fn optimized_out_uniform_is_a_silent_no_op() {
        let context = GraphicsContext::new(
            RecordingDevice::new(10, 10).without_uniforms(&["iMouse", "iDate"]),
        );
        let program = compile_program(&context, VERTEX_SHADER, SOURCE).unwrap();
        let set = resolve_uniforms(Some(&context), Some(&program)).unwrap();
        assert_eq!(set.location(UniformName::Mouse), None);
        assert_eq!(set.resolved(), 7);

        let mut device = context.device();
        device.clear_calls();
        set.set(&mut *device, UniformName::Mouse, UniformValue::Vec4([1.0; 4]));
        assert!(device.calls().is_empty());
        set.set(&mut *device, UniformName::Time, UniformValue::Float(2.0));
        assert!(matches!(
            device.calls(),
            [DeviceCall::SetUniform { value: UniformValue::Float(v), .. }] if *v == 2.0
        ));
    }

    #[test]
    fn apply_zero_fills_channels() {
        let context = GraphicsContext::new(RecordingDevice::new(10, 10));
        let program = compile_program(&context, VERTEX_SHADER, SOURCE).unwrap();
        let set = resolve_uniforms(Some(&context), Some(&program)).unwrap();
        let frame = FrameUniforms {
            resolution: [10.0, 10.0, 1.0],
            time: 1.0,
            time_delta: 0.5,
            frame_rate: 2.0,
            frame: 3,
            mouse: [0.0; 4],
            date: [2024.0, 0.0, 1.0, 0.0],
        };
        let mut device = context.device();
        device.clear_calls();
        set.apply(&mut *device, &frame);
        assert_eq!(device.calls().len(), 9);
        assert_eq!(
            device.last_uniform(program.program(), "iChannelTime"),
            Some(UniformValue::FloatArray4([0.0; 4]))
        );
        assert_eq!(
            device.last_uniform(program.program(), "iChannelResolution"),
            Some(UniformValue::Vec3Array4([[0.0; 3]; 4]))
        );
        assert_eq!(
            device.last_uniform(program.program(), "iFrame"),
            Some(UniformValue::Int(3))
        );
    }

    #[test]
    fn names_round_trip_through_index() {
        for (position, name) in UniformName::ALL.into_iter().enumerate() {
            assert_eq!(name.index(), position);
            assert_eq!(UniformName::from_name(name.as_str()), Some(name));
        }
        assert_eq!(UniformName::from_name("iChannel0"), None);
    }

    #[test]
    fn date_vector_uses_zero_based_month() {
        let when = Utc.with_ymd_and_hms(2024, 3, 15, 1, 2, 3).unwrap();
        assert_eq!(date_vector(&when), [2024.0, 2.0, 15.0, 3723.0]);
    }

    #[test]
    fn date_vector_keeps_sub_second_fraction() {
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap()
            + chrono::Duration::milliseconds(500);
        assert_eq!(date_vector(&when)[3], 1.5);
    }
}
