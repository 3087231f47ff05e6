use bytemuck::{Pod, Zeroable};

use crate::types::UniformValue;
use crate::uniforms::{UniformName, CHANNEL_COUNT};

/// CPU mirror of the `ShaderParams` std140 block injected by
/// `compile::wrap_fragment`. Arrays use a 16-byte stride, so scalar and vec3
/// array elements are padded to `[f32; 4]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct UniformBlock {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: i32,
    pub _padding0: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub channel_time: [[f32; 4]; CHANNEL_COUNT],
    pub channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

pub(crate) const UNIFORM_BLOCK_SIZE: u64 = std::mem::size_of::<UniformBlock>() as u64;

impl UniformBlock {
    /// Stores `value` in the field backing `name`. Mismatched value kinds are
    /// dropped, like a wrong-typed `glUniform*` call.
    pub fn write(&mut self, name: UniformName, value: UniformValue) {
        match (name, value) {
            (UniformName::Resolution, UniformValue::Vec3(v)) => self.resolution = v,
            (UniformName::Time, UniformValue::Float(v)) => self.time = v,
            (UniformName::TimeDelta, UniformValue::Float(v)) => self.time_delta = v,
            (UniformName::FrameRate, UniformValue::Float(v)) => self.frame_rate = v,
            (UniformName::Frame, UniformValue::Int(v)) => self.frame = v,
            (UniformName::Mouse, UniformValue::Vec4(v)) => self.mouse = v,
            (UniformName::Date, UniformValue::Vec4(v)) => self.date = v,
            (UniformName::ChannelTime, UniformValue::FloatArray4(values)) => {
                for (slot, value) in self.channel_time.iter_mut().zip(values) {
                    *slot = [value, 0.0, 0.0, 0.0];
                }
            }
            (UniformName::ChannelResolution, UniformValue::Vec3Array4(values)) => {
                for (slot, [x, y, z]) in self.channel_resolution.iter_mut().zip(values) {
                    *slot = [x, y, z, 0.0];
                }
            }
            (name, value) => {
                tracing::trace!(uniform = name.as_str(), ?value, "uniform type mismatch ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(offset_of!(UniformBlock, time), 12);
        assert_eq!(offset_of!(UniformBlock, frame), 24);
        assert_eq!(offset_of!(UniformBlock, mouse), 32);
        assert_eq!(offset_of!(UniformBlock, date), 48);
        assert_eq!(offset_of!(UniformBlock, channel_time), 64);
        assert_eq!(offset_of!(UniformBlock, channel_resolution), 128);
        assert_eq!(UNIFORM_BLOCK_SIZE, 192);
    }

    #[test]
    fn write_pads_array_elements() {
        let mut block = UniformBlock::zeroed();
        block.write(
            UniformName::ChannelResolution,
            UniformValue::Vec3Array4([[1.0, 2.0, 3.0]; 4]),
        );
        assert_eq!(block.channel_resolution[3], [1.0, 2.0, 3.0, 0.0]);
        block.write(UniformName::Time, UniformValue::Int(4));
        assert_eq!(block.time, 0.0);
    }
}
