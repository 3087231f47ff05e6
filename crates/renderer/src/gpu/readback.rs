use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;

use super::context::OFFSCREEN_FORMAT;
use super::device::{RenderTarget, WgpuDevice};

const BYTES_PER_PIXEL: u32 = 4;

impl WgpuDevice {
    /// Copies the offscreen target back to the CPU. Blocks until the GPU has
    /// finished every submitted frame.
    pub fn read_pixels(&self) -> Result<RgbaImage> {
        let RenderTarget::Texture { texture } = &self.target else {
            bail!("pixel readback is only available for offscreen targets");
        };
        if self.format != OFFSCREEN_FORMAT {
            bail!("unsupported readback format {:?}", self.format);
        }
        let (width, height) = self.size;
        if width == 0 || height == 0 {
            bail!("cannot read back an empty {width}x{height} target");
        }

        let unpadded_row = width * BYTES_PER_PIXEL;
        let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("failed waiting for GPU readback: {err}"))?;
        receiver
            .recv()
            .context("readback callback never fired")?
            .map_err(|err| anyhow!("failed to map readback buffer: {err}"))?;

        let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_row as usize]);
            }
        }
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("readback produced a truncated {width}x{height} image"))
    }
}
