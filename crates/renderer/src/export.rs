use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use scheduler::Ticker;

use crate::cache::ProgramCache;
use crate::canvas::{CanvasOptions, ShaderCanvas};
use crate::gpu::{WgpuDevice, WgpuProvider};
use crate::surface::OffscreenSurface;

/// Renders a single frame of `source` at `time` seconds into an image.
///
/// The surface is sized in physical pixels with a pixel ratio of 1, so the
/// image has exactly `size` dimensions.
pub fn render_still(source: &str, size: (u32, u32), time: Duration) -> Result<RgbaImage> {
    let surface = OffscreenSurface::new(size.0, size.1).with_pixel_ratio(Some(1.0));
    let ticker = Ticker::new();
    let mut provider = WgpuProvider::new();
    let start = Instant::now();
    let canvas: ShaderCanvas<WgpuDevice> = ShaderCanvas::mount_at(
        &mut provider,
        &surface,
        source,
        CanvasOptions::default(),
        ProgramCache::shared(),
        &ticker,
        start,
    );
    if let Some(err) = canvas.error() {
        bail!("{err}");
    }

    let drawn = ticker
        .tick(start + time)
        .map_err(|err| anyhow!("failed to dispatch frame: {err}"))?;
    if drawn == 0 {
        bail!("render loop was not running");
    }

    let image = {
        let context = canvas
            .context()
            .ok_or_else(|| anyhow!("canvas lost its graphics context"))?;
        let device = context.device_ref();
        device.read_pixels()?
    };
    let outcome = canvas.unmount();
    tracing::debug!(?outcome, "offscreen canvas released");
    Ok(image)
}

/// Renders one frame and writes it to `path` as PNG.
pub(crate) fn run(source: &str, size: (u32, u32), time: Duration, path: &Path) -> Result<()> {
    let image = render_still(source, size, time)?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        width = size.0,
        height = size.1,
        time = time.as_secs_f32(),
        "exported frame"
    );
    Ok(())
}
