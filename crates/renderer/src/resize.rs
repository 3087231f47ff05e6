use crate::device::GraphicsDevice;
use crate::surface::DrawableSurface;

/// Backing-buffer size for a surface: displayed size times pixel ratio,
/// floored. A missing, non-finite, or non-positive ratio counts as 1.
pub fn target_size<S: DrawableSurface + ?Sized>(surface: &S) -> (u32, u32) {
    let ratio = surface
        .device_pixel_ratio()
        .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
        .unwrap_or(1.0);
    let rect = surface.bounding_rect();
    (scale(rect.width, ratio), scale(rect.height, ratio))
}

fn scale(length: f64, ratio: f64) -> u32 {
    let scaled = (length * ratio).floor();
    if scaled.is_finite() && scaled > 0.0 {
        scaled.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Keeps a device's backing buffer matched to its surface.
#[derive(Debug)]
pub struct ResizeController {
    attached: bool,
    reallocations: u64,
}

impl ResizeController {
    pub fn attach() -> Self {
        Self {
            attached: true,
            reallocations: 0,
        }
    }

    /// Reallocates the buffer and resets the viewport when the target size
    /// differs from the current one. Returns whether anything changed.
    pub fn sync<S, D>(&mut self, surface: &S, device: &mut D) -> bool
    where
        S: DrawableSurface + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        if !self.attached {
            return false;
        }
        let (width, height) = target_size(surface);
        if device.buffer_size() == (width, height) {
            return false;
        }
        tracing::debug!(width, height, "reallocating backing buffer");
        device.resize_buffer(width, height);
        device.viewport(width, height);
        self.reallocations += 1;
        true
    }

    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn detach(&mut self) {
        self.attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;
    use crate::surface::OffscreenSurface;

    #[test]
    fn target_size_scales_by_pixel_ratio() {
        let surface = OffscreenSurface::new(300, 150).with_pixel_ratio(Some(2.0));
        assert_eq!(target_size(&surface), (600, 300));
    }

    #[test]
    fn target_size_defaults_ratio_to_one() {
        for ratio in [None, Some(0.0), Some(-1.0), Some(f64::NAN)] {
            let surface = OffscreenSurface::new(300, 150).with_pixel_ratio(ratio);
            assert_eq!(target_size(&surface), (300, 150));
        }
    }

    #[test]
    fn target_size_floors_fractional_pixels() {
        let surface = OffscreenSurface::new(101, 51).with_pixel_ratio(Some(1.5));
        assert_eq!(target_size(&surface), (151, 76));
    }

    #[test]
    fn sync_is_idempotent_for_same_size() {
        let surface = OffscreenSurface::new(300, 150).with_pixel_ratio(Some(2.0));
        let mut device = RecordingDevice::new(300, 150);
        let mut controller = ResizeController::attach();

        assert!(controller.sync(&surface, &mut device));
        assert_eq!(device.buffer_size(), (600, 300));
        assert_eq!(device.viewport_size(), Some((600, 300)));
        assert!(!controller.sync(&surface, &mut device));
        assert_eq!(device.resize_count(), 1);
        assert_eq!(controller.reallocations(), 1);
    }

    #[test]
    fn sync_skips_when_already_matching() {
        let surface = OffscreenSurface::new(300, 150);
        let mut device = RecordingDevice::new(300, 150);
        let mut controller = ResizeController::attach();
        assert!(!controller.sync(&surface, &mut device));
        assert_eq!(device.resize_count(), 0);
    }

    #[test]
    fn detached_controller_ignores_resizes() {
        let mut surface = OffscreenSurface::new(300, 150);
        let mut device = RecordingDevice::new(300, 150);
        let mut controller = ResizeController::attach();
        controller.detach();
        surface.set_size(400.0, 200.0);
        assert!(!controller.sync(&surface, &mut device));
        assert_eq!(device.buffer_size(), (300, 150));
    }
}
