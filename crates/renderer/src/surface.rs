/// Placement of a surface in layout (logical) pixels, the coordinate space
/// pointer events are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Something a graphics context can be bound to and drawn into.
pub trait DrawableSurface {
    /// Displayed bounds in layout pixels.
    fn bounding_rect(&self) -> SurfaceRect;
    /// Physical pixels per layout pixel, when the host knows it.
    fn device_pixel_ratio(&self) -> Option<f64>;
}

/// Surface with host-controlled geometry. Backs offscreen rendering and
/// tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffscreenSurface {
    rect: SurfaceRect,
    pixel_ratio: Option<f64>,
}

impl OffscreenSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            rect: SurfaceRect::new(0.0, 0.0, f64::from(width), f64::from(height)),
            pixel_ratio: Some(1.0),
        }
    }

    pub fn with_origin(mut self, left: f64, top: f64) -> Self {
        self.rect.left = left;
        self.rect.top = top;
        self
    }

    pub fn with_pixel_ratio(mut self, ratio: Option<f64>) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.rect.width = width;
        self.rect.height = height;
    }

    pub fn set_pixel_ratio(&mut self, ratio: Option<f64>) {
        self.pixel_ratio = ratio;
    }
}

impl DrawableSurface for OffscreenSurface {
    fn bounding_rect(&self) -> SurfaceRect {
        self.rect
    }

    fn device_pixel_ratio(&self) -> Option<f64> {
        self.pixel_ratio
    }
}
