use image::{Rgb, RgbImage};

/// Eight-step viridis palette.
pub(crate) const PALETTE: [Rgb<u8>; 8] = [
    Rgb([68, 1, 84]),
    Rgb([70, 50, 126]),
    Rgb([54, 92, 141]),
    Rgb([39, 127, 142]),
    Rgb([31, 161, 135]),
    Rgb([74, 193, 109]),
    Rgb([160, 218, 57]),
    Rgb([253, 231, 37]),
];

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([228, 228, 234]);
const AXIS: Rgb<u8> = Rgb([90, 90, 90]);

/// Plot area inside a raster image, with data → pixel mapping.
pub(crate) struct Canvas {
    pub image: RgbImage,
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let image = RgbImage::from_pixel(width, height, BACKGROUND);
        Self {
            image,
            left: width / 10,
            right: width - width / 20,
            top: height / 12,
            bottom: height - height / 8,
        }
    }

    pub fn plot_width(&self) -> u32 {
        self.right - self.left
    }

    /// Horizontal grid lines and the two axes.
    pub fn frame(&mut self, gridlines: u32) {
        let height = self.bottom - self.top;
        for i in 1..=gridlines {
            let y = self.bottom - height * i / (gridlines + 1);
            self.hline(self.left, self.right, y, GRID, 1);
        }
        self.hline(self.left, self.right, self.bottom, AXIS, 2);
        self.vline(self.left, self.top, self.bottom, AXIS, 2);
    }

    /// Map a value in `[0, max]` to a pixel row.
    pub fn y_for(&self, value: f64, max: f64) -> i64 {
        let span = (self.bottom - self.top) as f64;
        let frac = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
        self.bottom as i64 - (frac * span).round() as i64
    }

    /// Map a value in `[min, max]` to a pixel column.
    pub fn x_for(&self, value: f64, min: f64, max: f64) -> i64 {
        let span = self.plot_width() as f64;
        let frac = if max > min { (value - min) / (max - min) } else { 0.5 };
        self.left as i64 + (frac.clamp(0.0, 1.0) * span).round() as i64
    }

    /// Vertical bar `slot` of `slots`, filling `width_ratio` of its slot.
    pub fn bar(&mut self, slot: usize, slots: usize, width_ratio: f64, value: f64, max: f64, color: Rgb<u8>) {
        let slot_w = self.plot_width() as f64 / slots.max(1) as f64;
        let bar_w = slot_w * width_ratio;
        let x0 = self.left as f64 + slot_w * slot as f64 + (slot_w - bar_w) / 2.0;
        let top = self.y_for(value, max);
        self.fill_rect(x0 as i64, top, (x0 + bar_w) as i64, self.bottom as i64, color);
    }

    /// Polyline with square markers at each point.
    pub fn series(&mut self, points: &[(i64, i64)], color: Rgb<u8>, thickness: i64) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color, thickness);
        }
        for &(x, y) in points {
            self.fill_rect(x - thickness * 2, y - thickness * 2, x + thickness * 2, y + thickness * 2, color);
        }
    }

    fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, thickness: i64) {
        let (mut x0, mut y0) = from;
        let (x1, y1) = to;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness / 2;
        loop {
            self.fill_rect(x0 - half, y0 - half, x0 + half, y0 + half, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn hline(&mut self, x0: u32, x1: u32, y: u32, color: Rgb<u8>, thickness: u32) {
        self.fill_rect(x0 as i64, y as i64, x1 as i64, (y + thickness) as i64, color);
    }

    fn vline(&mut self, x: u32, y0: u32, y1: u32, color: Rgb<u8>, thickness: u32) {
        self.fill_rect(x as i64, y0 as i64, (x + thickness) as i64, y1 as i64, color);
    }

    /// Fill the half-open rectangle `[x0, x1) x [y0, y1)`, clipped to the image.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
        let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
        for y in y0..y1.max(y0 + 1).min(h) {
            for x in x0..x1.max(x0 + 1).min(w) {
                self.image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
