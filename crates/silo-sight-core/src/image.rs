use nalgebra::Vector2;

/// Borrowed 8-bit grayscale image, row-major with `len == width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

/// Owned 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f64 && y <= (self.height - 1) as f64
    }
}

// Clamp-to-edge so gradients near the border do not see a fake step.
#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i64, y: i64) -> f64 {
    if src.width == 0 || src.height == 0 {
        return 0.0;
    }
    let x = x.clamp(0, src.width as i64 - 1) as usize;
    let y = y.clamp(0, src.height as i64 - 1) as usize;
    src.data[y * src.width + x] as f64
}

/// Bilinear intensity at a sub-pixel position (pixel centers on integers).
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = get_gray(src, x0, y0);
    let p10 = get_gray(src, x0 + 1, y0);
    let p01 = get_gray(src, x0, y0 + 1);
    let p11 = get_gray(src, x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Central-difference intensity gradient at a sub-pixel position.
#[inline]
pub fn gradient(src: &GrayImageView<'_>, x: f64, y: f64) -> Vector2<f64> {
    let gx = 0.5 * (sample_bilinear(src, x + 1.0, y) - sample_bilinear(src, x - 1.0, y));
    let gy = 0.5 * (sample_bilinear(src, x, y + 1.0) - sample_bilinear(src, x, y - 1.0));
    Vector2::new(gx, gy)
}
