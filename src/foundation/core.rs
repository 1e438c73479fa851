use crate::foundation::error::{CircleFitError, CircleFitResult};

/// Opaque white, the default background of every renderer.
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Straight-alpha RGBA8 pixel buffer, row-major.
///
/// `stride` is the byte distance between the starts of two consecutive rows and is always at
/// least `width * 4`. Padding bytes past `width * 4` are carried along but never read by the
/// cost kernels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Canvas {
    /// Create a tightly packed canvas filled with `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> CircleFitResult<Self> {
        let stride = tight_stride(width)?;
        let len = buffer_len(stride, height)?;
        let mut data = vec![0u8; len];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Create a canvas with the same layout as `other`, every pixel set to `rgba`.
    pub fn filled_like(other: &Canvas, rgba: [u8; 4]) -> Self {
        let mut data = vec![0u8; other.data.len()];
        for row in data.chunks_mut(other.stride.max(1)) {
            let visible = (other.width as usize * 4).min(row.len());
            for px in row[..visible].chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
        Self {
            width: other.width,
            height: other.height,
            stride: other.stride,
            data,
        }
    }

    /// Copy the visible pixels of `src` into a canvas with the layout of `like`.
    ///
    /// # Panics
    ///
    /// Panics when the two canvases differ in width or height.
    pub fn relayout(src: &Canvas, like: &Canvas) -> Self {
        assert!(
            src.width == like.width && src.height == like.height,
            "canvas dimensions must match: {}x{} vs {}x{}",
            src.width,
            src.height,
            like.width,
            like.height
        );
        let mut out = Self::filled_like(like, [0; 4]);
        for y in 0..src.height {
            let start = y as usize * out.stride;
            let n = out.width as usize * 4;
            out.data[start..start + n].copy_from_slice(src.row(y));
        }
        out
    }

    /// Create a tightly packed opaque white canvas.
    pub fn white(width: u32, height: u32) -> CircleFitResult<Self> {
        Self::filled(width, height, WHITE)
    }

    /// Wrap tightly packed RGBA8 bytes.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> CircleFitResult<Self> {
        let stride = tight_stride(width)?;
        Self::from_rgba8_with_stride(width, height, stride, data)
    }

    /// Wrap RGBA8 bytes whose rows are `stride` bytes apart.
    pub fn from_rgba8_with_stride(
        width: u32,
        height: u32,
        stride: usize,
        data: Vec<u8>,
    ) -> CircleFitResult<Self> {
        let row = tight_stride(width)?;
        if stride < row {
            return Err(CircleFitError::validation(format!(
                "canvas stride {stride} is smaller than width * 4 = {row}"
            )));
        }
        let expected = buffer_len(stride, height)?;
        if data.len() != expected {
            return Err(CircleFitError::validation(format!(
                "canvas buffer has {} bytes, expected {expected} ({width}x{height}, stride {stride})",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Convert a decoded `image` buffer (straight alpha) into a canvas.
    pub fn from_rgba_image(img: &image::RgbaImage) -> CircleFitResult<Self> {
        Self::from_rgba8(img.width(), img.height(), img.as_raw().clone())
    }

    /// Copy the visible pixels into a tightly packed `image` buffer.
    pub fn to_rgba_image(&self) -> CircleFitResult<image::RgbaImage> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        image::RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| CircleFitError::validation("canvas dimensions do not fit an RGBA image"))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Return `true` when `other` has the same width, height and stride.
    pub fn same_layout(&self, other: &Canvas) -> bool {
        self.width == other.width && self.height == other.height && self.stride == other.stride
    }

    /// Visible bytes of row `y` (padding excluded).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 4]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = y as usize * self.stride + x as usize * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Overwrite every byte with the contents of `src` in one bulk copy.
    ///
    /// # Panics
    ///
    /// Panics when the two canvases do not share the same layout.
    pub fn copy_from(&mut self, src: &Canvas) {
        assert!(
            self.same_layout(src),
            "canvas layout mismatch: {}x{} (stride {}) vs {}x{} (stride {})",
            self.width,
            self.height,
            self.stride,
            src.width,
            src.height,
            src.stride
        );
        self.data.copy_from_slice(&src.data);
    }
}

fn tight_stride(width: u32) -> CircleFitResult<usize> {
    (width as usize)
        .checked_mul(4)
        .ok_or_else(|| CircleFitError::validation("canvas width overflow"))
}

fn buffer_len(stride: usize, height: u32) -> CircleFitResult<usize> {
    stride
        .checked_mul(height as usize)
        .ok_or_else(|| CircleFitError::validation("canvas size overflow"))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
