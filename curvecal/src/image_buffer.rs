use crate::error::{CalibError, Result};
use crate::rect::Rect;

/// Bytes per pixel. Buffers are RGB, no alpha.
pub const CHANNELS: usize = 3;

pub const BLACK: [u8; 3] = [0, 0, 0];
pub const WHITE: [u8; 3] = [255, 255, 255];

fn check_layout(width: u32, height: u32, len: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CalibError::invalid(format!(
            "image dimensions must be non-zero, got {width}x{height}"
        )));
    }
    let expected = width as usize * height as usize * CHANNELS;
    if len != expected {
        return Err(CalibError::invalid(format!(
            "a {width}x{height} RGB image needs {expected} bytes, got {len}"
        )));
    }
    Ok(())
}

#[inline]
fn pixel_index(width: u32, x: u32, y: u32) -> usize {
    (y as usize * width as usize + x as usize) * CHANNELS
}

/// An owned RGB image. Produced by the pattern generator and by the
/// non-in-place warps; the caller owns it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    /// Pixel data in row-major RGB order (3 bytes per pixel).
    img_data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageBuffer {
    /// Allocates a `width` x `height` image filled with `fill`.
    pub fn new(width: u32, height: u32, fill: [u8; 3]) -> Result<Self> {
        check_layout(width, height, width as usize * height as usize * CHANNELS)?;
        let img_data = fill
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();
        Ok(ImageBuffer {
            img_data,
            width,
            height,
        })
    }

    /// Wraps existing RGB bytes, checking that the length matches the dimensions.
    pub fn from_raw(width: u32, height: u32, img_data: Vec<u8>) -> Result<Self> {
        check_layout(width, height, img_data.len())?;
        Ok(ImageBuffer {
            img_data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.img_data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.img_data
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.img_data,
            width: self.width,
            height: self.height,
        }
    }

    pub fn view_mut(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            data: &mut self.img_data,
            width: self.width,
            height: self.height,
        }
    }

    /// Returns the `[r, g, b]` components at `(x, y)`.
    ///
    /// # Panics
    /// Panics if `(x, y)` is outside the image.
    pub fn get_rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.view().get_rgb(x, y)
    }

    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        self.view_mut().set_rgb(x, y, rgb);
    }

    /// Produces a new image shrunk by an integer `factor`, every output pixel
    /// being the average of a `factor` x `factor` block. Trailing rows and
    /// columns that do not fill a whole block are dropped, so output pixel
    /// `i` is centred on input coordinate `i * factor + (factor - 1) / 2`.
    pub fn downscaled(&self, factor: u32) -> Result<ImageBuffer> {
        self.view().downscaled(factor)
    }
}

/// A borrowed, read-only RGB image. The core never keeps it beyond the call.
#[derive(Debug, Copy, Clone)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> ImageView<'a> {
    pub fn new(width: u32, height: u32, data: &'a [u8]) -> Result<Self> {
        check_layout(width, height, data.len())?;
        Ok(ImageView {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &'a [u8] {
        self.data
    }

    pub fn get_rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let index = pixel_index(self.width, x, y);
        [self.data[index], self.data[index + 1], self.data[index + 2]]
    }

    /// Copies the pixels into a new owned buffer.
    pub fn to_owned_buffer(&self) -> ImageBuffer {
        ImageBuffer {
            img_data: self.data.to_vec(),
            width: self.width,
            height: self.height,
        }
    }

    /// Luma (`0.299 R + 0.587 G + 0.114 B`) of every pixel, row-major.
    pub fn to_luma(&self) -> Vec<f32> {
        self.data
            .chunks_exact(CHANNELS)
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .collect()
    }

    pub fn downscaled(&self, factor: u32) -> Result<ImageBuffer> {
        if factor == 0 {
            return Err(CalibError::invalid("downscale factor must be positive"));
        }
        if factor == 1 {
            return Ok(self.to_owned_buffer());
        }
        let new_width = self.width / factor;
        let new_height = self.height / factor;
        if new_width == 0 || new_height == 0 {
            return Err(CalibError::invalid(format!(
                "cannot shrink a {}x{} image by {factor}",
                self.width, self.height
            )));
        }

        let block = factor * factor;
        let mut new_img_data = vec![0u8; new_width as usize * new_height as usize * CHANNELS];
        for new_y in 0..new_height {
            for new_x in 0..new_width {
                let mut totals = [0u32; 3];
                for orig_y in new_y * factor..(new_y + 1) * factor {
                    for orig_x in new_x * factor..(new_x + 1) * factor {
                        let rgb = self.get_rgb(orig_x, orig_y);
                        for c in 0..CHANNELS {
                            totals[c] += rgb[c] as u32;
                        }
                    }
                }
                let index = pixel_index(new_width, new_x, new_y);
                for c in 0..CHANNELS {
                    new_img_data[index + c] = ((totals[c] + block / 2) / block) as u8;
                }
            }
        }

        Ok(ImageBuffer {
            img_data: new_img_data,
            width: new_width,
            height: new_height,
        })
    }
}

/// A borrowed, mutable RGB image for in-place operations. The core never
/// resizes it.
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> ImageViewMut<'a> {
    pub fn new(width: u32, height: u32, data: &'a mut [u8]) -> Result<Self> {
        check_layout(width, height, data.len())?;
        Ok(ImageViewMut {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: &*self.data,
            width: self.width,
            height: self.height,
        }
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    pub fn get_rgb(&self, x: u32, y: u32) -> [u8; 3] {
        self.as_view().get_rgb(x, y)
    }

    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let index = pixel_index(self.width, x, y);
        self.data[index..index + CHANNELS].copy_from_slice(&rgb);
    }

    /// Byte range of row `y`.
    pub(crate) fn row_range(&self, y: u32) -> std::ops::Range<usize> {
        let start = pixel_index(self.width, 0, y);
        start..start + self.width as usize * CHANNELS
    }

    /// Fills `rect` with `rgb`. The rectangle must lie inside the image.
    pub fn fill_rect(&mut self, rect: &Rect, rgb: [u8; 3]) -> Result<()> {
        Rect::of_size(self.width, self.height).ensure_contains(rect, "image", "fill area")?;
        for y in rect.y..rect.y + rect.height {
            let start = pixel_index(self.width, rect.x, y);
            let end = start + rect.width as usize * CHANNELS;
            for pixel in self.data[start..end].chunks_exact_mut(CHANNELS) {
                pixel.copy_from_slice(&rgb);
            }
        }
        Ok(())
    }
}
