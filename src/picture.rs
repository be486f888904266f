//! Tagged image buffers exchanged between the framework and the
//! application.

use crate::error::{OscarError, OscarResult};

/// Pixel layout of a [`Picture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PictureType {
    /// Single channel, 8 bits per pixel.
    #[default]
    Greyscale,
    /// Packed 24 bit, byte order B G R.
    Bgr24,
    /// Packed 24 bit, byte order R G B.
    Rgb24,
    /// Packed YUV 4:2:2, 16 bits per pixel.
    Yuv422,
}

impl PictureType {
    /// Colour depth in bits per pixel.
    pub fn color_depth(self) -> u32 {
        match self {
            PictureType::Greyscale => 8,
            PictureType::Bgr24 | PictureType::Rgb24 => 24,
            PictureType::Yuv422 => 16,
        }
    }

    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        (self.color_depth() / 8) as usize
    }
}

/// An image buffer owned by whoever holds the value.
///
/// Pictures handed to a reader routine may be pre-sized by the caller
/// (width/height declared for verification against the file) or left
/// empty for the routine to allocate.
#[derive(Debug, Clone, Default)]
pub struct Picture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pixel_type: PictureType,
}

impl Picture {
    /// An empty picture for callee allocation.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A zeroed picture of the given geometry.
    pub fn with_geometry(width: u32, height: u32, pixel_type: PictureType) -> Self {
        let len = width as usize * height as usize * pixel_type.bytes_per_pixel();
        Picture {
            data: vec![0u8; len],
            width,
            height,
            pixel_type,
        }
    }

    /// Number of bytes a picture of this geometry occupies.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_type.bytes_per_pixel()
    }

    /// Check that the data length matches the declared geometry.
    pub fn validate(&self) -> OscarResult<()> {
        if self.data.len() < self.expected_len() {
            return Err(OscarError::BufferTooSmall {
                needed: self.expected_len(),
                available: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A borrowed view into a frame buffer, returned by the read paths of
/// the capture pipeline. The underlying memory stays owned by the
/// frame-buffer registry.
#[derive(Debug)]
pub struct PictureView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pixel_type: PictureType,
}
