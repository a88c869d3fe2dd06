use crate::error::{CineforgeError, CineforgeResult};

/// Bytes per pixel on the raw frame pipe: rgb24, no alpha, no padding.
pub const BYTES_PER_PIXEL: usize = 3;

/// An uncompressed RGB bitmap as it travels over the transcoder pipe:
/// exactly `width * height * 3` bytes, row-major, top-to-bottom.
///
/// Frames are never mutated across ownership boundaries; every transform
/// produces a new `Frame`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// A zero-initialized (black) frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; byte_len(width, height)],
        }
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(byte_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wraps a raw rgb24 buffer, enforcing the exact byte-count contract.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> CineforgeResult<Self> {
        let expected = byte_len(width, height);
        if data.len() != expected {
            return Err(CineforgeError::protocol(format!(
                "frame buffer is {} bytes, expected {expected} ({width}x{height}x3)",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Panics if `(x, y)` is out of bounds; callers iterate within `size()`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = self.offset(x, y);
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }
}

pub fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}
