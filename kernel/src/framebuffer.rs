// Packed 1 bpp framebuffer with a staging plane
//
// Two planes of FB_LEN bytes. `front()` is what the panel last got (or
// is about to get); the image decoder fills `back_mut()` and the result
// only becomes visible through `commit()`, so an aborted download can't
// touch the shown image.
//
// Polarity matches the controller: bit set = white, MSB = leftmost.

use crate::consts::{FB_LEN, HEIGHT, WIDTH};
use crate::font;

pub struct Framebuffer {
    planes: [[u8; FB_LEN]; 2],
    front: usize,
}

impl Framebuffer {
    pub const fn new() -> Self {
        Self {
            planes: [[0xFF; FB_LEN]; 2],
            front: 0,
        }
    }

    #[inline]
    pub fn front(&self) -> &[u8] {
        &self.planes[self.front]
    }

    /// Direct drawing on the visible plane (status and error screens).
    #[inline]
    pub fn canvas(&mut self) -> Canvas<'_> {
        Canvas::new(&mut self.planes[self.front], WIDTH, HEIGHT)
    }

    /// Staging plane for the next image. Contents are unspecified.
    #[inline]
    pub fn back_mut(&mut self) -> &mut [u8] {
        &mut self.planes[self.front ^ 1]
    }

    /// Promote the staging plane to the visible one.
    #[inline]
    pub fn commit(&mut self) {
        self.front ^= 1;
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Drawing surface over any packed 1 bpp buffer; used for both the
/// full frame and the small partial-refresh regions.
pub struct Canvas<'a> {
    buf: &'a mut [u8],
    width: u16,
    height: u16,
    stride: usize,
}

impl<'a> Canvas<'a> {
    pub fn new(buf: &'a mut [u8], width: u16, height: u16) -> Self {
        let stride = width.div_ceil(8) as usize;
        debug_assert!(buf.len() >= stride * height as usize);
        Self {
            buf,
            width,
            height,
            stride,
        }
    }

    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn clear(&mut self) {
        self.buf.fill(0xFF);
    }

    // out-of-bounds pixels are dropped
    #[inline]
    pub fn set_black(&mut self, x: i32, y: i32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = y as usize * self.stride + x as usize / 8;
        self.buf[idx] &= !(0x80 >> (x as usize % 8));
    }

    #[inline]
    pub fn is_black(&self, x: u16, y: u16) -> bool {
        let idx = y as usize * self.stride + x as usize / 8;
        self.buf[idx] & (0x80 >> (x % 8)) == 0
    }

    /// Draws `text` with its top-left at (x, y); returns the x after it.
    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, scale: u16) -> i32 {
        let scale = scale.max(1) as i32;
        let advance = font::ADVANCE as i32 * scale;
        let mut cx = x;
        for ch in text.chars() {
            let glyph = font::glyph(ch);
            for (col, bits) in glyph.iter().enumerate() {
                for row in 0..font::GLYPH_H as i32 {
                    if bits & (1 << row) == 0 {
                        continue;
                    }
                    let px = cx + col as i32 * scale;
                    let py = y + row * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            self.set_black(px + dx, py + dy);
                        }
                    }
                }
            }
            cx += advance;
        }
        cx
    }

    /// Horizontally centred text, top edge at `y`.
    pub fn draw_text_centered(&mut self, text: &str, y: i32, scale: u16) {
        let w = font::text_width(text.chars().count(), scale.max(1)) as i32;
        let x = (self.width as i32 - w) / 2;
        self.draw_text(text, x, y, scale);
    }
}
