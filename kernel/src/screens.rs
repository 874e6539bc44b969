// Fixed screens drawn straight into the visible plane, plus the small
// clock region that gets a partial refresh once a second.

use core::fmt::Write;

use crate::consts::{CLOCK_WINDOW, HEIGHT};
use crate::font;
use crate::fmt::StackFmt;
use crate::framebuffer::{Canvas, Framebuffer};

/// Setup instructions shown while the config portal is up.
pub fn draw_setup(fb: &mut Framebuffer, ap_name: &str) {
    let mut c = fb.canvas();
    c.clear();
    c.draw_text_centered("Setup WiFi", 40, 3);
    c.draw_text_centered("Connect phone to", 110, 2);
    c.draw_text_centered(ap_name, 145, 3);
    c.draw_text_centered("Open browser", 200, 2);
    c.draw_text_centered("192.168.4.1", 230, 2);
}

/// One line of text, centred on an otherwise blank screen.
pub fn draw_message(fb: &mut Framebuffer, msg: &str) {
    let mut c = fb.canvas();
    c.clear();
    let y = HEIGHT as i32 / 2 - font::GLYPH_H as i32;
    c.draw_text_centered(msg, y, 2);
}

const REGION_W: u16 = CLOCK_WINDOW.width();
const REGION_H: u16 = CLOCK_WINDOW.height();
pub const REGION_LEN: usize = REGION_W.div_ceil(8) as usize * REGION_H as usize;

/// Off-screen copy of the clock corner. Drawn here, then pushed with
/// `Panel::display_partial(region.data(), CLOCK_WINDOW)`.
pub struct ClockRegion {
    buf: [u8; REGION_LEN],
}

impl ClockRegion {
    pub const fn new() -> Self {
        Self {
            buf: [0xFF; REGION_LEN],
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    fn canvas(&mut self) -> Canvas<'_> {
        let mut c = Canvas::new(&mut self.buf, REGION_W, REGION_H);
        c.clear();
        c
    }

    pub fn draw_time(&mut self, h: u8, m: u8, s: u8) {
        let mut text = StackFmt::<8>::new();
        let _ = write!(text, "{:02}:{:02}:{:02}", h, m, s);
        let y = (REGION_H - font::GLYPH_H) as i32 / 2;
        self.canvas().draw_text(text.as_str(), 4, y, 1);
    }

    /// Short status word in place of the time (e.g. "NEXT").
    pub fn draw_label(&mut self, label: &str) {
        let y = (REGION_H - font::GLYPH_H) as i32 / 2;
        self.canvas().draw_text_centered(label, y, 1);
    }
}

impl Default for ClockRegion {
    fn default() -> Self {
        Self::new()
    }
}
