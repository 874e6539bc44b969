// Board-wide constants: panel geometry, timing bounds, defaults.
//
// Target is the Waveshare 4.2" V2 module (SSD1683, 400x300) on an
// ESP32-C3. Pin numbers live in the firmware's board/pins.rs.

use crate::epd::Window;

// ── Panel geometry ──────────────────────────────────────────────────

pub const WIDTH: u16 = 400;
pub const HEIGHT: u16 = 300;

/// Packed bytes per framebuffer row (1 bpp, MSB first).
pub const ROW_BYTES: usize = (WIDTH as usize).div_ceil(8);
pub const FB_LEN: usize = ROW_BYTES * HEIGHT as usize;

// live clock, redrawn every second with a partial refresh
pub const CLOCK_WINDOW: Window = Window::new(8, 6, 64, 24);

/// Fast refreshes between forced full refreshes.
pub const FULL_REFRESH_INTERVAL: u32 = 10;

// ── Timing ──────────────────────────────────────────────────────────

pub const WIFI_TIMEOUT_MS: u32 = 15_000;
pub const HTTP_TIMEOUT_MS: u32 = 30_000;
pub const STREAM_IDLE_MS: u32 = 10_000;
pub const SNTP_TIMEOUT_MS: u32 = 5_000;

pub const HOLD_THRESHOLD_MS: u32 = 2_000;
pub const SHORT_PRESS_MIN_MS: u32 = 50;
pub const MULTI_CLICK_WINDOW_MS: u32 = 500;

pub const TICK_MS: u64 = 50;
pub const PORTAL_TICK_MS: u64 = 5;

pub const DEFERRED_RESTART_MS: u64 = 30_000;
pub const RESTART_DELAY_SECS: u32 = 1;

// UTC+8
pub const UTC_OFFSET_SECS: i32 = 8 * 3600;

// ── Settings defaults ───────────────────────────────────────────────

pub const DEFAULT_SERVER: &str = "http://192.168.3.30:8080";
pub const DEFAULT_SLEEP_MIN: u16 = 60;
pub const MIN_SLEEP_MIN: u16 = 10;
pub const MAX_SLEEP_MIN: u16 = 1440;

// ── Portal ──────────────────────────────────────────────────────────

pub const AP_PREFIX: &str = "InkSight-";
pub const AP_ADDR: [u8; 4] = [192, 168, 4, 1];
pub const AP_PREFIX_LEN: u8 = 24;
