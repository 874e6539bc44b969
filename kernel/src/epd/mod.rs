// E-paper panel contract and hybrid refresh scheduling
//
// `Panel` is the command-level contract every controller backend
// implements (full / fast / partial refresh, deep sleep). The concrete
// backend is picked at build time; the firmware uses `Ssd1683`.
//
// `HybridRefresh` owns the session refresh counter and decides between
// a full (ghost-clearing, flashing) and a fast update for each new
// image.

pub mod ssd1683;

pub use ssd1683::Ssd1683;

use log::info;

/// Where the controller's internal state machine currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    FullReady,
    FastReady,
    Asleep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelError {
    /// SPI or GPIO transfer failed.
    Bus,
    /// Partial window empty, off-panel, or data length mismatch.
    Window,
}

impl core::fmt::Display for PanelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "panel bus error"),
            Self::Window => write!(f, "bad partial window"),
        }
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
}

impl Window {
    pub const fn new(x0: u16, y0: u16, x1: u16, y1: u16) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[inline]
    pub const fn width(&self) -> u16 {
        self.x1.saturating_sub(self.x0)
    }

    #[inline]
    pub const fn height(&self) -> u16 {
        self.y1.saturating_sub(self.y0)
    }

    /// Widens X outward to whole bytes and clips to the panel.
    /// RAM addressing on the X axis is in 8-pixel units.
    pub fn byte_aligned(&self, panel_w: u16, panel_h: u16) -> Self {
        let x0 = (self.x0 & !7).min(panel_w);
        let x1 = self.x1.saturating_add(7) & !7;
        Self {
            x0,
            y0: self.y0.min(panel_h),
            x1: x1.min(panel_w.div_ceil(8) * 8),
            y1: self.y1.min(panel_h),
        }
    }

    /// Bytes per row once byte aligned.
    #[inline]
    pub const fn row_bytes(&self) -> usize {
        (self.width() / 8) as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Command-level contract for an e-paper controller.
///
/// Images are packed 1 bpp, MSB first, 1 = white. Busy-wait timeouts
/// are absorbed by the implementation (logged, never fatal); only bus
/// faults and malformed windows come back as errors.
pub trait Panel {
    fn state(&self) -> ControllerState;

    /// Hardware reset, software reset, full-panel window. `FullReady`.
    fn init_full(&mut self) -> Result<(), PanelError>;

    /// `init_full` plus the fast waveform table. `FastReady`.
    fn init_fast(&mut self) -> Result<(), PanelError>;

    /// Full waveform; clears ghosting, visibly flashes.
    fn display_full(&mut self, image: &[u8]) -> Result<(), PanelError>;

    /// Fast waveform; less flash, ghosting accumulates.
    fn display_fast(&mut self, image: &[u8]) -> Result<(), PanelError>;

    /// Non-flashing update of one rectangle. `data` is row-major over
    /// the byte-aligned window (see [`Window::byte_aligned`]).
    fn display_partial(&mut self, data: &[u8], window: Window) -> Result<(), PanelError>;

    /// Deep sleep; required before the MCU sleeps.
    fn sleep(&mut self) -> Result<(), PanelError>;

    /// Busy waits that hit their bound since power-on. Backends that
    /// cannot stall report zero.
    fn busy_timeouts(&self) -> u32 {
        0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshKind {
    Full,
    Fast,
}

/// Hybrid refresh policy: every `interval`-th image (starting with the
/// first) gets a full refresh, the rest go out fast.
pub struct HybridRefresh {
    cycle: u32,
    interval: u32,
}

impl HybridRefresh {
    pub const fn new(interval: u32) -> Self {
        Self {
            cycle: 0,
            interval: if interval == 0 { 1 } else { interval },
        }
    }

    #[inline]
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    #[inline]
    pub fn next_kind(&self) -> RefreshKind {
        if self.cycle % self.interval == 0 {
            RefreshKind::Full
        } else {
            RefreshKind::Fast
        }
    }

    /// Pushes `image` with the scheduled waveform. The counter advances
    /// even if the transfer fails, keeping the full-refresh cadence.
    pub fn smart_display<P: Panel>(
        &mut self,
        panel: &mut P,
        image: &[u8],
    ) -> Result<RefreshKind, PanelError> {
        let kind = self.next_kind();
        info!("epd: {:?} refresh (cycle {})", kind, self.cycle);
        let result = match kind {
            RefreshKind::Full => panel.display_full(image),
            RefreshKind::Fast => panel.display_fast(image),
        };
        self.cycle = self.cycle.wrapping_add(1);
        result.map(|()| kind)
    }
}
