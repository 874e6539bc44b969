// SSD1683 e-paper driver (board-independent)
// Tested on the Waveshare 4.2" V2 module (400x300). The caller owns the
// framebuffer; this driver only streams it. Fast refresh loads the
// controller's built-in table via a temperature-register override.
//
// Busy handling: BUSY high = controller working. Every wait is bounded
// by BUSY_TIMEOUT_MS; on expiry we log and carry on, since some panel
// revisions never drop BUSY after certain commands.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use log::{debug, warn};

use super::{ControllerState, Panel, PanelError, Window};
use crate::consts::{HEIGHT, WIDTH};

pub const SPI_FREQ_MHZ: u32 = 10;

const BUSY_TIMEOUT_MS: u32 = 10_000;
const BUSY_POLL_MS: u32 = 10;
const SLEEP_SETTLE_MS: u32 = 200;

// SSD1683 commands
#[allow(dead_code)]
mod cmd {
    pub const DEEP_SLEEP: u8 = 0x10;
    pub const DATA_ENTRY_MODE: u8 = 0x11;
    pub const SW_RESET: u8 = 0x12;
    pub const WRITE_TEMP_REGISTER: u8 = 0x1A;
    pub const MASTER_ACTIVATION: u8 = 0x20;
    pub const DISPLAY_UPDATE_CONTROL_1: u8 = 0x21;
    pub const DISPLAY_UPDATE_CONTROL_2: u8 = 0x22;
    pub const WRITE_RAM_BW: u8 = 0x24; // new image
    pub const WRITE_RAM_RED: u8 = 0x26; // previous image (differential)
    pub const BORDER_WAVEFORM: u8 = 0x3C;
    pub const SET_RAM_X_RANGE: u8 = 0x44;
    pub const SET_RAM_Y_RANGE: u8 = 0x45;
    pub const SET_RAM_X_COUNTER: u8 = 0x4E;
    pub const SET_RAM_Y_COUNTER: u8 = 0x4F;
}

// update-control-2 sequences
const UPDATE_FULL: u8 = 0xF7;
const UPDATE_FAST: u8 = 0xC7;
const UPDATE_PARTIAL: u8 = 0xFF;
const LOAD_FAST_LUT: u8 = 0x91;
// temperature override selecting the fast waveform table
const FAST_TEMP: u8 = 0x6E;

pub struct Ssd1683<SPI, DC, RST, BUSY, D> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: D,
    width: u16,
    height: u16,
    state: ControllerState,
    busy_timeouts: u32,
}

impl<SPI, DC, RST, BUSY, D> Ssd1683<SPI, DC, RST, BUSY, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: D) -> Self {
        Self::with_size(spi, dc, rst, busy, delay, WIDTH, HEIGHT)
    }

    pub fn with_size(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: D, width: u16, height: u16) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
            width,
            height,
            state: ControllerState::Uninitialized,
            busy_timeouts: 0,
        }
    }

    #[inline]
    fn frame_len(&self) -> usize {
        self.width.div_ceil(8) as usize * self.height as usize
    }

    fn reset(&mut self) -> Result<(), PanelError> {
        self.rst.set_high().map_err(|_| PanelError::Bus)?;
        self.delay.delay_ms(100);
        self.rst.set_low().map_err(|_| PanelError::Bus)?;
        self.delay.delay_ms(2);
        self.rst.set_high().map_err(|_| PanelError::Bus)?;
        self.delay.delay_ms(100);
        Ok(())
    }

    // reset + SW reset + output/border config + full window
    fn init_common(&mut self) -> Result<(), PanelError> {
        self.reset()?;
        self.wait_busy();

        self.send_command(cmd::SW_RESET)?;
        self.wait_busy();

        // bypass RED RAM as 0 for the first update, BW normal
        self.command(cmd::DISPLAY_UPDATE_CONTROL_1, &[0x40, 0x00])?;
        self.command(cmd::BORDER_WAVEFORM, &[0x05])?;

        self.set_full_window()?;
        self.wait_busy();
        Ok(())
    }

    fn set_full_window(&mut self) -> Result<(), PanelError> {
        let x_end = ((self.width - 1) / 8) as u8;
        let y_end = self.height - 1;

        // X increment, Y increment
        self.command(cmd::DATA_ENTRY_MODE, &[0x03])?;
        self.command(cmd::SET_RAM_X_RANGE, &[0x00, x_end])?;
        self.command(
            cmd::SET_RAM_Y_RANGE,
            &[0x00, 0x00, (y_end & 0xFF) as u8, (y_end >> 8) as u8],
        )?;
        self.command(cmd::SET_RAM_X_COUNTER, &[0x00])?;
        self.command(cmd::SET_RAM_Y_COUNTER, &[0x00, 0x00])?;
        Ok(())
    }

    fn write_both_planes(&mut self, image: &[u8]) -> Result<(), PanelError> {
        if image.len() != self.frame_len() {
            return Err(PanelError::Window);
        }
        self.command(cmd::WRITE_RAM_BW, image)?;
        self.command(cmd::WRITE_RAM_RED, image)?;
        Ok(())
    }

    fn activate(&mut self, sequence: u8) -> Result<(), PanelError> {
        self.command(cmd::DISPLAY_UPDATE_CONTROL_2, &[sequence])?;
        self.send_command(cmd::MASTER_ACTIVATION)?;
        self.wait_busy();
        Ok(())
    }

    // ── Low-level SPI / busy ────────────────────────────────

    // bounded poll; returns true if the bound expired
    fn wait_busy(&mut self) -> bool {
        let mut waited = 0;
        // a pin read error counts as idle so we never spin on a dead line
        while self.busy.is_high().unwrap_or(false) {
            if waited >= BUSY_TIMEOUT_MS {
                self.busy_timeouts = self.busy_timeouts.saturating_add(1);
                warn!("epd: busy timeout after {}ms, continuing", waited);
                return true;
            }
            self.delay.delay_ms(BUSY_POLL_MS);
            waited += BUSY_POLL_MS;
        }
        false
    }

    fn command(&mut self, command: u8, data: &[u8]) -> Result<(), PanelError> {
        self.send_command(command)?;
        self.send_data(data)
    }

    fn send_command(&mut self, command: u8) -> Result<(), PanelError> {
        self.dc.set_low().map_err(|_| PanelError::Bus)?;
        self.spi.write(&[command]).map_err(|_| PanelError::Bus)?;
        self.dc.set_high().map_err(|_| PanelError::Bus)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), PanelError> {
        self.dc.set_high().map_err(|_| PanelError::Bus)?;
        self.spi.write(data).map_err(|_| PanelError::Bus)
    }
}

impl<SPI, DC, RST, BUSY, D> Panel for Ssd1683<SPI, DC, RST, BUSY, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    D: DelayNs,
{
    fn state(&self) -> ControllerState {
        self.state
    }

    fn init_full(&mut self) -> Result<(), PanelError> {
        self.init_common()?;
        self.state = ControllerState::FullReady;
        Ok(())
    }

    fn init_fast(&mut self) -> Result<(), PanelError> {
        self.init_common()?;

        self.command(cmd::WRITE_TEMP_REGISTER, &[FAST_TEMP])?;
        self.command(cmd::DISPLAY_UPDATE_CONTROL_2, &[LOAD_FAST_LUT])?;
        self.send_command(cmd::MASTER_ACTIVATION)?;
        self.wait_busy();

        self.set_full_window()?;
        self.wait_busy();
        self.state = ControllerState::FastReady;
        Ok(())
    }

    fn display_full(&mut self, image: &[u8]) -> Result<(), PanelError> {
        self.init_full()?;
        self.write_both_planes(image)?;
        self.activate(UPDATE_FULL)
    }

    fn display_fast(&mut self, image: &[u8]) -> Result<(), PanelError> {
        self.init_fast()?;
        self.write_both_planes(image)?;
        self.activate(UPDATE_FAST)
    }

    fn display_partial(&mut self, data: &[u8], window: Window) -> Result<(), PanelError> {
        let win = window.byte_aligned(self.width, self.height);
        if win.is_empty() || data.len() != win.row_bytes() * win.height() as usize {
            return Err(PanelError::Window);
        }
        if matches!(
            self.state,
            ControllerState::Uninitialized | ControllerState::Asleep
        ) {
            self.init_full()?;
        }

        let x_start = (win.x0 / 8) as u8;
        let x_end = ((win.x1 - 1) / 8) as u8;
        let y_last = win.y1 - 1;
        debug!("epd: partial x {}..{} y {}..{}", win.x0, win.x1, win.y0, win.y1);

        // non-flashing border, normal RAM usage
        self.command(cmd::BORDER_WAVEFORM, &[0x80])?;
        self.command(cmd::DISPLAY_UPDATE_CONTROL_1, &[0x00, 0x00])?;
        self.command(cmd::BORDER_WAVEFORM, &[0x80])?;

        self.command(cmd::SET_RAM_X_RANGE, &[x_start, x_end])?;
        self.command(
            cmd::SET_RAM_Y_RANGE,
            &[
                (win.y0 & 0xFF) as u8,
                (win.y0 >> 8) as u8,
                (y_last & 0xFF) as u8,
                (y_last >> 8) as u8,
            ],
        )?;
        self.command(cmd::SET_RAM_X_COUNTER, &[x_start])?;
        self.command(
            cmd::SET_RAM_Y_COUNTER,
            &[(win.y0 & 0xFF) as u8, (win.y0 >> 8) as u8],
        )?;

        self.command(cmd::WRITE_RAM_BW, data)?;
        self.activate(UPDATE_PARTIAL)
    }

    fn sleep(&mut self) -> Result<(), PanelError> {
        self.command(cmd::DEEP_SLEEP, &[0x01])?;
        self.delay.delay_ms(SLEEP_SETTLE_MS);
        self.state = ControllerState::Asleep;
        Ok(())
    }

    fn busy_timeouts(&self) -> u32 {
        self.busy_timeouts
    }
}
