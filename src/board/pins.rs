//! GPIO |     Function    |      Notes
//! -----+-----------------+----------------------------------
//!  0   | ADC - Battery   | Voltage divider (2:1), reads 1/2 actual voltage
//!  1   | EPD DC          | Data/Command select
//!  2   | EPD RST         | Reset (active low)
//!  4   | SPI2 SCK        | Display clock
//!  6   | SPI2 MOSI       | Display data (write-only panel, no MISO)
//!  7   | EPD CS          | Display chip select
//!  9   | Config button   | Active LOW, internal pullup (also the BOOT strap)
//! 10   | EPD BUSY        | High while the controller works

// ----- E-Paper Display -----
pub const EPD_CS: u8 = 7;
pub const EPD_DC: u8 = 1;
pub const EPD_RST: u8 = 2;
pub const EPD_BUSY: u8 = 10;

// ----- SPI Bus -----
pub const SPI_SCK: u8 = 4;
pub const SPI_MOSI: u8 = 6;

// ----- Config Button -----
pub const BTN_CONFIG: u8 = 9; // Digital, active LOW

// ----- Battery -----
pub const BATTERY_ADC: u8 = 0; // GPIO0 - voltage divider, 1/2 of battery voltage
/// Cell-to-pin ratio of the sense divider.
pub const BATTERY_DIVIDER: u16 = 2;

// ----- Settings flash -----
pub const FLASH_SIZE: u32 = 4 * 1024 * 1024;
pub const SETTINGS_PARTITION_SIZE: u32 = 64 * 1024;
pub const SETTINGS_RANGE: core::ops::Range<u32> =
    (FLASH_SIZE - SETTINGS_PARTITION_SIZE)..FLASH_SIZE;
