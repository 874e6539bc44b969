// ESP32-C3 backends for the inkframe kernel: board bring-up, flash
// settings, and the WiFi/HTTP/portal network stack.

#![no_std]

extern crate alloc;

// Hands out a `&'static mut` for values built at runtime during bring-up.
#[macro_export]
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

pub mod board;
pub mod drivers;
pub mod net;

use inkframe_kernel::device::Device;

/// The kernel orchestrator wired to this board.
pub type InkDevice = Device<
    'static,
    board::Epd,
    net::WifiNet,
    drivers::storage::FlashStore,
    board::BoardIo,
    embassy_time::Delay,
>;
