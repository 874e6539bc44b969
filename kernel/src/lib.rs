// Portable core of the inkframe e-paper firmware.
//
// Everything here is hardware-agnostic: the panel, radio, flash and
// button are reached through the traits in `epd`, `net`, `storage` and
// `device`, so the whole state machine runs under `cargo test` on the
// host. The `inkframe` firmware crate supplies the ESP32-C3 backends.

#![cfg_attr(not(test), no_std)]

pub mod bmp;
pub mod clock;
pub mod config;
pub mod consts;
pub mod device;
pub mod epd;
pub mod error;
pub mod fmt;
pub mod font;
pub mod framebuffer;
pub mod gesture;
pub mod ledger;
pub mod net;
pub mod portal;
pub mod screens;
pub mod sntp;
pub mod storage;
