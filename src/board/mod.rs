//! InkSight board support
//!
//! Maps the ESP32-C3 peripherals onto the subsystems the kernel knows
//! about: the SSD1683 panel, the config button and the battery sense
//! divider. Application code never sees GPIO numbers.

pub mod pins;

use embassy_time::Instant;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::{
    Blocking,
    analog::adc::{Adc, AdcCalCurve, AdcConfig, AdcPin, Attenuation},
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    peripherals::{ADC1, GPIO0, GPIO1, GPIO2, GPIO4, GPIO6, GPIO7, GPIO9, GPIO10, SPI2},
    spi,
    time::Rate,
};
use inkframe_kernel::epd::Ssd1683;
use inkframe_kernel::epd::ssd1683::SPI_FREQ_MHZ;

// Type Aliases
pub type SpiBus = spi::master::Spi<'static, Blocking>;
pub type SpiDevice = ExclusiveDevice<SpiBus, Output<'static>, Delay>;
pub type Epd = Ssd1683<SpiDevice, Output<'static>, Output<'static>, Input<'static>, Delay>;

/// The peripherals this board claims; `main` moves them out of
/// `Peripherals` and keeps the radio, timers and flash for itself.
pub struct BoardPeripherals {
    pub spi2: SPI2<'static>,
    pub adc1: ADC1<'static>,
    pub battery: GPIO0<'static>,
    pub dc: GPIO1<'static>,
    pub rst: GPIO2<'static>,
    pub sck: GPIO4<'static>,
    pub mosi: GPIO6<'static>,
    pub cs: GPIO7<'static>,
    pub button: GPIO9<'static>,
    pub busy: GPIO10<'static>,
}

/// Button and battery sense, plus the monotonic clock.
pub struct BoardIo {
    button: Input<'static>,
    adc: Adc<'static, ADC1<'static>, Blocking>,
    battery: AdcPin<GPIO0<'static>, ADC1<'static>, AdcCalCurve<ADC1<'static>>>,
}

/// Complete board hardware, ready for the kernel.
pub struct Board {
    pub epd: Epd,
    pub io: BoardIo,
}

impl Board {
    pub fn init(p: BoardPeripherals) -> Self {
        let mut adc_cfg = AdcConfig::new();
        // 11dB attenuation covers the divided cell voltage (~2.1V max)
        let battery =
            adc_cfg.enable_pin_with_cal::<_, AdcCalCurve<ADC1>>(p.battery, Attenuation::_11dB);
        let adc = Adc::new(p.adc1, adc_cfg);

        let button = Input::new(p.button, InputConfig::default().with_pull(Pull::Up));

        let cs = Output::new(p.cs, Level::High, OutputConfig::default());
        let dc = Output::new(p.dc, Level::High, OutputConfig::default());
        let rst = Output::new(p.rst, Level::High, OutputConfig::default());
        let busy = Input::new(p.busy, InputConfig::default().with_pull(Pull::None));

        let spi_cfg = spi::master::Config::default().with_frequency(Rate::from_mhz(SPI_FREQ_MHZ));
        let spi_bus = spi::master::Spi::new(p.spi2, spi_cfg)
            .unwrap()
            .with_sck(p.sck)
            .with_mosi(p.mosi);
        let spi_dev = ExclusiveDevice::new(spi_bus, cs, Delay::new()).unwrap();

        let epd = Ssd1683::new(spi_dev, dc, rst, busy, Delay::new());

        Board {
            epd,
            io: BoardIo {
                button,
                adc,
                battery,
            },
        }
    }
}

impl inkframe_kernel::device::Board for BoardIo {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn button_pressed(&mut self) -> bool {
        self.button.is_low()
    }

    fn battery_mv(&mut self) -> u16 {
        // calibrated reading is millivolts at the pin
        let pin_mv: u16 = nb::block!(self.adc.read_oneshot(&mut self.battery)).unwrap_or(0);
        pin_mv.saturating_mul(pins::BATTERY_DIVIDER)
    }
}
