// inkframe entry point
//
// Boot sequence: logger -> clocks/heap -> rtos -> board -> radio ->
// kernel boot, then one of three paths:
//   Running  - tick the device every TICK_MS until it asks to exit
//   Portal   - serve the setup portal until a restart is due
//   Exit     - failure already reported on the panel
// Exits end in a software reset or a timed deep sleep (which also
// resets the chip on wake).

#![no_std]
#![no_main]

use core::time::Duration as CoreDuration;

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Duration, Ticker, Timer};
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;
use log::{info, warn};
use static_cell::ConstStaticCell;

use inkframe::InkDevice;
use inkframe::board::{Board, BoardPeripherals};
use inkframe::drivers::storage::FlashStore;
use inkframe::net::portal::{self, SharedDevice};
use inkframe_kernel::consts::{PORTAL_TICK_MS, RESTART_DELAY_SECS, TICK_MS};
use inkframe_kernel::device::{Board as _, BootOutcome, Device, Exit};
use inkframe_kernel::framebuffer::Framebuffer;

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

// two 15 KB planes; kept off the task stack
static FRAMEBUFFER: ConstStaticCell<Framebuffer> = ConstStaticCell::new(Framebuffer::new());

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();

    let p = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));

    // radio buffers and the config strings handed to the wifi driver
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 64 * 1024);

    let timg0 = TimerGroup::new(p.TIMG0);
    let sw_int = SoftwareInterruptControl::new(p.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    info!("inkframe {} booting", env!("CARGO_PKG_VERSION"));

    let rtc = Rtc::new(p.LPWR);

    let mut board = Board::init(BoardPeripherals {
        spi2: p.SPI2,
        adc1: p.ADC1,
        battery: p.GPIO0,
        dc: p.GPIO1,
        rst: p.GPIO2,
        sck: p.GPIO4,
        mosi: p.GPIO6,
        cs: p.GPIO7,
        button: p.GPIO9,
        busy: p.GPIO10,
    });

    info!("battery: {}mV", board.io.battery_mv());

    let store = FlashStore::new(FlashStorage::new(p.FLASH));
    let net = inkframe::net::bring_up(&spawner, p.WIFI);
    let ap_stack = net.ap_stack();

    let mut device: InkDevice =
        Device::new(board.epd, net, store, board.io, Delay, FRAMEBUFFER.take());

    let exit = match device.boot().await {
        BootOutcome::Running => run(&mut device).await,
        BootOutcome::Portal => run_portal(&spawner, ap_stack, device).await,
        BootOutcome::Exit(exit) => exit,
    };

    shutdown(exit, rtc).await
}

async fn run(device: &mut InkDevice) -> Exit {
    info!("main: running, tick {}ms", TICK_MS);
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    loop {
        if let Some(exit) = device.tick().await {
            return exit;
        }
        ticker.next().await;
    }
}

async fn run_portal(spawner: &Spawner, ap: Stack<'static>, device: InkDevice) -> Exit {
    if spawner.spawn(portal::dns_task(ap)).is_err() {
        warn!("main: captive dns not started");
    }
    if spawner.spawn(portal::dhcp_task(ap)).is_err() {
        warn!("main: dhcp server not started");
    }

    let device: SharedDevice = Mutex::new(device);
    match select(portal::http_server(ap, &device), portal_ticks(&device)).await {
        Either::First(never) => never,
        Either::Second(exit) => exit,
    }
}

async fn portal_ticks(device: &SharedDevice) -> Exit {
    loop {
        Timer::after(Duration::from_millis(PORTAL_TICK_MS)).await;
        if let Some(exit) = device.lock().await.portal_tick().await {
            return exit;
        }
    }
}

async fn shutdown(exit: Exit, mut rtc: Rtc<'static>) -> ! {
    match exit {
        Exit::Restart { delay_secs } if delay_secs <= RESTART_DELAY_SECS => {
            info!("main: restarting in {}s", delay_secs);
            Timer::after(Duration::from_secs(delay_secs as u64)).await;
            esp_hal::system::software_reset()
        }
        // long back-off waits are spent asleep; waking resets the chip
        Exit::Restart { delay_secs } => {
            info!("main: retry in {}s (deep sleep)", delay_secs);
            let timer = TimerWakeupSource::new(CoreDuration::from_secs(delay_secs as u64));
            rtc.sleep_deep(&[&timer])
        }
        Exit::DeepSleep { minutes } => {
            info!("main: deep sleep for {} min", minutes);
            let timer = TimerWakeupSource::new(CoreDuration::from_secs(minutes as u64 * 60));
            rtc.sleep_deep(&[&timer])
        }
    }
}
