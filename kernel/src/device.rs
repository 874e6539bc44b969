// Device orchestrator
//
// Owns every collaborator and walks the per-boot lifecycle:
//
//   Boot ─┬─> Portal                       (button held, or unprovisioned)
//         └─> Connecting ─> Fetching ─> Displaying <─> Refreshing
//                  │            │
//                  └────────────┴─> Error ─> Sleeping   (ledger decides)
//
// The firmware calls `boot()` once, then either `tick()` every TICK_MS
// (running) or `portal_request()` / `portal_tick()` (portal) until one
// of them hands back an `Exit`. Nothing here sleeps or restarts the MCU
// itself; every path ends in an `Exit` the firmware carries out.

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::bmp;
use crate::clock::SoftClock;
use crate::config::Settings;
use crate::consts::{
    CLOCK_WINDOW, FULL_REFRESH_INTERVAL, HEIGHT, RESTART_DELAY_SECS, STREAM_IDLE_MS,
    UTC_OFFSET_SECS, WIDTH, WIFI_TIMEOUT_MS,
};
use crate::epd::{HybridRefresh, Panel};
use crate::error::Error;
use crate::fmt::StackFmt;
use crate::framebuffer::Framebuffer;
use crate::gesture::{GestureDetector, GestureEvent};
use crate::ledger::{FailureOutcome, RetryLedger};
use crate::net::{self, Credentials, HttpError, Network, RenderQuery};
use crate::portal::{self, Portal, PortalEnv, Request, Response};
use crate::screens::{self, ClockRegion};
use crate::storage::{self, Storage};

/// Board services the orchestrator polls directly.
pub trait Board {
    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Config button level, true while pressed.
    fn button_pressed(&mut self) -> bool;

    fn battery_mv(&mut self) -> u16;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Boot,
    Portal,
    Connecting,
    Fetching,
    Displaying,
    Refreshing,
    Sleeping,
    Error,
}

/// How the current boot ends. The panel is already asleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Restart { delay_secs: u32 },
    DeepSleep { minutes: u16 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootOutcome {
    /// Serve the setup portal for the rest of this boot.
    Portal,
    /// First image is up; keep calling `tick()`.
    Running,
    Exit(Exit),
}

/// Per-boot runtime state.
pub struct Context {
    state: DeviceState,
    gesture: GestureDetector,
    /// "NEXT" is on screen for a pending double click.
    preview_shown: bool,
    /// Button still down from the press that forced the portal.
    boot_hold: bool,
    /// Panel busy-wait overruns already logged.
    busy_seen: u32,
    last_refresh_ms: u64,
    clock: SoftClock,
    region: ClockRegion,
}

impl Context {
    fn new() -> Self {
        Self {
            state: DeviceState::Boot,
            gesture: GestureDetector::default(),
            preview_shown: false,
            boot_hold: false,
            busy_seen: 0,
            last_refresh_ms: 0,
            clock: SoftClock::midnight(0),
            region: ClockRegion::new(),
        }
    }
}

pub struct Device<'a, P, N, S, B, D> {
    panel: P,
    net: N,
    storage: S,
    board: B,
    delay: D,
    fb: &'a mut Framebuffer,
    refresh: HybridRefresh,
    settings: Settings,
    ledger: RetryLedger,
    portal: Portal,
    ctx: Context,
}

impl<'a, P, N, S, B, D> Device<'a, P, N, S, B, D>
where
    P: Panel,
    N: Network,
    S: Storage,
    B: Board,
    D: DelayNs,
{
    pub fn new(panel: P, net: N, storage: S, board: B, delay: D, fb: &'a mut Framebuffer) -> Self {
        Self {
            panel,
            net,
            storage,
            board,
            delay,
            fb,
            refresh: HybridRefresh::new(FULL_REFRESH_INTERVAL),
            settings: Settings::defaults(),
            ledger: RetryLedger::with_default_schedule(0),
            portal: Portal::new(),
            ctx: Context::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> DeviceState {
        self.ctx.state
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn framebuffer(&self) -> &Framebuffer {
        &*self.fb
    }

    #[inline]
    pub fn panel(&self) -> &P {
        &self.panel
    }

    #[inline]
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    // ── Boot ────────────────────────────────────────────────────────

    pub async fn boot(&mut self) -> BootOutcome {
        self.ctx.state = DeviceState::Boot;
        if let Err(e) = self.panel.init_full() {
            warn!("epd: init failed: {}", e);
        }
        self.absorb_busy_timeouts();

        self.settings = Settings::load(&mut self.storage).await;
        let count = storage::load_retry_count(&mut self.storage).await;
        self.ledger = RetryLedger::with_default_schedule(count);
        info!("device: retry count {}/{}", self.ledger.count(), self.ledger.max());

        let forced = self.board.button_pressed();
        self.ctx.boot_hold = forced;
        if forced || !self.settings.is_provisioned() {
            info!(
                "device: {} -> portal",
                if forced { "button held" } else { "not provisioned" }
            );
            return self.enter_portal().await;
        }

        match self.refresh_image(false).await {
            Ok(()) => {
                self.ctx.state = DeviceState::Displaying;
                self.ctx.last_refresh_ms = self.board.now_ms();
                info!("device: staying awake, refresh every {} min", self.settings.sleep_min);
                BootOutcome::Running
            }
            Err(e) => BootOutcome::Exit(self.fail(e).await),
        }
    }

    async fn enter_portal(&mut self) -> BootOutcome {
        self.ctx.state = DeviceState::Portal;
        let name = portal::ap_name(&self.net.mac());
        screens::draw_setup(self.fb, &name);
        self.show_frame();

        if let Err(e) = self.net.start_access_point(&name).await {
            error!("portal: access point failed: {}", e);
            return BootOutcome::Exit(self.fail(e.into()).await);
        }
        info!("portal: up as '{}'", name.as_str());
        BootOutcome::Portal
    }

    // ── Running ─────────────────────────────────────────────────────

    /// One main-loop pass: button, clock, refresh interval.
    pub async fn tick(&mut self) -> Option<Exit> {
        let now = self.board.now_ms();
        let pressed = self.board.button_pressed();
        let event = self.ctx.gesture.update(pressed, now as u32);

        match event {
            GestureEvent::None => {}
            GestureEvent::LongPress => return Some(self.restart_now()),
            GestureEvent::SingleClick => self.refetch(false).await,
            GestureEvent::DoubleClick => self.refetch(true).await,
            GestureEvent::TripleClick => self.favorite().await,
        }
        if !event.is_none() {
            self.ctx.preview_shown = false;
            self.ctx.last_refresh_ms = self.board.now_ms();
        } else if !self.ctx.preview_shown
            && self.ctx.gesture.provisional() == Some(GestureEvent::DoubleClick)
        {
            self.ctx.preview_shown = true;
            self.ctx.region.draw_label("NEXT");
            self.push_region();
        }

        let now = self.board.now_ms();
        if self.ctx.clock.advance(now) && !self.ctx.preview_shown {
            self.show_clock();
        }

        let interval_ms = self.settings.sleep_min as u64 * 60_000;
        if now.saturating_sub(self.ctx.last_refresh_ms) >= interval_ms {
            info!("device: {} min elapsed, refreshing", self.settings.sleep_min);
            self.refetch(false).await;
            self.ctx.last_refresh_ms = self.board.now_ms();
        }
        None
    }

    /// Re-fetch while running. A failure keeps the current image.
    async fn refetch(&mut self, next: bool) {
        self.ctx.state = DeviceState::Refreshing;
        match self.refresh_image(next).await {
            Ok(()) => info!("device: refreshed{}", if next { " (next)" } else { "" }),
            Err(e) => {
                warn!("device: refresh failed, keeping old content: {}", e);
                if self.ctx.preview_shown {
                    self.show_clock();
                }
            }
        }
        self.ctx.state = DeviceState::Displaying;
    }

    async fn favorite(&mut self) {
        info!("device: favorite");
        let creds = Credentials {
            ssid: &self.settings.ssid,
            pass: &self.settings.pass,
        };
        match self.net.connect(creds, WIFI_TIMEOUT_MS).await {
            Ok(()) => {
                let mac = self.net.mac();
                match net::favorite_url(&self.settings.server, &mac) {
                    Ok(url) => {
                        let token = self.settings.device_token.as_str();
                        let with_token = [("X-Device-Token", token)];
                        let headers = if token.is_empty() {
                            &with_token[..0]
                        } else {
                            &with_token[..]
                        };
                        match self
                            .net
                            .post(url.as_str(), headers, "application/json", b"{}")
                            .await
                        {
                            Ok(200) => info!("device: favorite posted"),
                            Ok(status) => warn!("device: favorite -> {}", status),
                            Err(e) => warn!("device: favorite failed: {}", e),
                        }
                    }
                    Err(e) => warn!("device: favorite url: {}", e),
                }
            }
            Err(e) => warn!("device: favorite, no link: {}", e),
        }
        self.net.release().await;
    }

    // ── Fetch pipeline ──────────────────────────────────────────────

    /// Connect, fetch, decode, display, reset the ledger, sync the
    /// clock. The radio is released on every path.
    async fn refresh_image(&mut self, next: bool) -> Result<(), Error> {
        self.ctx.state = DeviceState::Connecting;
        let fetched = self.connect_and_fetch(next).await;
        if fetched.is_ok() {
            self.fb.commit();
            self.show_frame();
            self.ctx.state = DeviceState::Displaying;
            if self.ledger.on_success()
                && let Err(e) = storage::store_retry_count(&mut self.storage, 0).await
            {
                warn!("device: retry count reset not saved: {}", e);
            }
            self.sync_clock().await;
        }
        self.net.release().await;
        fetched
    }

    async fn connect_and_fetch(&mut self, next: bool) -> Result<(), Error> {
        let creds = Credentials {
            ssid: &self.settings.ssid,
            pass: &self.settings.pass,
        };
        self.net.connect(creds, WIFI_TIMEOUT_MS).await?;

        self.ctx.state = DeviceState::Fetching;
        let mac = self.net.mac();
        let url = net::render_url(&RenderQuery {
            server: &self.settings.server,
            battery_mv: self.board.battery_mv(),
            mac: &mac,
            rssi: self.net.rssi(),
            next,
        })?;
        info!("net: GET {}", url.as_str());

        let mut resp = self.net.get(url.as_str()).await?;
        if resp.status != 200 {
            return Err(HttpError::Status(resp.status).into());
        }
        bmp::decode(
            &mut resp.body,
            resp.content_length,
            &mut self.delay,
            STREAM_IDLE_MS,
            self.fb.back_mut(),
            WIDTH,
            HEIGHT,
        )
        .await?;
        Ok(())
    }

    async fn sync_clock(&mut self) {
        let synced = self.net.sync_time().await;
        let now = self.board.now_ms();
        self.ctx.clock = match synced {
            Some(unix) => SoftClock::from_unix(unix, UTC_OFFSET_SECS, now),
            None => {
                warn!("device: time sync failed, clock starts at 00:00:00");
                SoftClock::midnight(now)
            }
        };
        self.ctx.preview_shown = false;
        self.show_clock();
    }

    // ── Failure handling ────────────────────────────────────────────

    /// Routes a failure through the ledger, shows why, and puts the
    /// panel to sleep.
    async fn fail(&mut self, err: Error) -> Exit {
        self.ctx.state = DeviceState::Error;
        error!("device: {}", err);

        let mut msg = StackFmt::<64>::new();
        let exit = match self.ledger.on_failure() {
            FailureOutcome::Restart {
                attempt,
                max,
                delay_secs,
            } => {
                let _ = write!(msg, "{} {}/{} {}s", err.reason(), attempt, max, delay_secs);
                info!("device: retry {}/{} in {}s", attempt, max, delay_secs);
                Exit::Restart { delay_secs }
            }
            FailureOutcome::ExtendedSleep => {
                let _ = msg.write_str("Sleep. Press btn.");
                info!("device: retries exhausted, sleeping {} min", self.settings.sleep_min);
                Exit::DeepSleep {
                    minutes: self.settings.sleep_min,
                }
            }
        };
        if let Err(e) = storage::store_retry_count(&mut self.storage, self.ledger.count()).await {
            warn!("device: retry count not saved: {}", e);
        }

        screens::draw_message(self.fb, msg.as_str());
        self.show_frame_full();
        self.sleep_panel();
        exit
    }

    fn restart_now(&mut self) -> Exit {
        info!("device: long press, restarting");
        screens::draw_message(self.fb, "Restarting");
        self.show_frame_full();
        self.sleep_panel();
        Exit::Restart {
            delay_secs: RESTART_DELAY_SECS,
        }
    }

    fn sleep_panel(&mut self) {
        self.ctx.state = DeviceState::Sleeping;
        if let Err(e) = self.panel.sleep() {
            warn!("epd: sleep failed: {}", e);
        }
        self.absorb_busy_timeouts();
    }

    // ── Panel output ────────────────────────────────────────────────

    fn show_frame(&mut self) {
        if let Err(e) = self.refresh.smart_display(&mut self.panel, self.fb.front()) {
            warn!("epd: display failed: {}", e);
        }
        self.absorb_busy_timeouts();
    }

    // error and restart screens skip the hybrid schedule; no ghosting
    fn show_frame_full(&mut self) {
        if let Err(e) = self.panel.display_full(self.fb.front()) {
            warn!("epd: display failed: {}", e);
        }
        self.absorb_busy_timeouts();
    }

    fn show_clock(&mut self) {
        let (h, m, s) = self.ctx.clock.hms();
        self.ctx.region.draw_time(h, m, s);
        self.ctx.preview_shown = false;
        self.push_region();
    }

    fn push_region(&mut self) {
        if let Err(e) = self.panel.display_partial(self.ctx.region.data(), CLOCK_WINDOW) {
            warn!("epd: partial refresh failed: {}", e);
        }
        self.absorb_busy_timeouts();
    }

    /// Busy-line overruns never fail an operation; they are only logged.
    fn absorb_busy_timeouts(&mut self) {
        let total = self.panel.busy_timeouts();
        if total > self.ctx.busy_seen {
            warn!(
                "device: {} ({} new), continuing",
                Error::HardwareTimeout,
                total - self.ctx.busy_seen
            );
            self.ctx.busy_seen = total;
        }
    }

    // ── Portal ──────────────────────────────────────────────────────

    pub async fn portal_request(&mut self, req: &Request<'_>) -> Response {
        let env = PortalEnv {
            battery_mv: self.board.battery_mv(),
            now_ms: self.board.now_ms(),
            net: &mut self.net,
            storage: &mut self.storage,
            settings: &mut self.settings,
        };
        self.portal.handle(req, env).await
    }

    /// Portal background pass: button, pending work, deferred restart.
    pub async fn portal_tick(&mut self) -> Option<Exit> {
        let now = self.board.now_ms();
        let pressed = self.board.button_pressed();
        if self.ctx.boot_hold {
            self.ctx.boot_hold = pressed;
        } else if self.ctx.gesture.update(pressed, now as u32) == GestureEvent::LongPress {
            return Some(self.restart_now());
        }

        let env = PortalEnv {
            battery_mv: self.board.battery_mv(),
            now_ms: now,
            net: &mut self.net,
            storage: &mut self.storage,
            settings: &mut self.settings,
        };
        if self.portal.poll(env).await {
            info!("portal: restarting");
            self.sleep_panel();
            return Some(Exit::Restart { delay_secs: 0 });
        }
        None
    }
}
