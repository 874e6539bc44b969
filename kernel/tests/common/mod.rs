// Host fakes for the orchestrator and portal tests: a recording panel,
// a scripted network, shared in-memory storage and a hand-driven board.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use inkframe_kernel::config::Settings;
use inkframe_kernel::consts::{HEIGHT, WIDTH};
use inkframe_kernel::device::Board;
use inkframe_kernel::epd::{ControllerState, Panel, PanelError, Window};
use inkframe_kernel::net::{
    Credentials, HttpError, HttpResponse, LinkError, Network, ScanEntry, ScanList,
};
use inkframe_kernel::storage::{Key, Storage, StorageError};

pub const MAC: [u8; 6] = [0x24, 0x0A, 0xC4, 0x00, 0x1F, 0xE2];

// ── Panel ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelOp {
    InitFull,
    InitFast,
    Full,
    Fast,
    Partial(Window),
    Sleep,
}

#[derive(Default)]
pub struct RecordingPanel {
    pub ops: Vec<PanelOp>,
    /// Last full or fast image pushed.
    pub shown: Vec<u8>,
    /// Last partial region pushed.
    pub region: Vec<u8>,
    /// Every display operation overruns its busy wait.
    pub stalls: bool,
    pub busy_timeouts: u32,
    pub asleep: bool,
}

impl RecordingPanel {
    pub fn count(&self, op: &PanelOp) -> usize {
        self.ops.iter().filter(|o| *o == op).count()
    }

    pub fn partials(&self) -> usize {
        self.ops
            .iter()
            .filter(|o| matches!(o, PanelOp::Partial(_)))
            .count()
    }

    pub fn refreshes(&self) -> usize {
        self.count(&PanelOp::Full) + self.count(&PanelOp::Fast)
    }

    fn busy(&mut self) {
        if self.stalls {
            self.busy_timeouts += 1;
        }
    }
}

impl Panel for RecordingPanel {
    fn state(&self) -> ControllerState {
        if self.asleep {
            ControllerState::Asleep
        } else {
            ControllerState::FullReady
        }
    }
    fn init_full(&mut self) -> Result<(), PanelError> {
        self.asleep = false;
        self.ops.push(PanelOp::InitFull);
        Ok(())
    }
    fn init_fast(&mut self) -> Result<(), PanelError> {
        self.asleep = false;
        self.ops.push(PanelOp::InitFast);
        Ok(())
    }
    fn display_full(&mut self, image: &[u8]) -> Result<(), PanelError> {
        self.ops.push(PanelOp::Full);
        self.shown = image.to_vec();
        self.busy();
        Ok(())
    }
    fn display_fast(&mut self, image: &[u8]) -> Result<(), PanelError> {
        self.ops.push(PanelOp::Fast);
        self.shown = image.to_vec();
        self.busy();
        Ok(())
    }
    fn display_partial(&mut self, data: &[u8], window: Window) -> Result<(), PanelError> {
        self.ops.push(PanelOp::Partial(window));
        self.region = data.to_vec();
        self.busy();
        Ok(())
    }
    fn sleep(&mut self) -> Result<(), PanelError> {
        self.asleep = true;
        self.ops.push(PanelOp::Sleep);
        Ok(())
    }
    fn busy_timeouts(&self) -> u32 {
        self.busy_timeouts
    }
}

// ── Network ─────────────────────────────────────────────────────────

pub struct Scripted {
    pub status: u16,
    pub content_length: Option<usize>,
    pub body: Vec<u8>,
}

impl Scripted {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_length: Some(body.len()),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Default)]
pub struct NetLog {
    pub connects: Vec<(String, String)>,
    pub releases: usize,
    pub gets: Vec<String>,
    pub posts: Vec<Post>,
    pub access_point: Option<String>,
}

/// Connect results and responses are consumed in order; when a queue
/// runs dry connects succeed and GETs fail to connect.
#[derive(Default)]
pub struct ScriptedNet {
    pub connect_results: VecDeque<Result<(), LinkError>>,
    pub responses: VecDeque<Scripted>,
    pub networks: Vec<ScanEntry>,
    pub time: Option<u32>,
    /// Returned by `start_access_point` when set.
    pub ap_error: Option<LinkError>,
    pub log: Rc<RefCell<NetLog>>,
    linked: bool,
    current: Vec<u8>,
}

impl ScriptedNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, r: Scripted) -> Self {
        self.responses.push_back(r);
        self
    }

    pub fn connect_fails(mut self, e: LinkError) -> Self {
        self.connect_results.push_back(Err(e));
        self
    }
}

impl Network for ScriptedNet {
    type Body<'a>
        = &'a [u8]
    where
        Self: 'a;

    async fn connect(&mut self, creds: Credentials<'_>, _timeout_ms: u32) -> Result<(), LinkError> {
        self.log
            .borrow_mut()
            .connects
            .push((creds.ssid.to_string(), creds.pass.to_string()));
        let result = self.connect_results.pop_front().unwrap_or(Ok(()));
        self.linked = result.is_ok();
        result
    }

    async fn release(&mut self) {
        self.linked = false;
        self.log.borrow_mut().releases += 1;
    }

    fn mac(&self) -> [u8; 6] {
        MAC
    }

    fn rssi(&self) -> i8 {
        -61
    }

    fn ipv4(&self) -> Option<[u8; 4]> {
        self.linked.then_some([192, 168, 3, 77])
    }

    async fn get(&mut self, url: &str) -> Result<HttpResponse<Self::Body<'_>>, HttpError> {
        self.log.borrow_mut().gets.push(url.to_string());
        let r = self.responses.pop_front().ok_or(HttpError::Connect)?;
        self.current = r.body;
        Ok(HttpResponse {
            status: r.status,
            content_length: r.content_length,
            body: &self.current[..],
        })
    }

    async fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        _content_type: &str,
        body: &[u8],
    ) -> Result<u16, HttpError> {
        self.log.borrow_mut().posts.push(Post {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::from_utf8_lossy(body).into_owned(),
        });
        Ok(200)
    }

    async fn scan(&mut self, out: &mut ScanList) -> Result<(), LinkError> {
        for n in &self.networks {
            let _ = out.push(n.clone());
        }
        Ok(())
    }

    async fn start_access_point(&mut self, ssid: &str) -> Result<(), LinkError> {
        if let Some(e) = self.ap_error {
            return Err(e);
        }
        self.log.borrow_mut().access_point = Some(ssid.to_string());
        Ok(())
    }

    async fn sync_time(&mut self) -> Option<u32> {
        self.time
    }
}

// ── Storage ─────────────────────────────────────────────────────────

/// Cloneable handle; clones share one map so a "reboot" can reuse it.
#[derive(Clone, Default)]
pub struct MemStorage {
    pub map: Rc<RefCell<HashMap<Key, Vec<u8>>>>,
    /// While set, every store fails as a flash write error.
    pub fail_stores: Rc<Cell<bool>>,
}

impl MemStorage {
    pub fn retry_count(&self) -> Option<u8> {
        self.map.borrow().get(&Key::RetryCount).map(|v| v[0])
    }

    pub fn settings(&self) -> Option<Settings> {
        self.map
            .borrow()
            .get(&Key::Settings)
            .and_then(|v| Settings::decode(v))
    }

    pub fn with_settings(self, s: &Settings) -> Self {
        let mut buf = [0u8; inkframe_kernel::config::RECORD_CAP];
        let bytes = s.encode(&mut buf).unwrap().to_vec();
        self.map.borrow_mut().insert(Key::Settings, bytes);
        self
    }
}

impl Storage for MemStorage {
    async fn load(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        match self.map.borrow().get(&key) {
            Some(v) if v.len() > buf.len() => Err(StorageError::BufferTooSmall),
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(Some(v.len()))
            }
            None => Ok(None),
        }
    }

    async fn store(&mut self, key: Key, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_stores.get() {
            return Err(StorageError::Flash);
        }
        self.map.borrow_mut().insert(key, data.to_vec());
        Ok(())
    }
}

// ── Board and delay ─────────────────────────────────────────────────

#[derive(Default)]
pub struct ManualBoard {
    pub now: u64,
    pub pressed: bool,
    pub battery_mv: u16,
}

impl Board for ManualBoard {
    fn now_ms(&self) -> u64 {
        self.now
    }
    fn button_pressed(&mut self) -> bool {
        self.pressed
    }
    fn battery_mv(&mut self) -> u16 {
        self.battery_mv
    }
}

/// Never fires; scripted bodies are always ready or at EOF.
pub struct NeverDelay;

impl embedded_hal_async::delay::DelayNs for NeverDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        core::future::pending::<()>().await
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub const PIXEL_OFFSET: usize = 62;
pub const STRIDE: usize = 52;

/// Full-panel bitmap whose file row `r` (bottom-up) is filled with
/// `r as u8`, padding bytes set to 0xAA.
pub fn panel_bmp() -> Vec<u8> {
    let rows = HEIGHT as usize;
    let rb = (WIDTH as usize).div_ceil(8);
    let mut v = vec![0u8; PIXEL_OFFSET];
    v[0] = b'B';
    v[1] = b'M';
    let size = (PIXEL_OFFSET + rows * STRIDE) as u32;
    v[2..6].copy_from_slice(&size.to_le_bytes());
    v[10..14].copy_from_slice(&(PIXEL_OFFSET as u32).to_le_bytes());
    for r in 0..rows {
        v.extend(std::iter::repeat_n(r as u8, rb));
        v.extend(std::iter::repeat_n(0xAA, STRIDE - rb));
    }
    v
}

pub fn provisioned() -> Settings {
    let mut s = Settings::defaults();
    s.ssid = "home".try_into().unwrap();
    s.pass = "secret".try_into().unwrap();
    s.server = "http://10.0.0.5:8080".try_into().unwrap();
    s
}
