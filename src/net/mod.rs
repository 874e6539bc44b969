// WiFi station/access point and HTTP client over esp-radio + embassy-net
//
// One radio, two interfaces: `sta` (DHCP client, used for the image
// server and SNTP) and `ap` (static 192.168.4.1/24, used only while the
// setup portal runs). Both stacks get runner tasks at bring-up; the
// controller decides which side is actually on air.

pub mod http;
pub mod portal;

use alloc::string::String;

use embassy_executor::Spawner;
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{
    Config as NetConfig, DhcpConfig, IpAddress, IpEndpoint, Ipv4Address, Ipv4Cidr, Runner, Stack,
    StackResources, StaticConfigV4,
};
use embassy_time::{Duration, with_timeout};
use esp_hal::peripherals::WIFI;
use esp_hal::rng::Rng;
use esp_radio::Controller;
use esp_radio::wifi::{
    self, AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, ScanConfig, WifiController,
    WifiDevice, WifiError,
};
use heapless::Vec;
use inkframe_kernel::consts::{AP_ADDR, AP_PREFIX_LEN, SNTP_TIMEOUT_MS};
use inkframe_kernel::net::{
    Credentials, HttpError, HttpResponse, LinkError, MAX_SCAN_RESULTS, Network, ScanEntry,
    ScanList, parse_ipv4,
};
use inkframe_kernel::sntp;
use log::{info, warn};

use crate::mk_static;

pub use http::HttpBody;

// image stream window; the panel bitmap is ~15.6 KB
const RX_LEN: usize = 4096;
// config push bodies are written in chunks
const TX_LEN: usize = 1024;
const HEAD_LEN: usize = 1024;

const SNTP_LOCAL_PORT: u16 = 50_123;

#[embassy_executor::task(pool_size = 2)]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

fn seed() -> u64 {
    let rng = Rng::new();
    (rng.random() as u64) << 32 | rng.random() as u64
}

/// Initializes the radio and both network stacks and spawns their
/// runners. Panics only if the radio cannot be brought up at all.
pub fn bring_up(spawner: &Spawner, wifi: WIFI<'static>) -> WifiNet {
    let radio = mk_static!(
        Controller<'static>,
        esp_radio::init().expect("radio init failed")
    );
    let (ctrl, interfaces) =
        wifi::new(radio, wifi, Default::default()).expect("wifi driver init failed");

    let mac = interfaces.sta.mac_address();

    let (sta, sta_runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(DhcpConfig::default()),
        mk_static!(StackResources<4>, StackResources::<4>::new()),
        seed(),
    );

    let [a, b, c, d] = AP_ADDR;
    let ap_cfg = StaticConfigV4 {
        address: Ipv4Cidr::new(Ipv4Address::new(a, b, c, d), AP_PREFIX_LEN),
        gateway: Some(Ipv4Address::new(a, b, c, d)),
        dns_servers: Vec::new(),
    };
    let (ap, ap_runner) = embassy_net::new(
        interfaces.ap,
        NetConfig::ipv4_static(ap_cfg),
        mk_static!(StackResources<4>, StackResources::<4>::new()),
        seed(),
    );

    spawner.spawn(net_task(sta_runner)).ok();
    spawner.spawn(net_task(ap_runner)).ok();

    WifiNet {
        ctrl,
        sta,
        ap,
        mac,
        rssi: 0,
        ap_config: None,
        rx: [0u8; RX_LEN],
        tx: [0u8; TX_LEN],
        head: [0u8; HEAD_LEN],
    }
}

fn radio_err(e: WifiError) -> LinkError {
    warn!("wifi: driver error {:?}", e);
    LinkError::Radio
}

pub struct WifiNet {
    ctrl: WifiController<'static>,
    sta: Stack<'static>,
    ap: Stack<'static>,
    mac: [u8; 6],
    rssi: i8,
    // set while the setup portal is on air
    ap_config: Option<AccessPointConfig>,
    rx: [u8; RX_LEN],
    tx: [u8; TX_LEN],
    head: [u8; HEAD_LEN],
}

impl WifiNet {
    /// Stack serving the setup portal.
    pub fn ap_stack(&self) -> Stack<'static> {
        self.ap
    }

    async fn ensure_started(&mut self) -> Result<(), LinkError> {
        if !matches!(self.ctrl.is_started(), Ok(true)) {
            self.ctrl.start_async().await.map_err(radio_err)?;
        }
        Ok(())
    }

    async fn ssid_visible(&mut self, ssid: &str) -> bool {
        let mut list = ScanList::new();
        self.scan(&mut list).await.is_ok() && list.iter().any(|n| n.ssid == ssid)
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, HttpError> {
        if let Some([a, b, c, d]) = parse_ipv4(host) {
            return Ok(IpAddress::Ipv4(Ipv4Address::new(a, b, c, d)));
        }
        let addrs = self
            .sta
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("dns: {} failed: {:?}", host, e);
                HttpError::Dns
            })?;
        addrs.first().copied().ok_or(HttpError::Dns)
    }
}

impl Network for WifiNet {
    type Body<'a>
        = HttpBody<'a>
    where
        Self: 'a;

    async fn connect(&mut self, creds: Credentials<'_>, timeout_ms: u32) -> Result<(), LinkError> {
        info!("wifi: connecting to '{}'", creds.ssid);
        let client = ClientConfig::default()
            .with_ssid(String::from(creds.ssid))
            .with_password(String::from(creds.pass));
        let mode = match &self.ap_config {
            Some(ap) => ModeConfig::ApSta(client, ap.clone()),
            None => ModeConfig::Client(client),
        };
        self.ctrl.set_config(&mode).map_err(radio_err)?;
        self.ensure_started().await?;

        let ctrl = &mut self.ctrl;
        let sta = self.sta;
        let joined = with_timeout(Duration::from_millis(timeout_ms as u64), async {
            let associated = ctrl.connect_async().await;
            if associated.is_ok() {
                sta.wait_config_up().await;
            }
            associated
        })
        .await;

        match joined {
            Ok(Ok(())) => {
                self.rssi = self
                    .ctrl
                    .rssi()
                    .map(|r| r.clamp(i8::MIN as i32, 0) as i8)
                    .unwrap_or(0);
                if let Some(cfg) = self.sta.config_v4() {
                    info!("wifi: up, ip={} rssi={}", cfg.address.address(), self.rssi);
                }
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("wifi: association failed: {:?}", e);
                if self.ssid_visible(creds.ssid).await {
                    Err(LinkError::AuthFailed)
                } else {
                    Err(LinkError::NotFound)
                }
            }
            Err(_) => {
                warn!("wifi: no address within {}ms", timeout_ms);
                let _ = self.ctrl.disconnect_async().await;
                Err(LinkError::Timeout)
            }
        }
    }

    async fn release(&mut self) {
        let _ = self.ctrl.disconnect_async().await;
        // the portal keeps its access point up
        if self.ap_config.is_none() {
            let _ = self.ctrl.stop_async().await;
        }
        self.rssi = 0;
    }

    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn rssi(&self) -> i8 {
        self.rssi
    }

    fn ipv4(&self) -> Option<[u8; 4]> {
        if !self.sta.is_link_up() {
            return None;
        }
        self.sta.config_v4().map(|c| c.address.address().octets())
    }

    async fn get(&mut self, url: &str) -> Result<HttpResponse<HttpBody<'_>>, HttpError> {
        let parts = inkframe_kernel::net::split_url(url)?;
        let addr = self.resolve(parts.host).await?;
        let Self {
            sta, rx, tx, head, ..
        } = self;
        http::get(*sta, rx, tx, head, addr, &parts).await
    }

    async fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        content_type: &str,
        body: &[u8],
    ) -> Result<u16, HttpError> {
        let parts = inkframe_kernel::net::split_url(url)?;
        let addr = self.resolve(parts.host).await?;
        let Self {
            sta, rx, tx, head, ..
        } = self;
        let req = http::Post {
            headers,
            content_type,
            body,
        };
        http::post(*sta, rx, tx, head, addr, &parts, &req).await
    }

    async fn scan(&mut self, out: &mut ScanList) -> Result<(), LinkError> {
        self.ensure_started().await?;
        let found = self
            .ctrl
            .scan_with_config_async(ScanConfig::default().with_max(MAX_SCAN_RESULTS))
            .await
            .map_err(radio_err)?;

        for ap in found.iter() {
            if ap.ssid.is_empty() || out.iter().any(|n| n.ssid == ap.ssid.as_str()) {
                continue;
            }
            let Ok(ssid) = heapless::String::try_from(ap.ssid.as_str()) else {
                continue;
            };
            let entry = ScanEntry {
                ssid,
                rssi: ap.signal_strength,
                secure: !matches!(ap.auth_method, None | Some(AuthMethod::None)),
            };
            if out.push(entry).is_err() {
                break;
            }
        }
        info!("wifi: scan found {} networks", out.len());
        Ok(())
    }

    async fn start_access_point(&mut self, ssid: &str) -> Result<(), LinkError> {
        let ap = AccessPointConfig::default()
            .with_ssid(String::from(ssid))
            .with_auth_method(AuthMethod::None);
        self.ctrl
            .set_config(&ModeConfig::ApSta(ClientConfig::default(), ap.clone()))
            .map_err(radio_err)?;
        self.ensure_started().await?;
        self.ap_config = Some(ap);
        info!("wifi: access point '{}' up", ssid);
        Ok(())
    }

    async fn sync_time(&mut self) -> Option<u32> {
        let server = self.resolve(sntp::SERVER).await.ok()?;

        let mut rx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];
        let mut rx_buf = [0u8; 128];
        let mut tx_buf = [0u8; 64];
        let mut socket = UdpSocket::new(self.sta, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);
        socket.bind(SNTP_LOCAL_PORT).ok()?;
        socket
            .send_to(&sntp::request(), IpEndpoint::new(server, sntp::NTP_PORT))
            .await
            .ok()?;

        let mut pkt = [0u8; 64];
        let got = with_timeout(
            Duration::from_millis(SNTP_TIMEOUT_MS as u64),
            socket.recv_from(&mut pkt),
        )
        .await;
        match got {
            Ok(Ok((n, _))) => sntp::parse_reply(&pkt[..n]),
            _ => {
                warn!("sntp: no reply from {}", sntp::SERVER);
                None
            }
        }
    }
}
