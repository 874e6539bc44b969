// Setup portal: routes for the configuration page served on the
// device's own access point
//
// The firmware accepts connections, parses them with `http::parse` and
// hands each request to `Portal::handle`; the reply goes back as-is.
// Work that must not hold up a reply (pushing preferences upstream,
// the deferred restart) happens in `Portal::poll` between requests.
//
//   GET  /             setup page
//   GET  /scan         nearby networks
//   GET  /info         MAC, battery, server
//   GET  /status       station link state
//   POST /save_wifi    ssid, pass, server (connects before saving)
//   POST /save_config  config (JSON), token
//   POST /restart      restart in 1s
//   anything else      captive-portal probes answered, rest redirected

pub mod dhcp;
pub mod dns;
pub mod http;

use core::fmt::Write;

use heapless::String;
use log::{info, warn};

use crate::config::{
    self, ConfigError, PASS_CAP, PREFS_CAP, SSID_CAP, Settings, TOKEN_CAP, URL_CAP,
};
use crate::consts::{AP_PREFIX, DEFERRED_RESTART_MS, RESTART_DELAY_SECS, WIFI_TIMEOUT_MS};
use crate::fmt::{JsonStr, MacDisplay, Volts};
use crate::net::{self, Credentials, LinkError, Network, ScanList};
use crate::storage::Storage;

pub use http::{Method, Request, Response};

pub const PAGE: &str = include_str!("page.html");

const PORTAL_URL: &str = "http://192.168.4.1";

const PROBE_PATHS: [&str; 6] = [
    "/generate_204",
    "/gen_204",
    "/hotspot-detect.html",
    "/canonical.html",
    "/success.txt",
    "/ncsi.txt",
];

/// `InkSight-` plus the last two MAC octets in upper-case hex.
pub fn ap_name(mac: &[u8; 6]) -> String<16> {
    let mut name = String::new();
    let _ = write!(name, "{}{:02X}{:02X}", AP_PREFIX, mac[4], mac[5]);
    name
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    Connected,
    Failed(LinkError),
}

/// Collaborators a request may touch.
pub struct PortalEnv<'a, N, S> {
    pub net: &'a mut N,
    pub storage: &'a mut S,
    pub settings: &'a mut Settings,
    pub battery_mv: u16,
    pub now_ms: u64,
}

pub struct Portal {
    status: LinkStatus,
    push_pending: bool,
    restart_at: Option<u64>,
}

impl Default for Portal {
    fn default() -> Self {
        Self::new()
    }
}

impl Portal {
    pub const fn new() -> Self {
        Self {
            status: LinkStatus::Idle,
            push_pending: false,
            restart_at: None,
        }
    }

    #[inline]
    pub fn restart_at(&self) -> Option<u64> {
        self.restart_at
    }

    pub async fn handle<N: Network, S: Storage>(
        &mut self,
        req: &Request<'_>,
        env: PortalEnv<'_, N, S>,
    ) -> Response {
        match (req.method, req.path) {
            (Method::Get, "/") => Response::html(PAGE),
            (Method::Get, "/scan") => scan(env.net).await.with_cors(),
            (Method::Get, "/info") => info_json(&env),
            (Method::Get, "/status") => self.status_json(env.net).with_cors(),
            (Method::Post, "/save_wifi") => self.save_wifi(req.body, env).await,
            (Method::Post, "/save_config") => self.save_config(req.body, env).await,
            (Method::Post, "/restart") => {
                info!("portal: restart requested");
                self.schedule_restart(env.now_ms + RESTART_DELAY_SECS as u64 * 1000);
                Response::json_static("{\"ok\":true}")
            }
            _ => captive(req.path),
        }
    }

    /// Background work between requests. Returns true once the
    /// scheduled restart is due.
    pub async fn poll<N: Network, S: Storage>(&mut self, env: PortalEnv<'_, N, S>) -> bool {
        if self.push_pending {
            self.push_pending = false;
            push_config(env.net, env.settings).await;
        }
        self.restart_at.is_some_and(|at| env.now_ms >= at)
    }

    fn schedule_restart(&mut self, at: u64) {
        // an earlier deadline wins
        self.restart_at = Some(self.restart_at.map_or(at, |cur| cur.min(at)));
    }

    fn status_json<N: Network>(&self, net: &N) -> Response {
        let mut body = http::JsonBody::new();
        let _ = match self.status {
            LinkStatus::Idle => body.write_str("{\"state\":\"idle\"}"),
            LinkStatus::Connecting => body.write_str("{\"state\":\"connecting\"}"),
            LinkStatus::Connected => {
                let [a, b, c, d] = net.ipv4().unwrap_or([0; 4]);
                write!(body, "{{\"state\":\"connected\",\"ip\":\"{}.{}.{}.{}\"}}", a, b, c, d)
            }
            LinkStatus::Failed(e) => {
                write!(body, "{{\"state\":\"failed\",\"error\":\"{}\"}}", e.code())
            }
        };
        Response::json(body)
    }

    async fn save_wifi<N: Network, S: Storage>(
        &mut self,
        form: &str,
        env: PortalEnv<'_, N, S>,
    ) -> Response {
        let ssid: String<SSID_CAP> =
            config::sanitize_text(&http::form_value::<SSID_CAP>(form, "ssid"));
        let pass: String<PASS_CAP> =
            config::sanitize_text(&http::form_value::<PASS_CAP>(form, "pass"));
        let server_raw = http::form_value::<URL_CAP>(form, "server");

        if ssid.is_empty() {
            return fail(ConfigError::EmptySsid.message());
        }
        let server = match config::normalize_server(&server_raw) {
            Ok(server) => server,
            Err(e) => {
                warn!("portal: rejected server url");
                return fail(e.message());
            }
        };

        info!("portal: connecting to '{}'", ssid.as_str());
        self.status = LinkStatus::Connecting;
        let creds = Credentials {
            ssid: &ssid,
            pass: &pass,
        };
        match env.net.connect(creds, WIFI_TIMEOUT_MS).await {
            Ok(()) => {
                let mut next = env.settings.clone();
                next.ssid = ssid;
                next.pass = pass;
                if let Some(server) = server {
                    next.server = server;
                }
                if let Err(e) = next.save(env.storage).await {
                    warn!("portal: saving credentials failed: {}", e);
                    self.status = LinkStatus::Idle;
                    env.net.release().await;
                    return fail(ConfigError::Encode.message());
                }
                *env.settings = next;
                self.status = LinkStatus::Connected;
                info!("portal: wifi ok, credentials saved");
                Response::json_static("{\"ok\":true}")
            }
            Err(e) => {
                warn!("portal: connect failed: {}", e);
                self.status = LinkStatus::Failed(e);
                env.net.release().await;
                fail(e.message())
            }
        }
    }

    async fn save_config<N: Network, S: Storage>(
        &mut self,
        form: &str,
        env: PortalEnv<'_, N, S>,
    ) -> Response {
        let prefs: String<PREFS_CAP> =
            config::sanitize(&http::form_value::<PREFS_CAP>(form, "config"));
        let token: String<TOKEN_CAP> =
            config::sanitize_text(&http::form_value::<TOKEN_CAP>(form, "token"));

        let mut next = env.settings.clone();
        if let Err(e) = next.apply_prefs(&prefs) {
            return fail(e.message());
        }
        if !token.is_empty() {
            next.device_token = token;
        }
        if let Err(e) = next.save(env.storage).await {
            warn!("portal: saving config failed: {}", e);
            return fail(ConfigError::Encode.message());
        }
        *env.settings = next;
        info!("portal: config saved, restart in {}s", DEFERRED_RESTART_MS / 1000);

        if self.status == LinkStatus::Connected {
            self.push_pending = true;
        }
        self.schedule_restart(env.now_ms + DEFERRED_RESTART_MS);
        Response::json_static("{\"ok\":true}")
    }
}

fn fail(msg: &str) -> Response {
    let mut body = http::JsonBody::new();
    let _ = write!(body, "{{\"ok\":false,\"msg\":\"{}\"}}", JsonStr(msg));
    Response::json(body)
}

async fn scan<N: Network>(net: &mut N) -> Response {
    let mut list = ScanList::new();
    if let Err(e) = net.scan(&mut list).await {
        warn!("portal: scan failed: {}", e);
    }
    info!("portal: {} networks", list.len());
    let mut body = http::JsonBody::new();
    let _ = body.write_str("{\"networks\":[");
    for (i, ap) in list.iter().enumerate() {
        let _ = write!(
            body,
            "{}{{\"ssid\":\"{}\",\"rssi\":{},\"secure\":{}}}",
            if i > 0 { "," } else { "" },
            JsonStr(&ap.ssid),
            ap.rssi,
            ap.secure
        );
    }
    let _ = body.write_str("]}");
    Response::json(body)
}

fn info_json<N: Network, S>(env: &PortalEnv<'_, N, S>) -> Response {
    let mut body = http::JsonBody::new();
    let mac = env.net.mac();
    let _ = write!(
        body,
        "{{\"mac\":\"{}\",\"battery\":\"{}V\",\"server_url\":\"{}\"}}",
        MacDisplay(&mac),
        Volts(env.battery_mv),
        JsonStr(&env.settings.server)
    );
    Response::json(body)
}

fn captive(path: &str) -> Response {
    if PROBE_PATHS.contains(&path) {
        return Response::status(204);
    }
    if path.ends_with(".ico") || path.ends_with(".png") || path.ends_with(".jpg") {
        return Response::status(404);
    }
    Response::redirect(PORTAL_URL)
}

async fn push_config<N: Network>(net: &mut N, settings: &Settings) {
    if settings.prefs_json.is_empty() {
        return;
    }
    let mac = net.mac();
    let (Ok(url), Some(body)) = (
        net::config_url(&settings.server),
        net::config_body(&settings.prefs_json, &mac),
    ) else {
        warn!("portal: config push skipped, bad url or body");
        return;
    };
    match net
        .post(url.as_str(), &[], "application/json", body.as_bytes())
        .await
    {
        Ok(status) => info!("portal: POST /api/config -> {}", status),
        Err(e) => warn!("portal: POST /api/config failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ap_name_from_mac() {
        assert_eq!(ap_name(&[0x24, 0x0A, 0xC4, 0x00, 0x1f, 0xe2]).as_str(), "InkSight-1FE2");
    }

    #[test]
    fn test_captive_rules() {
        assert_eq!(captive("/generate_204").status, 204);
        assert_eq!(captive("/hotspot-detect.html").status, 204);
        assert_eq!(captive("/ncsi.txt").status, 204);
        assert_eq!(captive("/favicon.ico").status, 404);
        assert_eq!(captive("/logo.png").status, 404);
        let r = captive("/some/page");
        assert_eq!(r.status, 302);
        assert_eq!(r.location, Some(PORTAL_URL));
    }

    #[test]
    fn test_restart_deadline_keeps_earliest() {
        let mut p = Portal::new();
        p.schedule_restart(30_000);
        p.schedule_restart(2_000);
        p.schedule_restart(40_000);
        assert_eq!(p.restart_at(), Some(2_000));
    }
}
