// Radio and HTTP client contract
//
// The firmware implements this over esp-radio + embassy-net; tests use
// scripted fakes. Every call is bounded: `connect` by its timeout
// argument, HTTP by the implementation's response timeout, and body
// reads by the caller (see `bmp::decode`).

use core::fmt::Write;

use heapless::{String, Vec};

use crate::consts::{HEIGHT, WIDTH};
use crate::fmt::{MacDisplay, StackFmt, Volts};

pub const MAX_SCAN_RESULTS: usize = 20;

pub type ScanList = Vec<ScanEntry, MAX_SCAN_RESULTS>;

#[derive(Clone, Copy, Debug)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub pass: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String<32>,
    pub rssi: i8,
    pub secure: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// The access point was not seen in a scan.
    NotFound,
    /// Seen, but association or the handshake failed.
    AuthFailed,
    /// No address within the bound.
    Timeout,
    /// Driver-level failure (radio off, bad config).
    Radio,
}

impl LinkError {
    /// Short code shown by the portal status endpoint.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NO_SSID",
            Self::AuthFailed => "AUTH_FAIL",
            Self::Timeout => "TIMEOUT",
            Self::Radio => "RADIO",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Network not found",
            Self::AuthFailed => "Wrong password",
            Self::Timeout => "Connection timed out, try again",
            Self::Radio => "WiFi hardware error",
        }
    }
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "link {}", self.code())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpError {
    /// Not an `http://` URL (TLS is not available on the device).
    UnsupportedScheme,
    BadUrl,
    Dns,
    Connect,
    /// No complete response head within the bound.
    Timeout,
    Io,
    BadResponse,
    /// Response head was fine but the status was not 200.
    Status(u16),
}

impl core::fmt::Display for HttpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedScheme => write!(f, "unsupported url scheme"),
            Self::BadUrl => write!(f, "malformed url"),
            Self::Dns => write!(f, "dns lookup failed"),
            Self::Connect => write!(f, "tcp connect failed"),
            Self::Timeout => write!(f, "response timeout"),
            Self::Io => write!(f, "socket error"),
            Self::BadResponse => write!(f, "malformed response"),
            Self::Status(code) => write!(f, "http status {}", code),
        }
    }
}

/// A successful response head; the body is streamed.
pub struct HttpResponse<B> {
    pub status: u16,
    pub content_length: Option<usize>,
    pub body: B,
}

#[allow(async_fn_in_trait)]
pub trait Network {
    type Body<'a>: embedded_io_async::Read
    where
        Self: 'a;

    /// Station association plus DHCP, bounded by `timeout_ms`.
    async fn connect(&mut self, creds: Credentials<'_>, timeout_ms: u32) -> Result<(), LinkError>;

    /// Disconnects and powers the station side down.
    async fn release(&mut self);

    fn mac(&self) -> [u8; 6];

    /// Signal strength of the current association, dBm.
    fn rssi(&self) -> i8;

    fn ipv4(&self) -> Option<[u8; 4]>;

    /// Any status is returned as a response; transport failures are
    /// errors.
    async fn get(&mut self, url: &str) -> Result<HttpResponse<Self::Body<'_>>, HttpError>;

    /// Fire-and-check POST; returns the status code.
    async fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        content_type: &str,
        body: &[u8],
    ) -> Result<u16, HttpError>;

    async fn scan(&mut self, out: &mut ScanList) -> Result<(), LinkError>;

    /// Open access point with the given name at `consts::AP_ADDR`.
    async fn start_access_point(&mut self, ssid: &str) -> Result<(), LinkError>;

    /// Unix seconds from a time server, if one answers.
    async fn sync_time(&mut self) -> Option<u32>;
}

// ── URL and body builders ───────────────────────────────────────────

pub type Url = StackFmt<384>;

#[derive(Clone, Copy, Debug)]
pub struct RenderQuery<'a> {
    pub server: &'a str,
    pub battery_mv: u16,
    pub mac: &'a [u8; 6],
    pub rssi: i8,
    pub next: bool,
}

/// `GET {server}/api/render?v=..&mac=..&rssi=..&w=..&h=..[&next=1]`
pub fn render_url(q: &RenderQuery<'_>) -> Result<Url, HttpError> {
    let mut url = Url::new();
    let _ = write!(
        url,
        "{}/api/render?v={}&mac={}&rssi={}&w={}&h={}",
        q.server,
        Volts(q.battery_mv),
        MacDisplay(q.mac),
        q.rssi,
        WIDTH,
        HEIGHT
    );
    if q.next {
        let _ = url.write_str("&next=1");
    }
    if url.truncated() {
        return Err(HttpError::BadUrl);
    }
    Ok(url)
}

pub fn favorite_url(server: &str, mac: &[u8; 6]) -> Result<Url, HttpError> {
    let mut url = Url::new();
    let _ = write!(url, "{}/api/device/{}/favorite", server, MacDisplay(mac));
    if url.truncated() {
        return Err(HttpError::BadUrl);
    }
    Ok(url)
}

pub fn config_url(server: &str) -> Result<Url, HttpError> {
    let mut url = Url::new();
    let _ = write!(url, "{}/api/config", server);
    if url.truncated() {
        return Err(HttpError::BadUrl);
    }
    Ok(url)
}

/// Stored preferences with `"mac"` injected as the first member.
pub fn config_body(prefs: &str, mac: &[u8; 6]) -> Option<StackFmt<2112>> {
    let rest = prefs.strip_prefix('{')?;
    let mut body = StackFmt::<2112>::new();
    let _ = write!(body, "{{\"mac\":\"{}\",{}", MacDisplay(mac), rest);
    (!body.truncated()).then_some(body)
}

/// Host part and port of an `http://` URL plus the path to request.
#[derive(Debug, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

pub fn split_url(url: &str) -> Result<UrlParts<'_>, HttpError> {
    let rest = match url.strip_prefix("http://") {
        Some(rest) => rest,
        None if url.starts_with("https://") => return Err(HttpError::UnsupportedScheme),
        None => return Err(HttpError::BadUrl),
    };
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().map_err(|_| HttpError::BadUrl)?),
        None => (authority, 80),
    };
    if host.is_empty() {
        return Err(HttpError::BadUrl);
    }
    Ok(UrlParts { host, port, path })
}

/// Dotted-quad literal, for skipping DNS.
pub fn parse_ipv4(host: &str) -> Option<[u8; 4]> {
    let mut out = [0u8; 4];
    let mut parts = host.split('.');
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}

/// Status code and `Content-Length` of a response head (everything
/// before the blank line).
pub fn response_head(head: &[u8]) -> Result<(u16, Option<usize>), HttpError> {
    let text = core::str::from_utf8(head).map_err(|_| HttpError::BadResponse)?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().ok_or(HttpError::BadResponse)?;
    let mut parts = status_line.split(' ');
    if !parts.next().is_some_and(|v| v.starts_with("HTTP/1.")) {
        return Err(HttpError::BadResponse);
    }
    let status = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or(HttpError::BadResponse)?;
    let length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok());
    Ok((status, length))
}
