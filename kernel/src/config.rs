// Runtime settings record and portal input validation
//
// One versioned record under `Key::Settings`: a format byte followed by
// the postcard encoding of `Settings`. Missing, stale or undecodable
// records read back as defaults, so a corrupted flash page degrades to
// the setup portal instead of a boot loop.

use heapless::String;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_SERVER, DEFAULT_SLEEP_MIN, MAX_SLEEP_MIN, MIN_SLEEP_MIN};
use crate::storage::{Key, Storage, StorageError};

pub const SSID_CAP: usize = 32;
pub const PASS_CAP: usize = 64;
pub const URL_CAP: usize = 200;
pub const PREFS_CAP: usize = 2048;
pub const TOKEN_CAP: usize = 64;

const FORMAT_VERSION: u8 = 1;

/// Worst-case encoded size plus the version byte.
pub const RECORD_CAP: usize = 2560;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub ssid: String<SSID_CAP>,
    pub pass: String<PASS_CAP>,
    pub server: String<URL_CAP>,
    /// Minutes between image refreshes, also the extended-sleep length.
    pub sleep_min: u16,
    /// Preferences object from the portal, pushed to `/api/config`.
    pub prefs_json: String<PREFS_CAP>,
    pub device_token: String<TOKEN_CAP>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Settings {
    pub fn defaults() -> Self {
        let mut server = String::new();
        let _ = server.push_str(DEFAULT_SERVER);
        Self {
            ssid: String::new(),
            pass: String::new(),
            server,
            sleep_min: DEFAULT_SLEEP_MIN,
            prefs_json: String::new(),
            device_token: String::new(),
        }
    }

    /// Both an access point and a render server are known.
    #[inline]
    pub fn is_provisioned(&self) -> bool {
        !self.ssid.is_empty() && !self.server.is_empty()
    }

    fn sanitize(&mut self) {
        self.sleep_min = self.sleep_min.clamp(MIN_SLEEP_MIN, MAX_SLEEP_MIN);
    }

    /// Stores a validated preferences object and lifts its
    /// `refreshInterval` (if any) into `sleep_min`.
    pub fn apply_prefs(&mut self, json: &str) -> Result<(), ConfigError> {
        validate_prefs(json)?;
        self.prefs_json = String::try_from(json).map_err(|()| ConfigError::PrefsTooLong)?;
        if let Some(min) = extract_refresh_interval(json) {
            info!("config: refreshInterval -> {} min", min);
            self.sleep_min = min;
        }
        Ok(())
    }

    pub fn encode<'a>(&self, buf: &'a mut [u8; RECORD_CAP]) -> Result<&'a [u8], ConfigError> {
        buf[0] = FORMAT_VERSION;
        let used = postcard::to_slice(self, &mut buf[1..])
            .map_err(|_| ConfigError::Encode)?
            .len();
        Ok(&buf[..1 + used])
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&version, body) = bytes.split_first()?;
        if version != FORMAT_VERSION {
            warn!("config: record version {} unsupported", version);
            return None;
        }
        let mut s: Self = postcard::from_bytes(body).ok()?;
        s.sanitize();
        Some(s)
    }

    pub async fn load<S: Storage>(storage: &mut S) -> Self {
        let mut buf = [0u8; RECORD_CAP];
        match storage.load(Key::Settings, &mut buf).await {
            Ok(Some(n)) => Self::decode(&buf[..n]).unwrap_or_else(|| {
                warn!("config: settings record unreadable, using defaults");
                Self::defaults()
            }),
            Ok(None) => Self::defaults(),
            Err(e) => {
                warn!("config: settings load failed: {}", e);
                Self::defaults()
            }
        }
    }

    /// Single-commit write of the whole record.
    pub async fn save<S: Storage>(&self, storage: &mut S) -> Result<(), StorageError> {
        let mut buf = [0u8; RECORD_CAP];
        let bytes = self.encode(&mut buf).map_err(|_| StorageError::BufferTooSmall)?;
        storage.store(Key::Settings, bytes).await
    }
}

// ── Validation ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    EmptySsid,
    BadServerUrl,
    EmptyPrefs,
    BadPrefsFormat,
    PrefsTooLong,
    Encode,
}

impl ConfigError {
    /// Message returned to the portal page.
    pub fn message(self) -> &'static str {
        match self {
            Self::EmptySsid => "SSID empty",
            Self::BadServerUrl => "Server URL must start with http:// or https://",
            Self::EmptyPrefs => "Config empty",
            Self::BadPrefsFormat => "Invalid config format",
            Self::PrefsTooLong => "Config too long",
            Self::Encode => "Settings could not be saved",
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn clean<const N: usize>(raw: &str, strict: bool) -> String<N> {
    let cut = floor_char_boundary(raw, N);
    let mut out = String::new();
    for c in raw[..cut].trim().chars() {
        let dropped = match c {
            '<' | '>' => true,
            '"' | '\'' | '&' | '\\' => strict,
            c if (c as u32) < 0x20 => strict,
            _ => false,
        };
        if !dropped {
            let _ = out.push(c);
        }
    }
    out
}

/// Cut to `N` bytes, trim, strip markup brackets.
pub fn sanitize<const N: usize>(raw: &str) -> String<N> {
    clean(raw, false)
}

/// `sanitize` plus quotes, `&`, backslash and control characters. Used
/// for the SSID and passphrase.
pub fn sanitize_text<const N: usize>(raw: &str) -> String<N> {
    clean(raw, true)
}

/// Validates a server address and drops trailing slashes. An empty
/// input means "keep the current server" and yields `None`.
pub fn normalize_server(raw: &str) -> Result<Option<String<URL_CAP>>, ConfigError> {
    let url: String<URL_CAP> = sanitize(raw);
    if url.is_empty() {
        return Ok(None);
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::BadServerUrl);
    }
    let trimmed = url.trim_end_matches('/');
    String::try_from(trimmed)
        .map(Some)
        .map_err(|()| ConfigError::BadServerUrl)
}

/// Minimal shape check: an object that mentions `"modes"`.
pub fn validate_prefs(json: &str) -> Result<(), ConfigError> {
    if json.is_empty() {
        return Err(ConfigError::EmptyPrefs);
    }
    if json.len() < 2 || !json.starts_with('{') || !json.ends_with('}') {
        return Err(ConfigError::BadPrefsFormat);
    }
    if !json.contains("\"modes\"") {
        return Err(ConfigError::BadPrefsFormat);
    }
    Ok(())
}

/// `refreshInterval` in minutes, clamped to 10..=1440. A key with an
/// unparsable value counts as 0 and clamps up to the minimum.
pub fn extract_refresh_interval(json: &str) -> Option<u16> {
    let at = json.find("\"refreshInterval\"")?;
    let rest = &json[at..];
    let colon = rest.find(':')?;
    let value = leading_int(&rest[colon + 1..]);
    Some(value.clamp(MIN_SLEEP_MIN as i64, MAX_SLEEP_MIN as i64) as u16)
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let s = s.strip_prefix('"').unwrap_or(s);
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }
    if neg { -value } else { value }
}
