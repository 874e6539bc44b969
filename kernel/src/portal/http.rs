// Just enough HTTP/1.0 for the setup page: one request per
// connection, urlencoded form bodies, small JSON replies.

use core::fmt::Write;

use heapless::String;

use crate::fmt::StackFmt;

/// Request head plus body must fit in this many bytes.
pub const REQUEST_CAP: usize = 4096;

pub type JsonBody = StackFmt<2048>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Head not terminated by a blank line yet.
    Incomplete,
    Malformed,
}

#[derive(Debug)]
pub struct Request<'a> {
    pub method: Method,
    /// Path without the query string.
    pub path: &'a str,
    pub query: &'a str,
    pub body: &'a str,
}

/// Offset just past the `\r\n\r\n` ending the head.
pub fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// `Content-Length` from a request head, 0 if absent.
pub fn content_length(head: &[u8]) -> usize {
    let Ok(head) = core::str::from_utf8(head) else {
        return 0;
    };
    head.split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Parses a complete request (head and `Content-Length` body).
pub fn parse(buf: &[u8]) -> Result<Request<'_>, ParseError> {
    let end = head_end(buf).ok_or(ParseError::Incomplete)?;
    let text = core::str::from_utf8(buf).map_err(|_| ParseError::Malformed)?;
    let line = text[..end].split("\r\n").next().ok_or(ParseError::Malformed)?;
    let mut parts = line.split(' ');
    let method = match parts.next() {
        Some("GET") | Some("HEAD") => Method::Get,
        Some("POST") => Method::Post,
        Some(_) => Method::Other,
        None => return Err(ParseError::Malformed),
    };
    let target = parts.next().ok_or(ParseError::Malformed)?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let want = content_length(&buf[..end]);
    let body_end = (end + want).min(text.len());
    // a length that ends inside a UTF-8 sequence
    let body = text.get(end..body_end).ok_or(ParseError::Malformed)?;
    Ok(Request {
        method,
        path,
        query,
        body,
    })
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes `%XX` and `+`. Invalid UTF-8 after decoding gives `None`;
/// output past `N` bytes is cut on a char boundary.
pub fn url_decode<const N: usize>(raw: &str) -> Option<String<N>> {
    let mut bytes: heapless::Vec<u8, N> = heapless::Vec::new();
    let src = raw.as_bytes();
    let mut i = 0;
    while i < src.len() {
        let b = match src[i] {
            b'+' => b' ',
            b'%' if i + 2 < src.len() => {
                match (hex(src[i + 1]), hex(src[i + 2])) {
                    (Some(h), Some(l)) => {
                        i += 2;
                        (h << 4) | l
                    }
                    _ => b'%',
                }
            }
            b => b,
        };
        if bytes.push(b).is_err() {
            break;
        }
        i += 1;
    }
    let valid = match core::str::from_utf8(&bytes) {
        Ok(s) => s.len(),
        // clipped mid-character at the cap
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => return None,
    };
    let mut out = String::new();
    let text = core::str::from_utf8(&bytes[..valid]).ok()?;
    out.push_str(text).ok()?;
    Some(out)
}

/// Raw (still encoded) value of `key` in an urlencoded string.
pub fn form_field<'a>(form: &'a str, key: &str) -> Option<&'a str> {
    form.split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Decoded `key` of `form`; missing or undecodable reads as empty.
pub fn form_value<const N: usize>(form: &str, key: &str) -> String<N> {
    form_field(form, key)
        .and_then(url_decode::<N>)
        .unwrap_or_default()
}

// ── Responses ───────────────────────────────────────────────────────

pub enum Body {
    Empty,
    Static(&'static str),
    Json(JsonBody),
}

pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub location: Option<&'static str>,
    /// `Access-Control-Allow-Origin: *`
    pub cors: bool,
    pub body: Body,
}

impl Response {
    pub fn html(page: &'static str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            location: None,
            cors: false,
            body: Body::Static(page),
        }
    }

    pub fn json(body: JsonBody) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            location: None,
            cors: false,
            body: Body::Json(body),
        }
    }

    pub fn json_static(body: &'static str) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            location: None,
            cors: false,
            body: Body::Static(body),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            location: None,
            cors: false,
            body: Body::Empty,
        }
    }

    pub fn redirect(location: &'static str) -> Self {
        Self {
            location: Some(location),
            ..Self::status(302)
        }
    }

    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Empty => &[],
            Body::Static(s) => s.as_bytes(),
            Body::Json(j) => j.as_bytes(),
        }
    }

    /// Status line and headers, through the blank line.
    pub fn head(&self) -> StackFmt<256> {
        let mut h = StackFmt::new();
        let _ = write!(
            h,
            "HTTP/1.0 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            reason(self.status),
            self.content_type,
            self.body_bytes().len()
        );
        if let Some(loc) = self.location {
            let _ = write!(h, "Location: {}\r\n", loc);
        }
        if self.cors {
            let _ = h.write_str("Access-Control-Allow-Origin: *\r\n");
        }
        let _ = h.write_str("\r\n");
        h
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        302 => "Found",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Status",
    }
}
