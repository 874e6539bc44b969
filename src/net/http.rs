// Minimal HTTP/1.0 client: one request per connection, no TLS.
//
// The response head is read into a bounded buffer; whatever body bytes
// arrived with it are replayed before the socket is read again.

use core::fmt::Write as _;

use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use inkframe_kernel::consts::HTTP_TIMEOUT_MS;
use inkframe_kernel::fmt::StackFmt;
use inkframe_kernel::net::{HttpError, HttpResponse, UrlParts, response_head};
use inkframe_kernel::portal::http::head_end;
use log::{debug, warn};

/// Streamed response body, capped at `Content-Length` when the server
/// sent one, otherwise read until the peer closes.
pub struct HttpBody<'a> {
    socket: TcpSocket<'a>,
    pending: &'a [u8],
    remaining: Option<usize>,
}

impl ErrorType for HttpBody<'_> {
    type Error = ErrorKind;
}

impl Read for HttpBody<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        let limit = match self.remaining {
            Some(0) => return Ok(0),
            Some(n) => n.min(buf.len()),
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(0);
        }

        let n = if !self.pending.is_empty() {
            let n = limit.min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending = &self.pending[n..];
            n
        } else {
            self.socket
                .read(&mut buf[..limit])
                .await
                .map_err(|_| ErrorKind::ConnectionReset)?
        };

        if let Some(rem) = self.remaining.as_mut() {
            *rem -= n;
        }
        Ok(n)
    }
}

pub struct Post<'r> {
    pub headers: &'r [(&'r str, &'r str)],
    pub content_type: &'r str,
    pub body: &'r [u8],
}

async fn open<'a>(
    stack: Stack<'a>,
    rx: &'a mut [u8],
    tx: &'a mut [u8],
    addr: IpAddress,
    port: u16,
) -> Result<TcpSocket<'a>, HttpError> {
    let mut socket = TcpSocket::new(stack, rx, tx);
    socket.set_timeout(Some(Duration::from_millis(HTTP_TIMEOUT_MS as u64)));
    socket.connect((addr, port)).await.map_err(|e| {
        warn!("http: connect {}:{} failed: {:?}", addr, port, e);
        HttpError::Connect
    })?;
    Ok(socket)
}

/// Reads up to and including the blank line; returns (head length,
/// bytes filled).
async fn read_head(socket: &mut TcpSocket<'_>, head: &mut [u8]) -> Result<(usize, usize), HttpError> {
    let mut filled = 0usize;
    let bound = Duration::from_millis(HTTP_TIMEOUT_MS as u64);
    let end = with_timeout(bound, async {
        loop {
            if filled == head.len() {
                return Err(HttpError::BadResponse);
            }
            match socket.read(&mut head[filled..]).await {
                Ok(0) => return Err(HttpError::BadResponse),
                Ok(n) => {
                    filled += n;
                    if let Some(end) = head_end(&head[..filled]) {
                        return Ok(end);
                    }
                }
                Err(_) => return Err(HttpError::Io),
            }
        }
    })
    .await
    .map_err(|_| HttpError::Timeout)??;
    Ok((end, filled))
}

async fn finish(mut socket: TcpSocket<'_>) {
    let _ = socket.flush().await;
    socket.close();
    Timer::after(Duration::from_millis(50)).await;
    socket.abort();
}

pub async fn get<'a>(
    stack: Stack<'a>,
    rx: &'a mut [u8],
    tx: &'a mut [u8],
    head: &'a mut [u8],
    addr: IpAddress,
    url: &UrlParts<'_>,
) -> Result<HttpResponse<HttpBody<'a>>, HttpError> {
    let mut socket = open(stack, rx, tx, addr, url.port).await?;

    let mut req = StackFmt::<512>::new();
    let _ = write!(
        req,
        "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
        url.path, url.host
    );
    if req.truncated() {
        return Err(HttpError::BadUrl);
    }
    socket
        .write_all(req.as_bytes())
        .await
        .map_err(|_| HttpError::Io)?;

    let (end, filled) = read_head(&mut socket, head).await?;
    let (status, content_length) = response_head(&head[..end - 4])?;
    debug!("http: GET {} -> {} ({:?} bytes)", url.path, status, content_length);

    let head: &'a [u8] = head;
    Ok(HttpResponse {
        status,
        content_length,
        body: HttpBody {
            socket,
            pending: &head[end..filled],
            remaining: content_length,
        },
    })
}

pub async fn post(
    stack: Stack<'_>,
    rx: &mut [u8],
    tx: &mut [u8],
    head: &mut [u8],
    addr: IpAddress,
    url: &UrlParts<'_>,
    req: &Post<'_>,
) -> Result<u16, HttpError> {
    let mut socket = open(stack, rx, tx, addr, url.port).await?;

    let mut out = StackFmt::<768>::new();
    let _ = write!(
        out,
        "POST {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
        url.path,
        url.host,
        req.content_type,
        req.body.len()
    );
    for (name, value) in req.headers {
        let _ = write!(out, "{}: {}\r\n", name, value);
    }
    let _ = out.write_str("\r\n");
    if out.truncated() {
        return Err(HttpError::BadUrl);
    }

    socket
        .write_all(out.as_bytes())
        .await
        .map_err(|_| HttpError::Io)?;
    socket.write_all(req.body).await.map_err(|_| HttpError::Io)?;
    let _ = socket.flush().await;

    let (end, _) = read_head(&mut socket, head).await?;
    let (status, _) = response_head(&head[..end - 4])?;
    debug!("http: POST {} -> {}", url.path, status);

    finish(socket).await;
    Ok(status)
}
