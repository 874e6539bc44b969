// Setup portal servers on the access-point stack
//
// HTTP on port 80 (one connection at a time, request routing is in the
// kernel), captive DNS on 53 and a small DHCP server on 67. The HTTP
// loop shares the device with the portal tick loop through a mutex.

use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, IpListenEndpoint, Ipv4Address, Stack};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use inkframe_kernel::consts::AP_ADDR;
use inkframe_kernel::portal::http::{self, REQUEST_CAP, content_length, head_end};
use inkframe_kernel::portal::{dhcp, dns};
use log::{debug, info, warn};

use crate::InkDevice;

pub type SharedDevice = Mutex<NoopRawMutex, InkDevice>;

const HTTP_PORT: u16 = 80;
const DNS_PORT: u16 = 53;

/// Serves portal requests forever.
pub async fn http_server(stack: Stack<'static>, device: &SharedDevice) -> ! {
    let mut rx_buf = [0u8; 1536];
    let mut tx_buf = [0u8; 2048];
    let mut req_buf = [0u8; REQUEST_CAP];
    info!("portal: http listening on :{}", HTTP_PORT);
    loop {
        serve_one_request(stack, &mut rx_buf, &mut tx_buf, &mut req_buf, device).await;
    }
}

/// Reads head and body (per `Content-Length`); returns the bytes filled,
/// or `None` if the client went away or overflowed the buffer.
async fn read_request(socket: &mut TcpSocket<'_>, buf: &mut [u8]) -> Option<usize> {
    let mut pos = 0usize;
    let mut want: Option<usize> = None;
    loop {
        if let Some(total) = want
            && pos >= total
        {
            return Some(total);
        }
        if pos >= buf.len() {
            return None;
        }
        match socket.read(&mut buf[pos..]).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => {
                pos += n;
                if want.is_none()
                    && let Some(end) = head_end(&buf[..pos])
                {
                    want = Some(end + content_length(&buf[..end]));
                }
            }
        }
    }
}

/// Accept one TCP connection on port 80, route the request through the
/// device, write the reply, then close the socket.
async fn serve_one_request(
    stack: Stack<'_>,
    rx_buf: &mut [u8],
    tx_buf: &mut [u8],
    req_buf: &mut [u8],
    device: &SharedDevice,
) {
    let mut socket = TcpSocket::new(stack, rx_buf, tx_buf);
    socket.set_timeout(Some(Duration::from_secs(10)));

    if socket
        .accept(IpListenEndpoint {
            addr: None,
            port: HTTP_PORT,
        })
        .await
        .is_err()
    {
        Timer::after(Duration::from_millis(200)).await;
        return;
    }

    let reply = match read_request(&mut socket, req_buf).await {
        Some(len) => match http::parse(&req_buf[..len]) {
            Ok(req) => {
                debug!("portal: {:?} {}", req.method, req.path);
                Some(device.lock().await.portal_request(&req).await)
            }
            Err(e) => {
                warn!("portal: bad request: {:?}", e);
                Some(http::Response::status(400))
            }
        },
        None => None,
    };

    if let Some(reply) = reply {
        let _ = socket.write_all(reply.head().as_bytes()).await;
        let _ = socket.write_all(reply.body_bytes()).await;
        let _ = socket.flush().await;
    }

    Timer::after(Duration::from_millis(50)).await;
    socket.close();
    Timer::after(Duration::from_millis(50)).await;
    socket.abort();
}

fn ap_ip() -> Ipv4Address {
    let [a, b, c, d] = AP_ADDR;
    Ipv4Address::new(a, b, c, d)
}

#[embassy_executor::task]
pub async fn dns_task(stack: Stack<'static>) {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; 512];
    let mut tx_buf = [0u8; 512];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);
    if let Err(e) = socket.bind(DNS_PORT) {
        warn!("portal: dns bind failed: {:?}", e);
        return;
    }
    info!("portal: captive dns on :{}", DNS_PORT);

    let mut query = [0u8; 512];
    let mut answer = [0u8; 512];
    loop {
        let (n, meta) = match socket.recv_from(&mut query).await {
            Ok(r) => r,
            Err(e) => {
                debug!("portal: dns recv: {:?}", e);
                continue;
            }
        };
        if let Some(len) = dns::answer(&query[..n], AP_ADDR, &mut answer) {
            let _ = socket.send_to(&answer[..len], meta).await;
        }
    }
}

#[embassy_executor::task]
pub async fn dhcp_task(stack: Stack<'static>) {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 1024];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);
    if let Err(e) = socket.bind(dhcp::SERVER_PORT) {
        warn!("portal: dhcp bind failed: {:?}", e);
        return;
    }
    info!("portal: dhcp serving from {}", ap_ip());

    let mut server = dhcp::DhcpServer::new(AP_ADDR);
    let broadcast = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::BROADCAST), dhcp::CLIENT_PORT);
    let mut req = [0u8; 576];
    let mut reply = [0u8; 576];
    loop {
        let n = match socket.recv_from(&mut req).await {
            Ok((n, _)) => n,
            Err(e) => {
                debug!("portal: dhcp recv: {:?}", e);
                continue;
            }
        };
        if let Some(len) = server.handle(&req[..n], &mut reply) {
            let _ = socket.send_to(&reply[..len], broadcast).await;
        }
    }
}
