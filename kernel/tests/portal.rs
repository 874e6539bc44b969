// Setup portal end to end: raw HTTP requests through `Device`, with
// the effects checked on the scripted network and in storage.

mod common;

use common::*;
use embassy_futures::block_on;

use inkframe_kernel::device::{BootOutcome, Device, DeviceState, Exit};
use inkframe_kernel::framebuffer::Framebuffer;
use inkframe_kernel::net::{LinkError, ScanEntry};
use inkframe_kernel::portal::http;

type TestDevice<'a> = Device<'a, RecordingPanel, ScriptedNet, MemStorage, ManualBoard, NeverDelay>;

fn portal_device<'a>(net: ScriptedNet, storage: MemStorage, fb: &'a mut Framebuffer) -> TestDevice<'a> {
    let board = ManualBoard {
        battery_mv: 3_912,
        ..Default::default()
    };
    let mut dev = Device::new(RecordingPanel::default(), net, storage, board, NeverDelay, fb);
    assert_eq!(block_on(dev.boot()), BootOutcome::Portal);
    dev
}

fn encode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sends one request and returns (status, body).
fn request(dev: &mut TestDevice<'_>, method: &str, path: &str, body: &str) -> (u16, String) {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: 192.168.4.1\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    let req = http::parse(raw.as_bytes()).unwrap();
    let resp = block_on(dev.portal_request(&req));
    (
        resp.status,
        String::from_utf8(resp.body_bytes().to_vec()).unwrap(),
    )
}

#[test]
fn test_unprovisioned_boot_shows_setup_and_starts_ap() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let dev = portal_device(net, MemStorage::default(), &mut fb);

    assert_eq!(dev.state(), DeviceState::Portal);
    assert_eq!(log.borrow().access_point.as_deref(), Some("InkSight-1FE2"));
    assert_eq!(dev.panel().count(&PanelOp::Full), 1);
    assert!(log.borrow().connects.is_empty());
}

#[test]
fn test_button_held_forces_portal() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let board = ManualBoard {
        pressed: true,
        ..Default::default()
    };
    let mut fb = Box::new(Framebuffer::new());
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let mut dev = Device::new(RecordingPanel::default(), net, storage, board, NeverDelay, &mut fb);
    assert_eq!(block_on(dev.boot()), BootOutcome::Portal);
    assert!(log.borrow().gets.is_empty());

    // the press that forced the portal is not a long press
    for t in [500, 2_500, 4_000] {
        dev.board_mut().now = t;
        assert_eq!(block_on(dev.portal_tick()), None);
    }
    dev.board_mut().pressed = false;
    dev.board_mut().now = 4_100;
    assert_eq!(block_on(dev.portal_tick()), None);

    dev.board_mut().pressed = true;
    dev.board_mut().now = 5_000;
    assert_eq!(block_on(dev.portal_tick()), None);
    dev.board_mut().now = 7_000;
    assert_eq!(
        block_on(dev.portal_tick()),
        Some(Exit::Restart { delay_secs: 1 })
    );
}

#[test]
fn test_save_wifi_rejects_bad_server_before_connecting() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let storage = MemStorage::default();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, storage.clone(), &mut fb);

    let body = form(&[("ssid", "home"), ("pass", "secret"), ("server", "ftp://x")]);
    let (status, reply) = request(&mut dev, "POST", "/save_wifi", &body);

    assert_eq!(status, 200);
    assert!(reply.contains("\"ok\":false"));
    assert!(reply.contains("http://"));
    assert!(log.borrow().connects.is_empty());
    assert!(storage.settings().is_none());
    assert_eq!(request(&mut dev, "GET", "/status", "").1, "{\"state\":\"idle\"}");
}

#[test]
fn test_save_wifi_rejects_empty_ssid() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, MemStorage::default(), &mut fb);

    let (_, reply) = request(&mut dev, "POST", "/save_wifi", &form(&[("ssid", "  "), ("pass", "x")]));
    assert_eq!(reply, "{\"ok\":false,\"msg\":\"SSID empty\"}");
    assert!(log.borrow().connects.is_empty());
}

#[test]
fn test_save_wifi_connects_then_saves() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let storage = MemStorage::default();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, storage.clone(), &mut fb);

    let body = form(&[
        ("ssid", " Cafe\"Net "),
        ("pass", "p&ss<word>"),
        ("server", "http://10.0.0.9:8080/"),
    ]);
    let (_, reply) = request(&mut dev, "POST", "/save_wifi", &body);
    assert_eq!(reply, "{\"ok\":true}");
    assert_eq!(
        log.borrow().connects,
        vec![("CafeNet".to_string(), "pssword".to_string())]
    );

    let saved = storage.settings().unwrap();
    assert_eq!(saved.ssid.as_str(), "CafeNet");
    assert_eq!(saved.pass.as_str(), "pssword");
    assert_eq!(saved.server.as_str(), "http://10.0.0.9:8080");
    assert!(saved.is_provisioned());

    let (_, status) = request(&mut dev, "GET", "/status", "");
    assert_eq!(status, "{\"state\":\"connected\",\"ip\":\"192.168.3.77\"}");
}

#[test]
fn test_save_wifi_failure_is_reported_not_saved() {
    let net = ScriptedNet::new().connect_fails(LinkError::AuthFailed);
    let log = net.log.clone();
    let storage = MemStorage::default();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, storage.clone(), &mut fb);

    let body = form(&[("ssid", "home"), ("pass", "wrong")]);
    let (_, reply) = request(&mut dev, "POST", "/save_wifi", &body);
    assert_eq!(reply, "{\"ok\":false,\"msg\":\"Wrong password\"}");
    assert_eq!(log.borrow().releases, 1);
    assert!(storage.settings().is_none());

    let (_, status) = request(&mut dev, "GET", "/status", "");
    assert_eq!(status, "{\"state\":\"failed\",\"error\":\"AUTH_FAIL\"}");
}

#[test]
fn test_save_wifi_unsaved_credentials_are_dropped() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let storage = MemStorage::default();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, storage.clone(), &mut fb);
    storage.fail_stores.set(true);

    let body = form(&[
        ("ssid", "home"),
        ("pass", "secret"),
        ("server", "http://10.0.0.9:8080"),
    ]);
    let (_, reply) = request(&mut dev, "POST", "/save_wifi", &body);
    assert_eq!(reply, "{\"ok\":false,\"msg\":\"Settings could not be saved\"}");
    assert_eq!(log.borrow().releases, 1);

    assert!(dev.settings().ssid.is_empty());
    assert!(dev.settings().pass.is_empty());
    assert_ne!(dev.settings().server.as_str(), "http://10.0.0.9:8080");
    assert!(storage.settings().is_none());

    let (_, status) = request(&mut dev, "GET", "/status", "");
    assert_eq!(status, "{\"state\":\"idle\"}");

    // a later config save must not carry the rejected credentials
    storage.fail_stores.set(false);
    let config = form(&[("config", "{\"modes\":[\"daily\"]}")]);
    let (_, reply) = request(&mut dev, "POST", "/save_config", &config);
    assert_eq!(reply, "{\"ok\":true}");
    assert!(storage.settings().unwrap().ssid.is_empty());
    assert!(log.borrow().posts.is_empty());
}

#[test]
fn test_save_config_clamps_interval_and_schedules_restart() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let storage = MemStorage::default();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, storage.clone(), &mut fb);
    dev.board_mut().now = 5_000;

    let prefs = "{\"modes\":[\"STOIC\"],\"refreshInterval\":5}";
    let (_, reply) = request(
        &mut dev,
        "POST",
        "/save_config",
        &form(&[("config", prefs), ("token", "tok123")]),
    );
    assert_eq!(reply, "{\"ok\":true}");

    let saved = storage.settings().unwrap();
    assert_eq!(saved.sleep_min, 10);
    assert_eq!(saved.prefs_json.as_str(), prefs);
    assert_eq!(saved.device_token.as_str(), "tok123");

    // no uplink, nothing pushed
    assert_eq!(block_on(dev.portal_tick()), None);
    assert!(log.borrow().posts.is_empty());

    dev.board_mut().now = 34_999;
    assert_eq!(block_on(dev.portal_tick()), None);
    dev.board_mut().now = 35_000;
    assert_eq!(
        block_on(dev.portal_tick()),
        Some(Exit::Restart { delay_secs: 0 })
    );
}

#[test]
fn test_save_config_rejects_bad_shape() {
    let storage = MemStorage::default();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(ScriptedNet::new(), storage.clone(), &mut fb);

    let (_, reply) = request(&mut dev, "POST", "/save_config", &form(&[("config", "{\"city\":1}")]));
    assert_eq!(reply, "{\"ok\":false,\"msg\":\"Invalid config format\"}");
    let (_, reply) = request(&mut dev, "POST", "/save_config", "");
    assert_eq!(reply, "{\"ok\":false,\"msg\":\"Config empty\"}");
    assert!(storage.settings().is_none());
    assert_eq!(block_on(dev.portal_tick()), None);
}

#[test]
fn test_config_is_pushed_after_reply_when_linked() {
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, MemStorage::default(), &mut fb);

    let wifi = form(&[("ssid", "home"), ("pass", "secret"), ("server", "http://h:1")]);
    request(&mut dev, "POST", "/save_wifi", &wifi);
    request(
        &mut dev,
        "POST",
        "/save_config",
        &form(&[("config", "{\"modes\":[\"ZEN\"]}")]),
    );
    assert!(log.borrow().posts.is_empty());

    assert_eq!(block_on(dev.portal_tick()), None);
    let posts = log.borrow().posts.clone();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, "http://h:1/api/config");
    assert_eq!(posts[0].body, "{\"mac\":\"24:0A:C4:00:1F:E2\",\"modes\":[\"ZEN\"]}");

    // pushed once only
    block_on(dev.portal_tick());
    assert_eq!(log.borrow().posts.len(), 1);
}

#[test]
fn test_scan_info_and_captive_routes() {
    let mut net = ScriptedNet::new();
    net.networks = vec![
        ScanEntry {
            ssid: "home".try_into().unwrap(),
            rssi: -48,
            secure: true,
        },
        ScanEntry {
            ssid: "a\"b".try_into().unwrap(),
            rssi: -80,
            secure: false,
        },
    ];
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(net, MemStorage::default(), &mut fb);

    let (_, scan) = request(&mut dev, "GET", "/scan", "");
    assert_eq!(
        scan,
        "{\"networks\":[{\"ssid\":\"home\",\"rssi\":-48,\"secure\":true},\
         {\"ssid\":\"a\\\"b\",\"rssi\":-80,\"secure\":false}]}"
    );

    let (_, info) = request(&mut dev, "GET", "/info", "");
    assert_eq!(
        info,
        "{\"mac\":\"24:0A:C4:00:1F:E2\",\"battery\":\"3.91V\",\"server_url\":\"http://192.168.3.30:8080\"}"
    );

    // read fresh from the board on every request
    dev.board_mut().battery_mv = 3_604;
    let (_, info) = request(&mut dev, "GET", "/info", "");
    assert!(info.contains("\"battery\":\"3.60V\""));

    let (status, page) = request(&mut dev, "GET", "/", "");
    assert_eq!(status, 200);
    assert!(page.contains("/save_wifi"));

    assert_eq!(request(&mut dev, "GET", "/generate_204", "").0, 204);
    assert_eq!(request(&mut dev, "GET", "/favicon.ico", "").0, 404);
    assert_eq!(request(&mut dev, "GET", "/library/test/success.html", "").0, 302);
}

#[test]
fn test_restart_endpoint_and_long_press() {
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(ScriptedNet::new(), MemStorage::default(), &mut fb);
    dev.board_mut().now = 10_000;

    let (_, reply) = request(&mut dev, "POST", "/restart", "");
    assert_eq!(reply, "{\"ok\":true}");
    dev.board_mut().now = 10_500;
    assert_eq!(block_on(dev.portal_tick()), None);
    dev.board_mut().now = 11_000;
    assert_eq!(
        block_on(dev.portal_tick()),
        Some(Exit::Restart { delay_secs: 0 })
    );

    let mut fb = Box::new(Framebuffer::new());
    let mut dev = portal_device(ScriptedNet::new(), MemStorage::default(), &mut fb);
    dev.board_mut().pressed = true;
    dev.board_mut().now = 1_000;
    assert_eq!(block_on(dev.portal_tick()), None);
    dev.board_mut().now = 3_000;
    assert_eq!(
        block_on(dev.portal_tick()),
        Some(Exit::Restart { delay_secs: 1 })
    );
    assert_eq!(dev.panel().ops.last(), Some(&PanelOp::Sleep));
}
