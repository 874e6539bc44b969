// Orchestrator lifecycle against host fakes: boot, fetch, refresh,
// gestures and the retry ledger across reboots.

mod common;

use common::*;
use embassy_futures::block_on;

use inkframe_kernel::consts::CLOCK_WINDOW;
use inkframe_kernel::device::{BootOutcome, Device, DeviceState, Exit};
use inkframe_kernel::framebuffer::Framebuffer;
use inkframe_kernel::net::LinkError;
use inkframe_kernel::screens::ClockRegion;
use inkframe_kernel::storage::store_retry_count;

type TestDevice<'a> = Device<'a, RecordingPanel, ScriptedNet, MemStorage, ManualBoard, NeverDelay>;

fn new_device<'a>(net: ScriptedNet, storage: MemStorage, fb: &'a mut Framebuffer) -> TestDevice<'a> {
    let board = ManualBoard {
        battery_mv: 3_912,
        ..Default::default()
    };
    Device::new(RecordingPanel::default(), net, storage, board, NeverDelay, fb)
}

fn sample(dev: &mut TestDevice<'_>, at: u64, pressed: bool) -> Option<Exit> {
    dev.board_mut().now = at;
    dev.board_mut().pressed = pressed;
    block_on(dev.tick())
}

fn truncated_bmp() -> Scripted {
    let mut body = panel_bmp();
    body.truncate(PIXEL_OFFSET + 100 * STRIDE);
    Scripted {
        status: 200,
        content_length: None,
        body,
    }
}

#[test]
fn test_boot_fetches_and_displays() {
    let storage = MemStorage::default().with_settings(&provisioned());
    block_on(store_retry_count(&mut storage.clone(), 3)).unwrap();
    let mut net = ScriptedNet::new().respond(Scripted::ok(panel_bmp()));
    net.time = Some(1_704_067_200);
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage.clone(), &mut fb);

    assert_eq!(block_on(dev.boot()), BootOutcome::Running);
    assert_eq!(dev.state(), DeviceState::Displaying);

    // file rows are bottom-up: the last one (299 -> 43) lands on top
    let front = dev.framebuffer().front();
    assert!(front[..50].iter().all(|b| *b == 43));
    assert!(front[50 * 299..].iter().all(|b| *b == 0));
    assert_eq!(dev.panel().shown, front);

    assert_eq!(storage.retry_count(), Some(0));
    let log = log.borrow();
    assert_eq!(log.connects, vec![("home".to_string(), "secret".to_string())]);
    assert_eq!(
        log.gets,
        vec!["http://10.0.0.5:8080/api/render?v=3.91&mac=24:0A:C4:00:1F:E2&rssi=-61&w=400&h=300"]
    );
    assert_eq!(log.releases, 1);

    // one full refresh, then the clock region at 08:00:00 local
    assert_eq!(dev.panel().count(&PanelOp::Full), 1);
    assert_eq!(dev.panel().ops.last(), Some(&PanelOp::Partial(CLOCK_WINDOW)));
    let mut clock = ClockRegion::new();
    clock.draw_time(8, 0, 0);
    assert_eq!(dev.panel().region, clock.data());
}

#[test]
fn test_truncated_stream_at_boot_reports_failure() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let net = ScriptedNet::new().respond(truncated_bmp());
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage.clone(), &mut fb);

    assert_eq!(
        block_on(dev.boot()),
        BootOutcome::Exit(Exit::Restart { delay_secs: 10 })
    );
    assert_eq!(storage.retry_count(), Some(1));
    assert_eq!(dev.state(), DeviceState::Sleeping);
    assert_eq!(dev.panel().ops.last(), Some(&PanelOp::Sleep));
    assert_eq!(log.borrow().releases, 1);
}

#[test]
fn test_truncated_refresh_keeps_current_image() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let net = ScriptedNet::new()
        .respond(Scripted::ok(panel_bmp()))
        .respond(truncated_bmp());
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage.clone(), &mut fb);
    assert_eq!(block_on(dev.boot()), BootOutcome::Running);
    let before = dev.framebuffer().front().to_vec();

    // default interval is 60 minutes
    assert_eq!(sample(&mut dev, 60 * 60_000, false), None);

    assert_eq!(log.borrow().gets.len(), 2);
    assert_eq!(log.borrow().releases, 2);
    assert_eq!(dev.framebuffer().front(), &before[..]);
    assert_eq!(dev.panel().refreshes(), 1);
    assert_eq!(dev.state(), DeviceState::Displaying);
    assert_eq!(storage.retry_count().unwrap_or(0), 0);
}

#[test]
fn test_ledger_restarts_then_extended_sleep() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let mut delays = Vec::new();
    let mut counts = Vec::new();

    for _ in 0..5 {
        let net = ScriptedNet::new().connect_fails(LinkError::Timeout);
        let mut fb = Box::new(Framebuffer::new());
        let mut dev = new_device(net, storage.clone(), &mut fb);
        match block_on(dev.boot()) {
            BootOutcome::Exit(Exit::Restart { delay_secs }) => delays.push(delay_secs),
            other => panic!("expected restart, got {:?}", other),
        }
        counts.push(storage.retry_count().unwrap());
    }
    assert_eq!(delays, [10, 30, 60, 120, 300]);
    assert_eq!(counts, [1, 2, 3, 4, 5]);

    let net = ScriptedNet::new().connect_fails(LinkError::Timeout);
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage.clone(), &mut fb);
    assert_eq!(
        block_on(dev.boot()),
        BootOutcome::Exit(Exit::DeepSleep { minutes: 60 })
    );
    assert_eq!(storage.retry_count(), Some(0));
    assert_eq!(dev.panel().ops.last(), Some(&PanelOp::Sleep));
}

#[test]
fn test_double_click_previews_then_fetches_next() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let net = ScriptedNet::new()
        .respond(Scripted::ok(panel_bmp()))
        .respond(Scripted::ok(panel_bmp()));
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage, &mut fb);
    assert_eq!(block_on(dev.boot()), BootOutcome::Running);

    sample(&mut dev, 1_000, true);
    sample(&mut dev, 1_100, false);
    sample(&mut dev, 1_200, true);
    sample(&mut dev, 1_300, false);

    let mut next = ClockRegion::new();
    next.draw_label("NEXT");
    assert_eq!(dev.panel().region, next.data());
    assert_eq!(log.borrow().gets.len(), 1);

    // window closes with the button up
    assert_eq!(sample(&mut dev, 1_850, false), None);
    let gets = log.borrow().gets.clone();
    assert_eq!(gets.len(), 2);
    assert!(gets[1].ends_with("&h=300&next=1"));
    assert_ne!(dev.panel().region, next.data());
}

#[test]
fn test_single_click_refreshes() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let net = ScriptedNet::new()
        .respond(Scripted::ok(panel_bmp()))
        .respond(Scripted::ok(panel_bmp()));
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage, &mut fb);
    block_on(dev.boot());

    sample(&mut dev, 1_000, true);
    sample(&mut dev, 1_100, false);
    sample(&mut dev, 1_650, false);

    let gets = log.borrow().gets.clone();
    assert_eq!(gets.len(), 2);
    assert!(gets[1].ends_with("&h=300"));
    assert_eq!(dev.panel().refreshes(), 2);
}

#[test]
fn test_triple_click_posts_favorite_with_token() {
    let mut settings = provisioned();
    settings.device_token = "tok123".try_into().unwrap();
    let storage = MemStorage::default().with_settings(&settings);
    let net = ScriptedNet::new().respond(Scripted::ok(panel_bmp()));
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage, &mut fb);
    block_on(dev.boot());

    for (t, p) in [(1_000, true), (1_100, false), (1_200, true), (1_300, false), (1_400, true)] {
        assert_eq!(sample(&mut dev, t, p), None);
    }
    assert!(log.borrow().posts.is_empty());
    sample(&mut dev, 1_500, false);

    let log = log.borrow();
    assert_eq!(log.gets.len(), 1);
    assert_eq!(log.posts.len(), 1);
    assert_eq!(
        log.posts[0].url,
        "http://10.0.0.5:8080/api/device/24:0A:C4:00:1F:E2/favorite"
    );
    assert_eq!(
        log.posts[0].headers,
        vec![("X-Device-Token".to_string(), "tok123".to_string())]
    );
    assert_eq!(log.releases, 2);
}

#[test]
fn test_long_press_restarts() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let net = ScriptedNet::new().respond(Scripted::ok(panel_bmp()));
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage, &mut fb);
    block_on(dev.boot());

    assert_eq!(sample(&mut dev, 1_000, true), None);
    assert_eq!(sample(&mut dev, 2_500, true), None);
    assert_eq!(
        sample(&mut dev, 3_000, true),
        Some(Exit::Restart { delay_secs: 1 })
    );
    // the restart screen clears ghosting even though the schedule says fast
    let ops = &dev.panel().ops;
    assert_eq!(&ops[ops.len() - 2..], &[PanelOp::Full, PanelOp::Sleep]);
    assert_eq!(dev.panel().count(&PanelOp::Fast), 0);
}

#[test]
fn test_bounce_is_ignored() {
    let storage = MemStorage::default().with_settings(&provisioned());
    let net = ScriptedNet::new().respond(Scripted::ok(panel_bmp()));
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage, &mut fb);
    block_on(dev.boot());

    sample(&mut dev, 1_000, true);
    sample(&mut dev, 1_020, false);
    sample(&mut dev, 2_000, false);
    assert_eq!(log.borrow().gets.len(), 1);
    assert_eq!(log.borrow().connects.len(), 1);
}

#[test]
fn test_unreachable_server_counts_as_failure() {
    let storage = MemStorage::default().with_settings(&provisioned());
    // link comes up but no response is queued, so the GET fails
    let net = ScriptedNet::new();
    let log = net.log.clone();
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, storage.clone(), &mut fb);

    assert_eq!(
        block_on(dev.boot()),
        BootOutcome::Exit(Exit::Restart { delay_secs: 10 })
    );
    assert_eq!(storage.retry_count(), Some(1));
    assert_eq!(log.borrow().releases, 1);
}

#[test]
fn test_error_screen_after_setup_screen_is_full_refresh() {
    // unprovisioned, so the setup screen goes out first
    let mut net = ScriptedNet::new();
    net.ap_error = Some(LinkError::Radio);
    let mut fb = Box::new(Framebuffer::new());
    let mut dev = new_device(net, MemStorage::default(), &mut fb);

    assert_eq!(
        block_on(dev.boot()),
        BootOutcome::Exit(Exit::Restart { delay_secs: 10 })
    );
    assert_eq!(
        dev.panel().ops,
        vec![PanelOp::InitFull, PanelOp::Full, PanelOp::Full, PanelOp::Sleep]
    );
}

#[test]
fn test_panel_busy_overruns_do_not_fail_boot() {
    let storage = MemStorage::default().with_settings(&provisioned());
    block_on(store_retry_count(&mut storage.clone(), 2)).unwrap();
    let net = ScriptedNet::new().respond(Scripted::ok(panel_bmp()));
    let mut fb = Box::new(Framebuffer::new());
    let board = ManualBoard::default();
    let panel = RecordingPanel {
        stalls: true,
        ..Default::default()
    };
    let mut dev = Device::new(panel, net, storage.clone(), board, NeverDelay, &mut fb);

    assert_eq!(block_on(dev.boot()), BootOutcome::Running);
    assert_eq!(dev.state(), DeviceState::Displaying);
    assert_eq!(storage.retry_count(), Some(0));

    // the clock keeps ticking over a stalling panel
    assert_eq!(sample(&mut dev, 1_000, false), None);
    assert_eq!(dev.state(), DeviceState::Displaying);
}
