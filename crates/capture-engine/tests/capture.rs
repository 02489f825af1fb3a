//! End-to-end capture tests against the simulated bus

use capture_engine::{
    CaptureEngine, CaptureError, EngineConfig, ErrorKind, Fetch, OpenRequest, ParamReply,
    RawMovieHeader, Roi, SessionState, StartRequest, WaitPolicy,
};
use iidc_bus::sim::{SimBus, SimCameraSpec, SimController, SimEvent, SimFault};
use iidc_bus::Feature;
use std::time::{Duration, Instant};

const ASYNC: u32 = 16;

fn engine_with(specs: Vec<SimCameraSpec>) -> (CaptureEngine, Vec<SimController>) {
    let bus = SimBus::new();
    let controllers = specs.into_iter().map(|spec| bus.attach(spec)).collect();
    (CaptureEngine::new(bus, EngineConfig::default()), controllers)
}

fn mono_vga(index: usize) -> OpenRequest {
    OpenRequest::index(index)
        .with_roi(Roi::sized(640, 480))
        .with_layers(1)
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for the capture thread");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_drop_frames_keeps_newest() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    let outcome = engine
        .start(handle, StartRequest::at_rate(30.0).dropping_frames())
        .unwrap();
    assert_eq!(outcome.fps_rounded, 30);

    let device = engine.device(handle).unwrap();
    assert_eq!(ctl[0].inject_frames(5), 5);
    let frame = device.fetch(WaitPolicy::Poll).unwrap().into_frame().unwrap();
    assert_eq!(frame.dropped(), 4);
    assert_eq!((frame.width(), frame.height(), frame.layers()), (640, 480, 1));
    // Fifth frame generated has counter 4 in its first byte
    assert_eq!(frame.pixels()[0], 4);
    frame.release().unwrap();
    assert_eq!(device.status().stats.dropped, 4);

    assert_eq!(ctl[0].inject_frames(3), 3);
    let frame = device.fetch(WaitPolicy::Poll).unwrap().into_frame().unwrap();
    assert_eq!(frame.dropped(), 2);
    drop(frame);
    assert_eq!(device.status().stats.dropped, 6);

    assert!(matches!(device.fetch(WaitPolicy::Poll).unwrap(), Fetch::NotReady));
    assert_eq!(engine.stop(handle).unwrap(), 6);

    let ring = ctl[0].ring_stats().unwrap();
    assert_eq!(ring.dequeued, 8);
    assert_eq!(ring.dequeued, ring.enqueued);
    assert_eq!(ring.max_outstanding, 1);
}

#[test]
fn test_in_order_delivery_reports_backlog() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    engine.start(handle, StartRequest::at_rate(15.0)).unwrap();
    let device = engine.device(handle).unwrap();

    ctl[0].inject_frames(3);
    for expected in [2, 1, 0] {
        let frame = device.fetch(WaitPolicy::Poll).unwrap().into_frame().unwrap();
        assert!(frame.is_lent());
        assert_eq!(frame.dropped(), expected);
        frame.release().unwrap();
        assert_eq!(ctl[0].outstanding_frames(), 0);
    }

    let status = device.status();
    assert_eq!(status.stats.frames, 3);
    assert_eq!(status.stats.dropped, 0);
    assert_eq!(engine.stop(handle).unwrap(), 0);
    let ring = ctl[0].ring_stats().unwrap();
    assert_eq!(ring.dequeued, ring.enqueued);
}

#[test]
fn test_fetch_after_stop_reports_stopped() {
    let (engine, _ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    let device = engine.device(handle).unwrap();
    assert!(device.fetch(WaitPolicy::Block).unwrap().is_stopped());

    engine.start(handle, StartRequest::default()).unwrap();
    assert!(matches!(
        engine.start(handle, StartRequest::default()),
        Err(CaptureError::AlreadyStarted)
    ));
    engine.stop(handle).unwrap();
    assert!(device.fetch(WaitPolicy::Poll).unwrap().is_stopped());
    assert_eq!(engine.stop(handle).unwrap(), 0);
}

#[test]
fn test_async_thread_delivers_in_order() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0).with_flags(ASYNC)).unwrap();
    engine.start(handle, StartRequest::at_rate(30.0)).unwrap();
    let device = engine.device(handle).unwrap();

    ctl[0].inject_frames(3);
    for expected in [2, 1, 0] {
        let frame = device.fetch(WaitPolicy::Block).unwrap().into_frame().unwrap();
        assert!(!frame.is_lent());
        assert_eq!(frame.dropped(), expected);
        assert_eq!(frame.pixels().len(), 640 * 480);
    }
    assert!(matches!(device.fetch(WaitPolicy::Poll).unwrap(), Fetch::NotReady));

    engine.stop(handle).unwrap();
    assert!(device.fetch(WaitPolicy::Block).unwrap().is_stopped());
    assert!(!ctl[0].is_capturing());

    // The thread is gone, so the device can start over
    engine.start(handle, StartRequest::at_rate(30.0)).unwrap();
    ctl[0].inject_frames(1);
    let frame = device.fetch(WaitPolicy::Block).unwrap().into_frame().unwrap();
    assert_eq!(frame.dropped(), 0);
    engine.stop(handle).unwrap();
}

#[test]
fn test_async_latest_wins() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0).with_flags(ASYNC)).unwrap();
    engine
        .start(handle, StartRequest::at_rate(30.0).dropping_frames())
        .unwrap();
    let device = engine.device(handle).unwrap();

    ctl[0].inject_frames(3);
    wait_for(|| device.status().stats.dropped == 2);
    let frame = device.fetch(WaitPolicy::Block).unwrap().into_frame().unwrap();
    assert_eq!(frame.pixels()[0], 2);
    drop(frame);
    assert_eq!(device.status().stats.dropped, 2);
    assert_eq!(engine.stop(handle).unwrap(), 2);
}

#[test]
fn test_async_error_ends_stream() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0).with_flags(ASYNC)).unwrap();
    engine.start(handle, StartRequest::default()).unwrap();
    let device = engine.device(handle).unwrap();

    ctl[0].inject_fault(SimFault::Dequeue);
    wait_for(|| device.status().last_error.is_some());
    assert!(matches!(device.fetch(WaitPolicy::Block).unwrap(), Fetch::NotReady));

    ctl[0].clear_fault(SimFault::Dequeue);
    engine.stop(handle).unwrap();
    assert_eq!(device.status().state, SessionState::Idle);
}

#[test]
fn test_stale_handle_after_reuse() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let first = engine.open(mono_vga(0)).unwrap();
    engine.close(first).unwrap();
    assert!(!ctl[0].is_powered());

    let second = engine.open(mono_vga(0)).unwrap();
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);

    let err = engine.start(first, StartRequest::default()).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidHandle(_)));
    assert_eq!(err.kind(), ErrorKind::User);
    assert!(engine.close(first).is_err());
    assert_eq!(engine.open_devices(), vec![second]);
}

#[test]
fn test_bus_master_broadcasts_start_and_stop() {
    let (engine, ctl) = engine_with(vec![
        SimCameraSpec::fixed_color(1),
        SimCameraSpec::fixed_color(2),
    ]);
    let master = engine.open(mono_vga(0)).unwrap();
    let slave = engine.open(mono_vga(1)).unwrap();
    engine.set_parameter(master, "SyncMode", Some(9.0)).unwrap();
    engine.set_parameter(slave, "SyncMode", Some(10.0)).unwrap();

    engine.start(slave, StartRequest::default()).unwrap();
    assert!(!ctl[1].is_transmitting());
    ctl[0].clear_events();

    engine.start(master, StartRequest::default()).unwrap();
    let transport: Vec<SimEvent> = ctl[0]
        .events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::Broadcast(_) | SimEvent::Transmission(_)))
        .collect();
    assert_eq!(
        transport,
        vec![
            SimEvent::Broadcast(true),
            SimEvent::Transmission(true),
            SimEvent::Broadcast(false)
        ]
    );
    assert!(ctl[1].is_transmitting());
    assert!(!ctl[0].is_broadcasting());

    engine.stop(master).unwrap();
    assert!(!ctl[1].is_transmitting());
    assert!(!ctl[0].is_broadcasting());
    engine.stop(slave).unwrap();
}

#[test]
fn test_soft_master_requires_armed_slaves() {
    let (engine, ctl) = engine_with(vec![
        SimCameraSpec::fixed_color(1),
        SimCameraSpec::fixed_color(2),
        SimCameraSpec::fixed_color(3).on_port(1),
    ]);
    let master = engine.open(mono_vga(0)).unwrap();
    let slave = engine.open(mono_vga(1)).unwrap();
    let elsewhere = engine.open(mono_vga(2)).unwrap();
    engine.set_parameter(master, "SyncMode", Some(5.0)).unwrap();
    engine.set_parameter(slave, "SyncMode", Some(6.0)).unwrap();
    engine.set_parameter(elsewhere, "SyncMode", Some(6.0)).unwrap();

    let err = engine.start(master, StartRequest::default()).unwrap_err();
    assert!(matches!(err, CaptureError::UnarmedSlave(h) if h == slave));
    assert!(!ctl[0].is_capturing());

    engine.start(slave, StartRequest::default()).unwrap();
    assert!(ctl[1].is_capturing());
    assert!(!ctl[1].is_transmitting());

    engine.start(master, StartRequest::default()).unwrap();
    assert!(ctl[0].is_transmitting());
    assert!(ctl[1].is_transmitting());
    assert!(!ctl[2].is_transmitting());

    engine.stop(master).unwrap();
    assert!(!ctl[1].is_transmitting());
    engine.stop(slave).unwrap();
}

#[test]
fn test_soft_master_starts_slave_with_blocked_consumer() {
    let (engine, ctl) = engine_with(vec![
        SimCameraSpec::fixed_color(1),
        SimCameraSpec::fixed_color(2),
    ]);
    let master = engine.open(mono_vga(0)).unwrap();
    let slave = engine.open(mono_vga(1)).unwrap();
    engine.set_parameter(master, "SyncMode", Some(5.0)).unwrap();
    engine.set_parameter(slave, "SyncMode", Some(6.0)).unwrap();
    engine.start(slave, StartRequest::default()).unwrap();
    let device = engine.device(slave).unwrap();

    std::thread::scope(|scope| {
        let consumer = scope.spawn(|| {
            let frame = device.fetch(WaitPolicy::Block).unwrap().into_frame().unwrap();
            (frame.width(), frame.pixels()[0])
        });
        std::thread::sleep(Duration::from_millis(20));

        engine.start(master, StartRequest::default()).unwrap();
        assert!(ctl[1].is_transmitting());
        assert_eq!(ctl[1].inject_frames(1), 1);
        assert_eq!(consumer.join().unwrap(), (640, 0));
    });

    engine.stop(master).unwrap();
    assert_eq!(ctl[1].outstanding_frames(), 0);
    engine.stop(slave).unwrap();
}

#[test]
fn test_blocked_fetch_sees_stop() {
    let (engine, _ctl) = engine_with(vec![
        SimCameraSpec::fixed_color(1),
        SimCameraSpec::fixed_color(2),
    ]);
    let sync = engine.open(mono_vga(0)).unwrap();
    let threaded = engine.open(mono_vga(1).with_flags(ASYNC)).unwrap();
    engine.start(sync, StartRequest::default()).unwrap();
    engine.start(threaded, StartRequest::default()).unwrap();

    for handle in [sync, threaded] {
        let device = engine.device(handle).unwrap();
        std::thread::scope(|scope| {
            let consumer = scope.spawn(|| device.fetch(WaitPolicy::Block).unwrap().is_stopped());
            std::thread::sleep(Duration::from_millis(20));
            engine.stop(handle).unwrap();
            assert!(consumer.join().unwrap());
        });
    }
}

#[test]
fn test_held_frames_keep_device_usable() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine
        .open(
            OpenRequest::index(0)
                .with_roi(Roi::sized(320, 240))
                .with_layers(3),
        )
        .unwrap();
    engine.start(handle, StartRequest::at_rate(60.0)).unwrap();
    let device = engine.device(handle).unwrap();

    assert_eq!(ctl[0].inject_frames(2), 2);
    let first = device.fetch(WaitPolicy::Poll).unwrap().into_frame().unwrap();
    assert_eq!(first.dropped(), 1);

    // Status, parameters and further fetches work while a frame is held
    assert_eq!(device.status().stats.frames, 1);
    assert!(device.has_trigger());
    assert_eq!(
        engine.set_parameter(handle, "GetFramerate", None).unwrap(),
        ParamReply::Value(60.0)
    );
    let second = device.fetch(WaitPolicy::Poll).unwrap().into_frame().unwrap();
    assert_eq!(ctl[0].outstanding_frames(), 2);
    assert_eq!(first.pixels().len(), 320 * 240 * 3);
    assert_eq!(second.pixels().len(), 320 * 240 * 3);
    assert_ne!(first.pixels(), second.pixels());

    let err = engine.stop(handle).unwrap_err();
    assert!(matches!(err, CaptureError::FrameHeld(2)));
    assert!(err.is_user_error());
    assert!(engine.close(handle).is_err());
    assert!(device.is_streaming());
    assert!(ctl[0].is_capturing());

    drop(second);
    first.release().unwrap();
    assert_eq!(ctl[0].outstanding_frames(), 0);
    assert_eq!(engine.stop(handle).unwrap(), 0);
    engine.close(handle).unwrap();
}

#[test]
fn test_start_time_out_of_range() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    let req = StartRequest {
        start_at: Some(1e30),
        ..Default::default()
    };
    let err = engine.start(handle, req).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidParameter(_)));
    assert!(!ctl[0].is_capturing());

    let req = StartRequest {
        start_at: Some(0.0),
        ..Default::default()
    };
    engine.start(handle, req).unwrap();
    engine.stop(handle).unwrap();
}

#[test]
fn test_hw_slave_arms_trigger() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    engine.set_parameter(handle, "SyncMode", Some(18.0)).unwrap();
    engine.start(handle, StartRequest::default()).unwrap();
    assert!(ctl[0].trigger_power());
    assert!(ctl[0].is_transmitting());
    engine.stop(handle).unwrap();
    assert!(!ctl[0].trigger_power());
}

#[test]
fn test_transport_failure_leaves_idle() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    ctl[0].inject_fault(SimFault::TransmissionStart);

    let err = engine.start(handle, StartRequest::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(!ctl[0].is_capturing());
    let device = engine.device(handle).unwrap();
    assert_eq!(device.status().state, SessionState::Idle);
    assert!(!device.is_streaming());

    ctl[0].clear_fault(SimFault::TransmissionStart);
    engine.start(handle, StartRequest::default()).unwrap();
    assert!(ctl[0].is_transmitting());
    engine.stop(handle).unwrap();
}

#[test]
fn test_setup_failure_is_reported() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();
    ctl[0].inject_fault(SimFault::CaptureSetup);
    assert!(engine.start(handle, StartRequest::default()).is_err());
    assert!(!ctl[0].is_transmitting());
    assert_eq!(
        engine.device(handle).unwrap().status().state,
        SessionState::Idle
    );
}

#[test]
fn test_parameters() {
    let (engine, ctl) = engine_with(vec![SimCameraSpec::fixed_color(1)]);
    let handle = engine.open(mono_vga(0)).unwrap();

    assert_eq!(
        engine.set_parameter(handle, "Brightness", Some(200.0)).unwrap(),
        ParamReply::Value(128.0)
    );
    assert_eq!(ctl[0].feature(Feature::Brightness).unwrap().value, 200);
    // Out of bounds is ignored
    engine.set_parameter(handle, "Brightness", Some(1000.0)).unwrap();
    assert_eq!(ctl[0].feature(Feature::Brightness).unwrap().value, 200);

    assert!(engine
        .set_parameter(handle, "Sharpness", None)
        .unwrap()
        .is_unsupported());
    assert!(engine
        .set_parameter(handle, "NoSuchThing", Some(1.0))
        .unwrap()
        .is_unsupported());

    assert_eq!(
        engine.set_parameter(handle, "GetVendorname", None).unwrap(),
        ParamReply::Text("Point Grey".to_string())
    );
    let err = engine
        .set_parameter(handle, "SyncMode", Some(3.0))
        .unwrap_err();
    assert!(err.is_user_error());
    assert!(engine
        .set_parameter(handle, "TriggerMode", Some(42.0))
        .unwrap_err()
        .is_user_error());

    engine.start(handle, StartRequest::at_rate(30.0)).unwrap();
    assert_eq!(
        engine.set_parameter(handle, "GetFramerate", None).unwrap(),
        ParamReply::Value(30.0)
    );
    assert_eq!(
        engine.set_parameter(handle, "GetROI", None).unwrap(),
        ParamReply::Rect(Roi::sized(640, 480))
    );
    engine.stop(handle).unwrap();
}

#[test]
fn test_recording_raw_dump() {
    let path = std::env::temp_dir().join(format!("capture-engine-it-{}.raw", std::process::id()));
    let (engine, ctl) = engine_with(vec![SimCameraSpec::scalable_raw(1)]);
    let handle = engine
        .open(
            OpenRequest::default()
                .with_roi(Roi::sized(64, 48))
                .with_layers(1)
                .with_bit_depth(16)
                .with_recording(&path.to_string_lossy(), 0),
        )
        .unwrap();
    engine.start(handle, StartRequest::at_rate(30.0)).unwrap();
    let device = engine.device(handle).unwrap();

    ctl[0].inject_frames(2);
    for _ in 0..2 {
        let frame = device.fetch(WaitPolicy::Poll).unwrap().into_frame().unwrap();
        assert_eq!(frame.info().data_depth, 12);
        frame.release().unwrap();
    }
    engine.stop(handle).unwrap();

    let header = RawMovieHeader::load(&path).unwrap();
    assert_eq!(header.frames, 2);
    assert_eq!(header.format.bits_per_channel, 16);
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 2 * 64 * 48 * 2);
    // 12-bit samples land in the top bits
    assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 1 << 4);

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(RawMovieHeader::sidecar_path(&path));
}

#[test]
fn test_close_all_powers_down() {
    let (engine, ctl) = engine_with(vec![
        SimCameraSpec::fixed_color(1),
        SimCameraSpec::scalable_raw(2),
    ]);
    let a = engine.open(mono_vga(0)).unwrap();
    engine.open(OpenRequest::index(1)).unwrap();
    engine.start(a, StartRequest::default()).unwrap();
    assert!(ctl.iter().all(|c| c.is_powered()));

    engine.close_all();
    assert!(engine.open_devices().is_empty());
    assert!(ctl.iter().all(|c| !c.is_powered()));
    assert!(!ctl[0].is_capturing());
}
