//! End-to-end tests for the input system against the virtual transport.
//!
//! Reader threads run for real; the tests drive the consumer side by calling
//! `tick` in a bounded polling loop.
//!
//! Run with:
//! ```bash
//! cargo test -p midin-io --test integration
//! ```

use std::time::{Duration, Instant};

use midin_core::TransportKind;
use midin_io::{
    DeviceHost, MidiInputSystem, ReaderState, StateBlockHost, TickReport, VirtualTransport,
    MAX_ADD_ATTEMPTS,
};

const WAIT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn test_system(transport: &VirtualTransport) -> MidiInputSystem {
    init_tracing();
    MidiInputSystem::builder()
        .transport(transport.clone())
        .read_timeout(Duration::from_millis(2))
        .build()
        .expect("Failed to build input system")
}

/// Tick until `done` holds, accumulating reports. Returns `None` on timeout.
fn tick_until(
    system: &mut MidiInputSystem,
    host: &mut StateBlockHost,
    mut done: impl FnMut(&TickReport, &StateBlockHost) -> bool,
) -> Option<TickReport> {
    let deadline = Instant::now() + WAIT;
    let mut total = TickReport::default();
    while Instant::now() < deadline {
        let report = system.tick(host);
        total.ports_rebuilt |= report.ports_rebuilt;
        total.events_delivered += report.events_delivered;
        total.events_dropped += report.events_dropped;
        total.devices_added += report.devices_added;
        total.devices_removed += report.devices_removed;
        if done(&report, host) {
            return Some(total);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

/// Open the ports, play one note on `channel` and wait for both devices to bind.
fn bind_devices(
    system: &mut MidiInputSystem,
    host: &mut StateBlockHost,
    transport: &VirtualTransport,
    channel: u8,
) {
    system.tick(host);
    transport.send(0, &[0x90 | channel, 1, 1]);
    transport.send(0, &[0x80 | channel, 1, 0]);
    tick_until(system, host, |_, host| host.device_count() == 2).expect("devices never bound");
}

#[test]
fn test_events_reach_host_once_devices_are_bound() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();

    let first = system.tick(&mut host);
    assert!(first.ports_rebuilt);
    assert_eq!(system.ports().len(), 1);

    // The first note requests the devices; it is dropped because nothing is bound yet
    transport.send(0, &[0x90, 60, 100]);
    tick_until(&mut system, &mut host, |_, host| host.device_count() == 2)
        .expect("devices never bound");
    let all = host.find_device("Keys", None).unwrap();
    let channel = host.find_device("Keys", Some(0)).unwrap();
    assert!(!host.is_note_pressed(all, 60));
    wait_for_messages(&system, 0, 1);
    assert_eq!(system.reader_stats(0).unwrap().dropped, 2);

    transport.send(0, &[0x90, 62, 90]);
    tick_until(&mut system, &mut host, |_, host| host.is_note_pressed(channel, 62))
        .expect("note never delivered");
    assert!(host.is_note_pressed(all, 62));
    assert_eq!(host.note_velocity(channel, 62), Some(90));
}

#[test]
fn test_zero_velocity_note_on_releases() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    bind_devices(&mut system, &mut host, &transport, 0);
    let channel = host.find_device("Keys", Some(0)).unwrap();

    transport.send(0, &[0x90, 64, 100]);
    tick_until(&mut system, &mut host, |_, host| host.is_note_pressed(channel, 64))
        .expect("note on never delivered");

    transport.send(0, &[0x90, 64, 0]);
    tick_until(&mut system, &mut host, |_, host| !host.is_note_pressed(channel, 64))
        .expect("note off never delivered");
}

#[test]
fn test_controls_and_pitch_bend() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    bind_devices(&mut system, &mut host, &transport, 4);
    let channel = host.find_device("Keys", Some(4)).unwrap();

    transport.send(0, &[0xB4, 74, 127]);
    transport.send(0, &[0xE4, 0x7F, 0x7F]);
    transport.send(0, &[0xD4, 33]);
    tick_until(&mut system, &mut host, |_, host| {
        host.channel_pressure(channel) == Some(33)
    })
    .expect("controls never delivered");

    assert_eq!(host.control_normalized(channel, 74), Some(1.0));
    assert_eq!(host.pitch_bend(channel), Some(0x3FFF));
    assert_eq!(host.pitch_bend_normalized(channel), Some(1.0));

    // Reset All Controllers zeroes every controller
    transport.send(0, &[0xB4, 121, 0]);
    tick_until(&mut system, &mut host, |_, host| host.control(channel, 74) == Some(0))
        .expect("controller reset never delivered");
}

#[test]
fn test_all_notes_off_releases_every_note() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    bind_devices(&mut system, &mut host, &transport, 0);
    let all = host.find_device("Keys", None).unwrap();

    for note in [10, 20, 100] {
        transport.send(0, &[0x90, note, 100]);
    }
    tick_until(&mut system, &mut host, |_, host| host.is_note_pressed(all, 100))
        .expect("notes never delivered");

    transport.send(0, &[0xB0, 0x7B, 0]);
    tick_until(&mut system, &mut host, |_, host| {
        [10, 20, 100].iter().all(|&n| !host.is_note_pressed(all, n))
    })
    .expect("all notes off never delivered");
}

#[test]
fn test_rename_rebuilds_every_port() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    transport.add_port("Pads");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();

    assert!(system.tick(&mut host).ports_rebuilt);
    assert_eq!(transport.open_count(), 2);
    assert!(!system.tick(&mut host).ports_rebuilt);

    transport.rename_port(1, "Drums");
    let report = system.tick(&mut host);
    assert!(report.ports_rebuilt);
    assert_eq!(transport.open_count(), 4);
    let names: Vec<_> = system.ports().into_iter().map(|info| info.name).collect();
    assert_eq!(names, vec!["Keys", "Drums"]);

    assert!(!system.tick(&mut host).ports_rebuilt);
    assert_eq!(transport.open_count(), 4);
}

#[test]
fn test_dead_reader_triggers_rebuild() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    system.tick(&mut host);
    assert_eq!(transport.open_count(), 1);

    transport.fail_reads(0, 3);
    tick_until(&mut system, &mut host, |report, _| report.ports_rebuilt)
        .expect("dead port never rebuilt");
    assert_eq!(transport.open_count(), 2);

    let states = system.reader_states();
    assert_eq!(states.len(), 1);
    assert_ne!(states[0].1, ReaderState::Stopped);
}

#[test]
fn test_unplug_removes_devices() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    bind_devices(&mut system, &mut host, &transport, 0);
    assert_eq!(system.registry().len(), 2);

    transport.remove_port(0);
    let report = system.tick(&mut host);
    assert!(report.ports_rebuilt);
    assert_eq!(report.devices_removed, 2);
    assert_eq!(host.device_count(), 0);
    assert!(system.registry().is_empty());
    assert!(system.ports().is_empty());
}

#[test]
fn test_transport_reaches_requested_devices_for_one_tick() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    bind_devices(&mut system, &mut host, &transport, 2);
    let all = host.find_device("Keys", None).unwrap();
    let channel = host.find_device("Keys", Some(2)).unwrap();

    transport.send(0, &[0xFA]);
    tick_until(&mut system, &mut host, |_, host| {
        host.transport(all) == Some(TransportKind::Start)
    })
    .expect("transport never delivered");
    assert_eq!(host.transport(channel), Some(TransportKind::Start));
    // Transport does not create devices for channels nobody used
    assert_eq!(host.device_count(), 2);

    system.tick(&mut host);
    assert_eq!(host.transport(all), None);
    assert_eq!(host.transport(channel), None);
}

fn wait_for_messages(system: &MidiInputSystem, port: usize, count: u64) {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if system.reader_stats(port).is_some_and(|stats| stats.messages >= count) {
            return;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("reader never saw {} messages", count);
}

#[test]
fn test_host_failure_is_retried_on_next_tick() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    host.fail_adds(2);

    system.tick(&mut host);
    transport.send(0, &[0x90, 60, 100]);
    wait_for_messages(&system, 0, 1);
    let report = system.tick(&mut host);
    assert_eq!(report.devices_added, 0);
    assert_eq!(host.device_count(), 0);

    // Unbound slots drop traffic until the retry binds them
    transport.send(0, &[0x90, 62, 100]);
    wait_for_messages(&system, 0, 2);
    let report = system.tick(&mut host);
    assert_eq!(report.events_delivered, 0);
    assert_eq!(report.devices_added, 2);
    assert_eq!(system.reader_stats(0).unwrap().dropped, 4);

    let keys = host.find_device("Keys", Some(0)).unwrap();
    transport.send(0, &[0x90, 64, 90]);
    tick_until(&mut system, &mut host, |_, host| host.is_note_pressed(keys, 64))
        .expect("retried device never received input");
}

#[test]
fn test_host_failure_gives_up_without_crashing() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    host.fail_adds(2 * MAX_ADD_ATTEMPTS as usize);

    system.tick(&mut host);
    transport.send(0, &[0x90, 60, 100]);
    wait_for_messages(&system, 0, 1);
    for _ in 0..MAX_ADD_ATTEMPTS + 1 {
        let report = system.tick(&mut host);
        assert_eq!(report.devices_added, 0);
    }
    assert_eq!(system.registry().pending(), 0);

    transport.send(0, &[0x90, 62, 100]);
    wait_for_messages(&system, 0, 2);
    let report = system.tick(&mut host);
    assert_eq!(report.events_delivered, 0);
    assert_eq!(host.device_count(), 0);
    assert_eq!(system.reader_stats(0).unwrap().dropped, 4);
}

#[test]
fn test_shutdown_removes_every_device() {
    let transport = VirtualTransport::new();
    transport.add_port("Keys");
    transport.add_port("Pads");
    let mut system = test_system(&transport);
    let mut host = StateBlockHost::new();
    system.tick(&mut host);
    transport.send(0, &[0x90, 60, 100]);
    transport.send(1, &[0x99, 36, 100]);
    tick_until(&mut system, &mut host, |_, host| host.device_count() == 4)
        .expect("devices never bound");

    let report = system.shutdown(&mut host);
    assert_eq!(report.devices_removed, 4);
    assert_eq!(host.device_count(), 0);
    assert!(system.ports().is_empty());
}

struct CountingHost {
    inner: StateBlockHost,
    updates: usize,
}

impl DeviceHost for CountingHost {
    fn add_device(
        &mut self,
        description: &midin_io::DeviceDescription,
    ) -> midin_io::Result<midin_core::DeviceId> {
        self.inner.add_device(description)
    }

    fn remove_device(&mut self, device: midin_core::DeviceId) {
        self.inner.remove_device(device)
    }

    fn deliver_delta(&mut self, device: midin_core::DeviceId, offset: u32, payload: &[u8]) {
        self.inner.deliver_delta(device, offset, payload)
    }

    fn begin_update(&mut self) {
        self.updates += 1;
        self.inner.begin_update();
    }
}

#[test]
fn test_begin_update_runs_every_tick() {
    let transport = VirtualTransport::new();
    let mut system = test_system(&transport);
    let mut host = CountingHost {
        inner: StateBlockHost::new(),
        updates: 0,
    };
    for _ in 0..3 {
        system.tick(&mut host);
    }
    assert_eq!(host.updates, 3);

    // Hosts can also be used through a trait object
    let dyn_host: &mut dyn DeviceHost = &mut host;
    system.tick(dyn_host);
    assert_eq!(host.updates, 4);
}
