//! # Hub Property Tests
//!
//! Checks the hub's invariants over scripted and randomized event sequences:
//!
//! 1. **Uniqueness**: live virtual IDs never collide
//! 2. **No reuse**: a released ID is never handed out again
//! 3. **Fan-out**: every view receives every broadcast exactly once
//! 4. **Isolation**: one failing view does not affect the others
//! 5. **Ordering**: concurrent callers deliver in commit order
//!
//! Run with: cargo test -p vantage_core --test hub_properties

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vantage_core::{
    Broadcaster, CalibrationBounds, CoordinationHub, CoreError, DeliveryError, DeviceUserKey,
    HubState, InboundEvent, OutboundEvent, SubscriberEndpoint, VirtualUserId, WorldBounds,
};

/// Records every delivery; optionally fails for one port.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(SubscriberEndpoint, OutboundEvent)>>,
    failing_port: Option<u16>,
}

impl Recorder {
    fn failing_on(port: u16) -> Self {
        Self {
            failing_port: Some(port),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<(SubscriberEndpoint, OutboundEvent)> {
        self.sent.lock().clone()
    }
}

impl Broadcaster for Recorder {
    fn deliver(&self, endpoint: &SubscriberEndpoint, event: &OutboundEvent) -> Result<(), DeliveryError> {
        if self.failing_port == Some(endpoint.port) {
            return Err(DeliveryError::new(endpoint, "unreachable"));
        }
        self.sent.lock().push((endpoint.clone(), *event));
        Ok(())
    }
}

fn kinect() -> CalibrationBounds {
    CalibrationBounds::new(-5000.0, -1000.0, 0.0, 5000.0, -1000.0, 15000.0)
}

fn hub_with(recorder: Recorder) -> CoordinationHub<Recorder> {
    let state = HubState::new(WorldBounds::default())
        .with_calibration("a", kinect())
        .with_calibration("b", kinect());
    CoordinationHub::new(state, recorder)
}

fn new_user(id: i32, client: &str) -> InboundEvent {
    InboundEvent::NewUser {
        key: DeviceUserKey::new(id, client),
        x: 0.0,
        y: 0.0,
        z: 7500.0,
    }
}

fn lost_user(id: i32, client: &str) -> InboundEvent {
    InboundEvent::LostUser {
        key: DeviceUserKey::new(id, client),
    }
}

fn view(port: u16) -> InboundEvent {
    InboundEvent::RegisterView {
        endpoint: SubscriberEndpoint::new("127.0.0.1", port),
    }
}

/// Every identity has a world entry and vice versa; live IDs are distinct.
fn assert_consistent(state: &HubState) {
    assert_eq!(state.identities().len(), state.world().len());

    let mut seen = HashSet::new();
    for (key, id) in state.identities().iter() {
        assert!(seen.insert(id), "virtual id {id} assigned twice");
        assert!(state.world().contains(id), "{key} has no world entry");
        assert_eq!(state.identities().key_of(id), Some(key));
    }
}

#[test]
fn scenario_center_of_room() {
    let hub = hub_with(Recorder::default());
    hub.handle(view(60606)).unwrap();

    hub.handle(new_user(1, "a")).unwrap();

    let sent = hub.broadcaster().sent();
    assert_eq!(sent.len(), 1);
    let OutboundEvent::NewUser { id, position } = sent[0].1 else {
        panic!("expected NewUser, got {:?}", sent[0].1);
    };
    assert_eq!(id, VirtualUserId(0));
    assert!((position.x - 500.0).abs() < 0.1);
    assert!((position.y - 375.0).abs() < 0.1);
    assert_eq!(position.z, 0.0);
}

#[test]
fn no_reuse_after_lost_user() {
    let hub = hub_with(Recorder::default());

    hub.handle(new_user(1, "a")).unwrap();
    hub.handle(lost_user(1, "a")).unwrap();
    hub.handle(new_user(1, "a")).unwrap();

    let ids: Vec<VirtualUserId> = hub.with_state(|s| s.identities().iter().map(|(_, id)| id).collect());
    assert_eq!(ids, vec![VirtualUserId(1)]);
}

#[test]
fn fan_out_reaches_every_view_once() {
    let hub = hub_with(Recorder::default());
    for port in [7001, 7002, 7003, 7002] {
        hub.handle(view(port)).unwrap();
    }

    let dispatch = hub.handle(new_user(4, "b")).unwrap();

    assert_eq!(dispatch.events, 1);
    assert_eq!(dispatch.delivered, 3);
    let sent = hub.broadcaster().sent();
    let ports: HashSet<u16> = sent.iter().map(|(e, _)| e.port).collect();
    assert_eq!(ports, HashSet::from([7001, 7002, 7003]));
    assert!(sent.iter().all(|(_, event)| *event == sent[0].1));
}

#[test]
fn failing_view_does_not_block_others() {
    let hub = hub_with(Recorder::failing_on(7002));
    for port in [7001, 7002, 7003] {
        hub.handle(view(port)).unwrap();
    }

    let dispatch = hub.handle(new_user(1, "a")).unwrap();

    assert_eq!(dispatch.delivered, 2);
    assert_eq!(dispatch.failed, 1);
    // The mutation stays committed.
    assert_eq!(hub.stats().live_users, 1);
    assert_eq!(hub.stats().delivery_failures, 1);
}

#[test]
fn uncalibrated_device_produces_no_broadcast() {
    let hub = hub_with(Recorder::default());
    hub.handle(view(7001)).unwrap();

    let err = hub.handle(new_user(1, "nobody")).unwrap_err();

    assert_eq!(
        err,
        CoreError::UncalibratedDevice {
            client_id: "nobody".into()
        }
    );
    assert!(hub.broadcaster().sent().is_empty());
    let stats = hub.stats();
    assert_eq!(stats.live_users, 0);
    assert_eq!(stats.uncalibrated_drops, 1);
    assert_eq!(stats.ignored, 0);
}

#[test]
fn random_sequences_keep_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let hub = hub_with(Recorder::default());
    hub.handle(view(9000)).unwrap();

    let mut highest_released: Option<VirtualUserId> = None;

    for _ in 0..5_000 {
        let client = if rng.gen_bool(0.5) { "a" } else { "b" };
        let local: i32 = rng.gen_range(0..8);
        let event = match rng.gen_range(0..3) {
            0 => new_user(local, client),
            1 => InboundEvent::UserCoordinates {
                key: DeviceUserKey::new(local, client),
                x: rng.gen_range(-8000.0..8000.0),
                y: 0.0,
                z: rng.gen_range(-1000.0..20000.0),
            },
            _ => lost_user(local, client),
        };

        hub.handle(event).unwrap();

        for (_, event) in hub.broadcaster().sent.lock().drain(..) {
            match event {
                OutboundEvent::NewUser { id, position } => {
                    if let Some(released) = highest_released {
                        assert!(id > released, "id {id} reused after {released}");
                    }
                    assert!(position.x >= 0.1 && position.x <= 1000.0 + 1e-3);
                    assert!(position.y >= 0.1 && position.y <= 750.0 + 1e-3);
                }
                OutboundEvent::UserCoordinates { position, .. } => {
                    assert!(position.x >= 0.1 && position.x <= 1000.0 + 1e-3);
                    assert!(position.y >= 0.1 && position.y <= 750.0 + 1e-3);
                    assert_eq!(position.z, 0.0);
                }
                OutboundEvent::LostUser { id } => {
                    highest_released = Some(highest_released.map_or(id, |h| h.max(id)));
                }
            }
        }

        hub.with_state(assert_consistent);
    }
}

#[test]
fn concurrent_announcements_assign_once() {
    let hub = Arc::new(hub_with(Recorder::default()));
    hub.handle(view(9100)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for local in 0..50 {
                    hub.handle(new_user(local, "a")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    hub.with_state(|state| {
        assert_consistent(state);
        assert_eq!(state.identities().len(), 50);
        assert_eq!(state.identities().next_id(), VirtualUserId(50));
    });
    assert_eq!(hub.broadcaster().sent().len(), 50);
}

/// Stalls the first `NewUser` send until the test thread has caught up.
struct SlowFirstNewUser {
    entered: Barrier,
    stalled: AtomicUsize,
    sent: Mutex<Vec<OutboundEvent>>,
}

impl Broadcaster for SlowFirstNewUser {
    fn deliver(&self, _: &SubscriberEndpoint, event: &OutboundEvent) -> Result<(), DeliveryError> {
        if matches!(event, OutboundEvent::NewUser { .. }) && self.stalled.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.wait();
            thread::sleep(Duration::from_millis(100));
        }
        self.sent.lock().push(*event);
        Ok(())
    }
}

#[test]
fn concurrent_callers_deliver_in_commit_order() {
    let state = HubState::new(WorldBounds::default()).with_calibration("a", kinect());
    let hub = Arc::new(CoordinationHub::new(
        state,
        SlowFirstNewUser {
            entered: Barrier::new(2),
            stalled: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        },
    ));
    hub.handle(view(7001)).unwrap();

    let announcer = {
        let hub = Arc::clone(&hub);
        thread::spawn(move || hub.handle(new_user(1, "a")).unwrap())
    };
    // NewUser is committed and mid-send when LostUser arrives.
    hub.broadcaster().entered.wait();
    let leaver = {
        let hub = Arc::clone(&hub);
        thread::spawn(move || hub.handle(lost_user(1, "a")).unwrap())
    };
    announcer.join().unwrap();
    leaver.join().unwrap();

    let sent = hub.broadcaster().sent.lock().clone();
    assert_eq!(sent.len(), 2);
    assert!(matches!(sent[0], OutboundEvent::NewUser { id: VirtualUserId(0), .. }), "got {sent:?}");
    assert_eq!(sent[1], OutboundEvent::LostUser { id: VirtualUserId(0) });
}

/// Counts batch calls; each batch is one encode in a real transport.
#[derive(Default)]
struct BatchCounter {
    batches: AtomicUsize,
    deliveries: AtomicUsize,
}

impl Broadcaster for BatchCounter {
    fn deliver(&self, _: &SubscriberEndpoint, _: &OutboundEvent) -> Result<(), DeliveryError> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn deliver_all(&self, endpoints: &[SubscriberEndpoint], event: &OutboundEvent) -> Vec<DeliveryError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        endpoints
            .iter()
            .filter_map(|endpoint| self.deliver(endpoint, event).err())
            .collect()
    }
}

#[test]
fn one_batch_per_outbound_event() {
    let state = HubState::new(WorldBounds::default()).with_calibration("a", kinect());
    let hub = CoordinationHub::new(state, BatchCounter::default());
    for port in [7001, 7002, 7003] {
        hub.handle(view(port)).unwrap();
    }
    hub.handle(new_user(1, "a")).unwrap();
    hub.handle(new_user(2, "a")).unwrap();

    let dispatch = hub
        .handle(InboundEvent::DeviceDisconnected { client_id: "a".into() })
        .unwrap();

    assert_eq!(dispatch.events, 2);
    assert_eq!(dispatch.delivered, 6);
    assert_eq!(hub.broadcaster().batches.load(Ordering::SeqCst), 4);
    assert_eq!(hub.broadcaster().deliveries.load(Ordering::SeqCst), 12);
}
