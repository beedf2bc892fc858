//! # Coordination Hub
//!
//! The state machine that ties calibration, identities, world state and
//! subscribers together.
//!
//! ## Architecture
//!
//! ```text
//!  inbound event
//!       │
//!  ┌────▼───────────────── Mutex<HubState> ─────────────────┐
//!  │ CalibrationStore  IdentityRegistry  VirtualWorldState  │
//!  │ SubscriberRegistry                                     │
//!  └────┬───────────────────────────────────────────────────┘
//!       │ outbound events + copy of subscriber list (lock released)
//!  ┌────▼────────┐
//!  │ Broadcaster │──► view 1, view 2, ... (fire-and-forget)
//!  └─────────────┘
//! ```
//!
//! Every inbound event is applied under one lock, so no observer can see a
//! world entry without its identity. Sends happen after the lock is dropped
//! and a failure on one subscriber never affects the others.
//!
//! A second dispatch lock is taken before the state lock is released and
//! held through fan-out, so concurrent callers deliver in commit order.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::calibration::{CalibrationBounds, CalibrationStore, WorldBounds};
use crate::error::{CoreError, CoreResult, DeliveryError};
use crate::events::{InboundEvent, OutboundEvent};
use crate::identity::{DeviceUserKey, IdentityRegistry};
use crate::subscribers::{SubscriberEndpoint, SubscriberRegistry};
use crate::world::{VirtualUserId, VirtualWorldState};

/// Sends outbound events to one subscriber.
///
/// Implementations must not block for long: the hub calls
/// [`Broadcaster::deliver_all`] once per outbound event, sequentially, while
/// holding the dispatch lock.
pub trait Broadcaster: Send + Sync {
    /// Delivers `event` to `endpoint`. No acknowledgment, no retry.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the send could not be attempted.
    fn deliver(&self, endpoint: &SubscriberEndpoint, event: &OutboundEvent) -> Result<(), DeliveryError>;

    /// Delivers `event` to every endpoint and returns the failures.
    ///
    /// The default calls [`Broadcaster::deliver`] per endpoint. Transports
    /// that serialize override it to encode once per event.
    fn deliver_all(&self, endpoints: &[SubscriberEndpoint], event: &OutboundEvent) -> Vec<DeliveryError> {
        endpoints
            .iter()
            .filter_map(|endpoint| self.deliver(endpoint, event).err())
            .collect()
    }
}

/// Counters kept under the state lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct StateCounters {
    events: u64,
    broadcasts: u64,
    ignored: u64,
    uncalibrated: u64,
}

/// Point-in-time hub statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Inbound events applied (including ignored ones).
    pub events_handled: u64,
    /// Outbound events produced.
    pub broadcasts: u64,
    /// Stale or duplicate events that were dropped as no-ops.
    pub ignored: u64,
    /// Position events dropped because the device was never calibrated.
    pub uncalibrated_drops: u64,
    /// Successful per-subscriber sends.
    pub deliveries: u64,
    /// Failed per-subscriber sends.
    pub delivery_failures: u64,
    /// Users currently in the world.
    pub live_users: usize,
    /// Registered views.
    pub subscribers: usize,
    /// Devices that sent `registerDevice`.
    pub known_devices: usize,
    /// Devices with calibration data.
    pub calibrated_devices: usize,
}

/// Outcome of fanning one inbound event out to the views.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Outbound events produced by the inbound event.
    pub events: usize,
    /// Successful sends.
    pub delivered: usize,
    /// Failed sends.
    pub failed: usize,
}

// ============================================================================
// STATE
// ============================================================================

/// Combined hub state. Only mutated through [`HubState::apply`].
#[derive(Clone, Debug, Default)]
pub struct HubState {
    calibration: CalibrationStore,
    identities: IdentityRegistry,
    world: VirtualWorldState,
    subscribers: SubscriberRegistry,
    devices: BTreeSet<String>,
    counters: StateCounters,
}

impl HubState {
    /// Creates an empty hub normalizing into `world`.
    #[must_use]
    pub fn new(world: WorldBounds) -> Self {
        Self {
            calibration: CalibrationStore::new(world),
            ..Self::default()
        }
    }

    /// Pre-seeds calibration for a device, as if it had sent `calibrateDevice`.
    #[must_use]
    pub fn with_calibration(mut self, client_id: impl Into<String>, bounds: CalibrationBounds) -> Self {
        self.calibration.set(client_id, bounds);
        self
    }

    /// Applies one inbound event and returns what must be broadcast.
    ///
    /// Stale and duplicate references return an empty list.
    ///
    /// # Errors
    ///
    /// [`CoreError::UncalibratedDevice`] for position events from a device
    /// without calibration. The event is dropped and nothing is mutated.
    pub fn apply(&mut self, event: InboundEvent) -> CoreResult<Vec<OutboundEvent>> {
        self.counters.events += 1;

        let result = match event {
            InboundEvent::RegisterDevice { client_id } => {
                self.register_device(client_id);
                Ok(Vec::new())
            }
            InboundEvent::CalibrateDevice { client_id, bounds } => {
                tracing::info!(
                    client = %client_id,
                    min_x = bounds.min_x,
                    min_y = bounds.min_y,
                    min_z = bounds.min_z,
                    max_x = bounds.max_x,
                    max_y = bounds.max_y,
                    max_z = bounds.max_z,
                    "Device calibrated"
                );
                self.calibration.set(client_id, bounds);
                Ok(Vec::new())
            }
            InboundEvent::NewUser { key, x, y, z } => self.add_user(key, x, y, z),
            InboundEvent::UserCoordinates { key, x, y, z } => self.move_user(&key, x, y, z),
            InboundEvent::LostUser { key } => self.remove_user(&key),
            InboundEvent::RegisterView { endpoint } => {
                self.register_view(endpoint);
                Ok(Vec::new())
            }
            InboundEvent::DeviceDisconnected { client_id } => self.disconnect_device(&client_id),
        };

        match &result {
            Ok(outbound) => self.counters.broadcasts += outbound.len() as u64,
            Err(CoreError::UncalibratedDevice { .. }) => self.counters.uncalibrated += 1,
            Err(_) => {}
        }
        result
    }

    fn register_device(&mut self, client_id: String) {
        if self.devices.contains(&client_id) {
            tracing::info!(client = %client_id, "Device registered again");
        } else {
            tracing::info!(client = %client_id, "Device registered");
            self.devices.insert(client_id);
        }
    }

    fn register_view(&mut self, endpoint: SubscriberEndpoint) {
        let label = endpoint.to_string();
        if self.subscribers.register(endpoint) {
            tracing::info!(view = %label, "View registered, sending updates");
        } else {
            self.counters.ignored += 1;
            tracing::debug!(view = %label, "View already registered");
        }
    }

    fn add_user(&mut self, key: DeviceUserKey, x: f32, y: f32, z: f32) -> CoreResult<Vec<OutboundEvent>> {
        if self.identities.contains(&key) {
            self.counters.ignored += 1;
            tracing::debug!(user = %key, "Ignoring repeated newUser");
            return Ok(Vec::new());
        }

        // Normalize first: a rejected event must not consume an ID.
        let position = self.calibration.normalize(&key.client_id, x, y, z)?;
        let label = key.to_string();
        let id = self.identities.assign(key)?;
        self.world.set(id, position);

        tracing::info!(
            user = %label,
            id = %id,
            x = position.x,
            y = position.y,
            "Added user"
        );
        Ok(vec![OutboundEvent::NewUser { id, position }])
    }

    fn move_user(&mut self, key: &DeviceUserKey, x: f32, y: f32, z: f32) -> CoreResult<Vec<OutboundEvent>> {
        let Ok(id) = self.identities.lookup(key) else {
            self.counters.ignored += 1;
            tracing::debug!(user = %key, "Ignoring userCoordinates for unknown user");
            return Ok(Vec::new());
        };

        let position = self.calibration.normalize(&key.client_id, x, y, z)?;
        self.world.set(id, position);

        tracing::trace!(id = %id, x = position.x, y = position.y, "Moved user");
        Ok(vec![OutboundEvent::UserCoordinates { id, position }])
    }

    fn remove_user(&mut self, key: &DeviceUserKey) -> CoreResult<Vec<OutboundEvent>> {
        if !self.identities.contains(key) {
            self.counters.ignored += 1;
            tracing::debug!(user = %key, "Ignoring lostUser for unknown user");
            return Ok(Vec::new());
        }

        let id = self.release(key)?;
        tracing::info!(user = %key, id = %id, "Removed user");
        Ok(vec![OutboundEvent::LostUser { id }])
    }

    fn disconnect_device(&mut self, client_id: &str) -> CoreResult<Vec<OutboundEvent>> {
        self.devices.remove(client_id);

        let owned = self.identities.keys_for_client(client_id);
        let mut outbound = Vec::with_capacity(owned.len());
        for key in &owned {
            let id = self.release(key)?;
            outbound.push(OutboundEvent::LostUser { id });
        }

        tracing::info!(client = %client_id, released = outbound.len(), "Device disconnected");
        Ok(outbound)
    }

    /// Drops a user from both the identity registry and the world.
    fn release(&mut self, key: &DeviceUserKey) -> CoreResult<VirtualUserId> {
        let id = self.identities.release(key)?;
        self.world.remove(id)?;
        Ok(id)
    }

    /// Calibration data.
    #[must_use]
    pub const fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    /// Identity mapping.
    #[must_use]
    pub const fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// Current world.
    #[must_use]
    pub const fn world(&self) -> &VirtualWorldState {
        &self.world
    }

    /// Registered views.
    #[must_use]
    pub const fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    /// Devices that announced themselves, sorted.
    #[must_use]
    pub const fn devices(&self) -> &BTreeSet<String> {
        &self.devices
    }

    fn stats(&self) -> HubStats {
        HubStats {
            events_handled: self.counters.events,
            broadcasts: self.counters.broadcasts,
            ignored: self.counters.ignored,
            uncalibrated_drops: self.counters.uncalibrated,
            deliveries: 0,
            delivery_failures: 0,
            live_users: self.world.len(),
            subscribers: self.subscribers.len(),
            known_devices: self.devices.len(),
            calibrated_devices: self.calibration.len(),
        }
    }
}

// ============================================================================
// HUB
// ============================================================================

/// Thread-safe hub: one lock around [`HubState`] plus a [`Broadcaster`].
///
/// Any number of threads may call [`CoordinationHub::handle`]. Views receive
/// broadcasts in the order their inbound events were applied.
pub struct CoordinationHub<B> {
    state: Mutex<HubState>,
    dispatch: Mutex<()>,
    broadcaster: B,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl<B: Broadcaster> CoordinationHub<B> {
    /// Creates a hub around existing state.
    pub fn new(state: HubState, broadcaster: B) -> Self {
        Self {
            state: Mutex::new(state),
            dispatch: Mutex::new(()),
            broadcaster,
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    /// Applies `event` atomically, then fans the result out to every view.
    ///
    /// # Errors
    ///
    /// Returns the [`CoreError`] that made the hub drop the event. It has
    /// already been logged.
    pub fn handle(&self, event: InboundEvent) -> CoreResult<Dispatch> {
        let kind = event.kind();

        let mut state = self.state.lock();
        let outbound = state.apply(event).map_err(|err| {
            log_rejection(kind, &err);
            err
        })?;
        if outbound.is_empty() {
            return Ok(Dispatch::default());
        }
        let subscribers = state.subscribers().all().to_vec();

        // Lock order: state, then dispatch. Nothing takes them the other way.
        let _dispatch = self.dispatch.lock();
        drop(state);

        Ok(self.fan_out(&outbound, &subscribers))
    }

    fn fan_out(&self, outbound: &[OutboundEvent], subscribers: &[SubscriberEndpoint]) -> Dispatch {
        let mut dispatch = Dispatch {
            events: outbound.len(),
            ..Dispatch::default()
        };

        if subscribers.is_empty() {
            tracing::debug!(events = outbound.len(), "No views registered");
            return dispatch;
        }

        for event in outbound {
            let failures = self.broadcaster.deliver_all(subscribers, event);
            for err in &failures {
                tracing::warn!(error = %err, "Delivery failed");
            }
            dispatch.failed += failures.len();
            dispatch.delivered += subscribers.len().saturating_sub(failures.len());
        }

        self.deliveries.fetch_add(dispatch.delivered as u64, Ordering::Relaxed);
        self.delivery_failures.fetch_add(dispatch.failed as u64, Ordering::Relaxed);
        dispatch
    }

    /// Runs `f` with shared access to the state, under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&HubState) -> R) -> R {
        f(&*self.state.lock())
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let mut stats = self.state.lock().stats();
        stats.deliveries = self.deliveries.load(Ordering::Relaxed);
        stats.delivery_failures = self.delivery_failures.load(Ordering::Relaxed);
        stats
    }

    /// The broadcaster used for fan-out.
    pub const fn broadcaster(&self) -> &B {
        &self.broadcaster
    }
}

fn log_rejection(kind: &str, err: &CoreError) {
    match err {
        CoreError::UncalibratedDevice { client_id } => tracing::error!(
            event = kind,
            client = %client_id,
            "Dropping event from uncalibrated device; run calibration for this device"
        ),
        other => tracing::warn!(event = kind, error = %other, "Dropping event"),
    }
}
