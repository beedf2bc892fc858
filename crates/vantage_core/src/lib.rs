//! # Vantage Core
//!
//! Coordination state for people tracked by several independent depth
//! sensors.
//!
//! ## Architecture
//!
//! - **Calibration**: per-device bounds, raw → virtual world normalization
//! - **Identity**: `(device user, client)` → virtual user, IDs never reused
//! - **World**: virtual user → normalized position
//! - **Subscribers**: views receiving updates, deduplicated
//! - **Hub**: applies inbound events atomically and fans results out
//!
//! ## Example
//!
//! ```rust,ignore
//! use vantage_core::{CoordinationHub, HubState, InboundEvent, WorldBounds};
//!
//! let hub = CoordinationHub::new(HubState::new(WorldBounds::default()), broadcaster);
//! hub.handle(InboundEvent::RegisterDevice { client_id: "lab-kinect".into() })?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod calibration;
pub mod error;
pub mod events;
pub mod hub;
pub mod identity;
pub mod subscribers;
pub mod world;

pub use calibration::{map_value, CalibrationBounds, CalibrationStore, WorldBounds, WORLD_FLOOR};
pub use error::{CoreError, CoreResult, DeliveryError};
pub use events::{InboundEvent, OutboundEvent};
pub use hub::{Broadcaster, CoordinationHub, Dispatch, HubState, HubStats};
pub use identity::{DeviceUserKey, IdentityRegistry};
pub use subscribers::{SubscriberEndpoint, SubscriberRegistry};
pub use world::{VirtualPosition, VirtualUserId, VirtualWorldState};
