//! # Hub Events
//!
//! Closed set of events flowing into and out of the hub. Wire addresses are
//! mapped onto these variants at the transport boundary only.
//!
//! ## Event Flow
//! ```text
//! device ──NewUser/UserCoordinates/LostUser──►┐
//! device ──RegisterDevice/CalibrateDevice────►├─► hub ──Outbound──► every view
//! view   ──RegisterView──────────────────────►┘
//! ```

use crate::calibration::CalibrationBounds;
use crate::identity::DeviceUserKey;
use crate::subscribers::SubscriberEndpoint;
use crate::world::{VirtualPosition, VirtualUserId};

// ============================================================================
// INBOUND (devices and views → hub)
// ============================================================================

/// Events accepted by the hub.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// A device announced itself.
    RegisterDevice {
        /// The announcing device.
        client_id: String,
    },

    /// A device sent (or resent) its raw coordinate bounds.
    CalibrateDevice {
        /// The calibrated device.
        client_id: String,
        /// Raw min/max per axis.
        bounds: CalibrationBounds,
    },

    /// A device started tracking a person.
    NewUser {
        /// Device-local identity.
        key: DeviceUserKey,
        /// Raw X.
        x: f32,
        /// Raw Y.
        y: f32,
        /// Raw Z (depth).
        z: f32,
    },

    /// A tracked person moved.
    UserCoordinates {
        /// Device-local identity.
        key: DeviceUserKey,
        /// Raw X.
        x: f32,
        /// Raw Y.
        y: f32,
        /// Raw Z (depth).
        z: f32,
    },

    /// A device stopped tracking a person.
    LostUser {
        /// Device-local identity.
        key: DeviceUserKey,
    },

    /// A view asked to receive updates.
    RegisterView {
        /// Where to send updates.
        endpoint: SubscriberEndpoint,
    },

    /// The transport reported that a device went away.
    ///
    /// Has no wire address; only in-process transports can raise it.
    DeviceDisconnected {
        /// The departed device.
        client_id: String,
    },
}

impl InboundEvent {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RegisterDevice { .. } => "registerDevice",
            Self::CalibrateDevice { .. } => "calibrateDevice",
            Self::NewUser { .. } => "newUser",
            Self::UserCoordinates { .. } => "userCoordinates",
            Self::LostUser { .. } => "lostUser",
            Self::RegisterView { .. } => "registerView",
            Self::DeviceDisconnected { .. } => "deviceDisconnected",
        }
    }
}

// ============================================================================
// OUTBOUND (hub → views)
// ============================================================================

/// Events broadcast to every subscriber.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutboundEvent {
    /// A person entered the virtual world.
    NewUser {
        /// Hub-assigned identity.
        id: VirtualUserId,
        /// Normalized position.
        position: VirtualPosition,
    },

    /// A person moved.
    UserCoordinates {
        /// Hub-assigned identity.
        id: VirtualUserId,
        /// Normalized position.
        position: VirtualPosition,
    },

    /// A person left the virtual world.
    LostUser {
        /// Hub-assigned identity.
        id: VirtualUserId,
    },
}

impl OutboundEvent {
    /// The virtual user this event is about.
    #[must_use]
    pub const fn user(&self) -> VirtualUserId {
        match self {
            Self::NewUser { id, .. } | Self::UserCoordinates { id, .. } | Self::LostUser { id } => *id,
        }
    }
}
