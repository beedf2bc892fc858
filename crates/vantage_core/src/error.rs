//! # Hub Error Types
//!
//! All errors that can occur while applying events to the hub state.

use thiserror::Error;

use crate::identity::DeviceUserKey;
use crate::subscribers::SubscriberEndpoint;
use crate::world::VirtualUserId;

/// Errors that can occur in the coordination core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A device user was announced twice without being lost in between.
    #[error("device user {0} is already assigned")]
    DuplicateUser(DeviceUserKey),

    /// A device user is not known to the identity registry.
    #[error("device user {0} is not assigned")]
    UnknownUser(DeviceUserKey),

    /// A virtual user has no entry in the world state.
    #[error("virtual user {0} is not in the world")]
    UnknownVirtualUser(VirtualUserId),

    /// Coordinates arrived from a device that never sent calibration data.
    #[error("device {client_id:?} has not been calibrated")]
    UncalibratedDevice {
        /// The client that still needs calibration.
        client_id: String,
    },

    /// The virtual ID space (positive 32-bit wire integers) is used up.
    #[error("virtual user id space exhausted")]
    IdentitiesExhausted,
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A failed send to a single subscriber.
///
/// Delivery errors never roll back state; the hub logs and counts them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("delivery to {endpoint} failed: {reason}")]
pub struct DeliveryError {
    /// Subscriber that could not be reached.
    pub endpoint: SubscriberEndpoint,
    /// Transport-level reason.
    pub reason: String,
}

impl DeliveryError {
    /// Creates a delivery error for `endpoint`.
    pub fn new(endpoint: &SubscriberEndpoint, reason: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.clone(),
            reason: reason.into(),
        }
    }
}
