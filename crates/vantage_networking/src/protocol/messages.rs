//! # Hub Message Contract
//!
//! Maps `/kuatro/*` OSC messages onto hub events and back.
//!
//! ## Inbound (device or view → hub)
//!
//! | Address | Arguments |
//! |---|---|
//! | `/kuatro/newUser` | `deviceUserId: i, x: f, y: f, z: f, clientId: s` |
//! | `/kuatro/userCoordinates` | `deviceUserId: i, x: f, y: f, z: f, clientId: s` |
//! | `/kuatro/lostUser` | `deviceUserId: i, clientId: s` |
//! | `/kuatro/registerDevice` | `clientId: s` |
//! | `/kuatro/calibrateDevice` | `clientId: s, minX..maxZ: f ×6` |
//! | `/kuatro/registerView` | `hostIp: s, port: i` |
//!
//! ## Outbound (hub → view)
//!
//! | Address | Arguments |
//! |---|---|
//! | `/kuatro/newUser` | `virtualUserId: i, x: f, y: f, z: f` |
//! | `/kuatro/userCoordinates` | `virtualUserId: i, x: f, y: f, z: f` |
//! | `/kuatro/lostUser` | `virtualUserId: i` |
//!
//! Float parameters also accept `i`, `h` and `d`; integer parameters accept
//! `h` when the value fits. Trailing extra arguments are ignored.

use vantage_core::{
    CalibrationBounds, DeviceUserKey, InboundEvent, OutboundEvent, SubscriberEndpoint,
    VirtualPosition, VirtualUserId,
};

use super::osc::{OscArg, OscMessage};
use crate::error::{ProtocolError, ProtocolResult};

/// A device started tracking someone; also the hub's "user entered" broadcast.
pub const NEW_USER: &str = "/kuatro/newUser";
/// A device lost someone; also the hub's "user left" broadcast.
pub const LOST_USER: &str = "/kuatro/lostUser";
/// A tracked person moved.
pub const USER_COORDINATES: &str = "/kuatro/userCoordinates";
/// A device announced itself.
pub const REGISTER_DEVICE: &str = "/kuatro/registerDevice";
/// A device sent its raw bounds.
pub const CALIBRATE_DEVICE: &str = "/kuatro/calibrateDevice";
/// A view asked for updates.
pub const REGISTER_VIEW: &str = "/kuatro/registerView";

/// Typed, position-checked access to a message's arguments.
struct Args<'a> {
    address: &'a str,
    args: &'a [OscArg],
}

impl<'a> Args<'a> {
    fn new(message: &'a OscMessage) -> Self {
        Self {
            address: &message.address,
            args: &message.args,
        }
    }

    fn get(&self, index: usize) -> ProtocolResult<&'a OscArg> {
        self.args.get(index).ok_or_else(|| ProtocolError::MissingArgument {
            address: self.address.to_owned(),
            index,
        })
    }

    fn wrong_type(&self, index: usize, expected: &'static str, found: &OscArg) -> ProtocolError {
        ProtocolError::WrongArgumentType {
            address: self.address.to_owned(),
            index,
            expected,
            found: found.type_tag(),
        }
    }

    fn long(&self, index: usize) -> ProtocolResult<i64> {
        match self.get(index)? {
            OscArg::Int(v) => Ok(i64::from(*v)),
            OscArg::Long(v) => Ok(*v),
            other => Err(self.wrong_type(index, "int", other)),
        }
    }

    fn int(&self, index: usize) -> ProtocolResult<i32> {
        i32::try_from(self.long(index)?).map_err(|_| ProtocolError::ArgumentOutOfRange {
            address: self.address.to_owned(),
            index,
        })
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn float(&self, index: usize) -> ProtocolResult<f32> {
        match self.get(index)? {
            OscArg::Float(v) => Ok(*v),
            OscArg::Double(v) => Ok(*v as f32),
            OscArg::Int(v) => Ok(*v as f32),
            OscArg::Long(v) => Ok(*v as f32),
            other => Err(self.wrong_type(index, "float", other)),
        }
    }

    fn string(&self, index: usize) -> ProtocolResult<&'a str> {
        match self.get(index)? {
            OscArg::String(v) => Ok(v.as_str()),
            other => Err(self.wrong_type(index, "string", other)),
        }
    }
}

/// Decodes one device or view message into a hub event.
///
/// # Errors
///
/// [`ProtocolError::UnknownAddress`] for anything outside the contract, or
/// the first argument that is missing, mistyped or out of range.
pub fn decode_inbound(message: &OscMessage) -> ProtocolResult<InboundEvent> {
    let args = Args::new(message);

    let event = match message.address.as_str() {
        NEW_USER => InboundEvent::NewUser {
            key: DeviceUserKey::new(args.int(0)?, args.string(4)?),
            x: args.float(1)?,
            y: args.float(2)?,
            z: args.float(3)?,
        },
        USER_COORDINATES => InboundEvent::UserCoordinates {
            key: DeviceUserKey::new(args.int(0)?, args.string(4)?),
            x: args.float(1)?,
            y: args.float(2)?,
            z: args.float(3)?,
        },
        LOST_USER => InboundEvent::LostUser {
            key: DeviceUserKey::new(args.int(0)?, args.string(1)?),
        },
        REGISTER_DEVICE => InboundEvent::RegisterDevice {
            client_id: args.string(0)?.to_owned(),
        },
        CALIBRATE_DEVICE => InboundEvent::CalibrateDevice {
            client_id: args.string(0)?.to_owned(),
            bounds: CalibrationBounds::new(
                args.float(1)?,
                args.float(2)?,
                args.float(3)?,
                args.float(4)?,
                args.float(5)?,
                args.float(6)?,
            ),
        },
        REGISTER_VIEW => {
            let host = args.string(0)?;
            let port = args.long(1)?;
            let port = u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .ok_or(ProtocolError::PortOutOfRange(port))?;
            InboundEvent::RegisterView {
                endpoint: SubscriberEndpoint::new(host, port),
            }
        }
        other => return Err(ProtocolError::UnknownAddress(other.to_owned())),
    };

    Ok(event)
}

/// Encodes a hub broadcast for the views.
#[must_use]
pub fn encode_outbound(event: &OutboundEvent) -> OscMessage {
    match *event {
        OutboundEvent::NewUser { id, position } => position_message(NEW_USER, id, position),
        OutboundEvent::UserCoordinates { id, position } => position_message(USER_COORDINATES, id, position),
        OutboundEvent::LostUser { id } => OscMessage::new(LOST_USER).arg(id.as_wire()),
    }
}

fn position_message(address: &str, id: VirtualUserId, position: VirtualPosition) -> OscMessage {
    OscMessage::new(address)
        .arg(id.as_wire())
        .arg(position.x)
        .arg(position.y)
        .arg(position.z)
}

/// Decodes a hub broadcast, as a view would.
///
/// # Errors
///
/// Unknown address, or a missing, mistyped or negative user ID.
pub fn decode_outbound(message: &OscMessage) -> ProtocolResult<OutboundEvent> {
    let args = Args::new(message);
    let id = || -> ProtocolResult<VirtualUserId> {
        u32::try_from(args.int(0)?)
            .map(VirtualUserId)
            .map_err(|_| ProtocolError::ArgumentOutOfRange {
                address: message.address.clone(),
                index: 0,
            })
    };
    let position = || -> ProtocolResult<VirtualPosition> {
        Ok(VirtualPosition::new(args.float(1)?, args.float(2)?, args.float(3)?))
    };

    match message.address.as_str() {
        NEW_USER => Ok(OutboundEvent::NewUser {
            id: id()?,
            position: position()?,
        }),
        USER_COORDINATES => Ok(OutboundEvent::UserCoordinates {
            id: id()?,
            position: position()?,
        }),
        LOST_USER => Ok(OutboundEvent::LostUser { id: id()? }),
        other => Err(ProtocolError::UnknownAddress(other.to_owned())),
    }
}

/// Encodes what a device or view sends to the hub.
///
/// Returns `None` for events that have no wire form.
#[must_use]
pub fn encode_inbound(event: &InboundEvent) -> Option<OscMessage> {
    let message = match event {
        InboundEvent::NewUser { key, x, y, z } => user_message(NEW_USER, key, *x, *y, *z),
        InboundEvent::UserCoordinates { key, x, y, z } => user_message(USER_COORDINATES, key, *x, *y, *z),
        InboundEvent::LostUser { key } => OscMessage::new(LOST_USER)
            .arg(key.device_user_id)
            .arg(key.client_id.as_str()),
        InboundEvent::RegisterDevice { client_id } => OscMessage::new(REGISTER_DEVICE).arg(client_id.as_str()),
        InboundEvent::CalibrateDevice { client_id, bounds } => OscMessage::new(CALIBRATE_DEVICE)
            .arg(client_id.as_str())
            .arg(bounds.min_x)
            .arg(bounds.min_y)
            .arg(bounds.min_z)
            .arg(bounds.max_x)
            .arg(bounds.max_y)
            .arg(bounds.max_z),
        InboundEvent::RegisterView { endpoint } => OscMessage::new(REGISTER_VIEW)
            .arg(endpoint.host.as_str())
            .arg(i32::from(endpoint.port)),
        InboundEvent::DeviceDisconnected { .. } => return None,
    };
    Some(message)
}

fn user_message(address: &str, key: &DeviceUserKey, x: f32, y: f32, z: f32) -> OscMessage {
    OscMessage::new(address)
        .arg(key.device_user_id)
        .arg(x)
        .arg(y)
        .arg(z)
        .arg(key.client_id.as_str())
}
