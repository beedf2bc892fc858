//! # Network Protocol
//!
//! OSC 1.0 over UDP, one message (or bundle) per datagram.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Address "/kuatro/newUser\0" (padded to 4)                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Type tags ",ifffs\0\0" (padded to 4)                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Arguments, big-endian, strings padded to 4                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod messages;
mod osc;

pub use messages::{
    decode_inbound, decode_outbound, encode_inbound, encode_outbound, CALIBRATE_DEVICE, LOST_USER,
    NEW_USER, REGISTER_DEVICE, REGISTER_VIEW, USER_COORDINATES,
};
pub use osc::{
    OscArg, OscMessage, OscPacket, PacketDeserializer, PacketSerializer, BUNDLE_TAG, IMMEDIATELY,
    MAX_BUNDLE_DEPTH,
};
