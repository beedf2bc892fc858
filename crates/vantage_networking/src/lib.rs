//! # Vantage Networking
//!
//! OSC over UDP transport for the coordination hub.
//!
//! ## Architecture
//!
//! - **Protocol**: OSC 1.0 codec plus the mapping between wire addresses
//!   and hub events
//! - **Transport**: shared UDP socket with packet statistics
//! - **Server**: receiver thread, bounded queue, one worker applying events
//!   to the hub, UDP fan-out to views
//!
//! ## Message Flow
//!
//! ```text
//! DEVICE / VIEW                       HUB
//!   |                                  |
//!   |--- /kuatro/newUser ------------->|  decode -> InboundEvent
//!   |                                  |  apply under the state lock
//!   |<-- /kuatro/newUser (virtual) ----|  one datagram per view
//!   |                                  |
//! ```
//!
//! Nothing is acknowledged or retried: losing a coordinate update is fine
//! because the next frame replaces it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vantage_core::{HubState, WorldBounds};
//! use vantage_networking::{HubServer, ServerConfig};
//!
//! let mut server = HubServer::bind(ServerConfig::default(), HubState::new(WorldBounds::default()))?;
//! println!("listening on {}", server.local_addr());
//! server.shutdown();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use error::{ProtocolError, ProtocolResult};
pub use protocol::{
    decode_inbound, decode_outbound, encode_inbound, encode_outbound, OscArg, OscMessage,
    OscPacket, PacketDeserializer, PacketSerializer,
};
pub use server::{
    process_datagram, DatagramOutcome, HubServer, ServerConfig, UdpBroadcaster, RESOLVE_RETRY,
};
pub use transport::{TransportStats, UdpTransport};

/// Default UDP port the hub listens on.
pub const DEFAULT_PORT: u16 = 50505;

/// Largest datagram we build or accept.
///
/// 1200 bytes stays below common MTUs; a full hub message is under 64 bytes.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Receive buffer size: the largest UDP payload.
///
/// Reading into this instead of [`MAX_PACKET_SIZE`] keeps the OS from
/// silently truncating a long datagram into something that still decodes.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Default capacity of the receiver → worker queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;
