//! # OSC 1.0 Codec
//!
//! Messages and bundles as specified by Open Sound Control 1.0.
//!
//! ## Layout
//!
//! ```text
//! message: address (string) │ type tags (string, ",ifs...") │ arguments
//! bundle:  "#bundle" (string) │ time tag (u64) │ { size (i32) │ element }*
//! ```
//!
//! All numbers are big-endian. Strings are NUL-terminated and zero-padded
//! to a multiple of four bytes.
//!
//! Serialization writes into a fixed buffer and reports overflow with
//! `false`; decoding borrows the datagram and only allocates for the
//! decoded values.

use crate::error::{ProtocolError, ProtocolResult};
use crate::MAX_PACKET_SIZE;

/// Address string that opens a bundle.
pub const BUNDLE_TAG: &str = "#bundle";

/// OSC time tag meaning "immediately".
pub const IMMEDIATELY: u64 = 1;

/// Deepest bundle nesting the decoder follows.
pub const MAX_BUNDLE_DEPTH: usize = 8;

/// Length of a string of `len` bytes plus terminator, padded to 4.
#[inline]
const fn padded_len(len: usize) -> usize {
    (len + 1 + 3) & !3
}

// ============================================================================
// VALUES
// ============================================================================

/// One typed OSC argument.
#[derive(Clone, Debug, PartialEq)]
pub enum OscArg {
    /// `i`: 32-bit integer.
    Int(i32),
    /// `f`: 32-bit float.
    Float(f32),
    /// `s`: string.
    String(String),
    /// `h`: 64-bit integer.
    Long(i64),
    /// `d`: 64-bit float.
    Double(f64),
    /// `T` / `F`: boolean, no payload bytes.
    Bool(bool),
}

impl OscArg {
    /// The type tag character for this argument.
    #[must_use]
    pub const fn type_tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::String(_) => 's',
            Self::Long(_) => 'h',
            Self::Double(_) => 'd',
            Self::Bool(true) => 'T',
            Self::Bool(false) => 'F',
        }
    }
}

impl From<i32> for OscArg {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for OscArg {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OscArg {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for OscArg {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// An address plus its arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct OscMessage {
    /// Address pattern, e.g. `/kuatro/newUser`.
    pub address: String,
    /// Arguments in wire order.
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Creates a message without arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<OscArg>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// A decoded datagram.
#[derive(Clone, Debug, PartialEq)]
pub enum OscPacket {
    /// A single message.
    Message(OscMessage),
    /// Several packets delivered together.
    Bundle {
        /// NTP-format time tag. The hub applies everything immediately.
        time_tag: u64,
        /// Elements in wire order.
        content: Vec<OscPacket>,
    },
}

impl OscPacket {
    /// Flattens nested bundles into their messages, in wire order.
    #[must_use]
    pub fn into_messages(self) -> Vec<OscMessage> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(self, out: &mut Vec<OscMessage>) {
        match self {
            Self::Message(message) => out.push(message),
            Self::Bundle { content, .. } => {
                for packet in content {
                    packet.collect_into(out);
                }
            }
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(message: OscMessage) -> Self {
        Self::Message(message)
    }
}

// ============================================================================
// SERIALIZER
// ============================================================================

/// Packet serializer - writes OSC packets to a pre-allocated buffer.
///
/// Reuse one serializer per thread; it never allocates.
pub struct PacketSerializer {
    buffer: [u8; MAX_PACKET_SIZE],
    position: usize,
}

impl PacketSerializer {
    /// Creates a new serializer with a fresh buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_PACKET_SIZE],
            position: 0,
        }
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.position + bytes.len() > MAX_PACKET_SIZE {
            return false;
        }
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        true
    }

    /// Writes an i32 in big-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) -> bool {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes a u32 in big-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> bool {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes an i64 in big-endian format.
    #[inline]
    pub fn write_i64(&mut self, value: i64) -> bool {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes a u64 in big-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) -> bool {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes an f32 in big-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> bool {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes an f64 in big-endian format.
    #[inline]
    pub fn write_f64(&mut self, value: f64) -> bool {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes a NUL-terminated, zero-padded string.
    ///
    /// Strings with an embedded NUL cannot be represented and are refused.
    pub fn write_str(&mut self, value: &str) -> bool {
        if value.contains('\0') {
            return false;
        }
        let padded = padded_len(value.len());
        if self.position + padded > MAX_PACKET_SIZE {
            return false;
        }
        let end = self.position + value.len();
        self.buffer[self.position..end].copy_from_slice(value.as_bytes());
        self.buffer[end..self.position + padded].fill(0);
        self.position += padded;
        true
    }

    fn write_type_tags(&mut self, args: &[OscArg]) -> bool {
        // ',' + one byte per argument, then terminator and padding
        let padded = padded_len(args.len() + 1);
        if self.position + padded > MAX_PACKET_SIZE {
            return false;
        }
        let start = self.position;
        self.buffer[start] = b',';
        for (slot, arg) in self.buffer[start + 1..].iter_mut().zip(args) {
            // type tags are all ASCII
            *slot = arg.type_tag() as u8;
        }
        self.buffer[start + 1 + args.len()..start + padded].fill(0);
        self.position += padded;
        true
    }

    fn write_arg(&mut self, arg: &OscArg) -> bool {
        match arg {
            OscArg::Int(v) => self.write_i32(*v),
            OscArg::Float(v) => self.write_f32(*v),
            OscArg::String(v) => self.write_str(v),
            OscArg::Long(v) => self.write_i64(*v),
            OscArg::Double(v) => self.write_f64(*v),
            OscArg::Bool(_) => true,
        }
    }

    fn write_message(&mut self, message: &OscMessage) -> bool {
        self.write_str(&message.address)
            && self.write_type_tags(&message.args)
            && message.args.iter().all(|arg| self.write_arg(arg))
    }

    fn write_packet(&mut self, packet: &OscPacket) -> bool {
        match packet {
            OscPacket::Message(message) => self.write_message(message),
            OscPacket::Bundle { time_tag, content } => {
                if !(self.write_str(BUNDLE_TAG) && self.write_u64(*time_tag)) {
                    return false;
                }
                for element in content {
                    let size_at = self.position;
                    if !self.write_u32(0) {
                        return false;
                    }
                    let start = self.position;
                    if !self.write_packet(element) {
                        return false;
                    }
                    let Ok(size) = u32::try_from(self.position - start) else {
                        return false;
                    };
                    self.buffer[size_at..start].copy_from_slice(&size.to_be_bytes());
                }
                true
            }
        }
    }

    /// Serializes a single message.
    pub fn serialize_message(&mut self, message: &OscMessage) -> bool {
        self.reset();
        self.write_message(message)
    }

    /// Serializes a message or bundle.
    pub fn serialize(&mut self, packet: &OscPacket) -> bool {
        self.reset();
        self.write_packet(packet)
    }

    /// Serializes `packet` and returns the encoded bytes.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::BufferOverflow`] if the packet does not fit.
    pub fn encode(&mut self, packet: &OscPacket) -> ProtocolResult<&[u8]> {
        if self.serialize(packet) {
            Ok(self.as_slice())
        } else {
            Err(ProtocolError::BufferOverflow(MAX_PACKET_SIZE))
        }
    }
}

impl Default for PacketSerializer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DESERIALIZER
// ============================================================================

/// Packet deserializer - reads OSC packets from a buffer.
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ProtocolError::Truncated {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Reads a big-endian i32.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than 4 bytes remain.
    #[inline]
    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian u32.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than 4 bytes remain.
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian i64.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than 8 bytes remain.
    #[inline]
    pub fn read_i64(&mut self) -> ProtocolResult<i64> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Reads a big-endian u64.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than 8 bytes remain.
    #[inline]
    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Reads a big-endian f32.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than 4 bytes remain.
    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a big-endian f64.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than 8 bytes remain.
    #[inline]
    pub fn read_f64(&mut self) -> ProtocolResult<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Reads a NUL-terminated, zero-padded string.
    ///
    /// # Errors
    ///
    /// Missing terminator, non-zero padding, truncation or invalid UTF-8.
    pub fn read_str(&mut self) -> ProtocolResult<&'a str> {
        let start = self.position;
        let Some(nul) = self.buffer[start..].iter().position(|&b| b == 0) else {
            return Err(ProtocolError::UnterminatedString(start));
        };
        let bytes = self.take(padded_len(nul))?;
        if bytes[nul..].iter().any(|&b| b != 0) {
            return Err(ProtocolError::BadPadding(start + nul));
        }
        std::str::from_utf8(&bytes[..nul]).map_err(|_| ProtocolError::InvalidUtf8(start))
    }

    /// Deserializes one packet from the buffer.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProtocolError`] found; a bad bundle element
    /// rejects the whole bundle.
    pub fn deserialize(&mut self) -> ProtocolResult<OscPacket> {
        self.read_packet(0)
    }

    fn read_packet(&mut self, depth: usize) -> ProtocolResult<OscPacket> {
        match self.buffer.get(self.position) {
            Some(b'/') => self.read_message().map(OscPacket::Message),
            Some(b'#') => self.read_bundle(depth),
            Some(_) => Err(ProtocolError::NotOsc),
            None => Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 0,
            }),
        }
    }

    fn read_bundle(&mut self, depth: usize) -> ProtocolResult<OscPacket> {
        if depth >= MAX_BUNDLE_DEPTH {
            return Err(ProtocolError::BundleTooDeep(MAX_BUNDLE_DEPTH));
        }
        if self.read_str()? != BUNDLE_TAG {
            return Err(ProtocolError::NotOsc);
        }
        let time_tag = self.read_u64()?;

        let mut content = Vec::new();
        while self.remaining() > 0 {
            let size = self.read_i32()?;
            let len = usize::try_from(size)
                .ok()
                .filter(|len| *len > 0 && len % 4 == 0 && *len <= self.remaining())
                .ok_or(ProtocolError::BadBundleElement(size))?;
            let element = self.take(len)?;
            content.push(PacketDeserializer::new(element).read_packet(depth + 1)?);
        }

        Ok(OscPacket::Bundle { time_tag, content })
    }

    fn read_message(&mut self) -> ProtocolResult<OscMessage> {
        let address = self.read_str()?.to_owned();

        // Pre-1.0 senders may omit the type tag string entirely.
        if self.remaining() == 0 {
            return Ok(OscMessage::new(address));
        }

        let Some(tags) = self.read_str()?.strip_prefix(',') else {
            return Err(ProtocolError::MissingTypeTags);
        };

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => OscArg::Int(self.read_i32()?),
                'f' => OscArg::Float(self.read_f32()?),
                's' => OscArg::String(self.read_str()?.to_owned()),
                'h' => OscArg::Long(self.read_i64()?),
                'd' => OscArg::Double(self.read_f64()?),
                'T' => OscArg::Bool(true),
                'F' => OscArg::Bool(false),
                other => return Err(ProtocolError::UnknownTypeTag(other)),
            };
            args.push(arg);
        }

        Ok(OscMessage { address, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn decode(bytes: &[u8]) -> ProtocolResult<OscPacket> {
        PacketDeserializer::new(bytes).deserialize()
    }

    #[test]
    fn test_message_wire_layout() {
        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_message(&OscMessage::new("/a").arg(1)));

        assert_eq!(serializer.as_slice(), b"/a\0\0,i\0\0\0\0\0\x01");
    }

    #[test]
    fn test_string_on_word_boundary_gets_full_padding() {
        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_message(&OscMessage::new("/abc")));

        // address: 4 chars + 4 NULs; type tags: "," + 3 NULs
        assert_eq!(serializer.as_slice(), b"/abc\0\0\0\0,\0\0\0");
    }

    #[test]
    fn test_all_argument_types() {
        let message = OscMessage {
            address: "/kuatro/everything".into(),
            args: vec![
                OscArg::Int(-7),
                OscArg::Float(1.5),
                OscArg::String("lab-kinect".into()),
                OscArg::Long(1 << 40),
                OscArg::Double(-0.25),
                OscArg::Bool(true),
                OscArg::Bool(false),
            ],
        };

        let mut serializer = PacketSerializer::new();
        let bytes = serializer.encode(&message.clone().into()).unwrap().to_vec();

        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(decode(&bytes).unwrap(), OscPacket::Message(message));
    }

    #[test]
    fn test_nested_bundle_flattens_in_order() {
        let inner = OscPacket::Bundle {
            time_tag: IMMEDIATELY,
            content: vec![OscMessage::new("/b").into(), OscMessage::new("/c").arg(3).into()],
        };
        let outer = OscPacket::Bundle {
            time_tag: IMMEDIATELY,
            content: vec![OscMessage::new("/a").into(), inner, OscMessage::new("/d").into()],
        };

        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize(&outer));
        let decoded = decode(serializer.as_slice()).unwrap();
        assert_eq!(decoded, outer);

        let addresses: Vec<String> = decoded.into_messages().into_iter().map(|m| m.address).collect();
        assert_eq!(addresses, vec!["/a", "/b", "/c", "/d"]);
    }

    #[test]
    fn test_message_without_type_tags() {
        let packet = decode(b"/kuatro/ping\0\0\0\0").unwrap();
        assert_eq!(packet, OscPacket::Message(OscMessage::new("/kuatro/ping")));
    }

    #[test]
    fn test_malformed_packets_are_rejected() {
        assert_eq!(decode(b""), Err(ProtocolError::Truncated { needed: 4, remaining: 0 }));
        assert_eq!(decode(b"hello\0\0\0"), Err(ProtocolError::NotOsc));
        assert_eq!(decode(b"/abc"), Err(ProtocolError::UnterminatedString(0)));
        assert_eq!(decode(b"/a\0X"), Err(ProtocolError::BadPadding(2)));
        assert_eq!(decode(b"/a\0\0i\0\0\0"), Err(ProtocolError::MissingTypeTags));
        assert_eq!(decode(b"/a\0\0,x\0\0"), Err(ProtocolError::UnknownTypeTag('x')));
        assert_eq!(
            decode(b"/a\0\0,i\0\0\0\0"),
            Err(ProtocolError::Truncated { needed: 4, remaining: 2 })
        );
    }

    #[test]
    fn test_bad_bundle_element_size() {
        let mut bytes = b"#bundle\0".to_vec();
        bytes.extend_from_slice(&IMMEDIATELY.to_be_bytes());
        bytes.extend_from_slice(&6_i32.to_be_bytes());
        bytes.extend_from_slice(b"/a\0\0,\0\0\0");

        assert_eq!(decode(&bytes), Err(ProtocolError::BadBundleElement(6)));
    }

    #[test]
    fn test_bundle_depth_is_limited() {
        let mut packet: OscPacket = OscMessage::new("/deep").into();
        for _ in 0..=MAX_BUNDLE_DEPTH {
            packet = OscPacket::Bundle {
                time_tag: IMMEDIATELY,
                content: vec![packet],
            };
        }

        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize(&packet));
        assert_eq!(
            decode(serializer.as_slice()),
            Err(ProtocolError::BundleTooDeep(MAX_BUNDLE_DEPTH))
        );
    }

    #[test]
    fn test_buffer_overflow() {
        let mut message = OscMessage::new("/big");
        for i in 0..400 {
            message = message.arg(i);
        }

        let mut serializer = PacketSerializer::new();
        assert!(!serializer.serialize_message(&message));
        assert_eq!(
            serializer.encode(&message.into()),
            Err(ProtocolError::BufferOverflow(MAX_PACKET_SIZE))
        );
    }

    #[test]
    fn test_embedded_nul_is_refused() {
        let mut serializer = PacketSerializer::new();
        assert!(!serializer.serialize_message(&OscMessage::new("/a").arg("x\0y")));
    }

    #[test]
    fn test_random_garbage_never_panics() {
        let mut rng = StdRng::seed_from_u64(42);
        let prefixes: [&[u8]; 3] = [b"", b"/", b"#bundle\0"];

        for _ in 0..10_000 {
            let mut bytes = prefixes[rng.gen_range(0..prefixes.len())].to_vec();
            let len = rng.gen_range(0..64);
            bytes.extend((0..len).map(|_| rng.gen::<u8>()));

            let _ = decode(&bytes);
        }
    }
}
