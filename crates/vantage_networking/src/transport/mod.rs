//! # Transport Layer
//!
//! Low-level UDP transport shared by the receiver thread and the broadcaster.
//!
//! ## Design
//!
//! - Raw UDP, no acknowledgments, no retries
//! - Blocking receive with a short read timeout so the receiver can notice
//!   shutdown
//! - Statistics kept in atomics; all methods take `&self`

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// UDP socket wrapper with packet statistics.
pub struct UdpTransport {
    /// The underlying socket.
    socket: UdpSocket,
    /// Local address.
    local_addr: SocketAddr,
    /// Statistics.
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    datagrams_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_errors: AtomicU64,
    recv_errors: AtomicU64,
    decode_errors: AtomicU64,
    queue_overflows: AtomicU64,
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Datagrams sent.
    pub datagrams_sent: u64,
    /// Datagrams received.
    pub datagrams_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors.
    pub recv_errors: u64,
    /// Datagrams or messages that failed to decode.
    pub decode_errors: u64,
    /// Datagrams dropped because the worker queue was full.
    pub queue_overflows: u64,
}

impl UdpTransport {
    /// Creates a new transport bound to the specified address.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or the timeout cannot be set.
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(read_timeout))?;

        // Buffer sizes are controlled by OS defaults
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            counters: Counters::default(),
        })
    }

    /// Returns the local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a datagram to the specified address.
    ///
    /// # Errors
    ///
    /// Returns the socket error; it is also counted.
    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        match self.socket.send_to(data, addr) {
            Ok(n) => {
                self.counters.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.counters.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Receives one datagram into `buffer`.
    ///
    /// Returns `Ok(None)` when the read timeout expires. Datagrams larger
    /// than `buffer` are truncated by the OS.
    ///
    /// # Errors
    ///
    /// Returns any other socket error; it is also counted.
    pub fn recv(&self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buffer) {
            Ok((len, addr)) => {
                self.counters.datagrams_received.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                Ok(Some((len, addr)))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => {
                self.counters.recv_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Counts a packet or message that could not be decoded.
    pub fn record_decode_errors(&self, count: u64) {
        self.counters.decode_errors.fetch_add(count, Ordering::Relaxed);
    }

    /// Counts a datagram dropped before reaching the worker.
    pub fn record_queue_overflow(&self) {
        self.counters.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        let c = &self.counters;
        TransportStats {
            datagrams_sent: c.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: c.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
            bytes_received: c.bytes_received.load(Ordering::Relaxed),
            send_errors: c.send_errors.load(Ordering::Relaxed),
            recv_errors: c.recv_errors.load(Ordering::Relaxed),
            decode_errors: c.decode_errors.load(Ordering::Relaxed),
            queue_overflows: c.queue_overflows.load(Ordering::Relaxed),
        }
    }
}
