//! # Hub Server
//!
//! Runs a [`CoordinationHub`] behind a UDP socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        HUB SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  bounded   ┌──────────────┐               │
//! │  │ Receiver     │──channel──►│ Worker       │               │
//! │  │ (UDP recv)   │            │ decode+apply │               │
//! │  └──────────────┘            └──────┬───────┘               │
//! │                                     │                       │
//! │              ┌──────────────────────▼──────┐                │
//! │              │ CoordinationHub             │                │
//! │              │ Mutex<HubState> → fan-out   │──► views (UDP) │
//! │              └─────────────────────────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A single worker keeps events in arrival order. When the queue is full
//! new datagrams are dropped and counted; the receiver never blocks.

mod broadcast;

pub use broadcast::{UdpBroadcaster, RESOLVE_RETRY};

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use vantage_core::{Broadcaster, CoordinationHub, HubState};

use crate::protocol::{decode_inbound, PacketDeserializer};
use crate::transport::{TransportStats, UdpTransport};
use crate::{DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY, MAX_DATAGRAM_SIZE, MAX_PACKET_SIZE};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Datagrams buffered between receiver and worker.
    pub queue_capacity: usize,
    /// Log every decoded inbound message at `info`.
    pub echo_messages: bool,
    /// How often the receiver wakes up to check for shutdown.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            echo_messages: false,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// A received datagram on its way to the worker.
struct Datagram {
    from: SocketAddr,
    data: Vec<u8>,
}

/// What became of one datagram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatagramOutcome {
    /// Messages decoded and passed to the hub.
    pub handled: usize,
    /// Packets or messages rejected by the decoder.
    pub rejected: usize,
    /// Handled messages the hub refused to apply.
    pub dropped: usize,
}

/// Decodes one datagram and applies every message in it, in order.
///
/// A malformed or oversized packet counts as one rejection. Inside a bundle each message
/// is decoded on its own, so one bad message does not drop its siblings.
/// Hub-level refusals (uncalibrated device and so on) are logged by the
/// hub, count as handled and are also tallied in `dropped`.
pub fn process_datagram<B: Broadcaster>(
    hub: &CoordinationHub<B>,
    from: SocketAddr,
    data: &[u8],
    echo: bool,
) -> DatagramOutcome {
    if data.len() > MAX_PACKET_SIZE {
        tracing::warn!(%from, len = data.len(), max = MAX_PACKET_SIZE, "Dropping oversized datagram");
        return DatagramOutcome { handled: 0, rejected: 1, dropped: 0 };
    }

    let packet = match PacketDeserializer::new(data).deserialize() {
        Ok(packet) => packet,
        Err(error) => {
            tracing::warn!(%from, %error, "Dropping malformed datagram");
            return DatagramOutcome { handled: 0, rejected: 1, dropped: 0 };
        }
    };

    let mut outcome = DatagramOutcome::default();
    for message in packet.into_messages() {
        if echo {
            tracing::info!(%from, address = %message.address, args = ?message.args, "Received message");
        }

        match decode_inbound(&message) {
            Ok(event) => {
                outcome.handled += 1;
                // The hub logs the reason for every refusal.
                if hub.handle(event).is_err() {
                    outcome.dropped += 1;
                }
            }
            Err(error) => {
                outcome.rejected += 1;
                tracing::warn!(%from, %error, "Dropping message");
            }
        }
    }
    outcome
}

/// A running hub: socket, receiver thread and worker thread.
///
/// Dropping the server shuts it down.
pub struct HubServer {
    hub: Arc<CoordinationHub<UdpBroadcaster>>,
    transport: Arc<UdpTransport>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl HubServer {
    /// Binds the socket and starts serving `state`.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound or a thread cannot be spawned.
    pub fn bind(config: ServerConfig, state: HubState) -> io::Result<Self> {
        let transport = Arc::new(UdpTransport::bind(config.bind_address, config.read_timeout)?);
        let hub = Arc::new(CoordinationHub::new(state, UdpBroadcaster::new(Arc::clone(&transport))));
        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = bounded(config.queue_capacity.max(1));

        let receiver = {
            let transport = Arc::clone(&transport);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("vantage-recv".into())
                .spawn(move || receive_loop(&transport, &running, &event_tx))?
        };

        let spawned = {
            let hub = Arc::clone(&hub);
            let transport = Arc::clone(&transport);
            let echo = config.echo_messages;
            thread::Builder::new()
                .name("vantage-hub".into())
                .spawn(move || work_loop(&hub, &transport, &event_rx, echo))
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                running.store(false, Ordering::Relaxed);
                let _ = receiver.join();
                return Err(e);
            }
        };

        tracing::info!(
            addr = %transport.local_addr(),
            queue = config.queue_capacity,
            echo = config.echo_messages,
            "Hub listening"
        );

        Ok(Self {
            hub,
            transport,
            running,
            threads: vec![receiver, worker],
        })
    }

    /// The address the socket is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// The hub being served.
    #[must_use]
    pub const fn hub(&self) -> &Arc<CoordinationHub<UdpBroadcaster>> {
        &self.hub
    }

    /// Socket statistics.
    #[must_use]
    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Returns whether the server threads are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops both threads and waits for them.
    ///
    /// Datagrams already queued are applied before the worker exits.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Server thread panicked");
            }
        }
        tracing::info!(addr = %self.transport.local_addr(), "Hub stopped");
    }
}

impl Drop for HubServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(transport: &UdpTransport, running: &AtomicBool, event_tx: &Sender<Datagram>) {
    // Larger than any accepted packet so oversized ones are seen whole and rejected.
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    while running.load(Ordering::Relaxed) {
        match transport.recv(&mut buffer) {
            Ok(Some((len, from))) => {
                let datagram = Datagram {
                    from,
                    data: buffer[..len].to_vec(),
                };
                match event_tx.try_send(datagram) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        transport.record_queue_overflow();
                        tracing::warn!(from = %dropped.from, "Hub queue full, dropping datagram");
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "Receive failed"),
        }
    }

    tracing::debug!("Receiver stopped");
}

/// Runs until the receiver drops its sender.
fn work_loop(
    hub: &CoordinationHub<UdpBroadcaster>,
    transport: &UdpTransport,
    event_rx: &Receiver<Datagram>,
    echo: bool,
) {
    for datagram in event_rx {
        let outcome = process_datagram(hub, datagram.from, &datagram.data, echo);
        if outcome.rejected > 0 {
            transport.record_decode_errors(outcome.rejected as u64);
        }
    }

    tracing::debug!("Worker stopped");
}
