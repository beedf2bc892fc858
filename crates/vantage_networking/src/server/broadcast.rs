//! UDP fan-out to registered views.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use vantage_core::{Broadcaster, DeliveryError, OutboundEvent, SubscriberEndpoint};

use crate::protocol::{encode_outbound, PacketSerializer};
use crate::transport::UdpTransport;

/// How long a failed host lookup is remembered before it is tried again.
pub const RESOLVE_RETRY: Duration = Duration::from_secs(30);

type Resolver = fn(&str, u16) -> io::Result<Vec<SocketAddr>>;

fn system_resolver(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    Ok((host, port).to_socket_addrs()?.collect())
}

#[derive(Clone, Debug)]
enum Resolution {
    Ready(SocketAddr),
    Failed { reason: String, retry_at: Instant },
}

/// Sends hub broadcasts as OSC datagrams from the hub's own socket.
///
/// Views announce a host name or IP. A successful resolution is cached for
/// the lifetime of the process; a failed one for [`RESOLVE_RETRY`], so an
/// unresolvable view costs one lookup per window instead of one per event.
pub struct UdpBroadcaster {
    transport: Arc<UdpTransport>,
    resolver: Resolver,
    resolved: RwLock<HashMap<SubscriberEndpoint, Resolution>>,
}

impl UdpBroadcaster {
    /// Creates a broadcaster sending through `transport`.
    #[must_use]
    pub fn new(transport: Arc<UdpTransport>) -> Self {
        Self::with_resolver(transport, system_resolver)
    }

    fn with_resolver(transport: Arc<UdpTransport>, resolver: Resolver) -> Self {
        Self {
            transport,
            resolver,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves `endpoint`, preferring the address family of our socket.
    fn resolve(&self, endpoint: &SubscriberEndpoint) -> Result<SocketAddr, DeliveryError> {
        let now = Instant::now();
        match self.resolved.read().get(endpoint) {
            Some(Resolution::Ready(addr)) => return Ok(*addr),
            Some(Resolution::Failed { reason, retry_at }) if now < *retry_at => {
                return Err(DeliveryError::new(endpoint, reason.clone()));
            }
            _ => {}
        }

        match self.lookup(endpoint) {
            Ok(addr) => {
                tracing::debug!(view = %endpoint, %addr, "Resolved view address");
                self.resolved.write().insert(endpoint.clone(), Resolution::Ready(addr));
                Ok(addr)
            }
            Err(reason) => {
                tracing::warn!(
                    view = %endpoint,
                    %reason,
                    retry_s = RESOLVE_RETRY.as_secs(),
                    "Cannot resolve view, skipping it until retry"
                );
                self.resolved.write().insert(
                    endpoint.clone(),
                    Resolution::Failed {
                        reason: reason.clone(),
                        retry_at: now + RESOLVE_RETRY,
                    },
                );
                Err(DeliveryError::new(endpoint, reason))
            }
        }
    }

    fn lookup(&self, endpoint: &SubscriberEndpoint) -> Result<SocketAddr, String> {
        let want_v4 = self.transport.local_addr().is_ipv4();
        let candidates =
            (self.resolver)(&endpoint.host, endpoint.port).map_err(|e| format!("cannot resolve host: {e}"))?;
        candidates
            .iter()
            .find(|addr| addr.is_ipv4() == want_v4)
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| "host has no addresses".to_string())
    }

    fn encode(event: &OutboundEvent) -> Option<PacketSerializer> {
        let mut serializer = PacketSerializer::new();
        serializer
            .serialize_message(&encode_outbound(event))
            .then_some(serializer)
    }

    fn send_encoded(&self, endpoint: &SubscriberEndpoint, payload: &[u8]) -> Result<(), DeliveryError> {
        let addr = self.resolve(endpoint)?;
        self.transport
            .send_to(payload, addr)
            .map(|_| ())
            .map_err(|e| DeliveryError::new(endpoint, e.to_string()))
    }
}

impl Broadcaster for UdpBroadcaster {
    fn deliver(&self, endpoint: &SubscriberEndpoint, event: &OutboundEvent) -> Result<(), DeliveryError> {
        let serializer = Self::encode(event)
            .ok_or_else(|| DeliveryError::new(endpoint, "message does not fit a datagram"))?;
        self.send_encoded(endpoint, serializer.as_slice())
    }

    fn deliver_all(&self, endpoints: &[SubscriberEndpoint], event: &OutboundEvent) -> Vec<DeliveryError> {
        let Some(serializer) = Self::encode(event) else {
            return endpoints
                .iter()
                .map(|endpoint| DeliveryError::new(endpoint, "message does not fit a datagram"))
                .collect();
        };
        endpoints
            .iter()
            .filter_map(|endpoint| self.send_encoded(endpoint, serializer.as_slice()).err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_outbound, PacketDeserializer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vantage_core::{VirtualPosition, VirtualUserId};

    fn local_transport() -> Arc<UdpTransport> {
        Arc::new(UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(2)).unwrap())
    }

    fn new_user_event() -> OutboundEvent {
        OutboundEvent::NewUser {
            id: VirtualUserId(0),
            position: VirtualPosition::new(500.0, 375.0, 0.0),
        }
    }

    #[test]
    fn test_deliver_to_local_view() {
        let hub_side = local_transport();
        let view = local_transport();
        let broadcaster = UdpBroadcaster::new(Arc::clone(&hub_side));
        let endpoint = SubscriberEndpoint::new("127.0.0.1", view.local_addr().port());
        let event = new_user_event();

        broadcaster.deliver(&endpoint, &event).unwrap();

        let mut buffer = [0u8; 64];
        let (len, _) = view.recv(&mut buffer).unwrap().unwrap();
        let packet = PacketDeserializer::new(&buffer[..len]).deserialize().unwrap();
        let message = packet.into_messages().remove(0);
        assert_eq!(decode_outbound(&message).unwrap(), event);
        assert_eq!(hub_side.stats().datagrams_sent, 1);
    }

    #[test]
    fn test_deliver_all_sends_same_bytes_and_skips_failures() {
        let hub_side = local_transport();
        let views = [local_transport(), local_transport()];
        let broadcaster = UdpBroadcaster::new(Arc::clone(&hub_side));
        let endpoints = vec![
            SubscriberEndpoint::new("127.0.0.1", views[0].local_addr().port()),
            SubscriberEndpoint::new("", 60606),
            SubscriberEndpoint::new("127.0.0.1", views[1].local_addr().port()),
        ];

        let failures = broadcaster.deliver_all(&endpoints, &new_user_event());

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].endpoint, endpoints[1]);
        let mut received = Vec::new();
        for view in &views {
            let mut buffer = [0u8; 64];
            let (len, _) = view.recv(&mut buffer).unwrap().unwrap();
            received.push(buffer[..len].to_vec());
        }
        assert_eq!(received[0], received[1]);
        assert_eq!(hub_side.stats().datagrams_sent, 2);
    }

    #[test]
    fn test_unresolvable_host_fails_delivery() {
        let broadcaster = UdpBroadcaster::new(local_transport());
        let endpoint = SubscriberEndpoint::new("", 60606);

        let err = broadcaster
            .deliver(&endpoint, &OutboundEvent::LostUser { id: VirtualUserId(1) })
            .unwrap_err();

        assert_eq!(err.endpoint, endpoint);
    }

    static FAILED_LOOKUPS: AtomicUsize = AtomicUsize::new(0);

    fn failing_resolver(_: &str, _: u16) -> io::Result<Vec<SocketAddr>> {
        FAILED_LOOKUPS.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }

    #[test]
    fn test_failed_lookup_is_not_repeated_per_event() {
        let broadcaster = UdpBroadcaster::with_resolver(local_transport(), failing_resolver);
        let endpoint = SubscriberEndpoint::new("view-host.invalid", 60606);
        let event = OutboundEvent::LostUser { id: VirtualUserId(1) };

        for _ in 0..3 {
            let err = broadcaster.deliver(&endpoint, &event).unwrap_err();
            assert!(err.reason.contains("no such host"), "{}", err.reason);
        }
        let failures = broadcaster.deliver_all(std::slice::from_ref(&endpoint), &event);

        assert_eq!(failures.len(), 1);
        assert_eq!(FAILED_LOOKUPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_lookup_is_retried_after_window() {
        let broadcaster = UdpBroadcaster::new(local_transport());
        let view = local_transport();
        let endpoint = SubscriberEndpoint::new("127.0.0.1", view.local_addr().port());
        broadcaster.resolved.write().insert(
            endpoint.clone(),
            Resolution::Failed {
                reason: "stale".into(),
                retry_at: Instant::now(),
            },
        );

        broadcaster.deliver(&endpoint, &new_user_event()).unwrap();

        assert!(matches!(
            broadcaster.resolved.read().get(&endpoint),
            Some(Resolution::Ready(_))
        ));
    }
}
