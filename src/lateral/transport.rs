//! Group transports
//!
//! A transport joins a named group and yields a [`GroupChannel`]: a sink for
//! outbound frames and a queue of inbound ones. Every member of the group,
//! including the sender, receives each frame; filtering is the dispatcher's
//! job.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

/// Inbound queue depth per channel.
const INBOUND_CAPACITY: usize = 1024;

/// Largest datagram accepted by the UDP transport.
const MAX_DATAGRAM: usize = 64 * 1024;

// == Traits ==
/// Outbound half of a group channel.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: Vec<u8>) -> Result<()>;
}

/// Creates group channels.
#[async_trait]
pub trait GroupTransport: Send + Sync + 'static {
    /// Joins `group`. `transport_config` is interpreted by the transport only.
    async fn join(&self, group: &str, transport_config: &str) -> Result<GroupChannel>;
}

// == Group Channel ==
/// A joined group.
pub struct GroupChannel {
    pub sink: Arc<dyn FrameSink>,
    pub inbound: mpsc::Receiver<Vec<u8>>,
    /// Task feeding `inbound`; stopped when the channel's owner goes away
    pub pump: Option<JoinHandle<()>>,
}

// == In-Process Transport ==
/// Group bus shared by every channel created from the same transport value.
///
/// Useful for tests and for several cache managers living in one process.
/// An optional join delay simulates a slow group membership handshake.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    groups: Arc<Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
    join_delay: Option<Duration>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_join_delay(mut self, delay: Duration) -> Self {
        self.join_delay = Some(delay);
        self
    }

    fn bus(&self, group: &str) -> broadcast::Sender<Vec<u8>> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(INBOUND_CAPACITY).0)
            .clone()
    }
}

struct MemorySink {
    bus: broadcast::Sender<Vec<u8>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        // No subscribers only means no peers are listening
        let _ = self.bus.send(frame);
        Ok(())
    }
}

#[async_trait]
impl GroupTransport for MemoryTransport {
    async fn join(&self, group: &str, _transport_config: &str) -> Result<GroupChannel> {
        if let Some(delay) = self.join_delay {
            tokio::time::sleep(delay).await;
        }

        let bus = self.bus(group);
        let mut subscription = bus.subscribe();
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let group_name = group.to_string();

        let pump = tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            group = %group_name,
                            skipped,
                            "Lateral receiver lagged, frames dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!(group, "Joined in-process group");
        Ok(GroupChannel {
            sink: Arc::new(MemorySink { bus }),
            inbound,
            pump: Some(pump),
        })
    }
}

// == UDP Multicast Transport ==
/// Joins an IPv4 multicast group given as `"<multicast addr>:<port>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpMulticastTransport;

impl UdpMulticastTransport {
    pub fn parse_config(transport_config: &str) -> Result<SocketAddrV4> {
        let addr: SocketAddrV4 = transport_config.trim().parse().map_err(|_| {
            CacheError::Lateral(format!(
                "Invalid multicast transport '{}', expected <ipv4>:<port>",
                transport_config
            ))
        })?;
        if !addr.ip().is_multicast() {
            return Err(CacheError::Lateral(format!(
                "{} is not a multicast address",
                addr.ip()
            )));
        }
        Ok(addr)
    }

    /// Binds the group port with address reuse so several nodes on one host
    /// can join the same group.
    fn bind_shared(port: u16) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
        Ok(UdpSocket::from_std(socket.into())?)
    }
}

struct UdpSink {
    socket: Arc<UdpSocket>,
    target: SocketAddrV4,
}

#[async_trait]
impl FrameSink for UdpSink {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        if frame.len() > MAX_DATAGRAM {
            return Err(CacheError::Lateral(format!(
                "Frame of {} bytes exceeds datagram limit",
                frame.len()
            )));
        }
        self.socket.send_to(&frame, self.target).await?;
        Ok(())
    }
}

#[async_trait]
impl GroupTransport for UdpMulticastTransport {
    async fn join(&self, group: &str, transport_config: &str) -> Result<GroupChannel> {
        let target = Self::parse_config(transport_config)?;

        let socket = Self::bind_shared(target.port())?;
        socket.join_multicast_v4(*target.ip(), Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;
        let socket = Arc::new(socket);

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = socket.clone();
        let pump = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match reader.recv_from(&mut buf).await {
                    Ok((len, _)) => {
                        if tx.send(buf[..len].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Multicast receive failed, leaving group");
                        break;
                    }
                }
            }
        });

        info!(group, %target, "Joined multicast group");
        Ok(GroupChannel {
            sink: Arc::new(UdpSink { socket, target }),
            inbound,
            pump: Some(pump),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_delivers_to_all_members() {
        let transport = MemoryTransport::new();
        let mut a = transport.join("g", "").await.unwrap();
        let mut b = transport.join("g", "").await.unwrap();

        a.sink.send(b"hello".to_vec()).await.unwrap();

        assert_eq!(a.inbound.recv().await.unwrap(), b"hello".to_vec());
        assert_eq!(b.inbound.recv().await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_memory_transport_isolates_groups() {
        let transport = MemoryTransport::new();
        let a = transport.join("g1", "").await.unwrap();
        let mut b = transport.join("g2", "").await.unwrap();

        a.sink.send(b"hello".to_vec()).await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(50), b.inbound.recv()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_parse_multicast_config() {
        let addr = UdpMulticastTransport::parse_config("239.255.0.1:6780").unwrap();
        assert_eq!(addr.port(), 6780);
        assert!(UdpMulticastTransport::parse_config("127.0.0.1:6780").is_err());
        assert!(UdpMulticastTransport::parse_config("not-an-address").is_err());
    }

    #[tokio::test]
    async fn test_two_nodes_share_multicast_port() {
        let transport = UdpMulticastTransport;
        let first = transport.join("g", "239.255.0.1:46781").await.unwrap();
        let second = transport.join("g", "239.255.0.1:46781").await;

        assert!(second.is_ok(), "second join failed: {:?}", second.err());
        drop(first);
    }
}
