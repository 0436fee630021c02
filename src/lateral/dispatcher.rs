//! RPC dispatcher
//!
//! Broadcasts cache operations to the group and dispatches the operations
//! peers send to the registered [`LateralListener`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheElement, CacheKey};
use crate::error::Result;
use crate::lateral::message::{Envelope, LateralMessage, NodeId};
use crate::lateral::transport::{FrameSink, GroupChannel};
use crate::lateral::LateralListener;

type Pending = Mutex<HashMap<u64, oneshot::Sender<CacheElement>>>;

struct Shared {
    group: String,
    node_id: NodeId,
    sink: Arc<dyn FrameSink>,
    pending: Pending,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<CacheElement>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, message: LateralMessage) -> Result<()> {
        let frame = Envelope {
            group: self.group.clone(),
            origin: self.node_id.clone(),
            message,
        }
        .encode()?;
        self.sink.send(frame).await
    }
}

// == RPC Dispatcher ==
/// Handle bound to one joined group channel.
///
/// Frames that originate from this dispatcher are dropped on receipt, so a
/// node never applies its own broadcasts. Dropping the dispatcher stops its
/// receive loop and leaves the group.
pub struct RpcDispatcher {
    shared: Arc<Shared>,
    receive_loop: JoinHandle<()>,
    pump: Option<JoinHandle<()>>,
    next_request: AtomicU64,
}

impl RpcDispatcher {
    /// Binds `channel` and starts dispatching inbound frames to `listener`.
    pub fn start(
        group: impl Into<String>,
        channel: GroupChannel,
        listener: Arc<dyn LateralListener>,
    ) -> Self {
        let shared = Arc::new(Shared {
            group: group.into(),
            node_id: NodeId::generate(),
            sink: channel.sink,
            pending: Mutex::new(HashMap::new()),
        });

        let receive_loop = tokio::spawn(receive_loop(shared.clone(), channel.inbound, listener));

        Self {
            shared,
            receive_loop,
            pump: channel.pump,
            next_request: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.shared.node_id
    }

    pub fn group(&self) -> &str {
        &self.shared.group
    }

    // == Broadcasts ==
    pub async fn broadcast_update(&self, element: CacheElement) -> Result<()> {
        self.shared.send(LateralMessage::Update { element }).await
    }

    pub async fn broadcast_remove(&self, region: &str, key: &CacheKey) -> Result<()> {
        self.shared
            .send(LateralMessage::Remove {
                region: region.to_string(),
                key: key.clone(),
            })
            .await
    }

    pub async fn broadcast_remove_all(&self, region: &str) -> Result<()> {
        self.shared
            .send(LateralMessage::RemoveAll {
                region: region.to_string(),
            })
            .await
    }

    // == Remote Get ==
    /// Asks the group for `key`; the first peer that has it wins.
    ///
    /// Returns `None` when no peer answers with an element within `timeout`.
    pub async fn request_get(
        &self,
        region: &str,
        key: &CacheKey,
        timeout: Duration,
    ) -> Result<Option<CacheElement>> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(id, tx);

        let sent = self
            .shared
            .send(LateralMessage::GetRequest {
                id,
                region: region.to_string(),
                key: key.clone(),
            })
            .await;
        if let Err(e) = sent {
            self.shared.pending().remove(&id);
            return Err(e);
        }

        let answer = tokio::time::timeout(timeout, rx).await;
        self.shared.pending().remove(&id);
        match answer {
            Ok(Ok(element)) => Ok(Some(element)),
            Ok(Err(_)) | Err(_) => {
                debug!(group = %self.shared.group, %key, "No peer answered remote get");
                Ok(None)
            }
        }
    }

    /// Stops dispatching and leaves the group.
    pub fn close(self) {}
}

impl Drop for RpcDispatcher {
    fn drop(&mut self) {
        self.receive_loop.abort();
        if let Some(pump) = &self.pump {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("group", &self.shared.group)
            .field("node_id", &self.shared.node_id)
            .finish()
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    mut inbound: mpsc::Receiver<Vec<u8>>,
    listener: Arc<dyn LateralListener>,
) {
    while let Some(frame) = inbound.recv().await {
        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(group = %shared.group, error = %e, "Dropping malformed lateral frame");
                continue;
            }
        };
        if envelope.group != shared.group || envelope.origin == shared.node_id {
            continue;
        }
        if let Err(e) = dispatch(&shared, envelope, listener.as_ref()).await {
            warn!(group = %shared.group, error = %e, "Failed to apply lateral operation");
        }
    }
    debug!(group = %shared.group, "Lateral receive loop finished");
}

async fn dispatch(
    shared: &Shared,
    envelope: Envelope,
    listener: &dyn LateralListener,
) -> Result<()> {
    match envelope.message {
        LateralMessage::Update { element } => listener.on_update(element).await,
        LateralMessage::Remove { region, key } => {
            listener.on_remove(&region, &key).await.map(|_| ())
        }
        LateralMessage::RemoveAll { region } => listener.on_remove_all(&region).await,
        LateralMessage::GetRequest { id, region, key } => {
            let element = listener.on_get(&region, &key).await?;
            shared
                .send(LateralMessage::GetResponse {
                    id,
                    to: envelope.origin,
                    element,
                })
                .await
        }
        LateralMessage::GetResponse { id, to, element } => {
            if to != shared.node_id {
                return Ok(());
            }
            if let Some(element) = element {
                if let Some(waiter) = shared.pending().remove(&id) {
                    let _ = waiter.send(element);
                }
            }
            Ok(())
        }
    }
}
