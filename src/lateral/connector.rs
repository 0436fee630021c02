//! Lateral connector
//!
//! Joins the group and builds the dispatcher without ever letting the caller
//! wait longer than its timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::LateralConfig;
use crate::error::CacheError;
use crate::lateral::{GroupTransport, LateralListener, RpcDispatcher};

/// Opens dispatchers over one transport.
#[derive(Clone)]
pub struct LateralConnector {
    transport: Arc<dyn GroupTransport>,
}

impl LateralConnector {
    pub fn new(transport: Arc<dyn GroupTransport>) -> Self {
        Self { transport }
    }

    // == Connect ==
    /// Joins `group_name` and returns a dispatcher bound to it, or `None`.
    ///
    /// The join runs as its own task; the caller waits on it for at most
    /// `timeout`. Failures and timeouts are logged and yield `None`, which
    /// callers treat as "lateral propagation unavailable". A join still in
    /// flight at the timeout is left to finish on its own; if it succeeds,
    /// the dispatcher it produced is dropped and leaves the group again.
    pub async fn connect(
        &self,
        group_name: &str,
        listener: Arc<dyn LateralListener>,
        config: &LateralConfig,
        timeout: Duration,
    ) -> Option<RpcDispatcher> {
        let transport = self.transport.clone();
        let group = group_name.to_string();
        let transport_config = config.transport.clone();

        let attempt = tokio::spawn(async move {
            let channel = transport.join(&group, &transport_config).await?;
            Ok::<_, CacheError>(RpcDispatcher::start(group, channel, listener))
        });

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(Ok(dispatcher))) => {
                info!(
                    group = group_name,
                    node = %dispatcher.node_id(),
                    "Lateral dispatcher connected"
                );
                Some(dispatcher)
            }
            Ok(Ok(Err(e))) => {
                error!(group = group_name, error = %e, "Failed to join lateral group");
                None
            }
            Ok(Err(e)) => {
                error!(group = group_name, error = %e, "Lateral connect attempt aborted");
                None
            }
            Err(_) => {
                warn!(
                    group = group_name,
                    ?timeout,
                    "Lateral connect timed out, continuing without propagation"
                );
                None
            }
        }
    }
}
