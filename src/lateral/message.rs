//! Lateral wire messages.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{CacheElement, CacheKey};
use crate::error::Result;

/// Identity of one dispatcher on the group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Random v4 identity; independent of pid and start time.
    pub fn generate() -> Self {
        NodeId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Operations propagated between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LateralMessage {
    Update {
        element: CacheElement,
    },
    Remove {
        region: String,
        key: CacheKey,
    },
    RemoveAll {
        region: String,
    },
    GetRequest {
        id: u64,
        region: String,
        key: CacheKey,
    },
    GetResponse {
        id: u64,
        /// Requesting node
        to: NodeId,
        element: Option<CacheElement>,
    },
}

/// Frame sent on the group channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub group: String,
    pub origin: NodeId,
    pub message: LateralMessage,
}

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(frame)?)
    }
}
