//! Cache Key Module
//!
//! Plain keys and grouped attribute keys share one flat store. The key is an
//! explicit tagged variant so group scans resolve by pattern matching.

use std::fmt;

use serde::{Deserialize, Serialize};

// == Group Id ==
/// Identifies a group within a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId {
    pub region: String,
    pub group: String,
}

impl GroupId {
    pub fn new(region: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[groupId={}, {}]", self.region, self.group)
    }
}

// == Group Attribute Name ==
/// One named attribute of a group; stored as an ordinary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupAttrName {
    pub group_id: GroupId,
    pub attr_name: String,
}

impl GroupAttrName {
    pub fn new(group_id: GroupId, attr_name: impl Into<String>) -> Self {
        Self {
            group_id,
            attr_name: attr_name.into(),
        }
    }
}

impl fmt::Display for GroupAttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[GAN: groupId={}, attrName={}]", self.group_id, self.attr_name)
    }
}

// == Cache Key ==
/// Key type of every region store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheKey {
    Plain { name: String },
    Group(GroupAttrName),
}

impl CacheKey {
    pub fn plain(name: impl Into<String>) -> Self {
        CacheKey::Plain { name: name.into() }
    }

    pub fn group(region: &str, group: &str, attr_name: impl Into<String>) -> Self {
        CacheKey::Group(GroupAttrName::new(GroupId::new(region, group), attr_name))
    }

    /// Attribute name if this key belongs to `group_id`.
    pub fn attr_in(&self, group_id: &GroupId) -> Option<&str> {
        match self {
            CacheKey::Group(gan) if gan.group_id == *group_id => Some(&gan.attr_name),
            _ => None,
        }
    }
}

impl From<&str> for CacheKey {
    fn from(name: &str) -> Self {
        CacheKey::plain(name)
    }
}

impl From<String> for CacheKey {
    fn from(name: String) -> Self {
        CacheKey::Plain { name }
    }
}

impl From<GroupAttrName> for CacheKey {
    fn from(gan: GroupAttrName) -> Self {
        CacheKey::Group(gan)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Plain { name } => f.write_str(name),
            CacheKey::Group(gan) => gan.fmt(f),
        }
    }
}
