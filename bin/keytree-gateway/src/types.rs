//! Request parameters and response bodies.

use keytree_path::Node;
use serde::{Deserialize, Serialize};

/// `key` parameter of `/v3/getpath`
#[derive(Debug, Deserialize)]
pub struct KeyParams {
    #[serde(default)]
    pub key: String,
}

/// Parameters of `/v3/get`
#[derive(Debug, Deserialize)]
pub struct GetParams {
    #[serde(default)]
    pub key: String,
    /// List every key starting with `key` instead of the single record
    #[serde(default)]
    pub prefix: Option<String>,
}

impl GetParams {
    pub fn wants_prefix(&self) -> bool {
        is_true(self.prefix.as_deref())
    }
}

/// Parameters of `/v3/connect`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Comma-separated endpoint list; the configured endpoints when absent
    #[serde(default)]
    pub endpoints: Option<String>,
}

/// Parameters of `/v3/put`
#[derive(Debug, Deserialize)]
pub struct PutParams {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    /// Lease TTL in seconds; blank means no lease
    #[serde(default)]
    pub ttl: Option<String>,
}

/// Parameters of `/v3/delete`
#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub key: String,
    /// Also delete everything below `key`
    #[serde(default)]
    pub dir: Option<String>,
}

impl DeleteParams {
    pub fn is_recursive(&self) -> bool {
        is_true(self.dir.as_deref())
    }
}

/// `{"node": ...}` envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeResponse {
    pub node: Node,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

fn is_true(flag: Option<&str>) -> bool {
    flag.is_some_and(|f| f.eq_ignore_ascii_case("true"))
}
