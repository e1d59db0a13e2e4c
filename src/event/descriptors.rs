//! Cluster entities referenced by events: nodes, shards, routings and blocks.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

/// A cluster member as seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryNode {
    pub id: String,
    pub name: String,
    pub transport_address: String,
    pub address: Option<SocketAddr>,
    pub host_name: Option<String>,
    pub master_node: bool,
    pub data_node: bool,
    pub attributes: BTreeMap<String, String>,
}

impl DiscoveryNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        transport_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport_address: transport_address.into(),
            address: None,
            host_name: None,
            master_node: true,
            data_node: true,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    pub fn with_roles(mut self, master_node: bool, data_node: bool) -> Self {
        self.master_node = master_node;
        self.data_node = data_node;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn ip_port(&self) -> Option<String> {
        self.address
            .map(|addr| format!("{}:{}", addr.ip(), addr.port()))
    }

    /// `[name][ip:port]`, or `[name]` when the address is unknown.
    pub fn description(&self) -> String {
        match self.ip_port() {
            Some(ip_port) => format!("[{}][{}]", self.name, ip_port),
            None => format!("[{}]", self.name),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut node = Map::new();
        node.insert("id".into(), json!(self.id));
        node.insert("name".into(), json!(self.name));
        node.insert("transport_address".into(), json!(self.transport_address));
        if let Some(addr) = self.address {
            let ip = addr.ip().to_string();
            let host = self.host_name.clone().unwrap_or_else(|| ip.clone());
            node.insert("ip".into(), json!(ip));
            node.insert("host".into(), json!(host));
            node.insert("ip_port".into(), json!(self.ip_port()));
        } else if let Some(host) = &self.host_name {
            node.insert("host".into(), json!(host));
        }
        node.insert("master_node".into(), json!(self.master_node));
        node.insert("data_node".into(), json!(self.data_node));
        if !self.attributes.is_empty() {
            node.insert("attributes".into(), json!(self.attributes));
        }
        Value::Object(node)
    }
}

impl fmt::Display for DiscoveryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardId {
    pub index: String,
    pub id: u32,
}

impl ShardId {
    pub fn new(index: impl Into<String>, id: u32) -> Self {
        Self {
            index: index.into(),
            id,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardRoutingState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
}

impl ShardRoutingState {
    pub fn as_str(self) -> &'static str {
        match self {
            ShardRoutingState::Unassigned => "UNASSIGNED",
            ShardRoutingState::Initializing => "INITIALIZING",
            ShardRoutingState::Started => "STARTED",
            ShardRoutingState::Relocating => "RELOCATING",
        }
    }
}

/// Placement of one shard copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRouting {
    pub shard_id: ShardId,
    pub primary: bool,
    pub state: ShardRoutingState,
    pub current_node_id: Option<String>,
    pub relocating_node_id: Option<String>,
    pub version: u64,
}

impl ShardRouting {
    pub fn new(shard_id: ShardId, primary: bool, state: ShardRoutingState) -> Self {
        Self {
            shard_id,
            primary,
            state,
            current_node_id: None,
            relocating_node_id: None,
            version: 0,
        }
    }

    pub fn on_node(mut self, node_id: impl Into<String>) -> Self {
        self.current_node_id = Some(node_id.into());
        self
    }

    pub fn relocating_to(mut self, node_id: impl Into<String>) -> Self {
        self.relocating_node_id = Some(node_id.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// `[index][id][P]` for primaries, `[index][id][R]` for replicas.
    pub fn description(&self) -> String {
        format!("{}[{}]", self.shard_id, if self.primary { "P" } else { "R" })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "state": self.state.as_str(),
            "primary": self.primary,
            "node": self.current_node_id,
            "relocating_node": self.relocating_node_id,
            "shard": self.shard_id.id,
            "index": self.shard_id.index,
        })
    }
}

impl fmt::Display for ShardRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockLevel {
    Read,
    Write,
    MetadataRead,
    MetadataWrite,
}

impl BlockLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockLevel::Read => "read",
            BlockLevel::Write => "write",
            BlockLevel::MetadataRead => "metadata_read",
            BlockLevel::MetadataWrite => "metadata_write",
        }
    }
}

/// An operation block placed on the cluster or an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterBlock {
    pub id: u32,
    pub description: String,
    pub retryable: bool,
    pub levels: Vec<BlockLevel>,
}

impl ClusterBlock {
    pub fn new(id: u32, description: impl Into<String>, retryable: bool, levels: Vec<BlockLevel>) -> Self {
        Self {
            id,
            description: description.into(),
            retryable,
            levels,
        }
    }

    /// Object keyed by the block id.
    pub fn to_value(&self) -> Value {
        let levels: Vec<&str> = self.levels.iter().map(|l| l.as_str()).collect();
        let mut block = Map::new();
        block.insert(
            self.id.to_string(),
            json!({
                "description": self.description,
                "retryable": self.retryable,
                "levels": levels,
            }),
        );
        Value::Object(block)
    }
}

impl fmt::Display for ClusterBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}, blocks ", self.id, self.description)?;
        let levels: Vec<String> = self
            .levels
            .iter()
            .map(|l| l.as_str().to_ascii_uppercase())
            .collect();
        f.write_str(&levels.join(","))
    }
}
