//! Cluster lifecycle events and their document form.
//!
//! Events are immutable values produced by collaborators watching cluster
//! state. Every event renders to a flat JSON document made of the common
//! fields (`@timestamp`, optional `cluster_name`, `message`) followed by the
//! fields its variant contributes, always including an `event` tag.

pub mod descriptors;

pub use descriptors::{
    BlockLevel, ClusterBlock, DiscoveryNode, ShardId, ShardRouting, ShardRoutingState,
};

use crate::types::{format_timestamp, now_millis};
use serde_json::{json, Map, Value};
use std::fmt;

/// Output switches applied while rendering an event document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParams {
    pub output_cluster_name: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            output_cluster_name: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    ElectedAsMaster { node: DiscoveryNode },
    NodeJoinLeave { node: DiscoveryNode, joined: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    ElectedAsMaster { node: DiscoveryNode },
    NodeJoinLeave { node: DiscoveryNode, joined: bool },
    ClusterBlock { block: ClusterBlock, added: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEvent {
    ShardInitializing {
        shard: ShardRouting,
        node: DiscoveryNode,
    },
    ShardStarted {
        shard: ShardRouting,
        node: DiscoveryNode,
    },
    ShardPromotedToPrimary {
        shard: ShardRouting,
        node: DiscoveryNode,
    },
    ShardRelocating {
        shard: ShardRouting,
        from_node: DiscoveryNode,
        to_node: DiscoveryNode,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    IndexCreateDelete { index: String, created: bool },
}

/// Local lifecycle phase of a shard copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardPhase {
    Created,
    Started,
    Closed,
}

impl ShardPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ShardPhase::Created => "created",
            ShardPhase::Started => "started",
            ShardPhase::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEvent {
    pub phase: ShardPhase,
    pub shard_id: ShardId,
    pub node: DiscoveryNode,
    pub routing: Option<ShardRouting>,
    /// Relocation target for `Closed`, relocation source otherwise.
    pub relocating_node: Option<DiscoveryNode>,
    pub reason: Option<String>,
}

impl ShardEvent {
    pub fn new(phase: ShardPhase, shard_id: ShardId, node: DiscoveryNode) -> Self {
        Self {
            phase,
            shard_id,
            node,
            routing: None,
            relocating_node: None,
            reason: None,
        }
    }

    pub fn with_routing(mut self, routing: ShardRouting) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_relocating_node(mut self, node: DiscoveryNode) -> Self {
        self.relocating_node = Some(node);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn relocation_key(&self) -> &'static str {
        match self.phase {
            ShardPhase::Closed => "relocated_to",
            ShardPhase::Created | ShardPhase::Started => "relocated_from",
        }
    }

    fn description(&self) -> String {
        // Created shards have no routing yet.
        let subject = match (&self.phase, &self.routing) {
            (ShardPhase::Created, _) | (_, None) => self.shard_id.to_string(),
            (_, Some(routing)) => routing.description(),
        };
        let mut description = format!("{} {} on {}", subject, self.phase.as_str(), self.node);
        if let Some(other) = &self.relocating_node {
            if self.phase != ShardPhase::Created {
                let direction = match self.phase {
                    ShardPhase::Closed => "to",
                    _ => "from",
                };
                description.push_str(&format!(", relocated {} {}", direction, other));
            }
        }
        description
    }
}

/// The closed set of event variants, grouped by family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Node { source: String, event: NodeEvent },
    Cluster { source: String, event: ClusterEvent },
    Routing(RoutingEvent),
    Index { source: String, event: IndexEvent },
    Shard(ShardEvent),
}

impl EventKind {
    /// Stable family tag; never contains whitespace.
    pub fn type_tag(&self) -> &'static str {
        match self {
            EventKind::Node { .. } => "node_event",
            EventKind::Cluster { .. } => "cluster_event",
            EventKind::Routing(_) => "routing_event",
            EventKind::Index { .. } => "index_event",
            EventKind::Shard(_) => "shard_event",
        }
    }

    /// Variant tag written to the `event` field.
    pub fn event_tag(&self) -> &'static str {
        match self {
            EventKind::Node { event, .. } => match event {
                NodeEvent::ElectedAsMaster { .. } => "elected_as_master",
                NodeEvent::NodeJoinLeave { joined, .. } => join_leave_tag(*joined),
            },
            EventKind::Cluster { event, .. } => match event {
                ClusterEvent::ElectedAsMaster { .. } => "elected_as_master",
                ClusterEvent::NodeJoinLeave { joined, .. } => join_leave_tag(*joined),
                ClusterEvent::ClusterBlock { added: true, .. } => "block_added",
                ClusterEvent::ClusterBlock { added: false, .. } => "block_removed",
            },
            EventKind::Routing(event) => match event {
                RoutingEvent::ShardInitializing { .. } => "shard_initializing",
                RoutingEvent::ShardStarted { .. } => "shard_started",
                RoutingEvent::ShardPromotedToPrimary { .. } => "shard_promoted",
                RoutingEvent::ShardRelocating { .. } => "shard_relocating",
            },
            EventKind::Index { event, .. } => match event {
                IndexEvent::IndexCreateDelete { created: true, .. } => "index_created",
                IndexEvent::IndexCreateDelete { created: false, .. } => "index_deleted",
            },
            EventKind::Shard(event) => event.phase.as_str(),
        }
    }

    pub fn concise_description(&self) -> String {
        match self {
            EventKind::Node { event, .. } => match event {
                NodeEvent::ElectedAsMaster { node } => format!("{} became master", node),
                NodeEvent::NodeJoinLeave { node, joined } => join_leave_description(node, *joined),
            },
            EventKind::Cluster { event, .. } => match event {
                ClusterEvent::ElectedAsMaster { node } => format!("{} became master", node),
                ClusterEvent::NodeJoinLeave { node, joined } => {
                    join_leave_description(node, *joined)
                }
                ClusterEvent::ClusterBlock { block, added } => {
                    format!("{}: [{}]", if *added { "added" } else { "removed" }, block)
                }
            },
            EventKind::Routing(event) => match event {
                RoutingEvent::ShardInitializing { shard, node } => {
                    format!("{} initializing on {}", shard, node)
                }
                RoutingEvent::ShardStarted { shard, node } => {
                    format!("{} started on {}", shard, node)
                }
                RoutingEvent::ShardPromotedToPrimary { shard, node } => {
                    format!("{} promoted to primary on {}", shard.shard_id, node)
                }
                RoutingEvent::ShardRelocating {
                    shard,
                    from_node,
                    to_node,
                } => format!("{} relocating to {} from {}", shard, to_node, from_node),
            },
            EventKind::Index { event, .. } => match event {
                IndexEvent::IndexCreateDelete { index, created } => {
                    format!("[{}] {}", index, if *created { "created" } else { "deleted" })
                }
            },
            EventKind::Shard(event) => event.description(),
        }
    }

    fn write_fields(&self, body: &mut Map<String, Value>) {
        body.insert("event".into(), json!(self.event_tag()));
        match self {
            EventKind::Node { source, event } => {
                body.insert("event_source".into(), json!(source));
                match event {
                    NodeEvent::ElectedAsMaster { node } | NodeEvent::NodeJoinLeave { node, .. } => {
                        body.insert("node".into(), node.to_value());
                    }
                }
            }
            EventKind::Cluster { source, event } => {
                body.insert("event_source".into(), json!(source));
                match event {
                    ClusterEvent::ElectedAsMaster { node }
                    | ClusterEvent::NodeJoinLeave { node, .. } => {
                        body.insert("node".into(), node.to_value());
                    }
                    ClusterEvent::ClusterBlock { block, .. } => {
                        body.insert("block".into(), block.to_value());
                    }
                }
            }
            EventKind::Routing(event) => {
                let (shard, node) = match event {
                    RoutingEvent::ShardInitializing { shard, node }
                    | RoutingEvent::ShardStarted { shard, node }
                    | RoutingEvent::ShardPromotedToPrimary { shard, node } => (shard, node),
                    RoutingEvent::ShardRelocating {
                        shard, from_node, ..
                    } => (shard, from_node),
                };
                body.insert("index".into(), json!(shard.shard_id.index));
                body.insert("shard_id".into(), json!(shard.shard_id.id));
                body.insert("node".into(), node.to_value());
                body.insert("routing".into(), shard.to_value());
                if let RoutingEvent::ShardRelocating { to_node, .. } = event {
                    body.insert("relocated_to".into(), to_node.to_value());
                }
            }
            EventKind::Index { source, event } => {
                body.insert("event_source".into(), json!(source));
                match event {
                    IndexEvent::IndexCreateDelete { index, .. } => {
                        body.insert("index".into(), json!(index));
                    }
                }
            }
            EventKind::Shard(event) => {
                body.insert("reason".into(), json!(event.reason));
                body.insert("index".into(), json!(event.shard_id.index));
                body.insert("shard_id".into(), json!(event.shard_id.id));
                body.insert("node".into(), event.node.to_value());
                if let Some(routing) = &event.routing {
                    body.insert("routing".into(), routing.to_value());
                }
                if let Some(other) = &event.relocating_node {
                    body.insert(event.relocation_key().into(), other.to_value());
                }
            }
        }
    }
}

fn join_leave_tag(joined: bool) -> &'static str {
    if joined {
        "node_joined"
    } else {
        "node_left"
    }
}

fn join_leave_description(node: &DiscoveryNode, joined: bool) -> String {
    format!("{}{}", node, if joined { " joined" } else { " left" })
}

/// A timestamped cluster event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    timestamp: u64,
    cluster_name: String,
    kind: EventKind,
}

impl Event {
    pub fn new(timestamp: u64, cluster_name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            timestamp,
            cluster_name: cluster_name.into(),
            kind,
        }
    }

    /// Event stamped with the current wall-clock time.
    pub fn now(cluster_name: impl Into<String>, kind: EventKind) -> Self {
        Self::new(now_millis(), cluster_name, kind)
    }

    /// Milliseconds since Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    pub fn event_tag(&self) -> &'static str {
        self.kind.event_tag()
    }

    pub fn concise_description(&self) -> String {
        self.kind.concise_description()
    }

    /// Append this event's fields to `body`.
    pub fn write_body(&self, body: &mut Map<String, Value>, params: &RenderParams) {
        body.insert("@timestamp".into(), json!(format_timestamp(self.timestamp)));
        if params.output_cluster_name {
            body.insert("cluster_name".into(), json!(self.cluster_name));
        }
        body.insert("message".into(), json!(self.concise_description()));
        self.kind.write_fields(body);
    }

    pub fn to_document(&self, params: &RenderParams) -> Value {
        let mut body = Map::new();
        self.write_body(&mut body, params);
        Value::Object(body)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] event: [{}]", self.type_tag(), self.concise_description())
    }
}
