//! Node and portlet types for the patch graph.
//!
//! A [`Node`] is one unit generator instance: an id, a type tag, opaque
//! construction arguments, declared inlets/outlets, and the connection lists
//! (`sources` per inlet, `sinks` per outlet). Connection lists are owned by
//! [`Graph`](crate::Graph) and kept mirrored by its mutation methods.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Unique identifier for a node in the patch graph.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Stable arena index of a node inside one [`Graph`](crate::Graph).
///
/// Handles are assigned sequentially and never reused within a graph instance,
/// so a handle of a deleted node simply resolves to nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub(crate) u32);

impl NodeHandle {
    /// Returns the raw arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an inlet or outlet, unique per node and direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortletId(pub u32);

impl fmt::Display for PortletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PortletId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Whether a portlet carries a continuous signal or discrete messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortletKind {
    /// Per-sample audio signal.
    Signal,
    /// Discrete control messages.
    Message,
}

impl fmt::Display for PortletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortletKind::Signal => f.write_str("signal"),
            PortletKind::Message => f.write_str("message"),
        }
    }
}

/// A declared inlet or outlet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Portlet {
    /// Portlet id.
    pub id: PortletId,
    /// Signal or message.
    #[serde(rename = "type")]
    pub kind: PortletKind,
}

/// One end of a connection: a node and one of its portlets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEndpoint {
    /// Node owning the portlet.
    pub node_id: NodeId,
    /// Inlet or outlet id, depending on which side of the connection this is.
    pub portlet_id: PortletId,
}

impl ConnectionEndpoint {
    /// Creates an endpoint.
    pub fn new(node_id: impl Into<NodeId>, portlet_id: impl Into<PortletId>) -> Self {
        Self {
            node_id: node_id.into(),
            portlet_id: portlet_id.into(),
        }
    }
}

impl fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.portlet_id)
    }
}

/// A directed edge from an outlet (`from`) to an inlet (`to`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source outlet.
    pub from: ConnectionEndpoint,
    /// Sink inlet.
    pub to: ConnectionEndpoint,
}

/// Opaque construction argument, as written in the patch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeArgument {
    /// Numeric argument.
    Float(f64),
    /// Symbol argument.
    Symbol(String),
}

/// A unit generator instance in the patch graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Node type tag, used to look up its implementation.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Construction arguments.
    #[serde(default)]
    pub args: Vec<NodeArgument>,
    /// Declared inlets.
    #[serde(default)]
    pub inlets: BTreeMap<PortletId, Portlet>,
    /// Declared outlets.
    #[serde(default)]
    pub outlets: BTreeMap<PortletId, Portlet>,
    /// Incoming connections per inlet.
    #[serde(default)]
    pub(crate) sources: BTreeMap<PortletId, Vec<ConnectionEndpoint>>,
    /// Outgoing connections per outlet.
    #[serde(default)]
    pub(crate) sinks: BTreeMap<PortletId, Vec<ConnectionEndpoint>>,
    /// This node must always produce signal (e.g. an audio output).
    #[serde(default)]
    pub is_pulling_signal: bool,
    /// This node originates message events (e.g. a startup trigger).
    #[serde(default)]
    pub is_pushing_messages: bool,
}

impl Node {
    /// Creates a node with no portlets.
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            args: Vec::new(),
            inlets: BTreeMap::new(),
            outlets: BTreeMap::new(),
            sources: BTreeMap::new(),
            sinks: BTreeMap::new(),
            is_pulling_signal: false,
            is_pushing_messages: false,
        }
    }

    /// Declares an inlet.
    pub fn with_inlet(mut self, id: impl Into<PortletId>, kind: PortletKind) -> Self {
        let id = id.into();
        self.inlets.insert(id, Portlet { id, kind });
        self
    }

    /// Declares an outlet.
    pub fn with_outlet(mut self, id: impl Into<PortletId>, kind: PortletKind) -> Self {
        let id = id.into();
        self.outlets.insert(id, Portlet { id, kind });
        self
    }

    /// Appends a construction argument.
    pub fn with_arg(mut self, arg: NodeArgument) -> Self {
        self.args.push(arg);
        self
    }

    /// Marks the node as a signal sink that must always be computed.
    pub fn pulling_signal(mut self) -> Self {
        self.is_pulling_signal = true;
        self
    }

    /// Marks the node as a message origin.
    pub fn pushing_messages(mut self) -> Self {
        self.is_pushing_messages = true;
        self
    }

    /// Returns the declared inlet `id`.
    pub fn inlet(&self, id: PortletId) -> Result<&Portlet, GraphError> {
        self.inlets.get(&id).ok_or_else(|| GraphError::UnknownInlet {
            node_id: self.id.clone(),
            portlet_id: id,
        })
    }

    /// Returns the declared outlet `id`.
    pub fn outlet(&self, id: PortletId) -> Result<&Portlet, GraphError> {
        self.outlets.get(&id).ok_or_else(|| GraphError::UnknownOutlet {
            node_id: self.id.clone(),
            portlet_id: id,
        })
    }

    /// Connections arriving at inlet `id` (empty if none).
    pub fn sources_of(&self, id: PortletId) -> &[ConnectionEndpoint] {
        self.sources.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Connections leaving outlet `id` (empty if none).
    pub fn sinks_of(&self, id: PortletId) -> &[ConnectionEndpoint] {
        self.sinks.get(&id).map_or(&[], Vec::as_slice)
    }

    /// All incoming connections, per inlet, in ascending inlet order.
    pub fn sources(&self) -> impl Iterator<Item = (PortletId, &[ConnectionEndpoint])> {
        self.sources.iter().map(|(id, eps)| (*id, eps.as_slice()))
    }

    /// All outgoing connections, per outlet, in ascending outlet order.
    pub fn sinks(&self) -> impl Iterator<Item = (PortletId, &[ConnectionEndpoint])> {
        self.sinks.iter().map(|(id, eps)| (*id, eps.as_slice()))
    }

    /// Inlets of the given kind, in ascending id order.
    pub fn inlets_of_kind(&self, kind: PortletKind) -> impl Iterator<Item = &Portlet> {
        self.inlets.values().filter(move |p| p.kind == kind)
    }

    /// Outlets of the given kind, in ascending id order.
    pub fn outlets_of_kind(&self, kind: PortletKind) -> impl Iterator<Item = &Portlet> {
        self.outlets.values().filter(move |p| p.kind == kind)
    }

    /// Ids of nodes feeding any signal inlet of this node, in inlet order.
    pub fn signal_source_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.inlets_of_kind(PortletKind::Signal)
            .flat_map(|inlet| self.sources_of(inlet.id))
            .map(|ep| &ep.node_id)
    }

    /// Ids of nodes fed by any signal outlet of this node, in outlet order.
    pub fn signal_sink_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.outlets_of_kind(PortletKind::Signal)
            .flat_map(|outlet| self.sinks_of(outlet.id))
            .map(|ep| &ep.node_id)
    }

    pub(crate) fn clear_connections(&mut self) {
        self.sources.clear();
        self.sinks.clear();
    }
}
